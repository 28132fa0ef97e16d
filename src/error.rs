use std::path::PathBuf;
use thiserror::Error;

use crate::api::EntityKind;

/// The main error type for tatorsync operations.
#[derive(Debug, Error)]
pub enum TatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} not found: \"{query}\"{hint}")]
    NotFound {
        kind: EntityKind,
        query: String,
        hint: String,
    },

    #[error("Duplicate {kind} found for \"{query}\": {ids:?}")]
    DuplicateName {
        kind: EntityKind,
        query: String,
        ids: Vec<u64>,
    },

    #[error("{kind} lookup for \"{query}\" requires a project (set --project)")]
    MissingScope { kind: EntityKind, query: String },

    #[error("Expected a single {kind} for \"{query}\", got a listing")]
    ExpectedSingle { kind: EntityKind, query: String },

    #[error("{operation} is not supported for {kind}")]
    UnsupportedOperation {
        kind: EntityKind,
        operation: &'static str,
    },

    #[error("Request to {url} failed: {message}")]
    Api { url: String, message: String },

    #[error("Request to {url} returned HTTP {status}: {body}")]
    ApiStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {url}: {message}")]
    ApiDecode { url: String, message: String },

    #[error("Invalid host URL '{host}': {message}")]
    InvalidHost { host: String, message: String },

    #[error("No API token given (use --token or TATOR_TOKEN)")]
    MissingToken,

    #[error("Failed to parse CSV from {path}: {source}")]
    CsvParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write CSV to {path}: {source}")]
    CsvWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid CSV data in {path}: {message}")]
    CsvInvalid { path: PathBuf, message: String },

    #[error("Failed to parse YOLO label file {path} at line {line}: {message}")]
    YoloLabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid YOLO layout at {path}: {message}")]
    YoloLayoutInvalid { path: PathBuf, message: String },

    #[error("Failed to parse class file {path}: {source}")]
    ClassFileParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write YAML to {path}: {source}")]
    YamlWrite {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Can't find image frames:\n  {}", format_paths(.paths))]
    MissingImages { paths: Vec<PathBuf> },

    #[error("Class '{class}' is not in the class list")]
    UnknownClass { class: String },

    #[error("Unrecognized CSV classes: {classes:?}")]
    UnrecognizedClasses { classes: Vec<String> },

    #[error("Invalid frame pattern '{pattern}': {message}")]
    FramePattern { pattern: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n  ")
}
