//! YOLO training directories.
//!
//! [`export`] turns a localization CSV into an Ultralytics-style training
//! directory (`images/`, `labels/`, image list files and a dataset YAML).
//! [`import`] reads YOLO label files (typically model predictions) back into a
//! localization table.

pub mod export;
pub mod import;
pub mod split;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TatorError;

pub(crate) const LABEL_EXTENSION: &str = "txt";

/// Where the ordered class list comes from.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ClassSource {
    /// Sorted distinct class labels found in the input.
    #[default]
    Auto,
    /// An explicit list; the index of a name is its YOLO class ID.
    List(Vec<String>),
}

impl ClassSource {
    /// Parses `auto` or a path to a class file (see [`read_class_file`]).
    pub fn parse(raw: &str) -> Result<Self, TatorError> {
        if raw == "auto" {
            return Ok(ClassSource::Auto);
        }
        let path = Path::new(raw);
        if !path.is_file() {
            return Err(TatorError::InvalidArgument(format!(
                "--classes must be 'auto' or an existing class file, got '{raw}'"
            )));
        }
        Ok(ClassSource::List(read_class_file(path)?))
    }
}

#[derive(Debug, Deserialize)]
struct ClassYaml {
    names: ClassYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

/// Reads an ordered class list.
///
/// `.yaml`/`.yml` files use the `names` key (a sequence, or an index mapping
/// whose gaps become `class_<n>`); any other file is one class per line.
pub fn read_class_file(path: &Path) -> Result<Vec<String>, TatorError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yaml" | "yml") => read_yaml_names(path),
        Some("pt") => Err(TatorError::UnsupportedFormat(format!(
            "'{}' (model checkpoints cannot be read; export the class names to YAML or text)",
            path.display()
        ))),
        _ => {
            let data = fs::read_to_string(path).map_err(TatorError::Io)?;
            Ok(data
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect())
        }
    }
}

fn read_yaml_names(path: &Path) -> Result<Vec<String>, TatorError> {
    let data = fs::read_to_string(path).map_err(TatorError::Io)?;
    let parsed: ClassYaml =
        serde_yaml::from_str(&data).map_err(|source| TatorError::ClassFileParse {
            path: path.to_path_buf(),
            source,
        })?;

    let names = match parsed.names {
        ClassYamlNames::Sequence(names) => names,
        ClassYamlNames::Mapping(mapping) => {
            let Some(max_index) = mapping.keys().max().copied() else {
                return Ok(Vec::new());
            };
            let mut names = vec![String::new(); max_index + 1];
            for (index, name) in mapping {
                names[index] = name;
            }
            for (index, name) in names.iter_mut().enumerate() {
                if name.trim().is_empty() {
                    *name = format!("class_{index}");
                }
            }
            names
        }
    };

    Ok(names)
}

/// Contents of the dataset YAML consumed by YOLO trainers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetYaml {
    pub path: String,
    pub train: String,
    pub val: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    pub names: BTreeMap<usize, String>,
}

impl DatasetYaml {
    pub fn new(
        root: impl Into<String>,
        train: impl Into<String>,
        val: impl Into<String>,
        classes: &[String],
    ) -> Self {
        Self {
            path: root.into(),
            train: train.into(),
            val: val.into(),
            test: None,
            names: classes.iter().cloned().enumerate().collect(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), TatorError> {
        let yaml = serde_yaml::to_string(self).map_err(|source| TatorError::YamlWrite {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, yaml).map_err(TatorError::Io)
    }
}
