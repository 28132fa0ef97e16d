//! Annotation records (localizations and states) and their upload specs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A bounding box on one video frame, as returned by the server.
///
/// Coordinates are normalized to the frame size with `(x, y)` at the top-left
/// corner of the box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Localization {
    pub id: u64,
    #[serde(rename = "type", default)]
    pub type_id: Option<u64>,
    pub media: u64,
    #[serde(default)]
    pub frame: u64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub modified_by: Option<u64>,
    #[serde(default)]
    pub modified_datetime: Option<String>,
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

/// A frame-level annotation, as returned by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: u64,
    #[serde(rename = "type", default)]
    pub type_id: Option<u64>,
    #[serde(default)]
    pub media: Vec<u64>,
    #[serde(default)]
    pub frame: Option<u64>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub modified_by: Option<u64>,
    #[serde(default)]
    pub modified_datetime: Option<String>,
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

/// Filters for a localization listing. Empty fields are not sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalizationQuery {
    pub versions: Vec<u64>,
    pub type_id: Option<u64>,
    pub media_ids: Vec<u64>,
    pub frame: Option<u64>,
    /// Attribute equality filters as `(attribute, value)` pairs.
    pub attributes: Vec<(String, String)>,
    /// Result window `(start, stop)`.
    pub window: Option<(u64, u64)>,
    /// When non-empty, only these localizations are listed.
    pub ids: Vec<u64>,
}

/// Filters for a state listing. Empty fields are not sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateQuery {
    pub type_id: Option<u64>,
    pub versions: Vec<u64>,
    pub media_ids: Vec<u64>,
    pub attributes: Vec<(String, String)>,
}

/// A localization to create.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LocalizationSpec {
    pub media_id: u64,
    #[serde(rename = "type")]
    pub type_id: u64,
    pub frame: u64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub version: u64,
    pub attributes: Map<String, Value>,
}

/// A state to create.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StateSpec {
    pub media_ids: Vec<u64>,
    pub frame: u64,
    #[serde(rename = "type")]
    pub type_id: u64,
    pub version: u64,
    pub attributes: Map<String, Value>,
}
