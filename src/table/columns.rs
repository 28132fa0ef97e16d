//! Configurable column names for localization CSV files.

use clap::Args;

/// Names of the localization columns in a CSV file.
///
/// Boxes are normalized with `(x, y)` at the top-left corner unless a command
/// says otherwise.
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct LocalizationColumns {
    /// Media name or ID column.
    #[arg(long = "col-media", default_value = "media")]
    pub media: String,

    /// Frame number column.
    #[arg(long = "col-frame", default_value = "frame")]
    pub frame: String,

    /// Box x column.
    #[arg(long = "col-x", default_value = "x")]
    pub x: String,

    /// Box y column.
    #[arg(long = "col-y", default_value = "y")]
    pub y: String,

    /// Box width column.
    #[arg(long = "col-w", default_value = "width")]
    pub width: String,

    /// Box height column.
    #[arg(long = "col-h", default_value = "height")]
    pub height: String,

    /// Class label column.
    #[arg(long = "col-class", default_value = "Class")]
    pub class: String,

    /// Local image path column.
    #[arg(long = "col-imagepath", default_value = "imagepath")]
    pub imagepath: String,
}

impl Default for LocalizationColumns {
    fn default() -> Self {
        Self {
            media: "media".to_string(),
            frame: "frame".to_string(),
            x: "x".to_string(),
            y: "y".to_string(),
            width: "width".to_string(),
            height: "height".to_string(),
            class: "Class".to_string(),
            imagepath: "imagepath".to_string(),
        }
    }
}
