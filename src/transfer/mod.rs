//! Moving annotations between CSV files and the server.

pub mod download;
pub mod states;
pub mod upload;

use std::path::Path;

use crate::api::Entity;
use crate::error::TatorError;

pub use download::{
    download_chips, download_frames, fetch_localizations, localization_table, LocalizationFilter,
};
pub use states::{download_states, StateFilter};
pub use upload::{
    localization_specs, state_specs, upload_localizations, upload_states, ColumnEdits,
    StateTarget, BATCH_SIZE,
};

/// Media attribute naming the directory that holds a video's source frames.
pub const TIFF_DIR_ATTRIBUTE: &str = "tiff_dir";
/// Media attribute holding the per-frame file name pattern, e.g. `{:06d}.tiff`.
pub const TIFF_PATTERN_ATTRIBUTE: &str = "tiff_pattern";

/// The on-disk source image of `frame`, when the media records one.
pub fn frame_tiff(media: &Entity, frame: u64) -> Result<Option<String>, TatorError> {
    let (Some(dir), Some(pattern)) = (
        media.attribute_str(TIFF_DIR_ATTRIBUTE),
        media.attribute_str(TIFF_PATTERN_ATTRIBUTE),
    ) else {
        return Ok(None);
    };
    let file = format_frame_pattern(pattern, frame)?;
    Ok(Some(Path::new(dir).join(file).to_string_lossy().into_owned()))
}

/// Substitutes `frame` into a brace pattern.
///
/// Accepted placeholders are `{}`, `{0}` and an optional integer format after a
/// colon: `{:d}`, `{:6d}`, `{:06d}`, `{0:06d}`. `{{` and `}}` are literal
/// braces.
pub fn format_frame_pattern(pattern: &str, frame: u64) -> Result<String, TatorError> {
    let fail = |message: &str| TatorError::FramePattern {
        pattern: pattern.to_string(),
        message: message.to_string(),
    };

    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(fail("single '}' outside a placeholder")),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(fail("unterminated placeholder")),
                    }
                }
                out.push_str(&render_field(&field, frame).ok_or_else(|| {
                    fail("expected a placeholder like {}, {0} or {:06d}")
                })?);
            }
            _ => out.push(ch),
        }
    }
    Ok(out)
}

fn render_field(field: &str, frame: u64) -> Option<String> {
    let (index, spec) = field.split_once(':').unwrap_or((field, ""));
    if !(index.is_empty() || index == "0") {
        return None;
    }
    let spec = spec.strip_suffix('d').unwrap_or(spec);
    if spec.is_empty() {
        return Some(frame.to_string());
    }
    let zero_pad = spec.starts_with('0');
    let width: usize = spec.parse().ok()?;
    Some(if zero_pad {
        format!("{frame:0width$}")
    } else {
        format!("{frame:>width$}")
    })
}

/// Formats a server timestamp to whole seconds (`2023-03-21T14:05:09`),
/// dropping fractional seconds but keeping any UTC offset.
pub fn truncate_to_seconds(datetime: &str) -> String {
    let Some(dot) = datetime.find('.') else {
        return datetime.to_string();
    };
    let rest = &datetime[dot + 1..];
    let offset_at = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    format!("{}{}", &datetime[..dot], &rest[offset_at..])
}
