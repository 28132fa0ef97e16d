//! YOLO label directory to localization CSV.
//!
//! Every `<name>_<frame>.txt` file below the input directory contributes one
//! row per label line. The media name is taken from the directory holding the
//! file, ignoring any `labels` component, so both `preds/<media>/labels/` and
//! `preds/<media>/` work.
//!
//! Coordinates are copied as written: `x` and `y` hold the box center. Run
//! `transform --action center-to-corner` before uploading the result.

use std::path::{Component, Path};

use walkdir::WalkDir;

use super::LABEL_EXTENSION;
use crate::error::TatorError;
use crate::table::Table;

pub const IMPORT_COLUMNS: [&str; 9] = [
    "media",
    "frame",
    "x",
    "y",
    "width",
    "height",
    "score",
    "class_idx",
    "Class",
];

/// One parsed label line.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelLine {
    pub class_id: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub score: Option<f64>,
}

/// Reads every label file under `dir` into a table sorted by media, frame,
/// x, y.
pub fn read_label_dir(dir: &Path, classes: &[String]) -> Result<Table, TatorError> {
    if !dir.is_dir() {
        return Err(TatorError::YoloLayoutInvalid {
            path: dir.to_path_buf(),
            message: "label directory does not exist".to_string(),
        });
    }

    let mut table = Table::new(IMPORT_COLUMNS.iter().map(|c| c.to_string()).collect());

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|err| TatorError::Io(err.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_label = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(LABEL_EXTENSION))
            .unwrap_or(false);
        if !is_label {
            continue;
        }

        let media = media_name(path)?;
        let frame = frame_number(path)?;
        let data = std::fs::read_to_string(path).map_err(TatorError::Io)?;

        for (idx, line) in data.lines().enumerate() {
            let Some(label) = parse_label_line(line, path, idx + 1)? else {
                continue;
            };
            let class = classes.get(label.class_id).ok_or_else(|| TatorError::YoloLabelParse {
                path: path.to_path_buf(),
                line: idx + 1,
                message: format!(
                    "class index {} is outside the class list ({} classes)",
                    label.class_id,
                    classes.len()
                ),
            })?;

            table.push_row(vec![
                media.clone(),
                frame.to_string(),
                label.x.to_string(),
                label.y.to_string(),
                label.width.to_string(),
                label.height.to_string(),
                label.score.map(|s| s.to_string()).unwrap_or_default(),
                label.class_id.to_string(),
                class.clone(),
            ]);
        }
    }

    table.sort_by_columns(&[0, 1, 2, 3]);
    Ok(table)
}

fn media_name(path: &Path) -> Result<String, TatorError> {
    path.parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .filter(|name| *name != "labels")
        .last()
        .map(str::to_string)
        .ok_or_else(|| TatorError::YoloLayoutInvalid {
            path: path.to_path_buf(),
            message: "cannot derive a media name from the label file's directory".to_string(),
        })
}

fn frame_number(path: &Path) -> Result<u64, TatorError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplit_once('_'))
        .and_then(|(_, frame)| frame.parse::<u64>().ok())
        .ok_or_else(|| TatorError::YoloLayoutInvalid {
            path: path.to_path_buf(),
            message: "expected a label file named <name>_<frame>.txt".to_string(),
        })
}

/// Parses `class x y w h [score]`. Blank lines yield `None`.
pub fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<LabelLine>, TatorError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // Bounded so a corrupt file cannot allocate without limit.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(7).collect();
    if !(5..=6).contains(&tokens.len()) {
        return Err(TatorError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!("expected 5 or 6 tokens, found {}", tokens.len()),
        });
    }

    let class_id = tokens[0]
        .parse::<usize>()
        .map_err(|_| TatorError::YoloLabelParse {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!(
                "invalid class index '{}'; expected non-negative integer",
                tokens[0]
            ),
        })?;

    let number = |idx: usize, field: &str| -> Result<f64, TatorError> {
        tokens[idx]
            .parse::<f64>()
            .map_err(|_| TatorError::YoloLabelParse {
                path: file_path.to_path_buf(),
                line: line_num,
                message: format!("invalid {field} '{}'; expected a number", tokens[idx]),
            })
    };

    Ok(Some(LabelLine {
        class_id,
        x: number(1, "x")?,
        y: number(2, "y")?,
        width: number(3, "width")?,
        height: number(4, "height")?,
        score: if tokens.len() == 6 {
            Some(number(5, "score")?)
        } else {
            None
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_lines_with_and_without_score() {
        let path = Path::new("m_1.txt");
        let line = parse_label_line("2 0.5 0.25 0.3 0.1 0.87", path, 1)
            .expect("parse")
            .expect("row");
        assert_eq!(line.class_id, 2);
        assert_eq!(line.score, Some(0.87));

        let line = parse_label_line("0 0.5 0.5 0.1 0.1", path, 2)
            .expect("parse")
            .expect("row");
        assert_eq!(line.score, None);

        assert!(parse_label_line("   ", path, 3).expect("blank").is_none());
    }

    #[test]
    fn rejects_bad_token_counts_and_values() {
        let path = Path::new("m_1.txt");
        assert!(parse_label_line("0 0.5 0.5 0.1", path, 1).is_err());
        assert!(parse_label_line("0 0.1 0.2 0.3 0.4 0.5 0.6", path, 1).is_err());
        let err = parse_label_line("-1 0.5 0.5 0.1 0.1", path, 4).unwrap_err();
        assert!(matches!(err, TatorError::YoloLabelParse { line: 4, .. }));
        assert!(parse_label_line("0 abc 0.5 0.1 0.1", path, 1).is_err());
    }

    #[test]
    fn media_and_frame_come_from_path() {
        let path = Path::new("preds/cam7_run/labels/basler_000123.txt");
        assert_eq!(media_name(path).expect("media"), "cam7_run");
        assert_eq!(frame_number(path).expect("frame"), 123);

        let flat = Path::new("preds/cam7_run/x_5.txt");
        assert_eq!(media_name(flat).expect("media"), "cam7_run");
        assert!(frame_number(Path::new("preds/nounderscore.txt")).is_err());
    }

    #[test]
    fn reads_and_sorts_directory() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let labels = temp.path().join("mediaA").join("labels");
        fs::create_dir_all(&labels).expect("create labels");
        fs::write(labels.join("cam_10.txt"), "1 0.5 0.5 0.1 0.1 0.9\n").expect("write");
        fs::write(
            labels.join("cam_2.txt"),
            "0 0.7 0.5 0.1 0.1 0.4\n0 0.2 0.5 0.1 0.1 0.6\n",
        )
        .expect("write");

        let classes = vec!["diatom".to_string(), "salp".to_string()];
        let table = read_label_dir(temp.path(), &classes).expect("read dir");

        assert_eq!(table.headers(), IMPORT_COLUMNS);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[0][..3], ["mediaA", "2", "0.2"]);
        assert_eq!(table.rows()[1][2], "0.7");
        assert_eq!(table.rows()[2][1], "10");
        assert_eq!(table.rows()[2][8], "salp");
    }

    #[test]
    fn class_index_outside_list_fails() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("cam_1.txt"), "3 0.5 0.5 0.1 0.1\n").expect("write");
        let err = read_label_dir(temp.path(), &["diatom".to_string()]).unwrap_err();
        assert!(matches!(err, TatorError::YoloLabelParse { line: 1, .. }));
    }
}
