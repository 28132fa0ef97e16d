//! Localization and state upload from CSV tables.

use serde_json::Map;
use tracing::info;

use crate::api::{AnnotationApi, EntityKind, LocalizationSpec, StateSpec};
use crate::error::TatorError;
use crate::resolve::{Query, Resolver, Scope};
use crate::table::{infer_value, Table};

/// Maximum records per create request.
pub const BATCH_SIZE: usize = 500;

const LOCALIZATION_REQUIRED: [&str; 6] = ["media", "frame", "x", "y", "width", "height"];
/// Columns that never become localization attributes.
const LOCALIZATION_RESERVED: [&str; 2] = ["version", "type"];

const STATE_REQUIRED: [&str; 2] = ["media_id", "frame"];
const STATE_PER_ROW: [&str; 2] = ["statetype_id", "version_id"];

/// Column edits applied before a table is turned into upload specs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnEdits {
    /// `(old, new)` renames; a missing `old` column is an error.
    pub rename: Vec<(String, String)>,
    /// `(name, content)` constant columns.
    pub add: Vec<(String, String)>,
    /// Columns excluded from the uploaded attributes.
    pub drop: Vec<String>,
}

impl ColumnEdits {
    pub fn apply(&self, table: &mut Table) -> Result<(), TatorError> {
        for (old, new) in &self.rename {
            table.rename_column(old, new)?;
        }
        for (name, content) in &self.add {
            table.set_constant(name, content);
        }
        Ok(())
    }
}

/// Builds localization specs from `table`, sorting it by the required
/// columns first.
///
/// Every column other than the required ones, `version`, `type` and
/// `dropped` becomes an attribute. `media` cells may hold a media name
/// (looked up in `project`) or an ID.
pub fn localization_specs<A: AnnotationApi>(
    resolver: &Resolver<A>,
    table: &mut Table,
    project: u64,
    type_id: u64,
    version_id: u64,
    dropped: &[String],
) -> Result<Vec<LocalizationSpec>, TatorError> {
    let required = require_all(table, &LOCALIZATION_REQUIRED)?;
    table.sort_by_columns(&required);
    let attributes = attribute_columns(table, |name| {
        LOCALIZATION_REQUIRED.contains(&name)
            || LOCALIZATION_RESERVED.contains(&name)
            || dropped.iter().any(|d| d == name)
    });

    let scope = Scope::Id(project);
    let [media_col, frame_col, x_col, y_col, w_col, h_col] = [
        required[0], required[1], required[2], required[3], required[4], required[5],
    ];

    let mut specs = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let media = resolver.resolve_one(
            EntityKind::Media,
            Query::parse(table.cell(row, media_col).trim()),
            Some(&scope),
        )?;
        specs.push(LocalizationSpec {
            media_id: media.id,
            type_id,
            frame: table.u64_at(row, frame_col)?,
            x: table.f64_at(row, x_col)?,
            y: table.f64_at(row, y_col)?,
            width: table.f64_at(row, w_col)?,
            height: table.f64_at(row, h_col)?,
            version: version_id,
            attributes: row_attributes(table, row, &attributes),
        });
    }
    Ok(specs)
}

/// Creates localizations in batches of [`BATCH_SIZE`], in order.
pub fn upload_localizations<A: AnnotationApi>(
    api: &A,
    project: u64,
    specs: &[LocalizationSpec],
) -> Result<Vec<u64>, TatorError> {
    in_batches(specs, "localizations", |batch| {
        api.create_localizations(project, batch)
    })
}

/// Where each uploaded state's type and version come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateTarget {
    /// One state type and version for every row.
    Fixed { type_id: u64, version_id: u64 },
    /// `statetype_id` and `version_id` columns on every row.
    PerRow,
}

#[derive(Clone, Copy)]
enum RowIds {
    Fixed(u64, u64),
    Columns(usize, usize),
}

/// Builds state specs from `table`, sorting it by the key columns first.
///
/// Every column other than `media_id`, `frame`, `statetype_id` and
/// `version_id` becomes an attribute.
pub fn state_specs(table: &mut Table, target: StateTarget) -> Result<Vec<StateSpec>, TatorError> {
    let mut required = require_all(table, &STATE_REQUIRED)?;
    let source = match target {
        StateTarget::Fixed {
            type_id,
            version_id,
        } => RowIds::Fixed(type_id, version_id),
        StateTarget::PerRow => {
            let cols = require_all(table, &STATE_PER_ROW)?;
            required.extend(&cols);
            RowIds::Columns(cols[0], cols[1])
        }
    };
    table.sort_by_columns(&required);
    let attributes = attribute_columns(table, |name| {
        STATE_REQUIRED.contains(&name) || STATE_PER_ROW.contains(&name)
    });

    let mut specs = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let (type_id, version) = match source {
            RowIds::Fixed(type_id, version_id) => (type_id, version_id),
            RowIds::Columns(type_col, version_col) => {
                (table.u64_at(row, type_col)?, table.u64_at(row, version_col)?)
            }
        };
        specs.push(StateSpec {
            media_ids: vec![table.u64_at(row, required[0])?],
            frame: table.u64_at(row, required[1])?,
            type_id,
            version,
            attributes: row_attributes(table, row, &attributes),
        });
    }
    Ok(specs)
}

/// Creates states in batches of [`BATCH_SIZE`], in order.
pub fn upload_states<A: AnnotationApi>(
    api: &A,
    project: u64,
    specs: &[StateSpec],
) -> Result<Vec<u64>, TatorError> {
    in_batches(specs, "states", |batch| api.create_states(project, batch))
}

fn in_batches<T>(
    specs: &[T],
    what: &str,
    mut create: impl FnMut(&[T]) -> Result<Vec<u64>, TatorError>,
) -> Result<Vec<u64>, TatorError> {
    let batches = specs.len().div_ceil(BATCH_SIZE);
    let mut created = Vec::with_capacity(specs.len());
    for (idx, batch) in specs.chunks(BATCH_SIZE).enumerate() {
        let ids = create(batch)?;
        info!(batch = idx + 1, of = batches, created = ids.len(), "uploaded {what}");
        created.extend(ids);
    }
    Ok(created)
}

fn require_all(table: &Table, names: &[&str]) -> Result<Vec<usize>, TatorError> {
    let missing: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| table.column(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(TatorError::CsvInvalid {
            path: table.source().to_path_buf(),
            message: format!("required columns missing: {}", missing.join(", ")),
        });
    }
    names.iter().map(|name| table.require_column(name)).collect()
}

fn attribute_columns(table: &Table, excluded: impl Fn(&str) -> bool) -> Vec<(usize, String)> {
    table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, name)| !excluded(name.as_str()))
        .map(|(idx, name)| (idx, name.clone()))
        .collect()
}

fn row_attributes(
    table: &Table,
    row: usize,
    columns: &[(usize, String)],
) -> Map<String, serde_json::Value> {
    columns
        .iter()
        .filter_map(|(col, name)| {
            infer_value(table.cell(row, *col)).map(|value| (name.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn states_csv(csv: &str) -> Table {
        Table::from_csv_str(csv).expect("parse csv")
    }

    #[test]
    fn column_edits_rename_and_add() {
        let mut table = states_csv("media,frame,label\nm,1,diatom\n");
        let edits = ColumnEdits {
            rename: vec![("label".to_string(), "Class".to_string())],
            add: vec![("Verified".to_string(), "true".to_string())],
            drop: Vec::new(),
        };
        edits.apply(&mut table).expect("apply edits");
        assert_eq!(table.headers(), ["media", "frame", "Class", "Verified"]);
        assert_eq!(table.rows()[0][3], "true");

        let missing = ColumnEdits {
            rename: vec![("nope".to_string(), "x".to_string())],
            ..ColumnEdits::default()
        };
        assert!(missing.apply(&mut table).is_err());
    }

    #[test]
    fn fixed_state_specs_use_overrides() {
        let mut table = states_csv("frame,media_id,Verified,Note\n3,9,true,\n1,9,false,blurry\n");
        let specs = state_specs(
            &mut table,
            StateTarget::Fixed {
                type_id: 4,
                version_id: 2,
            },
        )
        .expect("state specs");

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].frame, 1);
        assert_eq!(specs[0].media_ids, vec![9]);
        assert_eq!(specs[0].type_id, 4);
        assert_eq!(specs[0].attributes.get("Note"), Some(&json!("blurry")));
        assert_eq!(specs[0].attributes.get("Verified"), Some(&json!(false)));
        assert!(!specs[1].attributes.contains_key("Note"));
    }

    #[test]
    fn per_row_state_specs_need_columns() {
        let mut table = states_csv("media_id,frame,statetype_id,version_id,checked\n9,1,4,2,1\n");
        let specs = state_specs(&mut table, StateTarget::PerRow).expect("state specs");
        assert_eq!((specs[0].type_id, specs[0].version), (4, 2));
        assert_eq!(specs[0].attributes.len(), 1);

        let mut bare = states_csv("media_id,frame\n9,1\n");
        let err = state_specs(&mut bare, StateTarget::PerRow).unwrap_err();
        assert!(err.to_string().contains("statetype_id, version_id"));
    }

    #[test]
    fn batches_preserve_order() {
        let specs: Vec<u32> = (0..1_201).collect();
        let mut sizes = Vec::new();
        let ids = in_batches(&specs, "things", |batch| {
            sizes.push(batch.len());
            Ok(batch.iter().map(|v| u64::from(*v)).collect())
        })
        .expect("batches");
        assert_eq!(sizes, vec![500, 500, 201]);
        assert_eq!(ids.len(), 1_201);
        assert_eq!(ids[1_200], 1_200);
    }
}
