//! In-place fix-ups of localization CSV tables.
//!
//! Offline actions rewrite box coordinates and class labels. The remote
//! actions compare classes with the project's taxonomy and fill image paths
//! from media attributes.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::Value;
use tracing::info;

use crate::api::{AnnotationApi, Entity, EntityKind};
use crate::error::TatorError;
use crate::geom::BBox;
use crate::resolve::{Query, Resolver, Scope};
use crate::table::{LocalizationColumns, Table};
use crate::transfer::frame_tiff;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum TransformAction {
    /// Compare CSV classes with project leaves and the class enum.
    CheckClasses,
    /// Fill the image path column from media frame attributes.
    AddTiffFrame,
    /// Move (x, y) from the top-left corner to the box center.
    CornerToCenter,
    /// Move (x, y) from the box center to the top-left corner.
    CenterToCorner,
}

impl TransformAction {
    pub fn needs_remote(self) -> bool {
        matches!(
            self,
            TransformAction::CheckClasses | TransformAction::AddTiffFrame
        )
    }
}

/// Rewrites class labels; returns the number of changed cells.
pub fn rename_classes(
    table: &mut Table,
    class_column: &str,
    renames: &[(String, String)],
) -> Result<usize, TatorError> {
    let col = table.require_column(class_column)?;
    let mut changed = 0;
    for row in 0..table.len() {
        let current = table.cell(row, col);
        if let Some((_, new)) = renames.iter().find(|(old, _)| old == current) {
            let new = new.clone();
            table.set_cell(row, col, new);
            changed += 1;
        }
    }
    Ok(changed)
}

/// Shifts `x`/`y` by half the box size in the direction of `action`, then
/// rounds and clips them as [`BBox::clip_origin`] does.
pub fn shift_boxes(
    table: &mut Table,
    columns: &LocalizationColumns,
    action: TransformAction,
) -> Result<(), TatorError> {
    let x_col = table.require_column(&columns.x)?;
    let y_col = table.require_column(&columns.y)?;
    let w_col = table.require_column(&columns.width)?;
    let h_col = table.require_column(&columns.height)?;

    for row in 0..table.len() {
        let (x, y, w, h) = (
            table.f64_at(row, x_col)?,
            table.f64_at(row, y_col)?,
            table.f64_at(row, w_col)?,
            table.f64_at(row, h_col)?,
        );
        let shifted = match action {
            TransformAction::CornerToCenter => {
                let (cx, cy) = BBox::from_corner(x, y, w, h).center();
                BBox::from_corner(cx, cy, w, h)
            }
            TransformAction::CenterToCorner => BBox::from_center(x, y, w, h),
            other => {
                return Err(TatorError::InvalidArgument(format!(
                    "{other:?} is not a coordinate conversion"
                )))
            }
        };
        let clipped = shifted.clip_origin();
        table.set_cell(row, x_col, clipped.x.to_string());
        table.set_cell(row, y_col, clipped.y.to_string());
    }
    Ok(())
}

/// Fills the image path column with each row's source frame file.
pub fn add_tiff_frame<A: AnnotationApi>(
    resolver: &Resolver<A>,
    table: &mut Table,
    project: &Scope,
    columns: &LocalizationColumns,
) -> Result<(), TatorError> {
    let media_col = table.require_column(&columns.media)?;
    let frame_col = table.require_column(&columns.frame)?;
    let path_col = table.ensure_column(&columns.imagepath);

    for row in 0..table.len() {
        let media = resolver.resolve_one(
            EntityKind::Media,
            Query::parse(table.cell(row, media_col).trim()),
            Some(project),
        )?;
        let frame = table.u64_at(row, frame_col)?;
        let tiff = frame_tiff(&media, frame)?.ok_or_else(|| {
            TatorError::InvalidArgument(format!(
                "media \"{}\" (id={}) has no tiff_dir/tiff_pattern attributes",
                media.name_str(),
                media.id
            ))
        })?;
        table.set_cell(row, path_col, tiff);
    }
    info!(rows = table.len(), "added frame image paths");
    Ok(())
}

/// CSV classes missing from the project's class sources.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassCheck {
    pub missing_from_enum: BTreeSet<String>,
    pub missing_from_leaves: BTreeSet<String>,
}

impl ClassCheck {
    /// Fails when any class is not a project leaf.
    pub fn ensure_known(&self) -> Result<(), TatorError> {
        if self.missing_from_leaves.is_empty() {
            Ok(())
        } else {
            Err(TatorError::UnrecognizedClasses {
                classes: self.missing_from_leaves.iter().cloned().collect(),
            })
        }
    }
}

impl fmt::Display for ClassCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MISSING FROM ENUM: {:?}", self.missing_from_enum)?;
        write!(f, "MISSING FROM LEAFS: {:?}", self.missing_from_leaves)
    }
}

/// Compares CSV classes with project leaf names and the enum choices of the
/// localization type's class attribute.
pub fn check_classes<A: AnnotationApi>(
    resolver: &Resolver<A>,
    table: &Table,
    project: &Scope,
    class_column: &str,
    loctype: Option<&Query>,
) -> Result<ClassCheck, TatorError> {
    let col = table.require_column(class_column)?;
    let csv_classes: BTreeSet<String> = (0..table.len())
        .map(|row| table.cell(row, col).to_string())
        .collect();

    let leaves: BTreeSet<String> = resolver
        .list(EntityKind::Leaf, Some(project))?
        .into_iter()
        .filter_map(|leaf| leaf.name)
        .collect();

    let loctype = match loctype {
        Some(query) => {
            resolver.resolve_one(EntityKind::LocalizationType, query.clone(), Some(project))?
        }
        None => {
            let loctypes = resolver.list(EntityKind::LocalizationType, Some(project))?;
            loctypes.into_iter().next().ok_or_else(|| {
                TatorError::InvalidArgument(format!(
                    "project {project} has no localization types"
                ))
            })?
        }
    };
    let choices: BTreeSet<String> = enum_choices(&loctype, class_column).into_iter().collect();

    Ok(ClassCheck {
        missing_from_enum: csv_classes.difference(&choices).cloned().collect(),
        missing_from_leaves: csv_classes.difference(&leaves).cloned().collect(),
    })
}

/// Choices of the enum attribute named `preferred`, or of the first enum
/// attribute of the type.
fn enum_choices(loctype: &Entity, preferred: &str) -> Vec<String> {
    let Some(Value::Array(attribute_types)) = loctype.extra.get("attribute_types") else {
        return Vec::new();
    };
    let enums: Vec<&Value> = attribute_types
        .iter()
        .filter(|attr| attr.get("dtype").and_then(Value::as_str) == Some("enum"))
        .collect();
    let chosen = enums
        .iter()
        .find(|attr| attr.get("name").and_then(Value::as_str) == Some(preferred))
        .or_else(|| enums.first());

    chosen
        .and_then(|attr| attr.get("choices"))
        .and_then(Value::as_array)
        .map(|choices| {
            choices
                .iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
