//! Frame-state download.

use std::collections::BTreeMap;

use tracing::info;

use super::{frame_tiff, truncate_to_seconds};
use crate::api::{value_to_string, AnnotationApi, EntityKind, StateQuery};
use crate::error::TatorError;
use crate::resolve::{Query, Resolver, Scope};
use crate::table::Table;

const LEADING_COLUMNS: [&str; 6] = [
    "id",
    "media_id",
    "media",
    "frame",
    "modified_by",
    "modified_datetime",
];

#[derive(Clone, Debug, PartialEq)]
pub struct StateFilter {
    pub project: Scope,
    pub statetype: Query,
    pub version: Option<Query>,
    pub media: Option<Query>,
    pub attributes: Vec<(String, String)>,
}

/// Lists states as CSV rows sorted by media name then frame.
///
/// Media names lose their file extension; `tiff_frame` is filled from the
/// media's frame directory attributes when present.
pub fn download_states<A: AnnotationApi>(
    resolver: &Resolver<A>,
    filter: &StateFilter,
) -> Result<Table, TatorError> {
    let project = resolver.project_id(&filter.project)?;
    let scope = Scope::Id(project);

    let statetype =
        resolver.resolve_one(EntityKind::StateType, filter.statetype.clone(), Some(&scope))?;
    let mut query = StateQuery {
        type_id: Some(statetype.id),
        attributes: filter.attributes.clone(),
        ..StateQuery::default()
    };
    if let Some(version) = &filter.version {
        let version = resolver.resolve_one(EntityKind::Version, version.clone(), Some(&scope))?;
        query.versions = vec![version.id];
    }
    if let Some(media) = &filter.media {
        let media = resolver.resolve_one(EntityKind::Media, media.clone(), Some(&scope))?;
        query.media_ids = vec![media.id];
    }

    let states = resolver.api().list_states(project, &query)?;
    info!(count = states.len(), statetype = statetype.name_str(), "fetched states");

    let mut records = Vec::with_capacity(states.len());
    for state in &states {
        let mut record = BTreeMap::new();
        record.insert("id".to_string(), state.id.to_string());

        if let Some(&media_id) = state.media.first() {
            let media = resolver.resolve_one(EntityKind::Media, media_id, None)?;
            record.insert("media_id".to_string(), media_id.to_string());
            record.insert("media".to_string(), strip_extension(media.name_str()).to_string());
            if let Some(tiff) = state
                .frame
                .map(|frame| frame_tiff(&media, frame))
                .transpose()?
                .flatten()
            {
                record.insert("tiff_frame".to_string(), tiff);
            }
        }
        record.insert(
            "frame".to_string(),
            state.frame.map(|f| f.to_string()).unwrap_or_default(),
        );

        let modified_by = match state.modified_by {
            Some(id) => {
                let user = resolver.resolve_one(EntityKind::User, id, None)?;
                EntityKind::User.name_of(&user).unwrap_or_default().to_string()
            }
            None => String::new(),
        };
        record.insert("modified_by".to_string(), modified_by);
        record.insert(
            "modified_datetime".to_string(),
            state
                .modified_datetime
                .as_deref()
                .map(truncate_to_seconds)
                .unwrap_or_default(),
        );

        for (key, value) in state.attributes.iter().flatten() {
            record.insert(key.clone(), value_to_string(value).unwrap_or_default());
        }
        records.push(record);
    }

    let mut table = Table::from_records(&LEADING_COLUMNS, &records, &["tiff_frame"]);
    if let (Some(media), Some(frame)) = (table.column("media"), table.column("frame")) {
        table.sort_by_columns(&[media, frame]);
    }
    Ok(table)
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_stripped() {
        assert_eq!(strip_extension("cam7_2023.mp4"), "cam7_2023");
        assert_eq!(strip_extension("noext"), "noext");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }
}
