//! Localization download: query, CSV rows, frame and chip images.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{frame_tiff, truncate_to_seconds};
use crate::api::{
    value_to_string, AnnotationApi, EntityKind, Localization, LocalizationQuery, StateQuery,
};
use crate::error::TatorError;
use crate::resolve::{Query, Resolver, Scope};
use crate::table::Table;

const LEADING_COLUMNS: [&str; 13] = [
    "id",
    "media_id",
    "media",
    "frame",
    "frame_tiff",
    "version_id",
    "version",
    "modified_by",
    "modified_datetime",
    "x",
    "y",
    "width",
    "height",
];

/// Which localizations to download.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalizationFilter {
    pub project: Scope,
    pub media: Option<Query>,
    pub frame: Option<u64>,
    /// When unset the project must have exactly one localization type.
    pub loctype: Option<Query>,
    pub version: Option<Query>,
    pub attributes: Vec<(String, String)>,
    pub window: Option<(u64, u64)>,
    pub ids: Vec<u64>,
    /// Restrict to frames covered by states of this type.
    pub statetype: Option<Query>,
    pub state_attributes: Vec<(String, String)>,
}

impl LocalizationFilter {
    pub fn new(project: impl Into<Scope>) -> Self {
        Self {
            project: project.into(),
            media: None,
            frame: None,
            loctype: None,
            version: None,
            attributes: Vec::new(),
            window: None,
            ids: Vec::new(),
            statetype: None,
            state_attributes: Vec::new(),
        }
    }
}

/// Fetches the localizations matching `filter`.
pub fn fetch_localizations<A: AnnotationApi>(
    resolver: &Resolver<A>,
    filter: &LocalizationFilter,
) -> Result<Vec<Localization>, TatorError> {
    if filter.statetype.is_some()
        && (filter.frame.is_some() || filter.window.is_some() || !filter.ids.is_empty())
    {
        return Err(TatorError::InvalidArgument(
            "--statetype cannot be combined with --frame, --pagination or --id".to_string(),
        ));
    }

    let project = resolver.project_id(&filter.project)?;
    let scope = Scope::Id(project);

    let type_id = match &filter.loctype {
        Some(query) => {
            resolver
                .resolve_one(EntityKind::LocalizationType, query.clone(), Some(&scope))?
                .id
        }
        None => default_loctype(resolver, &scope)?,
    };
    let versions = match &filter.version {
        Some(query) => {
            vec![resolver.resolve_one(EntityKind::Version, query.clone(), Some(&scope))?.id]
        }
        None => Vec::new(),
    };
    let media_ids = match &filter.media {
        Some(query) => {
            vec![resolver.resolve_one(EntityKind::Media, query.clone(), Some(&scope))?.id]
        }
        None => Vec::new(),
    };

    let base = LocalizationQuery {
        versions,
        type_id: Some(type_id),
        media_ids,
        attributes: filter.attributes.clone(),
        ..LocalizationQuery::default()
    };

    let Some(statetype) = &filter.statetype else {
        let query = LocalizationQuery {
            frame: filter.frame,
            window: filter.window,
            ids: filter.ids.clone(),
            ..base
        };
        let localizations = resolver.api().list_localizations(project, &query)?;
        info!(count = localizations.len(), "fetched localizations");
        return Ok(localizations);
    };

    let statetype = resolver.resolve_one(EntityKind::StateType, statetype.clone(), Some(&scope))?;
    let state_query = StateQuery {
        type_id: Some(statetype.id),
        versions: base.versions.clone(),
        media_ids: base.media_ids.clone(),
        attributes: filter.state_attributes.clone(),
    };
    let states = resolver.api().list_states(project, &state_query)?;
    info!(count = states.len(), statetype = statetype.name_str(), "fetched states");

    let mut seen = HashSet::new();
    let mut localizations = Vec::new();
    for state in &states {
        let (Some(&media), Some(frame)) = (state.media.first(), state.frame) else {
            continue;
        };
        if !seen.insert((media, frame)) {
            continue;
        }
        let query = LocalizationQuery {
            media_ids: vec![media],
            frame: Some(frame),
            ..base.clone()
        };
        let found = resolver.api().list_localizations(project, &query)?;
        debug!(media, frame, count = found.len(), "fetched localizations for state frame");
        localizations.extend(found);
    }
    info!(count = localizations.len(), "fetched localizations");
    Ok(localizations)
}

fn default_loctype<A: AnnotationApi>(
    resolver: &Resolver<A>,
    scope: &Scope,
) -> Result<u64, TatorError> {
    let loctypes = resolver.list(EntityKind::LocalizationType, Some(scope))?;
    match loctypes.as_slice() {
        [only] => Ok(only.id),
        _ => {
            let listed: Vec<String> = loctypes
                .iter()
                .map(|lt| format!("{}:{}", lt.id, lt.name_str()))
                .collect();
            Err(TatorError::InvalidArgument(format!(
                "expected one localization type in the project, found {{{}}}; specify one with --loctype",
                listed.join(",")
            )))
        }
    }
}

/// Builds the download CSV rows.
///
/// Media, version and user names come through the resolver, so each distinct
/// ID is fetched once. With `frame_dir` set, an `imagepath` column points at
/// `<frame_dir>/<media_id>_<frame>.png`.
pub fn localization_table<A: AnnotationApi>(
    resolver: &Resolver<A>,
    localizations: &[Localization],
    frame_dir: Option<&Path>,
) -> Result<Table, TatorError> {
    let mut records = Vec::with_capacity(localizations.len());

    for loc in localizations {
        let media = resolver.resolve_one(EntityKind::Media, loc.media, None)?;
        let mut record = BTreeMap::new();
        record.insert("id".to_string(), loc.id.to_string());
        record.insert("media_id".to_string(), loc.media.to_string());
        record.insert("media".to_string(), media.name_str().to_string());
        record.insert("frame".to_string(), loc.frame.to_string());
        if let Some(tiff) = frame_tiff(&media, loc.frame)? {
            record.insert("frame_tiff".to_string(), tiff);
        }

        let (version_id, version) = match loc.version {
            Some(id) => {
                let version = resolver.resolve_one(EntityKind::Version, id, None)?;
                (id.to_string(), version.name_str().to_string())
            }
            None => (String::new(), String::new()),
        };
        record.insert("version_id".to_string(), version_id);
        record.insert("version".to_string(), version);

        let modified_by = match loc.modified_by {
            Some(id) => {
                let user = resolver.resolve_one(EntityKind::User, id, None)?;
                EntityKind::User.name_of(&user).unwrap_or_default().to_string()
            }
            None => String::new(),
        };
        record.insert("modified_by".to_string(), modified_by);
        record.insert(
            "modified_datetime".to_string(),
            loc.modified_datetime
                .as_deref()
                .map(truncate_to_seconds)
                .unwrap_or_default(),
        );

        record.insert("x".to_string(), loc.x.to_string());
        record.insert("y".to_string(), loc.y.to_string());
        record.insert("width".to_string(), loc.width.to_string());
        record.insert("height".to_string(), loc.height.to_string());

        for (key, value) in loc.attributes.iter().flatten() {
            record.insert(key.clone(), value_to_string(value).unwrap_or_default());
        }

        if let Some(dir) = frame_dir {
            record.insert(
                "imagepath".to_string(),
                frame_image_path(dir, loc.media, loc.frame)
                    .to_string_lossy()
                    .into_owned(),
            );
        }
        records.push(record);
    }

    Ok(Table::from_records(&LEADING_COLUMNS, &records, &["imagepath"]))
}

pub fn frame_image_path(dir: &Path, media: u64, frame: u64) -> PathBuf {
    dir.join(format!("{media}_{frame}.png"))
}

pub fn chip_image_path(dir: &Path, loc: &Localization) -> PathBuf {
    dir.join(format!("{}_{}_{}.png", loc.media, loc.frame, loc.id))
}

/// Saves every distinct frame as `<media>_<frame>.png`, skipping files that
/// already exist. Returns the number of frames fetched.
pub fn download_frames<A: AnnotationApi>(
    api: &A,
    localizations: &[Localization],
    dir: &Path,
) -> Result<usize, TatorError> {
    fs::create_dir_all(dir).map_err(TatorError::Io)?;
    let mut fetched = 0;
    let mut seen = HashSet::new();
    for loc in localizations {
        if !seen.insert((loc.media, loc.frame)) {
            continue;
        }
        let target = frame_image_path(dir, loc.media, loc.frame);
        if target.is_file() {
            debug!(path = %target.display(), "frame already downloaded");
            continue;
        }
        let bytes = api.get_frame(loc.media, loc.frame)?;
        fs::write(&target, bytes).map_err(TatorError::Io)?;
        fetched += 1;
    }
    info!(fetched, dir = %dir.display(), "downloaded frames");
    Ok(fetched)
}

/// Saves each localization's image chip as `<media>_<frame>_<id>.png`,
/// skipping files that already exist. Returns the number of chips fetched.
pub fn download_chips<A: AnnotationApi>(
    api: &A,
    localizations: &[Localization],
    dir: &Path,
) -> Result<usize, TatorError> {
    fs::create_dir_all(dir).map_err(TatorError::Io)?;
    let mut fetched = 0;
    for loc in localizations {
        let target = chip_image_path(dir, loc);
        if target.is_file() {
            continue;
        }
        let bytes = api.get_localization_graphic(loc.id)?;
        fs::write(&target, bytes).map_err(TatorError::Io)?;
        fetched += 1;
    }
    info!(fetched, dir = %dir.display(), "downloaded localization chips");
    Ok(fetched)
}
