#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;

use serde_json::Value;
use tatorsync::api::{
    AnnotationApi, Entity, EntityKind, ListFilter, Localization, LocalizationQuery,
    LocalizationSpec, NewEntity, State, StateQuery, StateSpec,
};
use tatorsync::TatorError;

/// Remote calls made against a [`MemoryApi`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Calls {
    pub list: usize,
    pub get: usize,
    pub create: usize,
    pub list_localizations: usize,
    pub list_states: usize,
    pub frames: usize,
    pub graphics: usize,
}

/// An in-memory annotation server.
#[derive(Default)]
pub struct MemoryApi {
    records: RefCell<Vec<(EntityKind, Option<u64>, Entity)>>,
    localizations: Vec<Localization>,
    states: Vec<State>,
    next_id: Cell<u64>,
    calls: Cell<Calls>,
    pub list_filters: RefCell<Vec<(EntityKind, Option<u64>, ListFilter)>>,
    pub localization_queries: RefCell<Vec<LocalizationQuery>>,
    pub state_queries: RefCell<Vec<StateQuery>>,
    pub localization_batches: RefCell<Vec<Vec<LocalizationSpec>>>,
    pub state_batches: RefCell<Vec<Vec<StateSpec>>>,
}

impl MemoryApi {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1_000),
            ..Self::default()
        }
    }

    /// Adds a record; `scope` is the owning project for scoped kinds.
    pub fn with(self, kind: EntityKind, scope: Option<u64>, entity: Entity) -> Self {
        self.records.borrow_mut().push((kind, scope, entity));
        self
    }

    pub fn with_localization(mut self, localization: Localization) -> Self {
        self.localizations.push(localization);
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.states.push(state);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.get()
    }

    pub fn remote_calls(&self) -> usize {
        let c = self.calls();
        c.list + c.get + c.create + c.list_localizations + c.list_states + c.frames + c.graphics
    }

    fn bump(&self, update: impl FnOnce(&mut Calls)) {
        let mut calls = self.calls.get();
        update(&mut calls);
        self.calls.set(calls);
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

impl AnnotationApi for MemoryApi {
    fn list_entities(
        &self,
        kind: EntityKind,
        scope: Option<u64>,
        filter: &ListFilter,
    ) -> Result<Vec<Entity>, TatorError> {
        self.bump(|c| c.list += 1);
        self.list_filters
            .borrow_mut()
            .push((kind, scope, filter.clone()));

        Ok(self
            .records
            .borrow()
            .iter()
            .filter(|(k, s, _)| *k == kind && (!kind.is_scoped() || *s == scope))
            .map(|(_, _, entity)| entity)
            .filter(|entity| match &filter.name {
                Some(name) => kind.name_of(entity) == Some(name.as_str()),
                None => true,
            })
            .filter(|entity| match &filter.media_dtype {
                Some(dtype) => entity.extra.get("dtype").and_then(Value::as_str) == Some(dtype),
                None => true,
            })
            .cloned()
            .collect())
    }

    fn get_entity(&self, kind: EntityKind, id: u64) -> Result<Entity, TatorError> {
        self.bump(|c| c.get += 1);
        self.records
            .borrow()
            .iter()
            .find(|(k, _, entity)| *k == kind && entity.id == id)
            .map(|(_, _, entity)| entity.clone())
            .ok_or_else(|| TatorError::ApiStatus {
                url: format!("memory://{kind}/{id}"),
                status: 404,
                body: "Not Found".to_string(),
            })
    }

    fn create_entity(
        &self,
        kind: EntityKind,
        scope: u64,
        spec: &NewEntity,
    ) -> Result<u64, TatorError> {
        self.bump(|c| c.create += 1);
        if kind != EntityKind::Version {
            return Err(TatorError::UnsupportedOperation {
                kind,
                operation: "create",
            });
        }
        let id = self.next_id();
        let mut entity = Entity::new(id, spec.name.clone());
        if let Some(description) = &spec.description {
            entity = entity.with_extra("description", description.clone());
        }
        self.records.borrow_mut().push((kind, Some(scope), entity));
        Ok(id)
    }

    fn list_localizations(
        &self,
        _project: u64,
        query: &LocalizationQuery,
    ) -> Result<Vec<Localization>, TatorError> {
        self.bump(|c| c.list_localizations += 1);
        self.localization_queries.borrow_mut().push(query.clone());

        Ok(self
            .localizations
            .iter()
            .filter(|loc| query.ids.is_empty() || query.ids.contains(&loc.id))
            .filter(|loc| query.media_ids.is_empty() || query.media_ids.contains(&loc.media))
            .filter(|loc| query.frame.is_none_or(|frame| loc.frame == frame))
            .filter(|loc| query.type_id.is_none() || loc.type_id == query.type_id)
            .filter(|loc| {
                query.versions.is_empty()
                    || loc.version.is_some_and(|v| query.versions.contains(&v))
            })
            .cloned()
            .collect())
    }

    fn create_localizations(
        &self,
        _project: u64,
        specs: &[LocalizationSpec],
    ) -> Result<Vec<u64>, TatorError> {
        self.bump(|c| c.create += 1);
        self.localization_batches.borrow_mut().push(specs.to_vec());
        Ok(specs.iter().map(|_| self.next_id()).collect())
    }

    fn list_states(&self, _project: u64, query: &StateQuery) -> Result<Vec<State>, TatorError> {
        self.bump(|c| c.list_states += 1);
        self.state_queries.borrow_mut().push(query.clone());

        Ok(self
            .states
            .iter()
            .filter(|state| query.type_id.is_none() || state.type_id == query.type_id)
            .filter(|state| {
                query.media_ids.is_empty()
                    || state.media.iter().any(|m| query.media_ids.contains(m))
            })
            .cloned()
            .collect())
    }

    fn create_states(&self, _project: u64, specs: &[StateSpec]) -> Result<Vec<u64>, TatorError> {
        self.bump(|c| c.create += 1);
        self.state_batches.borrow_mut().push(specs.to_vec());
        Ok(specs.iter().map(|_| self.next_id()).collect())
    }

    fn get_frame(&self, media: u64, frame: u64) -> Result<Vec<u8>, TatorError> {
        self.bump(|c| c.frames += 1);
        Ok(format!("frame-{media}-{frame}").into_bytes())
    }

    fn get_localization_graphic(&self, id: u64) -> Result<Vec<u8>, TatorError> {
        self.bump(|c| c.graphics += 1);
        Ok(format!("chip-{id}").into_bytes())
    }
}

pub fn localization(id: u64, media: u64, frame: u64) -> Localization {
    Localization {
        id,
        type_id: Some(3),
        media,
        frame,
        x: 0.1,
        y: 0.2,
        width: 0.3,
        height: 0.4,
        version: Some(2),
        modified_by: Some(7),
        modified_datetime: Some("2023-03-21T14:05:09.123456Z".to_string()),
        attributes: Some(
            serde_json::json!({"Class": "diatom", "Verified": true})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        ),
    }
}

pub fn state(id: u64, media: u64, frame: u64) -> State {
    State {
        id,
        type_id: Some(5),
        media: vec![media],
        frame: Some(frame),
        version: Some(2),
        modified_by: Some(7),
        modified_datetime: Some("2023-03-21T09:00:00.5Z".to_string()),
        attributes: Some(
            serde_json::json!({"Verified": true})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        ),
    }
}

/// A project with one media, version, localization type, state type and user.
pub fn survey_api() -> MemoryApi {
    MemoryApi::new()
        .with(EntityKind::Project, None, Entity::new(42, "plankton-survey"))
        .with(EntityKind::Project, None, Entity::new(43, "mooring"))
        .with(
            EntityKind::Media,
            Some(42),
            Entity::new(9, "cam7_2023.mp4")
                .with_extra("dtype", "video")
                .with_attribute("tiff_dir", "/data/cam7")
                .with_attribute("tiff_pattern", "{:06d}.tiff"),
        )
        .with(EntityKind::Version, Some(42), Entity::new(2, "Baseline"))
        .with(EntityKind::LocalizationType, Some(42), Entity::new(3, "Box"))
        .with(EntityKind::StateType, Some(42), Entity::new(5, "Frame Check"))
        .with(
            EntityKind::User,
            None,
            Entity {
                name: None,
                ..Entity::new(7, "")
            }
            .with_username("sbatch"),
        )
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write file");
}
