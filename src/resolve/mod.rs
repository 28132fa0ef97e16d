//! Name-to-ID resolution for catalog entities.
//!
//! A [`Resolver`] turns user-supplied queries (an ID, the `list` sentinel, or a
//! human-readable name) into remote entities of a given [`EntityKind`]. Every
//! result is memoized for the lifetime of the resolver; the remote catalog is
//! assumed stable for the duration of one command.
//!
//! Scoped kinds (everything except projects and users) need a project to
//! disambiguate names. The project itself is resolved through the same cache.
//!
//! # Example
//!
//! ```no_run
//! use tatorsync::api::client::TatorClient;
//! use tatorsync::api::EntityKind;
//! use tatorsync::resolve::{Resolver, Scope};
//!
//! let client = TatorClient::new("https://tator.example.org", "token", None)?;
//! let resolver = Resolver::new(client);
//!
//! let project = resolver.resolve_one(EntityKind::Project, "plankton-survey", None)?;
//! let version = resolver.resolve_one(
//!     EntityKind::Version,
//!     "Baseline",
//!     Some(&Scope::from(&project)),
//! )?;
//! println!("version {} in project {}", version.id, project.id);
//! # Ok::<(), tatorsync::TatorError>(())
//! ```

mod query;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, info};

use crate::api::{AnnotationApi, Entity, EntityKind, ListFilter, NewEntity};
use crate::error::TatorError;

pub use query::{Query, Scope, LIST_SENTINEL};

/// The outcome of a lookup: one entity, or the listing for `list`.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    One(Entity),
    Many(Vec<Entity>),
}

impl Resolved {
    pub fn as_one(&self) -> Option<&Entity> {
        match self {
            Resolved::One(entity) => Some(entity),
            Resolved::Many(_) => None,
        }
    }

    /// All resolved entities; a single result is a one-element slice.
    pub fn entities(&self) -> &[Entity] {
        match self {
            Resolved::One(entity) => std::slice::from_ref(entity),
            Resolved::Many(entities) => entities,
        }
    }
}

/// Leaf (taxonomy) lookup options. Leaf lookups without a filter use the
/// default, a substring match on `path`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LeafFilter {
    /// Attribute compared against the query. `name` and `id` require a unique
    /// exact match; any other attribute matches by substring and may return
    /// several leaves.
    pub attribute: String,
    /// Attribute listings and substring matches are ordered by.
    pub order_by: String,
}

impl Default for LeafFilter {
    fn default() -> Self {
        Self {
            attribute: "path".to_string(),
            order_by: "path".to_string(),
        }
    }
}

impl LeafFilter {
    fn is_exact(&self) -> bool {
        matches!(self.attribute.as_str(), "name" | "id")
    }
}

/// Options for creating a missing version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Autocreate {
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: EntityKind,
    query: Query,
    scope: Option<u64>,
    leaf: Option<LeafFilter>,
}

/// Memoizing resolver over an [`AnnotationApi`].
///
/// The cache is unsynchronized and never evicted; one resolver serves one
/// command invocation.
pub struct Resolver<A> {
    api: A,
    cache: RefCell<HashMap<CacheKey, Rc<Resolved>>>,
}

impl<A: AnnotationApi> Resolver<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// The underlying API, for calls that bypass the catalog.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Number of memoized lookups.
    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Resolves `query` to one entity or, for `list`, every entity in scope.
    ///
    /// Repeated calls with an equivalent query and scope return the same
    /// `Rc` without another remote call.
    pub fn resolve(
        &self,
        kind: EntityKind,
        query: impl Into<Query>,
        scope: Option<&Scope>,
    ) -> Result<Rc<Resolved>, TatorError> {
        self.lookup(kind, query.into(), scope, None, None)
    }

    /// Resolves `query` to exactly one entity; `list` is rejected.
    pub fn resolve_one(
        &self,
        kind: EntityKind,
        query: impl Into<Query>,
        scope: Option<&Scope>,
    ) -> Result<Entity, TatorError> {
        let query = query.into();
        let resolved = self.lookup(kind, query.clone(), scope, None, None)?;
        single(kind, &query, &resolved)
    }

    /// Resolves `query` to the listing of every entity of `kind` in scope.
    pub fn list(&self, kind: EntityKind, scope: Option<&Scope>) -> Result<Vec<Entity>, TatorError> {
        let resolved = self.lookup(kind, Query::List, scope, None, None)?;
        Ok(resolved.entities().to_vec())
    }

    /// Version lookup that can create the version when the name is unknown.
    pub fn resolve_version(
        &self,
        query: impl Into<Query>,
        scope: Option<&Scope>,
        autocreate: Option<&Autocreate>,
    ) -> Result<Entity, TatorError> {
        let query = query.into();
        let resolved = self.lookup(EntityKind::Version, query.clone(), scope, None, autocreate)?;
        single(EntityKind::Version, &query, &resolved)
    }

    /// Leaf lookup by an arbitrary attribute; see [`LeafFilter`].
    pub fn resolve_leaves(
        &self,
        query: impl Into<Query>,
        scope: Option<&Scope>,
        filter: &LeafFilter,
    ) -> Result<Rc<Resolved>, TatorError> {
        self.lookup(EntityKind::Leaf, query.into(), scope, Some(filter), None)
    }

    /// Resolves a scope to a project ID. Names go through the project cache.
    pub fn project_id(&self, scope: &Scope) -> Result<u64, TatorError> {
        match scope {
            Scope::Id(id) => Ok(*id),
            Scope::Name(name) => Ok(self.resolve_one(EntityKind::Project, name, None)?.id),
        }
    }

    fn lookup(
        &self,
        kind: EntityKind,
        query: Query,
        scope: Option<&Scope>,
        leaf: Option<&LeafFilter>,
        autocreate: Option<&Autocreate>,
    ) -> Result<Rc<Resolved>, TatorError> {
        let default_leaf = LeafFilter::default();
        let leaf = match (kind, leaf) {
            (EntityKind::Leaf, None) => Some(&default_leaf),
            (_, leaf) => leaf,
        };

        if let Query::Id(id) = query {
            let key = CacheKey {
                kind,
                query,
                scope: None,
                leaf: None,
            };
            return self.memoize(key, || Ok(Resolved::One(self.api.get_entity(kind, id)?)));
        }

        let scope_id = if kind.is_scoped() {
            let scope = scope.ok_or_else(|| TatorError::MissingScope {
                kind,
                query: query.to_string(),
            })?;
            Some(self.project_id(scope)?)
        } else {
            None
        };

        let key = CacheKey {
            kind,
            query: query.clone(),
            scope: scope_id,
            leaf: leaf.cloned(),
        };
        self.memoize(key, || self.fetch(kind, &query, scope_id, leaf, autocreate))
    }

    fn memoize(
        &self,
        key: CacheKey,
        fetch: impl FnOnce() -> Result<Resolved, TatorError>,
    ) -> Result<Rc<Resolved>, TatorError> {
        let cached = self.cache.borrow().get(&key).cloned();
        if let Some(hit) = cached {
            debug!(kind = %key.kind, query = %key.query, scope = ?key.scope, "cache hit");
            return Ok(hit);
        }

        debug!(kind = %key.kind, query = %key.query, scope = ?key.scope, "cache miss");
        let resolved = Rc::new(fetch()?);
        self.cache.borrow_mut().insert(key, Rc::clone(&resolved));
        Ok(resolved)
    }

    fn fetch(
        &self,
        kind: EntityKind,
        query: &Query,
        scope: Option<u64>,
        leaf: Option<&LeafFilter>,
        autocreate: Option<&Autocreate>,
    ) -> Result<Resolved, TatorError> {
        let filter = list_filter(kind, query);
        let mut entities = self.api.list_entities(kind, scope, &filter)?;

        let name = match query {
            Query::Name(name) => name,
            Query::Id(_) | Query::List => {
                sort_listing(&mut entities, leaf);
                return Ok(Resolved::Many(entities));
            }
        };

        if let Some(leaf) = leaf.filter(|leaf| !leaf.is_exact()) {
            entities.retain(|entity| {
                entity
                    .field(&leaf.attribute)
                    .is_some_and(|value| value.contains(name.as_str()))
            });
            sort_listing(&mut entities, Some(leaf));
            return Ok(Resolved::Many(entities));
        }

        let mut matches: Vec<Entity> = entities
            .into_iter()
            .filter(|entity| match leaf {
                Some(leaf) => entity.field(&leaf.attribute).as_deref() == Some(name.as_str()),
                None => kind.name_of(entity) == Some(name.as_str()),
            })
            .collect();

        match matches.len() {
            1 => Ok(Resolved::One(matches.remove(0))),
            0 => match (scope, autocreate) {
                (Some(scope), Some(autocreate)) => self.create(kind, name, scope, autocreate),
                _ => Err(TatorError::NotFound {
                    kind,
                    query: name.clone(),
                    hint: not_found_hint(kind, name),
                }),
            },
            _ => Err(TatorError::DuplicateName {
                kind,
                query: name.clone(),
                ids: matches.iter().map(|entity| entity.id).collect(),
            }),
        }
    }

    fn create(
        &self,
        kind: EntityKind,
        name: &str,
        scope: u64,
        autocreate: &Autocreate,
    ) -> Result<Resolved, TatorError> {
        info!(%kind, name, project = scope, "creating missing entity");
        let spec = NewEntity {
            name: name.to_string(),
            description: autocreate.description.clone(),
        };
        let id = self.api.create_entity(kind, scope, &spec)?;
        Ok(Resolved::One(self.api.get_entity(kind, id)?))
    }
}

fn single(kind: EntityKind, query: &Query, resolved: &Resolved) -> Result<Entity, TatorError> {
    resolved
        .as_one()
        .cloned()
        .ok_or_else(|| TatorError::ExpectedSingle {
            kind,
            query: query.to_string(),
        })
}

fn list_filter(kind: EntityKind, query: &Query) -> ListFilter {
    match (kind, query) {
        (EntityKind::Media, Query::List) => ListFilter {
            media_dtype: Some("video".to_string()),
            ..Default::default()
        },
        (EntityKind::Media | EntityKind::User, Query::Name(name)) => ListFilter {
            name: Some(name.clone()),
            ..Default::default()
        },
        _ => ListFilter::default(),
    }
}

fn sort_listing(entities: &mut [Entity], leaf: Option<&LeafFilter>) {
    match leaf {
        Some(leaf) => entities.sort_by(|a, b| {
            a.field(&leaf.order_by)
                .cmp(&b.field(&leaf.order_by))
                .then(a.id.cmp(&b.id))
        }),
        None => entities.sort_by_key(|entity| entity.id),
    }
}

fn not_found_hint(kind: EntityKind, name: &str) -> String {
    if kind == EntityKind::Media && !name.contains('.') {
        ". Did you remember to include a file extension like .mp4?".to_string()
    } else {
        String::new()
    }
}
