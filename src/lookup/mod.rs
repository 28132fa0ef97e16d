//! Identifier lookup report.

use std::fmt::Write;

use crate::api::{AnnotationApi, Entity, EntityKind};
use crate::error::TatorError;
use crate::resolve::{Query, Resolved, Resolver, Scope};

/// Queries to resolve; each is a name, an ID or `list`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LookupRequest {
    pub user: Option<Query>,
    pub project: Option<Query>,
    pub media: Option<Query>,
    pub loctype: Option<Query>,
    pub version: Option<Query>,
    pub statetype: Option<Query>,
}

impl LookupRequest {
    pub fn is_empty(&self) -> bool {
        self == &LookupRequest::default()
    }
}

fn headings(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Project => ("PROJECT", "PROJECTS"),
        EntityKind::Media => ("MEDIA", "MEDIA"),
        EntityKind::MediaType => ("MEDIA TYPE", "MEDIA TYPES"),
        EntityKind::Version => ("VERSION", "VERSIONS"),
        EntityKind::LocalizationType => ("LOCALIZATION TYPE", "LOCALIZATION TYPES"),
        EntityKind::StateType => ("STATE TYPE", "STATE TYPES"),
        EntityKind::LeafType => ("LEAF TYPE", "LEAF TYPES"),
        EntityKind::Leaf => ("LEAF", "LEAVES"),
        EntityKind::User => ("USER", "USERS"),
    }
}

/// Resolves every query in `request` and renders the report.
///
/// The project is resolved first; a single project scopes the other lookups.
pub fn lookup_report<A: AnnotationApi>(
    resolver: &Resolver<A>,
    request: &LookupRequest,
) -> Result<String, TatorError> {
    let mut out = String::new();

    if let Some(query) = &request.user {
        let resolved = resolver.resolve(EntityKind::User, query.clone(), None)?;
        render(&mut out, EntityKind::User, &resolved);
    }

    let mut scope = None;
    if let Some(query) = &request.project {
        let resolved = resolver.resolve(EntityKind::Project, query.clone(), None)?;
        if let Resolved::One(project) = resolved.as_ref() {
            scope = Some(Scope::from(project));
        }
        render(&mut out, EntityKind::Project, &resolved);
    }

    let scoped = [
        (EntityKind::Media, &request.media),
        (EntityKind::LocalizationType, &request.loctype),
        (EntityKind::Version, &request.version),
        (EntityKind::StateType, &request.statetype),
    ];
    for (kind, query) in scoped {
        if let Some(query) = query {
            let resolved = resolver.resolve(kind, query.clone(), scope.as_ref())?;
            render(&mut out, kind, &resolved);
        }
    }

    Ok(out)
}

fn render(out: &mut String, kind: EntityKind, resolved: &Resolved) {
    let (single, plural) = headings(kind);
    match resolved {
        Resolved::One(entity) => {
            let _ = writeln!(out, "{single}: \"{}\" id={}", display_name(kind, entity), entity.id);
        }
        Resolved::Many(entities) => {
            let _ = writeln!(out, "{plural}");
            for entity in entities {
                let _ = writeln!(out, "  {:>4} \"{}\"", entity.id, display_name(kind, entity));
            }
        }
    }
}

fn display_name(kind: EntityKind, entity: &Entity) -> &str {
    kind.name_of(entity).unwrap_or_default()
}
