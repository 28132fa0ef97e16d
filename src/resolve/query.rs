//! Normalized lookup queries and scopes.

use std::fmt;
use std::str::FromStr;

use crate::api::Entity;

/// The literal that requests a full listing instead of a single entity.
pub const LIST_SENTINEL: &str = "list";

/// A normalized lookup query.
///
/// Raw user input is normalized once: an all-digit string is an ID, the
/// literal `list` requests a listing, anything else is a name. Normalized
/// queries double as cache keys, so `"42"` and `42` resolve identically.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Query {
    Id(u64),
    List,
    Name(String),
}

impl Query {
    pub fn parse(raw: &str) -> Self {
        if is_all_digits(raw) {
            if let Ok(id) = raw.parse::<u64>() {
                return Query::Id(id);
            }
        }
        if raw == LIST_SENTINEL {
            Query::List
        } else {
            Query::Name(raw.to_string())
        }
    }
}

fn is_all_digits(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit())
}

impl FromStr for Query {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Query::parse(s))
    }
}

impl From<&str> for Query {
    fn from(raw: &str) -> Self {
        Query::parse(raw)
    }
}

impl From<String> for Query {
    fn from(raw: String) -> Self {
        Query::parse(&raw)
    }
}

impl From<&String> for Query {
    fn from(raw: &String) -> Self {
        Query::parse(raw)
    }
}

impl From<u64> for Query {
    fn from(id: u64) -> Self {
        Query::Id(id)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Id(id) => write!(f, "{id}"),
            Query::List => f.write_str(LIST_SENTINEL),
            Query::Name(name) => f.write_str(name),
        }
    }
}

/// The parent project a scoped lookup is disambiguated in.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Id(u64),
    Name(String),
}

impl From<u64> for Scope {
    fn from(id: u64) -> Self {
        Scope::Id(id)
    }
}

impl From<&str> for Scope {
    fn from(raw: &str) -> Self {
        match Query::parse(raw) {
            Query::Id(id) => Scope::Id(id),
            _ => Scope::Name(raw.to_string()),
        }
    }
}

impl From<&String> for Scope {
    fn from(raw: &String) -> Self {
        Scope::from(raw.as_str())
    }
}

impl From<&Entity> for Scope {
    fn from(entity: &Entity) -> Self {
        Scope::Id(entity.id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Id(id) => write!(f, "{id}"),
            Scope::Name(name) => f.write_str(name),
        }
    }
}
