//! Cache key derivation.
//!
//! Every key has the shape
//!
//! ```text
//! {namespace}:{operation}:{entity_kind}[|{version}]:{suffix}
//! ```
//!
//! where the suffix is the entity's primary key for point lookups, empty for
//! the unfiltered count, and a canonical rendering of the filter for
//! predicate lookups (`author_id$3-status$open`).

use crate::entity::CacheEntity;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "db";

/// Kind of cached lookup. Each kind gets its own key space and TTL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Point lookup by primary key.
    Get,
    /// Unfiltered row count.
    Count,
    /// First row matching a filter.
    FilterFirst,
    /// Row count matching a filter.
    FilterCount,
}

impl Operation {
    /// Tag used in the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Count => "count",
            Operation::FilterFirst => "ff",
            Operation::FilterCount => "fc",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality predicate over entity fields.
///
/// Fields are kept sorted by name, so two filters built in different orders
/// render to the same key.
///
/// ```
/// use entity_cache::key::Filter;
///
/// let a = Filter::new().with("status", "open").with("author_id", 3);
/// let b = Filter::new().with("author_id", 3).with("status", "open");
/// assert_eq!(a.canonical(), b.canonical());
/// assert_eq!(a.canonical(), "author_id$3-status$open");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    fields: BTreeMap<String, String>,
}

impl Filter {
    pub fn new() -> Self {
        Filter {
            fields: BTreeMap::new(),
        }
    }

    /// Add (or replace) an equality condition.
    pub fn with(mut self, field: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.insert(field.into(), value.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Conditions in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Value required for `field`, if constrained.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Deterministic rendering used as the key suffix.
    pub fn canonical(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}${}", escape(k), escape(v)))
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl<K: Into<String>, V: fmt::Display> FromIterator<(K, V)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Filter::new(), |filter, (k, v)| filter.with(k, v))
    }
}

/// Percent-escape the characters that carry meaning inside a filter suffix
/// or a version tag.
fn escape(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['%', '$', '-', ':']) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '$' => out.push_str("%24"),
            '-' => out.push_str("%2D"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Derives cache keys for entities.
///
/// Cheap to clone. [`EntityCache`](crate::EntityCache) and the
/// [`InvalidationHooks`](crate::InvalidationHooks) built from it share one
/// namer, so writes always hit the keys reads use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyNamer {
    namespace: String,
}

impl KeyNamer {
    pub fn new(namespace: impl Into<String>) -> Self {
        KeyNamer {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key prefix for an operation on entity type `T`, including the
    /// trailing separator.
    pub fn prefix<T: CacheEntity>(&self, op: Operation) -> String {
        let kind = T::entity_kind();
        debug_assert!(
            !kind.contains([':', '|']),
            "entity kind {:?} contains a key separator",
            kind
        );
        match T::cache_version() {
            Some(version) => format!(
                "{}:{}:{}|{}:",
                self.namespace,
                op,
                kind,
                escape(version)
            ),
            None => format!("{}:{}:{}:", self.namespace, op, kind),
        }
    }

    /// Point-lookup key for one primary key.
    pub fn get_key<T: CacheEntity>(&self, id: &T::Key) -> String {
        format!("{}{}", self.prefix::<T>(Operation::Get), id)
    }

    /// Key of the unfiltered row count.
    pub fn count_key<T: CacheEntity>(&self) -> String {
        self.prefix::<T>(Operation::Count)
    }

    /// Key of a predicate lookup (`FilterFirst` or `FilterCount`).
    pub fn filter_key<T: CacheEntity>(&self, op: Operation, filter: &Filter) -> String {
        format!("{}{}", self.prefix::<T>(op), filter.canonical())
    }
}

impl Default for KeyNamer {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}
