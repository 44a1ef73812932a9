//! Underlying-store access for cache misses.
//!
//! The `DataRepository` trait decouples the cache from any specific database.
//! Implement it over SQLx, tokio-postgres, Diesel or anything else that can
//! answer four questions: one row by primary key, several rows by
//! `id IN (...)`, the first row matching an equality filter, and how many rows
//! match an equality filter.
//!
//! # Error Handling
//!
//! Return `Err(Error::RepositoryError(..))` for connectivity problems, query
//! failures and timeouts. The cache layer hands these back to its caller
//! unchanged. Never use an error for "no such row": return `Ok(None)` or leave
//! the row out of the batch instead.

use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use crate::key::Filter;

/// Trait for underlying store implementations.
#[allow(async_fn_in_trait)]
pub trait DataRepository<T: CacheEntity>: Send + Sync {
    /// Fetch entity by primary key.
    ///
    /// # Returns
    /// - `Ok(Some(entity))` - Entity found
    /// - `Ok(None)` - Entity not found (not an error)
    /// - `Err(e)` - Database error
    ///
    /// # Errors
    /// Returns `Err` if data source is unavailable or fetch fails
    async fn fetch_by_id(&self, id: &T::Key) -> Result<Option<T>>;

    /// Batch fetch by primary key (`WHERE id IN (...)`).
    ///
    /// Rows that do not exist are simply missing from the result; order is
    /// not significant. Default implementation calls `fetch_by_id()` for each key.
    ///
    /// # Errors
    /// Returns `Err` if data source is unavailable or fetch fails
    async fn fetch_by_ids(&self, ids: &[T::Key]) -> Result<Vec<T>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.fetch_by_id(id).await? {
                results.push(entity);
            }
        }
        Ok(results)
    }

    /// First row matching every condition of `filter`.
    ///
    /// # Errors
    /// Returns `Err` if not implemented or if data source operation fails
    async fn fetch_first(&self, filter: &Filter) -> Result<Option<T>> {
        let _ = filter;
        Err(Error::NotImplemented(
            "fetch_first not implemented for this repository".to_string(),
        ))
    }

    /// Number of rows matching `filter`. An empty filter counts every row.
    ///
    /// # Errors
    /// Returns `Err` if not implemented or if data source operation fails
    async fn count(&self, filter: &Filter) -> Result<u64> {
        let _ = filter;
        Err(Error::NotImplemented("count not implemented".to_string()))
    }
}

// ============================================================================
// In-Memory Test Repository
// ============================================================================

use std::collections::BTreeMap;

/// Simple in-memory repository for tests and demos.
///
/// Rows are kept in primary-key order (of their `Display` form), which is the
/// order `fetch_first` scans in. Filters are matched against the entity's
/// serde representation: a condition holds when the field is present and its
/// value renders to the same string (strings unquoted, everything else as JSON).
///
/// ```ignore
/// let mut repo = InMemoryRepository::new();
/// repo.insert(topic.clone());
///
/// let found = repo.fetch_first(&Filter::new().with("title", "Hello")).await?;
/// ```
pub struct InMemoryRepository<T: CacheEntity> {
    data: BTreeMap<String, T>,
}

impl<T: CacheEntity> InMemoryRepository<T> {
    /// Create a new empty in-memory repository.
    pub fn new() -> Self {
        InMemoryRepository {
            data: BTreeMap::new(),
        }
    }

    /// Insert or update an entity under its own primary key.
    pub fn insert(&mut self, value: T) {
        self.data.insert(value.cache_key().to_string(), value);
    }

    /// Remove an entity, returning it if it was present.
    pub fn remove(&mut self, id: &T::Key) -> Option<T> {
        self.data.remove(&id.to_string())
    }

    /// Remove all entities from the repository.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Return the number of entities in the repository.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Return true if the repository contains no entities.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn matches(entity: &T, filter: &Filter) -> Result<bool> {
        if filter.is_empty() {
            return Ok(true);
        }
        let value = serde_json::to_value(entity)?;
        Ok(filter.iter().all(|(field, expected)| match value.get(field) {
            Some(serde_json::Value::String(s)) => s == expected,
            Some(other) => other.to_string() == expected,
            None => false,
        }))
    }
}

impl<T: CacheEntity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CacheEntity> DataRepository<T> for InMemoryRepository<T> {
    async fn fetch_by_id(&self, id: &T::Key) -> Result<Option<T>> {
        Ok(self.data.get(&id.to_string()).cloned())
    }

    async fn fetch_by_ids(&self, ids: &[T::Key]) -> Result<Vec<T>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.data.get(&id.to_string()).cloned())
            .collect())
    }

    async fn fetch_first(&self, filter: &Filter) -> Result<Option<T>> {
        for entity in self.data.values() {
            if Self::matches(entity, filter)? {
                return Ok(Some(entity.clone()));
            }
        }
        Ok(None)
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let mut total = 0;
        for entity in self.data.values() {
            if Self::matches(entity, filter)? {
                total += 1;
            }
        }
        Ok(total)
    }
}
