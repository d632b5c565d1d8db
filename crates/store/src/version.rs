use serde::{Deserialize, Serialize};

/// Monotonic entity version for optimistic concurrency control.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of an entity that has never been persisted.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Version of a freshly inserted entity.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entity together with the version it was read at.
///
/// Callers read a `Versioned<T>`, mutate the entity, and write it back
/// conditioned on the version they read; a mismatch surfaces as
/// [`crate::StoreError::ConcurrencyConflict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub entity: T,
    pub version: Version,
}

impl<T> Versioned<T> {
    /// Wraps an entity at a version.
    pub fn new(entity: T, version: Version) -> Self {
        Self { entity, version }
    }
}
