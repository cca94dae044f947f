//! ID types for actors and inventory objects.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for actor IDs.
static ACTOR_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an actor (player or NPC performing actions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(u64);

impl ActorId {
    /// Creates a new unique actor ID.
    #[must_use]
    pub fn new() -> Self {
        Self(ACTOR_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an actor ID from a raw value (for deserialization).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid actor ID.
    pub const NULL: Self = Self(0);

    /// Checks if this is a valid (non-null) actor ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque handle to an item instance owned by the host inventory.
///
/// The engine never inspects item internals; it reads and writes the
/// item's augment blob through the store collaborator keyed by this
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemHandle(u64);

impl ItemHandle {
    /// Creates an item handle from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque handle to an augment token instance owned by the host inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenHandle(u64);

impl TokenHandle {
    /// Creates a token handle from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_id_unique() {
        let a = ActorId::new();
        let b = ActorId::new();
        assert_ne!(a, b);
        assert!(a.is_valid());
    }

    #[test]
    fn test_null_actor_invalid() {
        assert!(!ActorId::NULL.is_valid());
        assert_eq!(ActorId::from_raw(0), ActorId::NULL);
    }

    #[test]
    fn test_handle_roundtrip() {
        assert_eq!(ItemHandle::new(42).raw(), 42);
        assert_eq!(TokenHandle::new(7).raw(), 7);
    }
}
