//! Version types for persisted-format compatibility.

use serde::{Deserialize, Serialize};

/// Schema version using semantic versioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version (breaking changes)
    pub major: u16,
    /// Minor version (backwards-compatible additions)
    pub minor: u16,
    /// Patch version (bug fixes)
    pub patch: u16,
}

impl SchemaVersion {
    /// Creates a new schema version.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Current slot blob format version.
    pub const SLOT_BLOB: Self = Self::new(1, 0, 0);

    /// Current catalog config version.
    pub const CATALOG_CONFIG: Self = Self::new(1, 0, 0);

    /// Checks if this version is compatible with another version.
    /// Compatible means same major version and this minor >= other minor.
    #[must_use]
    pub const fn is_compatible_with(&self, other: &Self) -> bool {
        self.major == other.major && self.minor >= other.minor
    }

    /// Checks if this version can read data from another version.
    #[must_use]
    pub const fn can_read(&self, data_version: &Self) -> bool {
        self.major == data_version.major
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Magic bytes for persisted-format identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicBytes(pub [u8; 4]);

impl MagicBytes {
    /// Slot blob magic bytes.
    pub const SLOTS: Self = Self(*b"ARCS");

    /// Returns the magic as a str (all magics are ASCII).
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Checks if the given bytes start with this magic.
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() >= 4 && data[..4] == self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compatibility() {
        let v1 = SchemaVersion::new(1, 0, 0);
        let v2 = SchemaVersion::new(1, 1, 0);
        let v3 = SchemaVersion::new(2, 0, 0);

        assert!(v2.is_compatible_with(&v1));
        assert!(!v1.is_compatible_with(&v3));
        assert!(v1.can_read(&v2));
        assert!(!v1.can_read(&v3));
    }

    #[test]
    fn test_magic_matches() {
        assert!(MagicBytes::SLOTS.matches(b"ARCS|1|2|-;-"));
        assert!(!MagicBytes::SLOTS.matches(b"AR"));
        assert!(!MagicBytes::SLOTS.matches(b"XXXX|1"));
        assert_eq!(MagicBytes::SLOTS.as_str(), "ARCS");
    }
}
