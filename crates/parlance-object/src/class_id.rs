//! Hash-based class identity.
//!
//! This module provides [`ClassId`], a 64-bit hash that identifies a class
//! by name. Ids are computed deterministically, so a cast target's id can
//! be derived without consulting the registry, and ancestry membership
//! checks work on plain integers instead of string scans.
//!
//! Ids are stable for the lifetime of one process run; they are not stable
//! across versions of this crate and must never be persisted.

use std::fmt;

use xxhash_rust::xxh64::xxh64;

/// A deterministic 64-bit hash identifying a class by its leaf name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    /// Compute the id of a class name.
    pub fn of(name: &str) -> Self {
        Self(xxh64(name.as_bytes(), 0))
    }

    /// The raw hash value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The leaf (own) class name of an ancestry string: everything after the
/// last `:`, or the whole string when there is no ancestry prefix.
pub fn leaf_of(ancestry: &str) -> &str {
    match ancestry.rsplit_once(':') {
        Some((_, leaf)) => leaf,
        None => ancestry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic() {
        assert_eq!(ClassId::of("Voice"), ClassId::of("Voice"));
        assert_ne!(ClassId::of("Voice"), ClassId::of("voice"));
    }

    #[test]
    fn leaf_of_strips_ancestry() {
        assert_eq!(leaf_of("Base:Derived"), "Derived");
        assert_eq!(leaf_of("A:B:C"), "C");
        assert_eq!(leaf_of("Plain"), "Plain");
        assert_eq!(leaf_of(""), "");
    }

    #[test]
    fn display_is_fixed_width_hex() {
        assert_eq!(ClassId::of("x").to_string().len(), 16);
    }
}
