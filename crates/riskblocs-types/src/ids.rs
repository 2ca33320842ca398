//! Globally unique identifiers used throughout RiskBlocs.
//!
//! All row IDs use UUIDv7 so that rows created later sort later, which keeps
//! dataset listings and offer histories in creation order without a
//! separate timestamp index.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Identifier of an authenticated account (issuer or investor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DatasetId
// ---------------------------------------------------------------------------

/// Identifier of an uploaded (or filtered-copy) loan dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DatasetId(pub Uuid);

impl DatasetId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ds:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// NdaId
// ---------------------------------------------------------------------------

/// Identifier of a non-disclosure agreement between an issuer and an investor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NdaId(pub Uuid);

impl NdaId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for NdaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NdaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nda:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// OfferId
// ---------------------------------------------------------------------------

/// Identifier of an investor's price offer on a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OfferId(pub Uuid);

impl OfferId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for OfferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offer:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// StructureId
// ---------------------------------------------------------------------------

/// Identifier of a saved tranche structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StructureId(pub Uuid);

impl StructureId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for StructureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_id_uniqueness() {
        let a = DatasetId::new();
        let b = DatasetId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn dataset_id_ordering() {
        let a = DatasetId::new();
        let b = DatasetId::new();
        assert!(a < b);
    }

    #[test]
    fn ids_are_time_ordered_uuids() {
        assert_eq!(UserId::new().0.get_version_num(), 7);
        assert_eq!(DatasetId::new().0.get_version_num(), 7);
    }

    #[test]
    fn display_prefixes() {
        assert!(DatasetId::new().to_string().starts_with("ds:"));
        assert!(NdaId::new().to_string().starts_with("nda:"));
        assert!(OfferId::new().to_string().starts_with("offer:"));
        assert!(StructureId::new().to_string().starts_with("struct:"));
    }

    #[test]
    fn serde_roundtrips() {
        let id = DatasetId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: DatasetId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);

        let user = UserId::new();
        let json = serde_json::to_string(&user).unwrap();
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(user, back);
    }
}
