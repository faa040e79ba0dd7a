//! Domain types shared across the coordination layer.
//!
//! These are the Rust-native shapes of the data model in §3: identifiers,
//! the closed event vocabulary, and the small value types that travel
//! between the store, the broker, and the admin API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-assigned opaque identifier for a file, created on first
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub Uuid);

impl DatasetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

/// Token shared by every message and event describing one file's journey
/// through the pipeline. Minted by the first worker to see the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of lifecycle events a file can pass through (§3).
///
/// The *latest* row per file by `started_at` defines the file's current
/// status — this type is never stored as a mutable column, only appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventType {
    Registered,
    Uploaded,
    Submitted,
    Ingested,
    Archived,
    Verified,
    BackedUp,
    Ready,
    Disabled,
    Enabled,
    Error,
}

impl FileEventType {
    /// Database representation. Stored as text rather than a Postgres enum
    /// so new event names don't require a migration to add an enum label.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            FileEventType::Registered => "registered",
            FileEventType::Uploaded => "uploaded",
            FileEventType::Submitted => "submitted",
            FileEventType::Ingested => "ingested",
            FileEventType::Archived => "archived",
            FileEventType::Verified => "verified",
            FileEventType::BackedUp => "backed up",
            FileEventType::Ready => "ready",
            FileEventType::Disabled => "disabled",
            FileEventType::Enabled => "enabled",
            FileEventType::Error => "error",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        Some(match s {
            "registered" => FileEventType::Registered,
            "uploaded" => FileEventType::Uploaded,
            "submitted" => FileEventType::Submitted,
            "ingested" => FileEventType::Ingested,
            "archived" => FileEventType::Archived,
            "verified" => FileEventType::Verified,
            "backed up" => FileEventType::BackedUp,
            "ready" => FileEventType::Ready,
            "disabled" => FileEventType::Disabled,
            "enabled" => FileEventType::Enabled,
            "error" => FileEventType::Error,
            _ => return None,
        })
    }
}

impl std::fmt::Display for FileEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// The closed set of dataset lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetEventType {
    Registered,
    Released,
    Deprecated,
}

impl DatasetEventType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DatasetEventType::Registered => "registered",
            DatasetEventType::Released => "released",
            DatasetEventType::Deprecated => "deprecated",
        }
    }
}

impl std::fmt::Display for DatasetEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Where a checksum was computed: over the ciphertext as uploaded, the
/// ciphertext as archived, or the decrypted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumSource {
    Uploaded,
    Archived,
    Unencrypted,
}

impl ChecksumSource {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ChecksumSource::Uploaded => "UPLOADED",
            ChecksumSource::Archived => "ARCHIVED",
            ChecksumSource::Unencrypted => "UNENCRYPTED",
        }
    }
}

/// A hash algorithm name. `SHA256` is the only one in current use but the
/// column is free text so a new algorithm needs no migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumType(pub String);

impl ChecksumType {
    pub fn sha256() -> Self {
        Self("SHA256".to_string())
    }
}

/// Three-way answer from `check_accession_id_exists`: an admin needs to
/// distinguish "already assigned to this file" from "taken by another
/// file" before it can decide whether to proceed or reject with 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessionCheck {
    /// Unused — free to assign.
    Unused,
    /// Already assigned to the file asking.
    Same,
    /// Assigned to a different file.
    Duplicate,
}

/// Archive placement and size recorded at the `archived` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfo {
    pub archive_file_path: String,
    pub archive_file_size: i64,
    pub checksum: String,
    pub checksum_type: ChecksumType,
}

/// Decrypted size and checksum recorded at the `verified` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedInfo {
    pub decrypted_size: i64,
    pub decrypted_checksum: String,
    pub checksum_type: ChecksumType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_event_type_round_trips_through_db_string() {
        for ty in [
            FileEventType::Registered,
            FileEventType::Uploaded,
            FileEventType::Submitted,
            FileEventType::Ingested,
            FileEventType::Archived,
            FileEventType::Verified,
            FileEventType::BackedUp,
            FileEventType::Ready,
            FileEventType::Disabled,
            FileEventType::Enabled,
            FileEventType::Error,
        ] {
            let s = ty.as_db_str();
            assert_eq!(FileEventType::from_db_str(s), Some(ty));
        }
    }

    #[test]
    fn backed_up_stores_as_two_words() {
        assert_eq!(FileEventType::BackedUp.as_db_str(), "backed up");
    }

    #[test]
    fn unknown_event_string_does_not_parse() {
        assert_eq!(FileEventType::from_db_str("bogus"), None);
    }
}
