//! Row shapes returned by `sqlx` queries against the `sda` schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRow {
    pub file_id: Uuid,
    pub submission_user: String,
    pub submission_file_path: String,
    pub created_at: DateTime<Utc>,
    pub stable_id: Option<String>,
    pub archive_file_path: Option<String>,
    pub archive_file_size: Option<i64>,
    pub header: Option<String>,
    pub key_hash: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileEventRow {
    pub id: i64,
    pub file_id: Uuid,
    pub event: String,
    pub correlation_id: Uuid,
    pub user_id: String,
    pub details: Option<Value>,
    pub message: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChecksumRow {
    pub file_id: Uuid,
    pub source: String,
    #[sqlx(rename = "type")]
    pub checksum_type: String,
    pub value: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DatasetRow {
    pub dataset_id: Uuid,
    pub stable_id: String,
    pub created_at: DateTime<Utc>,
}
