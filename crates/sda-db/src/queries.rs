//! `PostgresStore`: the concrete [`sda_core::traits::FileStore`] implementation.
//!
//! Every public method here is the *outer*, retrying entry point from the
//! store's retry contract (§4.1): it pings the pool, then calls an inner
//! single-attempt method through [`sda_core::utils::with_retry`].

use serde_json::Value;
use sqlx::{postgres::PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use sda_core::{
    traits::{FileInfo, FileStore, HealthCheck, Service, UserFile},
    types::{
        AccessionCheck, ArchiveInfo, ChecksumType, CorrelationId, DatasetEventType, DatasetId,
        FileEventType, FileId, VerifiedInfo,
    },
    utils::{hex_decode, hex_encode, with_retry},
    Error, Result,
};

use crate::{migrations, pool::DatabasePool};

/// Minimum schema version `register_file` requires (§4.1).
const REGISTER_FILE_MIN_VERSION: i32 = 4;

pub struct PostgresStore {
    pool: DatabasePool,
    /// Cached at construction per §4.1: "read once... cached on the handle".
    version: i32,
}

impl PostgresStore {
    #[instrument(level = "debug", skip(pool))]
    pub async fn new(pool: DatabasePool) -> Result<Self> {
        migrations::run_migrations(pool.pool()).await?;
        let version = migrations::current_version(pool.pool()).await?;
        debug!(version, "🔧 store opened at schema version");
        Ok(Self { pool, version })
    }

    fn raw(&self) -> &PgPool {
        self.pool.pool()
    }

    /// Ping the pool and log if it's unreachable; `sqlx::Pool` rebuilds
    /// connections transparently on the next successful acquire, so there is
    /// nothing further to rebuild here (§4.1 `check_and_reconnect_if_needed`).
    async fn check_and_reconnect_if_needed(&self) -> Result<()> {
        if let Err(err) = self.pool.ping().await {
            tracing::warn!(%err, "database ping failed, pool will reconnect on next acquire");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Service for PostgresStore {}

#[async_trait::async_trait]
impl HealthCheck for PostgresStore {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

fn event_row_to_type(event: &str) -> Result<FileEventType> {
    FileEventType::from_db_str(event)
        .ok_or_else(|| Error::Internal(format!("unknown stored event {event}")))
}

#[async_trait::async_trait]
impl FileStore for PostgresStore {
    #[instrument(level = "debug", skip(self))]
    async fn register_file(&self, inbox_path: &str, user: &str) -> Result<FileId> {
        if self.version < REGISTER_FILE_MIN_VERSION {
            return Err(Error::SchemaVersion {
                op: "register_file".into(),
                have: self.version,
                need: REGISTER_FILE_MIN_VERSION,
            });
        }

        self.check_and_reconnect_if_needed().await?;
        with_retry("register_file", || async {
            let candidate = FileId::new();
            let correlation_id = CorrelationId::new();
            let file_id: Uuid = sqlx::query_scalar(
                "SELECT sda.register_file($1, $2, $3, $4)",
            )
            .bind(candidate.0)
            .bind(user)
            .bind(inbox_path)
            .bind(correlation_id.0)
            .fetch_one(self.raw())
            .await?;
            Ok(FileId(file_id))
        })
        .await
    }

    #[instrument(level = "debug", skip(self, details))]
    async fn update_file_event_log(
        &self,
        file_id: FileId,
        event: FileEventType,
        correlation_id: CorrelationId,
        user: &str,
        details: Option<Value>,
        message: &str,
    ) -> Result<()> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("update_file_event_log", || async {
            let result = sqlx::query(
                r#"
                INSERT INTO sda.file_event_log (file_id, event, correlation_id, user_id, details, message)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(file_id.0)
            .bind(event.as_db_str())
            .bind(correlation_id.0)
            .bind(user)
            .bind(&details)
            .bind(message)
            .execute(self.raw())
            .await?;

            if result.rows_affected() != 1 {
                return Err(Error::ZeroRowsAffected);
            }
            Ok(())
        })
        .await
    }

    #[instrument(level = "debug", skip(self, header))]
    async fn store_header(&self, file_id: FileId, header: &[u8]) -> Result<()> {
        self.check_and_reconnect_if_needed().await?;
        let encoded = hex_encode(header);
        with_retry("store_header", || async {
            let result = sqlx::query("UPDATE sda.files SET header = $1 WHERE file_id = $2")
                .bind(&encoded)
                .bind(file_id.0)
                .execute(self.raw())
                .await?;
            if result.rows_affected() != 1 {
                return Err(Error::NotFound(format!("file {file_id}")));
            }
            Ok(())
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_header(&self, file_id: FileId) -> Result<Vec<u8>> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_header", || async {
            let stored: Option<String> =
                sqlx::query_scalar("SELECT header FROM sda.files WHERE file_id = $1")
                    .bind(file_id.0)
                    .fetch_optional(self.raw())
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("file {file_id}")))?;
            let hex = stored.ok_or_else(|| Error::NotFound("header not stored".into()))?;
            hex_decode(&hex)
        })
        .await
    }

    #[instrument(level = "debug", skip(self, info))]
    async fn set_archived(
        &self,
        file_id: FileId,
        correlation_id: CorrelationId,
        info: &ArchiveInfo,
    ) -> Result<()> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("set_archived", || async {
            sqlx::query("SELECT sda.set_archived($1, $2, $3, $4, $5, $6, $7)")
                .bind(file_id.0)
                .bind(correlation_id.0)
                .bind("system")
                .bind(&info.archive_file_path)
                .bind(info.archive_file_size)
                .bind(&info.checksum)
                .bind(&info.checksum_type.0)
                .execute(self.raw())
                .await?;
            Ok(())
        })
        .await
    }

    #[instrument(level = "debug", skip(self, info))]
    async fn set_verified(
        &self,
        file_id: FileId,
        correlation_id: CorrelationId,
        info: &VerifiedInfo,
    ) -> Result<()> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("set_verified", || async {
            sqlx::query("SELECT sda.set_verified($1, $2, $3, $4, $5, $6)")
                .bind(file_id.0)
                .bind(correlation_id.0)
                .bind("system")
                .bind(info.decrypted_size)
                .bind(&info.decrypted_checksum)
                .bind(&info.checksum_type.0)
                .execute(self.raw())
                .await?;
            Ok(())
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn set_accession_id(&self, stable_id: &str, file_id: FileId) -> Result<()> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("set_accession_id", || async {
            let result = sqlx::query("UPDATE sda.files SET stable_id = $1 WHERE file_id = $2")
                .bind(stable_id)
                .bind(file_id.0)
                .execute(self.raw())
                .await?;
            if result.rows_affected() != 1 {
                return Err(Error::NotFound(format!("file {file_id}")));
            }
            Ok(())
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn check_accession_id_exists(
        &self,
        stable_id: &str,
        file_id: FileId,
    ) -> Result<AccessionCheck> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("check_accession_id_exists", || async {
            let existing: Option<Uuid> =
                sqlx::query_scalar("SELECT file_id FROM sda.files WHERE stable_id = $1")
                    .bind(stable_id)
                    .fetch_optional(self.raw())
                    .await?;
            Ok(match existing {
                None => AccessionCheck::Unused,
                Some(owner) if owner == file_id.0 => AccessionCheck::Same,
                Some(_) => AccessionCheck::Duplicate,
            })
        })
        .await
    }

    #[instrument(level = "debug", skip(self, accession_ids))]
    async fn map_files_to_dataset(&self, dataset_stable_id: &str, accession_ids: &[String]) -> Result<()> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("map_files_to_dataset", || async {
            let mut tx = self.raw().begin().await?;

            let inserted: Option<Uuid> = sqlx::query_scalar(
                r#"
                INSERT INTO sda.datasets (dataset_id, stable_id)
                VALUES ($1, $2)
                ON CONFLICT (stable_id) DO NOTHING
                RETURNING dataset_id
                "#,
            )
            .bind(DatasetId::new().0)
            .bind(dataset_stable_id)
            .fetch_optional(&mut *tx)
            .await?;

            let dataset_id = match inserted {
                Some(id) => {
                    sqlx::query(
                        "INSERT INTO sda.dataset_event_log (dataset_id, event, message) VALUES ($1, $2, $3)",
                    )
                    .bind(id)
                    .bind(DatasetEventType::Registered.as_db_str())
                    .bind("dataset created")
                    .execute(&mut *tx)
                    .await?;
                    id
                }
                None => {
                    sqlx::query_scalar("SELECT dataset_id FROM sda.datasets WHERE stable_id = $1")
                        .bind(dataset_stable_id)
                        .fetch_one(&mut *tx)
                        .await?
                }
            };

            for accession in accession_ids {
                let file_id: Uuid = sqlx::query_scalar(
                    "SELECT file_id FROM sda.files WHERE stable_id = $1",
                )
                .bind(accession)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::NotFound(format!("accession {accession}")))?;

                sqlx::query(
                    r#"
                    INSERT INTO sda.file_dataset (file_id, dataset_id)
                    VALUES ($1, $2)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(file_id)
                .bind(dataset_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_dataset_id(&self, stable_id: &str) -> Result<DatasetId> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_dataset_id", || async {
            let id: Uuid = sqlx::query_scalar("SELECT dataset_id FROM sda.datasets WHERE stable_id = $1")
                .bind(stable_id)
                .fetch_optional(self.raw())
                .await?
                .ok_or_else(|| Error::NotFound(format!("dataset {stable_id}")))?;
            Ok(DatasetId(id))
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn update_dataset_event(
        &self,
        dataset_id: DatasetId,
        event: DatasetEventType,
        message: &str,
    ) -> Result<()> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("update_dataset_event", || async {
            sqlx::query(
                "INSERT INTO sda.dataset_event_log (dataset_id, event, message) VALUES ($1, $2, $3)",
            )
            .bind(dataset_id.0)
            .bind(event.as_db_str())
            .bind(message)
            .execute(self.raw())
            .await?;
            Ok(())
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_file_status(&self, correlation_id: CorrelationId) -> Result<FileEventType> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_file_status", || async {
            let event: String = sqlx::query_scalar(
                r#"
                SELECT event FROM sda.file_event_log
                WHERE correlation_id = $1
                ORDER BY started_at DESC, id DESC
                LIMIT 1
                "#,
            )
            .bind(correlation_id.0)
            .fetch_optional(self.raw())
            .await?
            .ok_or_else(|| Error::NotFound(format!("correlation {correlation_id}")))?;
            event_row_to_type(&event)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_file_info(&self, file_id: FileId) -> Result<FileInfo> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_file_info", || async {
            let row = sqlx::query(
                r#"
                SELECT
                    f.submission_user, f.submission_file_path, f.stable_id,
                    f.archive_file_path, f.archive_file_size, f.key_hash,
                    (SELECT event FROM sda.file_event_log e
                     WHERE e.file_id = f.file_id
                     ORDER BY started_at DESC, id DESC LIMIT 1) AS status
                FROM sda.files f
                WHERE f.file_id = $1
                "#,
            )
            .bind(file_id.0)
            .fetch_optional(self.raw())
            .await?
            .ok_or_else(|| Error::NotFound(format!("file {file_id}")))?;

            let status: Option<String> = row.try_get("status")?;
            let status = event_row_to_type(
                &status.ok_or_else(|| Error::Internal("file has no events".into()))?,
            )?;

            Ok(FileInfo {
                file_id,
                submission_user: row.try_get("submission_user")?,
                submission_file_path: row.try_get("submission_file_path")?,
                status,
                stable_id: row.try_get("stable_id")?,
                archive_file_path: row.try_get("archive_file_path")?,
                archive_file_size: row.try_get("archive_file_size")?,
                key_hash: row.try_get("key_hash")?,
            })
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_inbox_path(&self, stable_id: &str) -> Result<String> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_inbox_path", || async {
            sqlx::query_scalar("SELECT submission_file_path FROM sda.files WHERE stable_id = $1")
                .bind(stable_id)
                .fetch_optional(self.raw())
                .await?
                .ok_or_else(|| Error::NotFound(format!("accession {stable_id}")))
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_archive_path(&self, stable_id: &str) -> Result<String> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_archive_path", || async {
            let path: Option<String> =
                sqlx::query_scalar("SELECT archive_file_path FROM sda.files WHERE stable_id = $1")
                    .bind(stable_id)
                    .fetch_optional(self.raw())
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("accession {stable_id}")))?;
            path.ok_or_else(|| Error::NotFound("file not yet archived".into()))
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_header_for_stable_id(&self, stable_id: &str) -> Result<Vec<u8>> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_header_for_stable_id", || async {
            let stored: Option<String> =
                sqlx::query_scalar("SELECT header FROM sda.files WHERE stable_id = $1")
                    .bind(stable_id)
                    .fetch_optional(self.raw())
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("accession {stable_id}")))?;
            let hex = stored.ok_or_else(|| Error::NotFound("header not stored".into()))?;
            hex_decode(&hex)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_sync_data(&self, stable_id: &str) -> Result<Value> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_sync_data", || async {
            let row = sqlx::query(
                r#"
                SELECT f.file_id, f.archive_file_path, f.archive_file_size, c.value AS checksum
                FROM sda.files f
                LEFT JOIN sda.checksums c ON c.file_id = f.file_id AND c.source = 'ARCHIVED'
                WHERE f.stable_id = $1
                "#,
            )
            .bind(stable_id)
            .fetch_optional(self.raw())
            .await?
            .ok_or_else(|| Error::NotFound(format!("accession {stable_id}")))?;

            let file_id: Uuid = row.try_get("file_id")?;
            let archive_file_path: Option<String> = row.try_get("archive_file_path")?;
            let archive_file_size: Option<i64> = row.try_get("archive_file_size")?;
            let checksum: Option<String> = row.try_get("checksum")?;

            Ok(serde_json::json!({
                "file_id": file_id,
                "stable_id": stable_id,
                "archive_file_path": archive_file_path,
                "archive_file_size": archive_file_size,
                "decrypted_checksum": checksum,
            }))
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_active_users(&self) -> Result<Vec<String>> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("list_active_users", || async {
            let users: Vec<String> = sqlx::query_scalar(
                r#"
                SELECT DISTINCT f.submission_user
                FROM sda.files f
                WHERE NOT EXISTS (
                    SELECT 1 FROM sda.file_dataset fd WHERE fd.file_id = f.file_id
                )
                ORDER BY 1
                "#,
            )
            .fetch_all(self.raw())
            .await?;
            Ok(users)
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_user_files(&self, user: &str) -> Result<Vec<UserFile>> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_user_files", || async {
            let rows = sqlx::query(
                r#"
                SELECT
                    f.file_id, f.submission_file_path,
                    (SELECT event FROM sda.file_event_log e
                     WHERE e.file_id = f.file_id
                     ORDER BY started_at DESC, id DESC LIMIT 1) AS status
                FROM sda.files f
                WHERE f.submission_user = $1
                AND NOT EXISTS (
                    SELECT 1 FROM sda.file_dataset fd WHERE fd.file_id = f.file_id
                )
                ORDER BY f.created_at
                "#,
            )
            .bind(user)
            .fetch_all(self.raw())
            .await?;

            rows.into_iter()
                .map(|row| {
                    let file_id: Uuid = row.try_get("file_id")?;
                    let inbox_path: String = row.try_get("submission_file_path")?;
                    let status: Option<String> = row.try_get("status")?;
                    let status = event_row_to_type(
                        &status.ok_or_else(|| Error::Internal("file has no events".into()))?,
                    )?;
                    Ok(UserFile {
                        file_id: FileId(file_id),
                        inbox_path,
                        status,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_corr_id(&self, user: &str, path: &str) -> Result<CorrelationId> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("get_corr_id", || async {
            let existing: Option<Uuid> = sqlx::query_scalar(
                r#"
                SELECT e.correlation_id
                FROM sda.file_event_log e
                JOIN sda.files f ON f.file_id = e.file_id
                WHERE f.submission_user = $1 AND f.submission_file_path = $2
                AND NOT EXISTS (
                    SELECT 1 FROM sda.file_dataset fd WHERE fd.file_id = f.file_id
                )
                ORDER BY e.started_at DESC, e.id DESC
                LIMIT 1
                "#,
            )
            .bind(user)
            .bind(path)
            .fetch_optional(self.raw())
            .await?;

            Ok(match existing {
                Some(id) => CorrelationId(id),
                None => CorrelationId::new(),
            })
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn find_file_id_by_path(&self, user: &str, path: &str) -> Result<FileId> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("find_file_id_by_path", || async {
            let file_id: Uuid = sqlx::query_scalar(
                "SELECT file_id FROM sda.files WHERE submission_user = $1 AND submission_file_path = $2",
            )
            .bind(user)
            .bind(path)
            .fetch_optional(self.raw())
            .await?
            .ok_or_else(|| Error::NotFound(format!("{user}:{path}")))?;
            Ok(FileId(file_id))
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn add_key_hash(&self, key_hash: &str, description: &str) -> Result<()> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("add_key_hash", || async {
            sqlx::query("INSERT INTO sda.encryption_keys (key_hash, description) VALUES ($1, $2)")
                .bind(key_hash)
                .bind(description)
                .execute(self.raw())
                .await?;
            Ok(())
        })
        .await
    }

    #[instrument(level = "debug", skip(self))]
    async fn set_key_hash(&self, file_id: FileId, key_hash: &str) -> Result<()> {
        self.check_and_reconnect_if_needed().await?;
        with_retry("set_key_hash", || async {
            let result = sqlx::query("UPDATE sda.files SET key_hash = $1 WHERE file_id = $2")
                .bind(key_hash)
                .bind(file_id.0)
                .execute(self.raw())
                .await?;
            if result.rows_affected() != 1 {
                return Err(Error::NotFound(format!("file {file_id}")));
            }
            Ok(())
        })
        .await
    }
}

// `sqlx::Error` auto-converts to `sda_core::Error` via `?` inside these
// closures through `From<sqlx::Error> for Error` — no per-call `.map_err`
// boilerplate needed (unlike the teacher's raw query functions).
