//! Schema migrations for the `sda` relational store (§6 "Persisted state
//! layout", §3 data model).
//!
//! Ported to plain statements rather than a migration-runner crate so the
//! schema stays inspectable; `sda.register_file`, `sda.set_archived`, and
//! `sda.set_verified` are Postgres functions so that "append event + write
//! field" happens atomically without a multi-statement Rust-side
//! transaction (§6).

use sqlx::postgres::PgPool;
use tracing::{debug, info, instrument};

use sda_core::{Error, Result};

/// Schema version this build of the store requires at minimum for
/// version-gated operations (§4.1 "register_file needs version >= 4").
pub const CURRENT_VERSION: i32 = 4;

const STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS sda",
    r#"
    CREATE TABLE IF NOT EXISTS sda.version (
        version INT PRIMARY KEY,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sda.encryption_keys (
        key_hash TEXT PRIMARY KEY,
        description TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sda.files (
        file_id UUID PRIMARY KEY,
        submission_user TEXT NOT NULL,
        submission_file_path TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        stable_id TEXT UNIQUE,
        archive_file_path TEXT,
        archive_file_size BIGINT,
        header TEXT,
        key_hash TEXT REFERENCES sda.encryption_keys(key_hash),
        UNIQUE (submission_user, submission_file_path)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sda.file_event_log (
        id BIGSERIAL PRIMARY KEY,
        file_id UUID NOT NULL REFERENCES sda.files(file_id),
        event TEXT NOT NULL,
        correlation_id UUID NOT NULL,
        user_id TEXT NOT NULL,
        details JSONB,
        message TEXT NOT NULL,
        started_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS file_event_log_file_id_idx ON sda.file_event_log (file_id, started_at, id)",
    "CREATE INDEX IF NOT EXISTS file_event_log_correlation_id_idx ON sda.file_event_log (correlation_id, started_at, id)",
    r#"
    CREATE TABLE IF NOT EXISTS sda.checksums (
        file_id UUID NOT NULL REFERENCES sda.files(file_id),
        source TEXT NOT NULL,
        type TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (file_id, source)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sda.datasets (
        dataset_id UUID PRIMARY KEY,
        stable_id TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sda.file_dataset (
        file_id UUID NOT NULL REFERENCES sda.files(file_id),
        dataset_id UUID NOT NULL REFERENCES sda.datasets(dataset_id),
        PRIMARY KEY (file_id, dataset_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sda.dataset_event_log (
        id BIGSERIAL PRIMARY KEY,
        dataset_id UUID NOT NULL REFERENCES sda.datasets(dataset_id),
        event TEXT NOT NULL,
        message TEXT NOT NULL,
        started_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    INSERT INTO sda.version (version) VALUES (4)
    ON CONFLICT (version) DO NOTHING
    "#,
    r#"
    CREATE OR REPLACE FUNCTION sda.register_file(
        p_file_id UUID,
        p_user TEXT,
        p_path TEXT,
        p_correlation_id UUID
    ) RETURNS UUID AS $$
    DECLARE
        v_file_id UUID;
    BEGIN
        INSERT INTO sda.files (file_id, submission_user, submission_file_path)
        VALUES (p_file_id, p_user, p_path)
        ON CONFLICT (submission_user, submission_file_path)
        DO UPDATE SET submission_user = EXCLUDED.submission_user
        RETURNING file_id INTO v_file_id;

        INSERT INTO sda.file_event_log (file_id, event, correlation_id, user_id, message)
        VALUES (v_file_id, 'registered', p_correlation_id, p_user, 'file registered');

        RETURN v_file_id;
    END;
    $$ LANGUAGE plpgsql
    "#,
    r#"
    CREATE OR REPLACE FUNCTION sda.set_archived(
        p_file_id UUID,
        p_correlation_id UUID,
        p_user TEXT,
        p_archive_file_path TEXT,
        p_archive_file_size BIGINT,
        p_checksum TEXT,
        p_checksum_type TEXT
    ) RETURNS VOID AS $$
    BEGIN
        UPDATE sda.files
        SET archive_file_path = p_archive_file_path, archive_file_size = p_archive_file_size
        WHERE file_id = p_file_id;
        IF NOT FOUND THEN
            RAISE EXCEPTION 'zero rows affected';
        END IF;

        INSERT INTO sda.checksums (file_id, source, type, value)
        VALUES (p_file_id, 'ARCHIVED', p_checksum_type, p_checksum)
        ON CONFLICT (file_id, source) DO UPDATE SET value = EXCLUDED.value, type = EXCLUDED.type;

        INSERT INTO sda.file_event_log (file_id, event, correlation_id, user_id, message)
        VALUES (p_file_id, 'archived', p_correlation_id, p_user, 'file archived');
    END;
    $$ LANGUAGE plpgsql
    "#,
    r#"
    CREATE OR REPLACE FUNCTION sda.set_verified(
        p_file_id UUID,
        p_correlation_id UUID,
        p_user TEXT,
        p_decrypted_size BIGINT,
        p_checksum TEXT,
        p_checksum_type TEXT
    ) RETURNS VOID AS $$
    BEGIN
        INSERT INTO sda.checksums (file_id, source, type, value)
        VALUES (p_file_id, 'UNENCRYPTED', p_checksum_type, p_checksum)
        ON CONFLICT (file_id, source) DO UPDATE SET value = EXCLUDED.value, type = EXCLUDED.type;

        INSERT INTO sda.file_event_log (file_id, event, correlation_id, user_id, message, details)
        VALUES (
            p_file_id, 'verified', p_correlation_id, p_user, 'file verified',
            jsonb_build_object('decrypted_size', p_decrypted_size)
        );
    END;
    $$ LANGUAGE plpgsql
    "#,
];

/// Run every migration statement in order. Idempotent: safe to call on
/// every startup (`CREATE ... IF NOT EXISTS`, `CREATE OR REPLACE FUNCTION`).
#[instrument(level = "debug", skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    debug!("🔧 running sda schema migrations");

    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
    }

    info!("✅ sda schema migrations complete");
    Ok(())
}

/// Read the highest applied schema version.
#[instrument(level = "debug", skip(pool))]
pub async fn current_version(pool: &PgPool) -> Result<i32> {
    let version: i32 = sqlx::query_scalar(
        "SELECT version FROM sda.version ORDER BY version DESC LIMIT 1",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| Error::Database(e.to_string()))?;
    Ok(version)
}
