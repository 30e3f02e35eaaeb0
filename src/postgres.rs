//! PostgreSQL backends
//!
//! Production implementations of the keyspace and envelope-store
//! capabilities. Byte fields are BYTEA columns, treated as opaque binary
//! end to end. The `data_keys` table holds raw DEK material; access
//! control on that table stands in for the custodian boundary, and
//! channel confidentiality between the database and this process is a
//! transport-layer precondition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::crypto::SecureKey;
use crate::custodian::{KeyRecord, Keyspace};
use crate::error::{Result, VaultError};
use crate::store::{Envelope, EnvelopeStore, SelectionCriteria};

/// Create the vault tables if they do not exist yet
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS data_keys (
            key_id    TEXT PRIMARY KEY,
            material  BYTEA NOT NULL,
            issued_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| VaultError::PersistenceFailure(format!("failed to create data_keys: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS envelopes (
            record_id            TEXT PRIMARY KEY,
            timestamp_ms         BIGINT NOT NULL,
            source_endpoint      TEXT NOT NULL,
            destination_endpoint TEXT NOT NULL,
            ciphertext           BYTEA NOT NULL,
            key_id               TEXT NOT NULL,
            nonce                BYTEA NOT NULL,
            tag                  BYTEA NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| VaultError::PersistenceFailure(format!("failed to create envelopes: {}", e)))?;

    Ok(())
}

/// PostgreSQL-backed keyspace. Append-only: inserts are conditional on
/// the primary key being unassigned, and no update or delete statement
/// exists in this module.
pub struct PostgresKeyspace {
    pool: PgPool,
}

impl PostgresKeyspace {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Keyspace for PostgresKeyspace {
    async fn insert_new(&self, record: KeyRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO data_keys (key_id, material, issued_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key_id) DO NOTHING
            "#,
        )
        .bind(&record.key_id)
        .bind(record.material.as_bytes())
        .bind(record.issued_at)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::PersistenceFailure(format!("failed to store key: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn fetch(&self, key_id: &str) -> Result<Option<KeyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT key_id, material, issued_at
            FROM data_keys
            WHERE key_id = $1
            "#,
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultError::PersistenceFailure(format!("failed to fetch key: {}", e)))?;

        Ok(row.map(|r| KeyRecord {
            key_id: r.get("key_id"),
            material: SecureKey::new(r.get::<Vec<u8>, _>("material")),
            issued_at: r.get::<DateTime<Utc>, _>("issued_at"),
        }))
    }
}

/// PostgreSQL-backed envelope store
pub struct PostgresEnvelopeStore {
    pool: PgPool,
}

impl PostgresEnvelopeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn envelope_from_row(row: &sqlx::postgres::PgRow) -> Envelope {
        Envelope {
            record_id: row.get("record_id"),
            timestamp_ms: row.get("timestamp_ms"),
            source_endpoint: row.get("source_endpoint"),
            destination_endpoint: row.get("destination_endpoint"),
            ciphertext: row.get("ciphertext"),
            key_id: row.get("key_id"),
            nonce: row.get("nonce"),
            tag: row.get("tag"),
        }
    }
}

#[async_trait]
impl EnvelopeStore for PostgresEnvelopeStore {
    async fn put(&self, envelope: Envelope) -> Result<()> {
        // Plain INSERT: the primary key rejects a second write under the
        // same record id, keeping persisted envelopes immutable
        sqlx::query(
            r#"
            INSERT INTO envelopes
                (record_id, timestamp_ms, source_endpoint, destination_endpoint,
                 ciphertext, key_id, nonce, tag)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&envelope.record_id)
        .bind(envelope.timestamp_ms)
        .bind(&envelope.source_endpoint)
        .bind(&envelope.destination_endpoint)
        .bind(&envelope.ciphertext)
        .bind(&envelope.key_id)
        .bind(&envelope.nonce)
        .bind(&envelope.tag)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::PersistenceFailure(format!("failed to store envelope: {}", e)))?;

        Ok(())
    }

    async fn get(&self, record_id: &str) -> Result<Option<Envelope>> {
        let row = sqlx::query(
            r#"
            SELECT record_id, timestamp_ms, source_endpoint, destination_endpoint,
                   ciphertext, key_id, nonce, tag
            FROM envelopes
            WHERE record_id = $1
            "#,
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultError::PersistenceFailure(format!("failed to fetch envelope: {}", e)))?;

        Ok(row.as_ref().map(Self::envelope_from_row))
    }

    async fn query(&self, criteria: &SelectionCriteria) -> Result<Vec<Envelope>> {
        let rows = sqlx::query(
            r#"
            SELECT record_id, timestamp_ms, source_endpoint, destination_endpoint,
                   ciphertext, key_id, nonce, tag
            FROM envelopes
            WHERE ($1::BIGINT IS NULL OR timestamp_ms >= $1)
              AND ($2::BIGINT IS NULL OR timestamp_ms <= $2)
              AND ($3::TEXT   IS NULL OR source_endpoint = $3)
              AND ($4::TEXT   IS NULL OR destination_endpoint = $4)
            ORDER BY timestamp_ms ASC, record_id ASC
            "#,
        )
        .bind(criteria.start_ms)
        .bind(criteria.end_ms)
        .bind(criteria.source_endpoint.as_deref())
        .bind(criteria.destination_endpoint.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VaultError::PersistenceFailure(format!("failed to query envelopes: {}", e)))?;

        Ok(rows.iter().map(Self::envelope_from_row).collect())
    }
}
