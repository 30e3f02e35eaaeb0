//! Key custodian: the sole owner of data-encryption-key material
//!
//! The custodian generates one DEK per stored record and serves raw
//! material back to the retrieval path by key id. The keyspace behind it
//! is a trait so tests run against a plain in-memory map while production
//! deployments back it with an access-controlled database table.
//!
//! Confidentiality of key material in transit between the custodian and
//! its callers is a transport-layer precondition; this module does not
//! re-implement it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::SecureKey;
use crate::error::{Result, VaultError};

/// A key record as held inside the keyspace.
///
/// Immutable once issued: there is no update or delete path, and the
/// material never leaves the custodian boundary except through
/// [`KeyCustodian::key_material`] and the one-time generation response.
#[derive(Debug, Clone)]
pub struct KeyRecord {
    /// Globally unique key identifier
    pub key_id: String,
    /// Raw 256-bit key material
    pub material: SecureKey,
    /// When the key was issued (bookkeeping only; keys never expire)
    pub issued_at: DateTime<Utc>,
}

/// Append-only keyspace capability.
///
/// Implementations must make `insert_new` atomic with respect to
/// concurrent writers: two inserts for the same id must never both
/// report success.
#[async_trait]
pub trait Keyspace: Send + Sync {
    /// Insert a key record if its id is unassigned. Returns `false` when
    /// the id is already taken (the caller regenerates and retries).
    async fn insert_new(&self, record: KeyRecord) -> Result<bool>;

    /// Fetch a key record by id
    async fn fetch(&self, key_id: &str) -> Result<Option<KeyRecord>>;
}

/// In-memory keyspace
///
/// Suitable for tests and single-process deployments. Keys are lost when
/// the process terminates.
pub struct InMemoryKeyspace {
    keys: RwLock<HashMap<String, KeyRecord>>,
}

impl InMemoryKeyspace {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryKeyspace {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Keyspace for InMemoryKeyspace {
    async fn insert_new(&self, record: KeyRecord) -> Result<bool> {
        let mut keys = self.keys.write();
        if keys.contains_key(&record.key_id) {
            return Ok(false);
        }
        keys.insert(record.key_id.clone(), record);
        Ok(true)
    }

    async fn fetch(&self, key_id: &str) -> Result<Option<KeyRecord>> {
        let keys = self.keys.read();
        Ok(keys.get(key_id).cloned())
    }
}

/// A freshly generated key: the identifier plus the one-time copy of the
/// material handed to the ingest path at generation time.
#[derive(Debug)]
pub struct IssuedKey {
    pub key_id: String,
    pub material: SecureKey,
}

/// Key custodian service
pub struct KeyCustodian<S: Keyspace> {
    keyspace: Arc<S>,
}

impl<S: Keyspace> KeyCustodian<S> {
    pub fn new(keyspace: Arc<S>) -> Self {
        Self { keyspace }
    }

    /// Generate a fresh 256-bit DEK under a new unique identifier.
    ///
    /// The id is a random token with negligible collision probability, but
    /// uniqueness is guaranteed rather than assumed: the insert is
    /// conditional on the id being unassigned, and a collision regenerates
    /// both id and material.
    pub async fn generate_key(&self) -> Result<IssuedKey> {
        loop {
            let key_id = format!("dek-{}", Uuid::new_v4().simple());
            let material = SecureKey::generate();

            let record = KeyRecord {
                key_id: key_id.clone(),
                material: material.clone(),
                issued_at: Utc::now(),
            };

            if self.keyspace.insert_new(record).await? {
                info!(key_id = %key_id, "generated new data encryption key");
                return Ok(IssuedKey { key_id, material });
            }
            debug!(key_id = %key_id, "key id collision, regenerating");
        }
    }

    /// Retrieve raw key material by identifier.
    ///
    /// This is the one operation that transmits raw key material; the
    /// channel it crosses must be confidential (transport-layer concern).
    pub async fn key_material(&self, key_id: &str) -> Result<SecureKey> {
        match self.keyspace.fetch(key_id).await? {
            Some(record) => Ok(record.material),
            None => Err(VaultError::KeyNotFound(key_id.to_string())),
        }
    }
}

/// Wire shape of a custodian RPC response: key material travels base64
/// encoded, alongside a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyResponse {
    pub key_id: String,
    pub key_material: String,
    pub message: String,
}

impl KeyResponse {
    pub fn new(key_id: &str, material: &SecureKey, message: &str) -> Self {
        Self {
            key_id: key_id.to_string(),
            key_material: STANDARD.encode(material.as_bytes()),
            message: message.to_string(),
        }
    }

    /// Decode the base64 material back into a key
    pub fn material(&self) -> Result<SecureKey> {
        let bytes = STANDARD
            .decode(&self.key_material)
            .map_err(|e| VaultError::ParseFailure(format!("base64 decode error: {}", e)))?;
        Ok(SecureKey::new(bytes))
    }
}
