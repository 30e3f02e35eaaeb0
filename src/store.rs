//! Envelope persistence
//!
//! This module defines the persisted envelope model and a trait-based
//! storage interface that can be implemented for various backends
//! (in-memory, PostgreSQL, etc.). The store only ever sees ciphertext
//! and plaintext metadata; payload plaintext never reaches it.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// The persisted unit for one captured record: ciphertext plus the
/// encryption metadata needed to open it, plus plaintext routing metadata.
///
/// Invariants: the nonce is unique per `key_id`; the ciphertext length
/// equals the original plaintext length (the tag is a separate field,
/// never concatenated in the persisted form); the tag authenticates
/// exactly this ciphertext under this key and nonce. Envelopes are
/// immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Caller-assigned unique record identifier
    pub record_id: String,
    /// Capture time, milliseconds since epoch
    pub timestamp_ms: i64,
    /// Source endpoint of the captured record
    pub source_endpoint: String,
    /// Destination endpoint of the captured record
    pub destination_endpoint: String,
    /// Encrypted payload (same length as the plaintext)
    pub ciphertext: Vec<u8>,
    /// Identifier of the DEK in the custodian's keyspace
    pub key_id: String,
    /// AES-GCM nonce (12 bytes)
    pub nonce: Vec<u8>,
    /// AES-GCM authentication tag (16 bytes)
    pub tag: Vec<u8>,
}

/// Metadata filter used to scope which envelopes the retrieval path
/// fetches. Independent from the post-decryption predicate: this runs
/// against plaintext metadata columns, before any key is touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionCriteria {
    /// Inclusive lower bound on `timestamp_ms`
    pub start_ms: Option<i64>,
    /// Inclusive upper bound on `timestamp_ms`
    pub end_ms: Option<i64>,
    /// Exact source endpoint match
    pub source_endpoint: Option<String>,
    /// Exact destination endpoint match
    pub destination_endpoint: Option<String>,
}

impl SelectionCriteria {
    /// Whether an envelope's metadata satisfies every set bound
    pub fn matches(&self, envelope: &Envelope) -> bool {
        if let Some(start) = self.start_ms {
            if envelope.timestamp_ms < start {
                return false;
            }
        }
        if let Some(end) = self.end_ms {
            if envelope.timestamp_ms > end {
                return false;
            }
        }
        if let Some(ref source) = self.source_endpoint {
            if &envelope.source_endpoint != source {
                return false;
            }
        }
        if let Some(ref destination) = self.destination_endpoint {
            if &envelope.destination_endpoint != destination {
                return false;
            }
        }
        true
    }
}

/// Storage capability for envelopes: put-by-id, get-by-id, and a
/// metadata range query. Record ids are caller-assigned and expected
/// unique; a second put under the same id is rejected, since envelopes
/// are immutable once persisted.
#[async_trait]
pub trait EnvelopeStore: Send + Sync {
    /// Persist an envelope under its record id
    async fn put(&self, envelope: Envelope) -> Result<()>;

    /// Retrieve an envelope by record id
    async fn get(&self, record_id: &str) -> Result<Option<Envelope>>;

    /// Retrieve all envelopes matching the criteria, ordered by
    /// `timestamp_ms` ascending
    async fn query(&self, criteria: &SelectionCriteria) -> Result<Vec<Envelope>>;
}

/// In-memory implementation of EnvelopeStore
///
/// Suitable for development, testing, and single-instance deployments.
/// Data is lost when the process terminates.
pub struct InMemoryEnvelopeStore {
    records: RwLock<HashMap<String, Envelope>>,
}

impl InMemoryEnvelopeStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEnvelopeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvelopeStore for InMemoryEnvelopeStore {
    async fn put(&self, envelope: Envelope) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&envelope.record_id) {
            return Err(VaultError::PersistenceFailure(format!(
                "duplicate record id: {}",
                envelope.record_id
            )));
        }
        records.insert(envelope.record_id.clone(), envelope);
        Ok(())
    }

    async fn get(&self, record_id: &str) -> Result<Option<Envelope>> {
        let records = self.records.read();
        Ok(records.get(record_id).cloned())
    }

    async fn query(&self, criteria: &SelectionCriteria) -> Result<Vec<Envelope>> {
        let records = self.records.read();
        let mut matched: Vec<_> = records
            .values()
            .filter(|e| criteria.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(record_id: &str, timestamp_ms: i64, source: &str) -> Envelope {
        Envelope {
            record_id: record_id.to_string(),
            timestamp_ms,
            source_endpoint: source.to_string(),
            destination_endpoint: "203.0.113.1:443".to_string(),
            ciphertext: vec![0xAA; 24],
            key_id: format!("dek-{}", record_id),
            nonce: vec![0x01; 12],
            tag: vec![0x02; 16],
        }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = InMemoryEnvelopeStore::new();
        store.put(envelope("r1", 1000, "10.0.0.1:5000")).await.unwrap();

        let fetched = store.get("r1").await.unwrap().unwrap();
        assert_eq!(fetched.record_id, "r1");
        assert_eq!(fetched.tag.len(), 16);

        assert!(store.get("r2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_rejects_duplicate_record_id() {
        let store = InMemoryEnvelopeStore::new();
        store.put(envelope("r1", 1000, "10.0.0.1:5000")).await.unwrap();

        let result = store.put(envelope("r1", 2000, "10.0.0.2:5000")).await;

        assert!(matches!(result, Err(VaultError::PersistenceFailure(_))));
        // First write is untouched
        let fetched = store.get("r1").await.unwrap().unwrap();
        assert_eq!(fetched.timestamp_ms, 1000);
    }

    #[tokio::test]
    async fn test_query_by_time_range() {
        let store = InMemoryEnvelopeStore::new();
        store.put(envelope("r1", 1000, "10.0.0.1:5000")).await.unwrap();
        store.put(envelope("r2", 2000, "10.0.0.2:5000")).await.unwrap();
        store.put(envelope("r3", 3000, "10.0.0.3:5000")).await.unwrap();

        let criteria = SelectionCriteria {
            start_ms: Some(1500),
            end_ms: Some(2500),
            ..Default::default()
        };
        let matched = store.query(&criteria).await.unwrap();

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].record_id, "r2");
    }

    #[tokio::test]
    async fn test_query_by_endpoint_ordered_by_timestamp() {
        let store = InMemoryEnvelopeStore::new();
        store.put(envelope("r2", 2000, "10.0.0.1:5000")).await.unwrap();
        store.put(envelope("r1", 1000, "10.0.0.1:5000")).await.unwrap();
        store.put(envelope("r3", 3000, "10.0.0.9:5000")).await.unwrap();

        let criteria = SelectionCriteria {
            source_endpoint: Some("10.0.0.1:5000".to_string()),
            ..Default::default()
        };
        let matched = store.query(&criteria).await.unwrap();

        let ids: Vec<_> = matched.iter().map(|e| e.record_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_empty_criteria_matches_all() {
        let store = InMemoryEnvelopeStore::new();
        store.put(envelope("r1", 1000, "10.0.0.1:5000")).await.unwrap();
        store.put(envelope("r2", 2000, "10.0.0.2:5000")).await.unwrap();

        let matched = store.query(&SelectionCriteria::default()).await.unwrap();
        assert_eq!(matched.len(), 2);
    }
}
