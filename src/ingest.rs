//! Ingest service
//!
//! Receives a raw captured record, seals its payload under a fresh DEK,
//! and persists the resulting envelope. One key per record: no DEK is
//! ever reused across records, which bounds both the blast radius of a
//! key compromise and the nonce-collision exposure of any single key.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::DEFAULT_CALL_TIMEOUT;
use crate::crypto::AesGcmCipher;
use crate::custodian::{KeyCustodian, Keyspace};
use crate::error::{Result, VaultError};
use crate::store::{Envelope, EnvelopeStore};

/// Ingest RPC request: one raw record plus its routing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub record_id: String,
    pub timestamp_ms: i64,
    pub source_endpoint: String,
    pub destination_endpoint: String,
    pub payload: Vec<u8>,
}

/// Ingest RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreAck {
    pub success: bool,
    pub message: String,
    pub stored_id: String,
}

impl StoreAck {
    /// Failure ack for an RPC boundary: structured response instead of an
    /// unstructured transport fault. The original record id is echoed
    /// back for debugging.
    pub fn failure(record_id: &str, error: &VaultError) -> Self {
        Self {
            success: false,
            message: format!("failed to store record: {}", error),
            stored_id: record_id.to_string(),
        }
    }
}

/// Ingest service: holds explicit handles to its custodian and store,
/// injected at construction.
pub struct IngestService<K: Keyspace, E: EnvelopeStore> {
    custodian: Arc<KeyCustodian<K>>,
    store: Arc<E>,
    call_timeout: Duration,
}

impl<K: Keyspace, E: EnvelopeStore> IngestService<K, E> {
    pub fn new(custodian: Arc<KeyCustodian<K>>, store: Arc<E>) -> Self {
        Self::with_call_timeout(custodian, store, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_call_timeout(
        custodian: Arc<KeyCustodian<K>>,
        store: Arc<E>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            custodian,
            store,
            call_timeout,
        }
    }

    /// Seal and persist one record, all-or-nothing.
    ///
    /// Any failure in key generation, sealing, or persistence aborts the
    /// whole operation with nothing stored. A generated-but-unused key
    /// may remain in the keyspace; that is harmless waste, not a
    /// correctness violation. The three failure variants stay distinct so
    /// the caller can decide whether to retry.
    pub async fn store_record(&self, request: StoreRequest) -> Result<StoreAck> {
        debug!(record_id = %request.record_id, "receiving record");

        // 1. Fresh DEK for this record
        let issued = timeout(self.call_timeout, self.custodian.generate_key())
            .await
            .map_err(|_| VaultError::KeyServiceUnavailable("key generation timed out".into()))?
            .map_err(|e| VaultError::KeyServiceUnavailable(e.to_string()))?;

        // 2. Seal the payload
        let sealed = AesGcmCipher::seal(&issued.material, &request.payload, None)?;

        // 3. Assemble and persist the envelope
        let envelope = Envelope {
            record_id: request.record_id.clone(),
            timestamp_ms: request.timestamp_ms,
            source_endpoint: request.source_endpoint,
            destination_endpoint: request.destination_endpoint,
            ciphertext: sealed.ciphertext,
            key_id: issued.key_id.clone(),
            nonce: sealed.nonce,
            tag: sealed.tag,
        };

        timeout(self.call_timeout, self.store.put(envelope))
            .await
            .map_err(|_| VaultError::PersistenceFailure("envelope store timed out".into()))??;

        info!(
            record_id = %request.record_id,
            key_id = %issued.key_id,
            "record sealed and stored"
        );

        Ok(StoreAck {
            success: true,
            message: format!(
                "record stored successfully, sealed with key {}",
                issued.key_id
            ),
            stored_id: request.record_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custodian::{InMemoryKeyspace, KeyRecord};
    use crate::store::{InMemoryEnvelopeStore, SelectionCriteria};
    use async_trait::async_trait;

    fn request(record_id: &str) -> StoreRequest {
        StoreRequest {
            record_id: record_id.to_string(),
            timestamp_ms: 1_700_000_000_001,
            source_endpoint: "192.168.1.101:4444".to_string(),
            destination_endpoint: "203.0.113.1:443".to_string(),
            payload: br#"{"proto":"TCP","length":512}"#.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_store_record_persists_one_envelope() {
        let keyspace = Arc::new(InMemoryKeyspace::new());
        let store = Arc::new(InMemoryEnvelopeStore::new());
        let custodian = Arc::new(KeyCustodian::new(keyspace));
        let service = IngestService::new(custodian, Arc::clone(&store));

        let ack = service.store_record(request("r1")).await.unwrap();

        assert!(ack.success);
        assert_eq!(ack.stored_id, "r1");

        let envelope = store.get("r1").await.unwrap().unwrap();
        assert_eq!(envelope.timestamp_ms, 1_700_000_000_001);
        assert_eq!(envelope.source_endpoint, "192.168.1.101:4444");
        // Ciphertext length matches the plaintext, tag held separately
        assert_eq!(envelope.ciphertext.len(), request("r1").payload.len());
        assert_eq!(envelope.nonce.len(), 12);
        assert_eq!(envelope.tag.len(), 16);
        assert!(envelope.key_id.starts_with("dek-"));
    }

    #[tokio::test]
    async fn test_each_record_gets_its_own_key() {
        let keyspace = Arc::new(InMemoryKeyspace::new());
        let store = Arc::new(InMemoryEnvelopeStore::new());
        let custodian = Arc::new(KeyCustodian::new(keyspace));
        let service = IngestService::new(custodian, Arc::clone(&store));

        service.store_record(request("r1")).await.unwrap();
        service.store_record(request("r2")).await.unwrap();

        let a = store.get("r1").await.unwrap().unwrap();
        let b = store.get("r2").await.unwrap().unwrap();
        assert_ne!(a.key_id, b.key_id);
    }

    struct FailingStore;

    #[async_trait]
    impl EnvelopeStore for FailingStore {
        async fn put(&self, _envelope: Envelope) -> crate::error::Result<()> {
            Err(VaultError::PersistenceFailure("backing store down".into()))
        }
        async fn get(&self, _record_id: &str) -> crate::error::Result<Option<Envelope>> {
            Ok(None)
        }
        async fn query(
            &self,
            _criteria: &SelectionCriteria,
        ) -> crate::error::Result<Vec<Envelope>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_stores_nothing() {
        let keyspace = Arc::new(InMemoryKeyspace::new());
        let custodian = Arc::new(KeyCustodian::new(keyspace));
        let service = IngestService::new(custodian, Arc::new(FailingStore));

        let result = service.store_record(request("r1")).await;

        match result {
            Err(e) => {
                assert!(matches!(e, VaultError::PersistenceFailure(_)));
                assert!(e.is_retryable());
            }
            Ok(ack) => panic!("expected PersistenceFailure, got ack {:?}", ack),
        }
    }

    struct FailingKeyspace;

    #[async_trait]
    impl Keyspace for FailingKeyspace {
        async fn insert_new(&self, _record: KeyRecord) -> crate::error::Result<bool> {
            Err(VaultError::PersistenceFailure("keyspace unreachable".into()))
        }
        async fn fetch(&self, _key_id: &str) -> crate::error::Result<Option<KeyRecord>> {
            Err(VaultError::PersistenceFailure("keyspace unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_key_service_failure_stores_nothing() {
        let custodian = Arc::new(KeyCustodian::new(Arc::new(FailingKeyspace)));
        let store = Arc::new(InMemoryEnvelopeStore::new());
        let service = IngestService::new(custodian, Arc::clone(&store));

        let result = service.store_record(request("r1")).await;

        assert!(matches!(result, Err(VaultError::KeyServiceUnavailable(_))));
        // No partial envelope was persisted
        assert!(store.get("r1").await.unwrap().is_none());
        let all = store.query(&SelectionCriteria::default()).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_failure_ack_echoes_record_id() {
        let error = VaultError::PersistenceFailure("backing store down".into());
        let ack = StoreAck::failure("r9", &error);

        assert!(!ack.success);
        assert_eq!(ack.stored_id, "r9");
        assert!(ack.message.contains("persistence failure"));
    }
}
