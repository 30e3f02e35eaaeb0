//! Retrieval service
//!
//! Fetches envelopes by metadata criteria, resolves each envelope's DEK,
//! opens the ciphertext, and structures the recovered payloads for the
//! query engine. Failures are per-record: one missing key or corrupted
//! envelope never blocks analysis of the rest of the batch. Every skipped
//! record lands in a manifest with a reason code so callers can tell "no
//! matches" from "matches existed but failed integrity or parsing".

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_CALL_TIMEOUT;
use crate::crypto::AesGcmCipher;
use crate::custodian::{KeyCustodian, Keyspace};
use crate::error::{Result, VaultError};
use crate::record::PlaintextRecord;
use crate::store::{Envelope, EnvelopeStore, SelectionCriteria};

/// Reason a record was excluded from a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The envelope's key id has no material in the keyspace (data loss)
    KeyNotFound,
    /// The custodian did not answer within the call timeout (transient)
    KeyServiceUnavailable,
    /// Authentication failed while opening the ciphertext (security event)
    TamperDetected,
    /// The envelope was malformed below the authentication layer
    DecryptionFailure,
    /// The decrypted payload could not be structured into fields
    ParseFailure,
}

impl SkipReason {
    fn classify(error: &VaultError) -> Self {
        match error {
            VaultError::KeyNotFound(_) => SkipReason::KeyNotFound,
            VaultError::TamperDetected(_) => SkipReason::TamperDetected,
            VaultError::ParseFailure(_) => SkipReason::ParseFailure,
            VaultError::KeyServiceUnavailable(_) => SkipReason::KeyServiceUnavailable,
            _ => SkipReason::DecryptionFailure,
        }
    }
}

/// Manifest entry for one excluded record
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    pub record_id: String,
    pub reason: SkipReason,
}

/// Result of a fetch: the records that passed both authentication and
/// parsing, plus the manifest of everything that did not.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<PlaintextRecord>,
    pub skipped: Vec<SkippedRecord>,
}

/// Retrieval service: holds explicit handles to its custodian and store,
/// injected at construction.
pub struct RetrievalService<K: Keyspace, E: EnvelopeStore> {
    custodian: Arc<KeyCustodian<K>>,
    store: Arc<E>,
    call_timeout: Duration,
}

impl<K: Keyspace, E: EnvelopeStore> RetrievalService<K, E> {
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

    /// Fetch every envelope matching the criteria and decrypt the batch,
    /// tolerating per-record failures.
    ///
    /// The store query itself failing aborts the call (there is no partial
    /// batch to salvage yet); everything after that is per-record.
    pub async fn fetch_and_decrypt(&self, criteria: &SelectionCriteria) -> Result<FetchOutcome> {
        let envelopes = timeout(self.call_timeout, self.store.query(criteria))
            .await
            .map_err(|_| VaultError::PersistenceFailure("envelope query timed out".into()))??;

        debug!(matched = envelopes.len(), "fetched envelopes for decryption");

        let mut outcome = FetchOutcome::default();
        for envelope in envelopes {
            let record_id = envelope.record_id.clone();
            match self.open_envelope(envelope).await {
                Ok(record) => outcome.records.push(record),
                Err(e) => {
                    let reason = SkipReason::classify(&e);
                    match reason {
                        // Possible compromise, not routine unavailability:
                        // distinctly louder than any other skip
                        SkipReason::TamperDetected => {
                            error!(record_id = %record_id, %e, "INTEGRITY VIOLATION: envelope failed authentication")
                        }
                        SkipReason::KeyNotFound => {
                            warn!(record_id = %record_id, %e, "key material lost, record unrecoverable")
                        }
                        _ => warn!(record_id = %record_id, %e, "record skipped"),
                    }
                    outcome.skipped.push(SkippedRecord { record_id, reason });
                }
            }
        }

        info!(
            recovered = outcome.records.len(),
            skipped = outcome.skipped.len(),
            "batch decryption complete"
        );
        Ok(outcome)
    }

    async fn open_envelope(&self, envelope: Envelope) -> Result<PlaintextRecord> {
        let material = timeout(
            self.call_timeout,
            self.custodian.key_material(&envelope.key_id),
        )
        .await
        .map_err(|_| VaultError::KeyServiceUnavailable("key retrieval timed out".into()))??;

        let payload = AesGcmCipher::open(
            &material,
            &envelope.nonce,
            &envelope.ciphertext,
            &envelope.tag,
            None,
        )?;

        PlaintextRecord::parse(
            envelope.record_id,
            envelope.timestamp_ms,
            envelope.source_endpoint,
            envelope.destination_endpoint,
            payload,
        )
    }
}
