//! Error types for the capture vault

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur along the ingest and retrieval paths
#[derive(Error, Debug)]
pub enum VaultError {
    /// The key custodian could not be reached or timed out (transient)
    #[error("key service unavailable: {0}")]
    KeyServiceUnavailable(String),

    /// No key material exists for the requested identifier (permanent
    /// for that key id; surfaced as a data-loss event, not retried)
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Authentication failed while opening a ciphertext. Indicates
    /// bit-level corruption or deliberate tampering of the ciphertext,
    /// nonce, tag, or associated data, or a key mismatch.
    #[error("integrity violation: {0}")]
    TamperDetected(String),

    /// Sealing a payload failed inside the codec
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// Opening a ciphertext failed before authentication ran
    /// (malformed nonce/tag/key sizes)
    #[error("decryption failure: {0}")]
    DecryptionFailure(String),

    /// The envelope store rejected or failed an operation
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// A decrypted payload could not be structured into fields
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// Invalid service configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl VaultError {
    /// Whether a caller may reasonably retry the failed operation.
    /// Integrity and key-loss failures are permanent for the affected
    /// record; only service-availability failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::KeyServiceUnavailable(_) | VaultError::PersistenceFailure(_)
        )
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::ParseFailure(err.to_string())
    }
}
