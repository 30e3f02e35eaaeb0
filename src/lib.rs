//! capvault: envelope encryption for captured network records
//!
//! Each ingested record is sealed under its own AES-256-GCM data
//! encryption key before anything touches durable storage; the retrieval
//! path recovers plaintext in memory only, tolerating per-record key loss
//! and tampering, and hands the results to a restricted predicate filter.

pub mod config;
pub mod crypto;
pub mod custodian;
pub mod error;
pub mod ingest;
pub mod postgres;
pub mod query;
pub mod record;
pub mod retrieval;
pub mod store;

pub use config::ServiceConfig;
pub use crypto::{AesGcmCipher, Sealed, SecureKey, AES_256_KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use custodian::{InMemoryKeyspace, IssuedKey, KeyCustodian, KeyRecord, KeyResponse, Keyspace};
pub use error::{Result, VaultError};
pub use ingest::{IngestService, StoreAck, StoreRequest};
pub use postgres::{ensure_schema, PostgresEnvelopeStore, PostgresKeyspace};
pub use query::{evaluate, CompareOp, Predicate};
pub use record::PlaintextRecord;
pub use retrieval::{FetchOutcome, RetrievalService, SkipReason, SkippedRecord};
pub use store::{Envelope, EnvelopeStore, InMemoryEnvelopeStore, SelectionCriteria};
