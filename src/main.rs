use std::sync::Arc;

use serde_json::json;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use capvault::{
    EnvelopeStore, IngestService, InMemoryEnvelopeStore, InMemoryKeyspace, KeyCustodian,
    Predicate, RetrievalService, SelectionCriteria, StoreRequest,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== capvault: encrypted capture walkthrough ===\n");

    let keyspace = Arc::new(InMemoryKeyspace::new());
    let store = Arc::new(InMemoryEnvelopeStore::new());
    let custodian = Arc::new(KeyCustodian::new(keyspace));
    let ingest = IngestService::new(Arc::clone(&custodian), Arc::clone(&store));
    let retrieval = RetrievalService::new(custodian, Arc::clone(&store));

    // Ingest a handful of captured records, one fresh DEK each
    let captures = [
        ("192.168.1.101:4444", json!({"proto": "TCP", "length": 512, "flags": "SYN"})),
        ("192.168.1.102:5353", json!({"proto": "UDP", "length": 96})),
        ("10.0.0.5:22",        json!({"proto": "TCP", "length": 1400, "flags": "ACK"})),
    ];

    for (i, (source, payload)) in captures.iter().enumerate() {
        let request = StoreRequest {
            record_id: Uuid::new_v4().to_string(),
            timestamp_ms: 1_700_000_000_000 + i as i64 * 1_000,
            source_endpoint: source.to_string(),
            destination_endpoint: "203.0.113.1:443".to_string(),
            payload: serde_json::to_vec(payload).expect("demo payload serializes"),
        };
        match ingest.store_record(request).await {
            Ok(ack) => println!("[INGEST] {}", ack.message),
            Err(e) => println!("[INGEST] rejected: {}", e),
        }
    }

    // Confirm the store never saw plaintext
    let stored = store
        .query(&SelectionCriteria::default())
        .await
        .expect("in-memory query");
    println!("\n[STORE] {} envelopes at rest, ciphertext only:", stored.len());
    for envelope in &stored {
        println!(
            "[STORE]   {} ({} ciphertext bytes, key {})",
            envelope.record_id,
            envelope.ciphertext.len(),
            envelope.key_id
        );
    }

    // Retrieve a time window and decrypt in memory
    let criteria = SelectionCriteria {
        start_ms: Some(1_700_000_000_000),
        end_ms: Some(1_700_000_002_000),
        ..Default::default()
    };
    let outcome = retrieval
        .fetch_and_decrypt(&criteria)
        .await
        .expect("fetch succeeds against in-memory store");
    println!(
        "\n[RETRIEVE] recovered {} records, skipped {}",
        outcome.records.len(),
        outcome.skipped.len()
    );

    // Filter the decrypted batch: TCP traffic under 1000 bytes
    let predicate = Predicate::eq("proto", "TCP").and(Predicate::lt("length", 1000));
    let matched = capvault::evaluate(outcome.records, &predicate);

    println!("\n[QUERY] proto == \"TCP\" and length < 1000:");
    for record in &matched {
        println!(
            "[QUERY]   {} from {}: {}",
            record.record_id,
            record.source_endpoint,
            serde_json::to_string(&record.fields).expect("fields serialize")
        );
    }
}
