//! Decrypted record model
//!
//! A [`PlaintextRecord`] exists only in memory during a retrieval call.
//! It carries the envelope's plaintext metadata, the recovered payload
//! bytes, and a uniform field set the query engine evaluates against.
//! Ciphertext and key material never appear here, so they can never leak
//! into query output.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, VaultError};

/// A recovered record: metadata, raw payload, and the structured fields
/// parsed out of it.
#[derive(Debug, Clone, Serialize)]
pub struct PlaintextRecord {
    pub record_id: String,
    pub timestamp_ms: i64,
    pub source_endpoint: String,
    pub destination_endpoint: String,
    /// The decrypted payload bytes, exactly as originally captured
    #[serde(skip)]
    pub payload: Vec<u8>,
    /// Uniform field set: metadata fields merged with the payload's
    /// fields (payload values shadow metadata on name collision)
    pub fields: Map<String, Value>,
}

impl PlaintextRecord {
    /// Structure a decrypted payload into a record.
    ///
    /// The payload must be a JSON object (a flat field/value encoding is
    /// the upstream contract); anything else fails the record's parse
    /// step without affecting the rest of the batch.
    pub fn parse(
        record_id: String,
        timestamp_ms: i64,
        source_endpoint: String,
        destination_endpoint: String,
        payload: Vec<u8>,
    ) -> Result<Self> {
        let value: Value = serde_json::from_slice(&payload)?;
        let object = match value {
            Value::Object(map) => map,
            other => {
                return Err(VaultError::ParseFailure(format!(
                    "payload is not a JSON object (got {})",
                    json_type_name(&other)
                )))
            }
        };

        let mut fields = Map::new();
        fields.insert("record_id".to_string(), Value::String(record_id.clone()));
        fields.insert("timestamp_ms".to_string(), Value::from(timestamp_ms));
        fields.insert(
            "source_endpoint".to_string(),
            Value::String(source_endpoint.clone()),
        );
        fields.insert(
            "destination_endpoint".to_string(),
            Value::String(destination_endpoint.clone()),
        );
        for (name, value) in &object {
            fields.insert(name.clone(), value.clone());
        }

        Ok(Self {
            record_id,
            timestamp_ms,
            source_endpoint,
            destination_endpoint,
            payload,
            fields,
        })
    }

    /// Look up a field by name in the uniform field set
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
