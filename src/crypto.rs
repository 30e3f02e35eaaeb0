//! Authenticated encryption codec
//!
//! This module provides the AES-256-GCM seal/open primitives used by the
//! ingest and retrieval paths. Both operations are stateless and safely
//! callable in parallel; a key never leaves this module except wrapped in
//! [`SecureKey`].

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

/// AES-256 key size in bytes (256 bits)
pub const AES_256_KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// A secure key wrapper that zeroizes memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureKey {
    bytes: Vec<u8>,
}

impl SecureKey {
    /// Create a new SecureKey from raw bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Generate a new random AES-256 key
    pub fn generate() -> Self {
        let mut key = vec![0u8; AES_256_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { bytes: key }
    }

    /// Get the key bytes (use with caution)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the key length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureKey([REDACTED])")
    }
}

/// Output of a seal operation: nonce, ciphertext, and authentication tag
/// kept as three separate fields.
///
/// The tag is split off the AEAD output rather than left appended to the
/// ciphertext, so the persisted ciphertext length always equals the
/// plaintext length and each component can be stored in its own column.
#[derive(Debug, Clone)]
pub struct Sealed {
    /// The nonce used for encryption (12 bytes)
    pub nonce: Vec<u8>,
    /// The ciphertext, same length as the plaintext
    pub ciphertext: Vec<u8>,
    /// The authentication tag (16 bytes)
    pub tag: Vec<u8>,
}

/// AES-256-GCM seal/open wrapper
pub struct AesGcmCipher;

impl AesGcmCipher {
    /// Seal a plaintext under the given key.
    ///
    /// A fresh random 96-bit nonce is sourced from the OS for every call;
    /// callers never supply or reuse nonces themselves. Nonce-reuse
    /// exposure is further bounded by the one-key-per-record policy of the
    /// ingest path.
    ///
    /// # Arguments
    /// * `key` - The 256-bit encryption key
    /// * `plaintext` - The data to seal
    /// * `aad` - Additional authenticated data (optional context)
    pub fn seal(key: &SecureKey, plaintext: &[u8], aad: Option<&[u8]>) -> Result<Sealed> {
        if key.len() != AES_256_KEY_SIZE {
            return Err(VaultError::EncryptionFailure(format!(
                "invalid key size: expected {}, got {}",
                AES_256_KEY_SIZE,
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| VaultError::EncryptionFailure(format!("cipher init error: {}", e)))?;

        // Generate random nonce
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut combined = match aad {
            Some(aad_data) => cipher
                .encrypt(nonce, Payload { msg: plaintext, aad: aad_data })
                .map_err(|e| VaultError::EncryptionFailure(format!("encryption error: {}", e)))?,
            None => cipher
                .encrypt(nonce, plaintext)
                .map_err(|e| VaultError::EncryptionFailure(format!("encryption error: {}", e)))?,
        };

        if combined.len() < TAG_SIZE {
            return Err(VaultError::EncryptionFailure(
                "cipher output shorter than tag".into(),
            ));
        }

        // The AEAD appends the 16-byte tag to the ciphertext; store it separately
        let tag = combined.split_off(combined.len() - TAG_SIZE);

        Ok(Sealed {
            nonce: nonce_bytes.to_vec(),
            ciphertext: combined,
            tag,
        })
    }

    /// Open a sealed ciphertext under the given key.
    ///
    /// Any authentication failure yields [`VaultError::TamperDetected`]:
    /// a flipped bit anywhere in the ciphertext, nonce, tag, or associated
    /// data, or a key other than the one used to seal. Garbage plaintext
    /// is never produced.
    pub fn open(
        key: &SecureKey,
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        if key.len() != AES_256_KEY_SIZE {
            return Err(VaultError::DecryptionFailure(format!(
                "invalid key size: expected {}, got {}",
                AES_256_KEY_SIZE,
                key.len()
            )));
        }
        if nonce.len() != NONCE_SIZE {
            return Err(VaultError::DecryptionFailure(format!(
                "invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce.len()
            )));
        }
        if tag.len() != TAG_SIZE {
            return Err(VaultError::DecryptionFailure(format!(
                "invalid tag size: expected {}, got {}",
                TAG_SIZE,
                tag.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| VaultError::DecryptionFailure(format!("cipher init error: {}", e)))?;

        // The AEAD verifies over ciphertext||tag
        let mut combined = Vec::with_capacity(ciphertext.len() + tag.len());
        combined.extend_from_slice(ciphertext);
        combined.extend_from_slice(tag);

        let nonce = Nonce::from_slice(nonce);

        let plaintext = match aad {
            Some(aad_data) => cipher
                .decrypt(nonce, Payload { msg: &combined, aad: aad_data })
                .map_err(|_| VaultError::TamperDetected("authentication tag mismatch".into()))?,
            None => cipher
                .decrypt(nonce, combined.as_slice())
                .map_err(|_| VaultError::TamperDetected("authentication tag mismatch".into()))?,
        };

        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = SecureKey::generate();
        let plaintext = b"captured packet payload";

        let sealed = AesGcmCipher::seal(&key, plaintext, None).unwrap();
        let opened =
            AesGcmCipher::open(&key, &sealed.nonce, &sealed.ciphertext, &sealed.tag, None).unwrap();

        assert_eq!(plaintext.to_vec(), opened);
    }

    #[test]
    fn test_ciphertext_length_equals_plaintext_length() {
        let key = SecureKey::generate();
        let plaintext = b"0123456789abcdef0123456789";

        let sealed = AesGcmCipher::seal(&key, plaintext, None).unwrap();

        assert_eq!(sealed.ciphertext.len(), plaintext.len());
        assert_eq!(sealed.nonce.len(), NONCE_SIZE);
        assert_eq!(sealed.tag.len(), TAG_SIZE);
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let key = SecureKey::generate();
        let sealed = AesGcmCipher::seal(&key, b"payload under test", None).unwrap();

        let mut corrupted = sealed.ciphertext.clone();
        corrupted[0] ^= 0x01;
        let result = AesGcmCipher::open(&key, &sealed.nonce, &corrupted, &sealed.tag, None);

        assert!(matches!(result, Err(VaultError::TamperDetected(_))));
    }

    #[test]
    fn test_tampered_nonce_detected() {
        let key = SecureKey::generate();
        let sealed = AesGcmCipher::seal(&key, b"payload under test", None).unwrap();

        let mut corrupted = sealed.nonce.clone();
        corrupted[3] ^= 0x80;
        let result = AesGcmCipher::open(&key, &corrupted, &sealed.ciphertext, &sealed.tag, None);

        assert!(matches!(result, Err(VaultError::TamperDetected(_))));
    }

    #[test]
    fn test_tampered_tag_detected() {
        let key = SecureKey::generate();
        let sealed = AesGcmCipher::seal(&key, b"payload under test", None).unwrap();

        let mut corrupted = sealed.tag.clone();
        corrupted[15] ^= 0x01;
        let result = AesGcmCipher::open(&key, &sealed.nonce, &sealed.ciphertext, &corrupted, None);

        assert!(matches!(result, Err(VaultError::TamperDetected(_))));
    }

    #[test]
    fn test_wrong_key_detected() {
        let key = SecureKey::generate();
        let other = SecureKey::generate();
        let sealed = AesGcmCipher::seal(&key, b"payload under test", None).unwrap();

        let result =
            AesGcmCipher::open(&other, &sealed.nonce, &sealed.ciphertext, &sealed.tag, None);

        assert!(matches!(result, Err(VaultError::TamperDetected(_))));
    }

    #[test]
    fn test_aad_mismatch_detected() {
        let key = SecureKey::generate();
        let sealed = AesGcmCipher::seal(&key, b"payload", Some(b"record r1")).unwrap();

        let opened = AesGcmCipher::open(
            &key,
            &sealed.nonce,
            &sealed.ciphertext,
            &sealed.tag,
            Some(b"record r1"),
        )
        .unwrap();
        assert_eq!(opened, b"payload");

        let result = AesGcmCipher::open(
            &key,
            &sealed.nonce,
            &sealed.ciphertext,
            &sealed.tag,
            Some(b"record r2"),
        );
        assert!(matches!(result, Err(VaultError::TamperDetected(_))));
    }

    #[test]
    fn test_invalid_nonce_size_rejected() {
        let key = SecureKey::generate();
        let sealed = AesGcmCipher::seal(&key, b"payload", None).unwrap();

        let result = AesGcmCipher::open(&key, &[0u8; 8], &sealed.ciphertext, &sealed.tag, None);

        assert!(matches!(result, Err(VaultError::DecryptionFailure(_))));
    }

    #[test]
    fn test_nonce_uniqueness_across_many_seals() {
        let key = SecureKey::generate();
        let mut seen = HashSet::new();

        for _ in 0..10_000 {
            let sealed = AesGcmCipher::seal(&key, b"x", None).unwrap();
            assert!(seen.insert(sealed.nonce), "nonce reused under the same key");
        }
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_payload(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let key = SecureKey::generate();
            let sealed = AesGcmCipher::seal(&key, &payload, None).unwrap();
            let opened =
                AesGcmCipher::open(&key, &sealed.nonce, &sealed.ciphertext, &sealed.tag, None)
                    .unwrap();
            prop_assert_eq!(opened, payload);
        }
    }
}
