//! `crypto` / `crypto.subtle` (spec.md §4.3). Keys never leave the host; a
//! guest-side `CryptoKey` wraps an opaque host-assigned integer id into
//! this module's registry.

use isolate_core::ClassRegistry;
use isolate_protocol::value::ClassTag;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error_bridge::{quota_exceeded_error, type_error, BridgeError};

/// Per-call cap on `getRandomValues` (spec.md §4.3).
pub const MAX_RANDOM_VALUES_BYTES: usize = 65536;

#[must_use]
pub fn random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Fills `buffer` with cryptographically random bytes. Rejects a request
/// over the 65536-byte cap with `QuotaExceededError`.
pub fn get_random_values(buffer: &mut [u8]) -> Result<(), BridgeError> {
    if buffer.len() > MAX_RANDOM_VALUES_BYTES {
        return Err(quota_exceeded_error(format!(
            "getRandomValues: {} bytes exceeds the {MAX_RANDOM_VALUES_BYTES}-byte limit",
            buffer.len()
        )));
    }
    rand::thread_rng().fill_bytes(buffer);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
}

#[must_use]
pub fn digest(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
    }
}

/// Host-side state for an imported key. Only raw HMAC-SHA256 keys are
/// modelled; that is the one `sign`/`verify` algorithm this bridge exposes.
#[derive(Debug, Clone)]
pub struct CryptoKeyState {
    pub raw: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct SubtleCrypto {
    keys: ClassRegistry<CryptoKeyState>,
}

impl SubtleCrypto {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `crypto.subtle.importKey("raw", keyData, "HMAC", ...)`.
    pub fn import_raw_key(&mut self, key_data: Vec<u8>) -> u64 {
        self.keys.insert(ClassTag::CryptoKey, CryptoKeyState { raw: key_data })
    }

    /// `crypto.subtle.sign("HMAC", key, data)`, HMAC-SHA256.
    pub fn sign(&self, key_instance_id: u64, data: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let key = self.key(key_instance_id)?;
        Ok(hmac_sha256(&key.raw, data))
    }

    /// `crypto.subtle.verify("HMAC", key, signature, data)`.
    pub fn verify(&self, key_instance_id: u64, signature: &[u8], data: &[u8]) -> Result<bool, BridgeError> {
        let key = self.key(key_instance_id)?;
        let expected = hmac_sha256(&key.raw, data);
        Ok(constant_time_eq(&expected, signature))
    }

    fn key(&self, instance_id: u64) -> Result<&CryptoKeyState, BridgeError> {
        Ok(&self
            .keys
            .get(instance_id)
            .ok_or_else(|| type_error("unknown CryptoKey"))?
            .state)
    }
}

const HMAC_BLOCK_SIZE: usize = 64;

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut block_key = [0u8; HMAC_BLOCK_SIZE];
    if key.len() > HMAC_BLOCK_SIZE {
        let hashed = Sha256::digest(key);
        block_key[..hashed.len()].copy_from_slice(&hashed);
    } else {
        block_key[..key.len()].copy_from_slice(key);
    }

    let mut inner_pad = [0x36u8; HMAC_BLOCK_SIZE];
    let mut outer_pad = [0x5cu8; HMAC_BLOCK_SIZE];
    for i in 0..HMAC_BLOCK_SIZE {
        inner_pad[i] ^= block_key[i];
        outer_pad[i] ^= block_key[i];
    }

    let mut inner_hasher = Sha256::new();
    inner_hasher.update(inner_pad);
    inner_hasher.update(message);
    let inner_digest = inner_hasher.finalize();

    let mut outer_hasher = Sha256::new();
    outer_hasher.update(outer_pad);
    outer_hasher.update(inner_digest);
    outer_hasher.finalize().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
