//! Secret value handling
//!
//! Settings flagged secret are encrypted before they touch the persistent
//! store and decrypted on the way out. The cipher itself is a seam: hosts
//! plug in their own primitives through [`SecretCipher`]; the bundled
//! [`KeyedCipher`] keeps the crate usable stand-alone.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::common::{ConfigError, Result};

/// Opaque encrypt/decrypt pair for secret setting values
///
/// `encrypt` is infallible; `decrypt` fails on corrupted or foreign payloads.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> String;
    fn decrypt(&self, payload: &str) -> Result<String>;
}

/// Keyed stream cipher over SHA-256 blocks, base64-armored
///
/// Obfuscation-grade: it keeps secrets out of casual store dumps and logs.
/// Deployments with stronger requirements supply their own [`SecretCipher`].
pub struct KeyedCipher {
    key: Vec<u8>,
}

impl KeyedCipher {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
        }
    }

    /// First `len` bytes of the keystream for this key
    fn keystream(&self, len: usize) -> Vec<u8> {
        let mut stream = Vec::with_capacity(len);
        let mut block: u64 = 0;
        while stream.len() < len {
            let mut hasher = Sha256::new();
            hasher.update(&self.key);
            hasher.update(block.to_le_bytes());
            stream.extend_from_slice(&hasher.finalize());
            block += 1;
        }
        stream.truncate(len);
        stream
    }
}

impl SecretCipher for KeyedCipher {
    fn encrypt(&self, plaintext: &str) -> String {
        let bytes = plaintext.as_bytes();
        let stream = self.keystream(bytes.len());
        let mixed: Vec<u8> = bytes.iter().zip(stream).map(|(b, k)| b ^ k).collect();
        BASE64.encode(mixed)
    }

    fn decrypt(&self, payload: &str) -> Result<String> {
        let mixed = BASE64
            .decode(payload)
            .map_err(|e| ConfigError::Decrypt(format!("invalid payload encoding: {}", e)))?;
        let stream = self.keystream(mixed.len());
        let bytes: Vec<u8> = mixed.iter().zip(stream).map(|(b, k)| b ^ k).collect();
        String::from_utf8(bytes)
            .map_err(|_| ConfigError::Decrypt("payload is not valid UTF-8".to_string()))
    }
}
