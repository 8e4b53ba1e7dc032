//! Secret codec: reversible encryption for credentials an operator must be
//! able to redisplay, one-way digests for compare-only tokens, and
//! generation of operator-issued credential material.

use aes_gcm::{
    aead::{rand_core::RngCore as AeadRngCore, Aead, AeadCore, KeyInit, OsRng as AeadOsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, seq::SliceRandom, Rng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use service_core::error::AppError;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const GENERATED_PASSWORD_LEN: usize = 12;
const PIN_LEN: usize = 6;

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnpqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*";

/// A freshly generated one-time token: the plaintext goes out of band to the
/// principal, only the digest is stored.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Encrypts, decrypts and hashes credential material.
///
/// Passwords and transaction PINs are reversibly encrypted (AES-256-GCM) so
/// an authorized operator higher in the hierarchy can view and reissue them;
/// reset/verification tokens and denylist keys are SHA-256 digests because
/// they are only ever compared for equality.
#[derive(Clone)]
pub struct SecretCodec {
    master_key: [u8; KEY_SIZE],
}

impl SecretCodec {
    /// Build from a hex-encoded 256-bit master key.
    pub fn from_hex(hex_key: &str) -> Result<Self, AppError> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid master key hex: {}", e)))?;
        if bytes.len() != KEY_SIZE {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid master key size: expected {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut master_key = [0u8; KEY_SIZE];
        master_key.copy_from_slice(&bytes);
        Ok(Self { master_key })
    }

    /// Generate a random master key (hex), for provisioning tooling.
    pub fn generate_master_key_hex() -> String {
        let mut key = [0u8; KEY_SIZE];
        AeadOsRng.fill_bytes(&mut key);
        hex::encode(key)
    }

    /// Encrypt to base64(nonce || ciphertext).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let key = Key::<Aes256Gcm>::from_slice(&self.master_key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Encryption failed: {}", e)))?;

        let mut payload = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, encoded: &str) -> Result<String, AppError> {
        let payload = BASE64
            .decode(encoded)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Malformed ciphertext: {}", e)))?;
        if payload.len() <= NONCE_SIZE {
            return Err(AppError::InternalError(anyhow::anyhow!(
                "Malformed ciphertext: too short"
            )));
        }

        let key = Key::<Aes256Gcm>::from_slice(&self.master_key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(&payload[..NONCE_SIZE]);

        let plaintext = cipher
            .decrypt(nonce, &payload[NONCE_SIZE..])
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid plaintext: {}", e)))
    }

    /// Constant-time comparison of a presented secret against its stored
    /// ciphertext. Decryption failure is an internal fault, not a mismatch.
    pub fn verify_secret(&self, presented: &str, stored_enc: &str) -> Result<bool, AppError> {
        let stored = self.decrypt(stored_enc)?;
        Ok(stored.as_bytes().ct_eq(presented.as_bytes()).into())
    }

    /// One-way digest for compare-only tokens.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Constant-time digest comparison.
    pub fn verify_token(token: &str, stored_hash: &str) -> bool {
        Self::hash_token(token)
            .as_bytes()
            .ct_eq(stored_hash.as_bytes())
            .into()
    }

    /// New one-time token for reset/verification links.
    pub fn generate_secure_token(ttl: Duration) -> IssuedToken {
        let mut bytes = [0u8; 32];
        OsRng.fill(&mut bytes);
        let token = hex::encode(bytes);
        let token_hash = Self::hash_token(&token);
        IssuedToken {
            token,
            token_hash,
            expires_at: Utc::now() + ttl,
        }
    }

    /// Operator-issued password with at least one character from each
    /// required class, drawn from OsRng.
    pub fn generate_strong_password() -> String {
        let mut chars: Vec<u8> = vec![
            UPPER[OsRng.gen_range(0..UPPER.len())],
            LOWER[OsRng.gen_range(0..LOWER.len())],
            DIGITS[OsRng.gen_range(0..DIGITS.len())],
            SYMBOLS[OsRng.gen_range(0..SYMBOLS.len())],
        ];
        let all: Vec<u8> = [UPPER, LOWER, DIGITS, SYMBOLS].concat();
        while chars.len() < GENERATED_PASSWORD_LEN {
            chars.push(all[OsRng.gen_range(0..all.len())]);
        }
        chars.shuffle(&mut OsRng);
        String::from_utf8(chars).expect("generated password is always ASCII")
    }

    /// Operator-issued transaction PIN.
    pub fn generate_pin() -> String {
        (0..PIN_LEN)
            .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
            .collect()
    }

    /// Spend work comparable to a secret verification. Called on the
    /// unknown-identifier path so it is not cheaper than the wrong-password
    /// path.
    pub fn burn(&self, presented: &str) {
        let _ = Self::hash_token(presented);
    }
}
