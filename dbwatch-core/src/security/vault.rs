//! Machine-scoped protection for the stored database password.
//!
//! Protected values are AES-GCM-256 ciphertext under a key derived with
//! Argon2id from host-bound material, rendered as
//! `"$AQ" + base64(nonce || ciphertext || tag)`. Values without the tag are
//! legacy plaintext: `reveal` passes them through and `upgrade` re-protects
//! them so the caller can rewrite the stored form.
//!
//! # Cryptographic Standards
//! - AES-GCM: NIST SP 800-38D, 96-bit random nonce per encryption
//! - Argon2id: RFC 9106, 64 MiB / 3 iterations / 4 lanes

use super::credentials::Credential;
use super::machine_key::MachineKey;
use crate::error::DbWatchError;
use crate::Result;
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use argon2::{Argon2, Params, Version};
use base64::{Engine, engine::general_purpose::STANDARD};
use zeroize::Zeroizing;

/// Prefix marking a value as vault ciphertext.
pub const PROTECTED_PREFIX: &str = "$AQ";

/// AES-GCM nonce size: 96 bits (NIST SP 800-38D §8.2.1)
const AES_GCM_NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size: 128 bits
const AES_GCM_TAG_SIZE: usize = 16;

/// Shortest well-formed payload: nonce plus tag around an empty plaintext
const MIN_PAYLOAD_SIZE: usize = AES_GCM_NONCE_SIZE + AES_GCM_TAG_SIZE;

/// AES key size: 256 bits
const AES_KEY_SIZE: usize = 32;

/// Argon2id memory cost in KiB (64 MiB)
const ARGON2_MEMORY_COST: u32 = 65536;

/// Argon2id time cost
const ARGON2_TIME_COST: u32 = 3;

/// Argon2id parallelism
const ARGON2_PARALLELISM: u32 = 4;

/// Domain-separation salt; the secret input is the machine key itself.
const VAULT_SALT: &[u8; 16] = b"dbwatch.vault.v1";

/// Protects and reveals a single credential string.
///
/// The derived key lives in zeroizing memory for the lifetime of the vault.
/// Deriving it costs one Argon2id run, so build the vault once per process.
pub struct SecretVault {
    key: Zeroizing<[u8; AES_KEY_SIZE]>,
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVault").finish_non_exhaustive()
    }
}

/// Derives the AES-256 key from host material using Argon2id.
fn derive_key(machine_key: &MachineKey) -> Result<Zeroizing<[u8; AES_KEY_SIZE]>> {
    let params = Params::new(
        ARGON2_MEMORY_COST,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        Some(AES_KEY_SIZE),
    )
    .map_err(|e| DbWatchError::encryption(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; AES_KEY_SIZE]);
    argon2
        .hash_password_into(machine_key.material(), VAULT_SALT, key.as_mut_slice())
        .map_err(|e| DbWatchError::encryption(format!("Key derivation failed: {}", e)))?;

    Ok(key)
}

impl SecretVault {
    /// Builds a vault bound to the given host key.
    ///
    /// # Errors
    /// Returns error if key derivation fails
    pub fn new(machine_key: &MachineKey) -> Result<Self> {
        Ok(Self {
            key: derive_key(machine_key)?,
        })
    }

    /// True when `value` carries the ciphertext tag.
    pub fn is_protected(value: &str) -> bool {
        value.starts_with(PROTECTED_PREFIX)
    }

    /// Encrypts a plaintext secret into its tagged, storable form.
    ///
    /// # Errors
    /// Returns error if the cipher fails
    ///
    /// # Example
    /// ```rust
    /// use dbwatch_core::security::{MachineKey, SecretVault};
    ///
    /// let vault = SecretVault::new(&MachineKey::from_bytes(b"0123456789abcdef")?)?;
    /// let stored = vault.protect("secret123")?;
    /// assert!(stored.starts_with("$AQ"));
    /// assert_eq!(vault.reveal(&stored)?.expose(), "secret123");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn protect(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&*self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| DbWatchError::encryption(format!("Encryption failed: {}", e)))?;

        let mut payload = Vec::with_capacity(AES_GCM_NONCE_SIZE.saturating_add(ciphertext.len()));
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", PROTECTED_PREFIX, STANDARD.encode(payload)))
    }

    /// Returns the plaintext behind a stored credential.
    ///
    /// Untagged input is legacy plaintext and comes back unchanged.
    ///
    /// # Errors
    /// Returns `DbWatchError::Decryption` if tagged input is malformed or was
    /// protected under a different machine key
    pub fn reveal(&self, stored: &str) -> Result<Credential> {
        let Some(encoded) = stored.strip_prefix(PROTECTED_PREFIX) else {
            return Ok(Credential::new(stored.to_string()));
        };

        let payload = STANDARD
            .decode(encoded.trim())
            .map_err(|_| DbWatchError::decryption("protected value is not valid base64"))?;

        if payload.len() < MIN_PAYLOAD_SIZE {
            return Err(DbWatchError::decryption(format!(
                "protected value too short (minimum {} bytes)",
                MIN_PAYLOAD_SIZE
            )));
        }

        let (nonce, ciphertext) = payload.split_at(AES_GCM_NONCE_SIZE);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&*self.key));

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| {
                    DbWatchError::decryption(
                        "authentication failed (protected on another machine or corrupted)",
                    )
                })?,
        );

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| DbWatchError::decryption("decrypted value is not UTF-8"))?;

        Ok(Credential::new(text.to_string()))
    }

    /// Re-protects a legacy plaintext value.
    ///
    /// Returns `None` when the value is already protected, so running the
    /// migration twice changes nothing.
    ///
    /// # Errors
    /// Returns error if encryption fails
    pub fn upgrade(&self, stored: &str) -> Result<Option<String>> {
        if Self::is_protected(stored) {
            return Ok(None);
        }
        self.protect(stored).map(Some)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn vault() -> &'static SecretVault {
        static VAULT: OnceLock<SecretVault> = OnceLock::new();
        VAULT.get_or_init(|| {
            SecretVault::new(&MachineKey::from_bytes(b"unit-test-machine-key").unwrap()).unwrap()
        })
    }

    #[test]
    fn test_protect_reveal_roundtrip() {
        let stored = vault().protect("secret123").unwrap();
        assert!(stored.starts_with(PROTECTED_PREFIX));
        assert!(!stored.contains("secret123"));
        assert_eq!(vault().reveal(&stored).unwrap().expose(), "secret123");
    }

    #[test]
    fn test_nonce_uniqueness() {
        let first = vault().protect("same").unwrap();
        let second = vault().protect("same").unwrap();
        assert_ne!(first, second);
        assert_eq!(vault().reveal(&first).unwrap().expose(), "same");
        assert_eq!(vault().reveal(&second).unwrap().expose(), "same");
    }

    #[test]
    fn test_untagged_value_passes_through() {
        let revealed = vault().reveal("legacy-plaintext").unwrap();
        assert_eq!(revealed.expose(), "legacy-plaintext");
    }

    #[test]
    fn test_empty_secret_roundtrip() {
        let stored = vault().protect("").unwrap();
        assert!(vault().reveal(&stored).unwrap().is_empty());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let stored = vault().protect("secret").unwrap();
        let mut payload = STANDARD.decode(&stored[PROTECTED_PREFIX.len()..]).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 1;
        let tampered = format!("{}{}", PROTECTED_PREFIX, STANDARD.encode(payload));

        let error = vault().reveal(&tampered).unwrap_err();
        assert!(matches!(error, DbWatchError::Decryption { .. }));
    }

    #[test]
    fn test_malformed_payloads_fail() {
        assert!(matches!(
            vault().reveal("$AQ***not base64***").unwrap_err(),
            DbWatchError::Decryption { .. }
        ));
        assert!(matches!(
            vault().reveal("$AQAAAA").unwrap_err(),
            DbWatchError::Decryption { .. }
        ));
    }

    #[test]
    fn test_upgrade_is_idempotent() {
        let upgraded = vault().upgrade("plain").unwrap().unwrap();
        assert!(SecretVault::is_protected(&upgraded));
        assert!(vault().upgrade(&upgraded).unwrap().is_none());
        assert_eq!(vault().reveal(&upgraded).unwrap().expose(), "plain");
    }

    #[test]
    fn test_unicode_secret_roundtrip() {
        let stored = vault().protect("hasło-żółć").unwrap();
        assert_eq!(vault().reveal(&stored).unwrap().expose(), "hasło-żółć");
    }
}
