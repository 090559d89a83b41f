//! Transient plaintext credential with automatic memory zeroing.
//!
//! A `Credential` only exists between `SecretVault::reveal` and the end of a
//! connection attempt. It is never serialized and never printed.

use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// Plaintext database password that zeroes its memory on drop.
///
/// # Example
///
/// ```rust
/// use dbwatch_core::security::Credential;
///
/// let credential = Credential::new("secret123".to_string());
/// assert_eq!(credential.expose(), "secret123");
/// assert_eq!(format!("{:?}", credential), "Credential(****)");
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credential {
    secret: Zeroizing<String>,
}

impl Credential {
    /// Wraps a plaintext secret.
    pub fn new(secret: String) -> Self {
        Self {
            secret: Zeroizing::new(secret),
        }
    }

    /// Borrows the plaintext for the duration of a connection attempt.
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Checks if the secret is empty without exposing it.
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}
