//! Credential protection for the stored database password.
//!
//! # Module Structure
//! - `credentials`: transient plaintext `Credential` with automatic memory zeroing
//! - `machine_key`: host-bound key material
//! - `vault`: `SecretVault` protect / reveal / upgrade
//!
//! # Security Guarantees
//! - The password is only persisted as AES-GCM ciphertext
//! - Ciphertext cannot be revealed on a host with different key material
//! - Plaintext lives in `Zeroizing` containers and is cleared on drop

mod credentials;
mod machine_key;
mod vault;

pub use credentials::Credential;
pub use machine_key::{KeySource, MachineKey};
pub use vault::{PROTECTED_PREFIX, SecretVault};
