//! Host-bound key material for the secret vault.
//!
//! The vault key must never leave the machine that produced a protected
//! credential. On hosts with a machine identity file (systemd, dbus) that
//! identity is used; elsewhere a random key file is created next to the
//! configuration on first use and readable only by its owner.

use crate::error::DbWatchError;
use crate::Result;
use aes_gcm::aead::{OsRng, rand_core::RngCore};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Size of a generated key file.
const GENERATED_KEY_SIZE: usize = 32;

/// Minimum amount of material accepted from any source.
const MIN_KEY_MATERIAL: usize = 16;

/// System files holding a stable per-host identity.
const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Where the key material came from, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    MachineId(PathBuf),
    KeyFile(PathBuf),
    Provided,
}

/// Secret bytes bound to this host.
pub struct MachineKey {
    material: Zeroizing<Vec<u8>>,
    source: KeySource,
}

impl std::fmt::Debug for MachineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineKey")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl MachineKey {
    /// Uses caller-supplied key material.
    ///
    /// # Errors
    /// Returns error if fewer than 16 bytes are supplied
    pub fn from_bytes(material: &[u8]) -> Result<Self> {
        if material.len() < MIN_KEY_MATERIAL {
            return Err(DbWatchError::encryption(format!(
                "Key material must be at least {} bytes",
                MIN_KEY_MATERIAL
            )));
        }
        Ok(Self {
            material: Zeroizing::new(material.to_vec()),
            source: KeySource::Provided,
        })
    }

    /// Finds the host identity, falling back to a generated key file.
    ///
    /// # Errors
    /// Returns error if no machine identity exists and the fallback key file
    /// can neither be read nor created
    pub fn discover(fallback_key_file: &Path) -> Result<Self> {
        for candidate in MACHINE_ID_PATHS {
            let path = Path::new(candidate);
            if let Ok(contents) = fs::read_to_string(path) {
                let identity = contents.trim();
                if identity.len() >= MIN_KEY_MATERIAL {
                    tracing::debug!(source = %path.display(), "Using machine identity for vault key");
                    return Ok(Self {
                        material: Zeroizing::new(identity.as_bytes().to_vec()),
                        source: KeySource::MachineId(path.to_path_buf()),
                    });
                }
            }
        }

        Self::load_or_create(fallback_key_file)
    }

    /// Reads a key file, creating it with fresh random bytes if absent.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or written, or is too short
    pub fn load_or_create(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => {
                let material = Zeroizing::new(bytes);
                if material.len() < MIN_KEY_MATERIAL {
                    return Err(DbWatchError::encryption(format!(
                        "Key file {} is truncated",
                        path.display()
                    )));
                }
                Ok(Self {
                    material,
                    source: KeySource::KeyFile(path.to_path_buf()),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::create(path),
            Err(e) => Err(DbWatchError::io(
                format!("Failed to read key file {}", path.display()),
                e,
            )),
        }
    }

    fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DbWatchError::io(format!("Failed to create {}", parent.display()), e)
            })?;
        }

        let mut material = Zeroizing::new(vec![0u8; GENERATED_KEY_SIZE]);
        OsRng.fill_bytes(&mut material);

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path).map_err(|e| {
            DbWatchError::io(format!("Failed to create key file {}", path.display()), e)
        })?;
        file.write_all(&material).map_err(|e| {
            DbWatchError::io(format!("Failed to write key file {}", path.display()), e)
        })?;

        tracing::info!(path = %path.display(), "Generated new vault key file");

        Ok(Self {
            material,
            source: KeySource::KeyFile(path.to_path_buf()),
        })
    }

    pub(crate) fn material(&self) -> &[u8] {
        &self.material
    }

    pub fn source(&self) -> &KeySource {
        &self.source
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_rejects_short_material() {
        assert!(MachineKey::from_bytes(b"short").is_err());
        let key = MachineKey::from_bytes(b"0123456789abcdef").unwrap();
        assert_eq!(key.source(), &KeySource::Provided);
    }

    #[test]
    fn test_key_file_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("vault.key");

        let first = MachineKey::load_or_create(&path).unwrap();
        assert_eq!(first.material().len(), GENERATED_KEY_SIZE);
        assert_eq!(first.source(), &KeySource::KeyFile(path.clone()));

        let second = MachineKey::load_or_create(&path).unwrap();
        assert_eq!(first.material(), second.material());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");
        MachineKey::load_or_create(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_truncated_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");
        fs::write(&path, b"tiny").unwrap();
        assert!(MachineKey::load_or_create(&path).is_err());
    }

    #[test]
    fn test_debug_hides_material() {
        let key = MachineKey::from_bytes(b"super-secret-material").unwrap();
        assert!(!format!("{:?}", key).contains("super-secret"));
    }
}
