//! Service configuration persisted as JSON next to the executable.
//!
//! The stored password is only ever vault ciphertext. A file still holding a
//! legacy plaintext password is rewritten in protected form the first time
//! it is loaded.

use crate::connection::ConnectionDescriptor;
use crate::error::DbWatchError;
use crate::models::BackendKind;
use crate::security::SecretVault;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "dbwatch.json";

/// Default vault key file name, used where the host has no machine identity.
pub const KEY_FILE_NAME: &str = "dbwatch.key";

/// HTTP method used for the webhook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    #[default]
    Post,
    Put,
}

impl fmt::Display for WebhookMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => f.write_str("POST"),
            Self::Put => f.write_str("PUT"),
        }
    }
}

impl std::str::FromStr for WebhookMethod {
    type Err = DbWatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            other => Err(DbWatchError::configuration(format!(
                "Unsupported webhook method {} (expected POST or PUT)",
                other
            ))),
        }
    }
}

/// Structured database settings as written in the file.
///
/// `backend` stays a string here so an unknown token surfaces as
/// `UnsupportedBackend` instead of a JSON error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub backend: String,
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_params: BTreeMap<String, String>,
}

impl From<&ConnectionDescriptor> for DatabaseSection {
    fn from(descriptor: &ConnectionDescriptor) -> Self {
        Self {
            backend: descriptor.backend().token().to_string(),
            server: descriptor.server().to_string(),
            port: descriptor.port(),
            user: descriptor.user().to_string(),
            database: descriptor.database().to_string(),
            extra_params: descriptor.extra_params().clone(),
        }
    }
}

impl DatabaseSection {
    /// Builds the validated descriptor.
    ///
    /// # Errors
    /// Returns `UnsupportedBackend` for an unknown backend token, or a
    /// configuration error for missing fields
    pub fn to_descriptor(&self) -> Result<ConnectionDescriptor> {
        let backend: BackendKind = self.backend.parse()?;
        let mut descriptor =
            ConnectionDescriptor::new(backend, &self.server, &self.user, &self.database)?;
        if let Some(port) = self.port {
            descriptor = descriptor.with_port(port);
        }
        for (key, value) in &self.extra_params {
            descriptor = descriptor.with_extra_param(key, value);
        }
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Contents of `dbwatch.json`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSection>,
    /// Legacy `fb://` / `oracle://` form written by older installations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_url: Option<String>,
    pub webhook_url: String,
    #[serde(default)]
    pub webhook_method: WebhookMethod,
    pub encrypted_password: String,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("database", &self.database)
            .field(
                "connection_url",
                &self
                    .connection_url
                    .as_deref()
                    .map(crate::error::redact_database_url),
            )
            .field("webhook_url", &self.webhook_url)
            .field("webhook_method", &self.webhook_method)
            .field("encrypted_password", &"****")
            .finish()
    }
}

impl ServiceConfig {
    /// New configuration holding an already protected password.
    pub fn new(
        descriptor: &ConnectionDescriptor,
        webhook_url: impl Into<String>,
        encrypted_password: impl Into<String>,
    ) -> Self {
        Self {
            database: Some(DatabaseSection::from(descriptor)),
            connection_url: None,
            webhook_url: webhook_url.into(),
            webhook_method: WebhookMethod::default(),
            encrypted_password: encrypted_password.into(),
        }
    }

    /// The connection descriptor, preferring the structured section.
    ///
    /// # Errors
    /// Returns error if neither form is present or the present one is invalid
    pub fn descriptor(&self) -> Result<ConnectionDescriptor> {
        match (&self.database, &self.connection_url) {
            (Some(section), _) => section.to_descriptor(),
            (None, Some(url)) => ConnectionDescriptor::from_url(url),
            (None, None) => Err(DbWatchError::configuration(
                "configuration has neither a database section nor a connection_url",
            )),
        }
    }

    /// Checks the webhook URL and database settings.
    ///
    /// # Errors
    /// Returns error if the webhook URL is not http(s) or the database
    /// settings do not produce a descriptor
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.webhook_url).map_err(|e| {
            DbWatchError::configuration(format!("Invalid webhook URL: {}", e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DbWatchError::configuration(format!(
                "Webhook URL must use http or https, got {}",
                url.scheme()
            )));
        }
        self.descriptor().map(|_| ())
    }
}

/// Configuration loaded, validated and migrated.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ServiceConfig,
    pub descriptor: ConnectionDescriptor,
    /// True if the stored password was rewritten in protected form
    pub migrated: bool,
}

/// Reads and writes the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `dbwatch.json` next to the running executable, or in the
    /// working directory when the executable path is unknown.
    pub fn beside_executable() -> Self {
        Self::new(executable_dir().join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key file location used by the vault on hosts without a machine id.
    pub fn key_file_path(&self) -> PathBuf {
        self.path
            .parent()
            .map_or_else(|| PathBuf::from(KEY_FILE_NAME), |dir| dir.join(KEY_FILE_NAME))
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Reads the file as is.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid JSON
    pub async fn load(&self) -> Result<ServiceConfig> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DbWatchError::io(format!("Failed to read {}", self.path.display()), e)
        })?;
        serde_json::from_str(&raw).map_err(|e| DbWatchError::Serialization {
            context: format!("Invalid configuration file {}", self.path.display()),
            source: e,
        })
    }

    /// Writes the file atomically: temp file in the same directory, then rename.
    ///
    /// # Errors
    /// Returns error if serialization or any filesystem step fails
    pub async fn save(&self, config: &ServiceConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config).map_err(|e| {
            DbWatchError::Serialization {
                context: "Failed to serialize configuration".to_string(),
                source: e,
            }
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DbWatchError::io(format!("Failed to create {}", parent.display()), e)
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await.map_err(|e| {
            DbWatchError::io(format!("Failed to write {}", temp_path.display()), e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| {
                    DbWatchError::io(format!("Failed to restrict {}", temp_path.display()), e)
                })?;
        }

        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            DbWatchError::io(format!("Failed to replace {}", self.path.display()), e)
        })?;

        tracing::debug!(path = %self.path.display(), "Configuration saved");
        Ok(())
    }

    /// Loads, protects a legacy plaintext password, then validates.
    ///
    /// Running it again on a migrated file changes nothing.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, is invalid, or the migrated
    /// form cannot be written back
    pub async fn load_and_migrate(&self, vault: &SecretVault) -> Result<LoadedConfig> {
        let mut config = self.load().await?;

        // A plaintext password is protected on disk even if the rest of the
        // file turns out to be invalid.
        let migrated = match vault.upgrade(&config.encrypted_password)? {
            Some(protected) => {
                config.encrypted_password = protected;
                self.save(&config).await?;
                tracing::info!(
                    path = %self.path.display(),
                    "Stored password was plaintext and has been protected"
                );
                true
            }
            None => false,
        };

        config.validate()?;
        let descriptor = config.descriptor()?;

        tracing::info!(
            target_db = %descriptor,
            webhook_method = %config.webhook_method,
            "Configuration loaded"
        );

        Ok(LoadedConfig {
            config,
            descriptor,
            migrated,
        })
    }
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn firebird_json() -> &'static str {
        r#"{
            "database": {
                "backend": "fb",
                "server": "192.168.1.5:3051",
                "user": "apw_user",
                "database": "D:/KSBAZA/WAPTEKA.FDB"
            },
            "webhook_url": "https://hooks.example.com/dbwatch",
            "encrypted_password": "$AQxyz"
        }"#
    }

    #[test]
    fn test_structured_section_parses() {
        let config: ServiceConfig = serde_json::from_str(firebird_json()).unwrap();
        assert_eq!(config.webhook_method, WebhookMethod::Post);

        let descriptor = config.descriptor().unwrap();
        assert_eq!(descriptor.backend(), BackendKind::Firebird);
        assert_eq!(descriptor.server(), "192.168.1.5:3051");
        config.validate().unwrap();
    }

    #[test]
    fn test_legacy_url_form() {
        let config: ServiceConfig = serde_json::from_str(
            r#"{
                "connection_url": "fb://apw_user:{{PASSWORD}}@10.0.0.2:3050/C:/DB/A.FDB",
                "webhook_url": "http://hooks.example.com",
                "webhook_method": "PUT",
                "encrypted_password": "plain"
            }"#,
        )
        .unwrap();

        assert_eq!(config.webhook_method, WebhookMethod::Put);
        let descriptor = config.descriptor().unwrap();
        assert_eq!(descriptor.server(), "10.0.0.2");
        assert_eq!(descriptor.port(), Some(3050));
    }

    #[test]
    fn test_unknown_backend_token() {
        let section = DatabaseSection {
            backend: "MSSQL".into(),
            server: "host".into(),
            port: None,
            user: "sa".into(),
            database: "db".into(),
            extra_params: BTreeMap::new(),
        };
        assert!(matches!(
            section.to_descriptor().unwrap_err(),
            DbWatchError::UnsupportedBackend { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_bad_webhook() {
        let mut config: ServiceConfig = serde_json::from_str(firebird_json()).unwrap();
        config.webhook_url = "ftp://example.com".into();
        assert!(config.validate().is_err());
        config.webhook_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_database_settings() {
        let config = ServiceConfig {
            database: None,
            connection_url: None,
            webhook_url: "https://example.com".into(),
            webhook_method: WebhookMethod::Post,
            encrypted_password: String::new(),
        };
        assert!(config.descriptor().is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let mut config: ServiceConfig = serde_json::from_str(firebird_json()).unwrap();
        config.encrypted_password = "legacy-plaintext".into();
        assert!(!format!("{:?}", config).contains("legacy-plaintext"));
    }

    #[test]
    fn test_section_roundtrip_through_descriptor() {
        let descriptor =
            ConnectionDescriptor::new(BackendKind::Oracle, "dbhost", "apw_user", "/ORCL")
                .unwrap()
                .with_port(1521);
        let config = ServiceConfig::new(&descriptor, "https://example.com", "$AQ...");
        assert_eq!(config.descriptor().unwrap(), descriptor);
        assert_eq!(config.database.as_ref().unwrap().backend, "ORACLE");
    }

    #[test]
    fn test_key_file_beside_config() {
        let store = ConfigStore::new("/opt/dbwatch/dbwatch.json");
        assert_eq!(store.key_file_path(), PathBuf::from("/opt/dbwatch/dbwatch.key"));
    }

    #[test]
    fn test_webhook_method_tokens() {
        assert_eq!("put".parse::<WebhookMethod>().unwrap(), WebhookMethod::Put);
        assert_eq!(" POST ".parse::<WebhookMethod>().unwrap(), WebhookMethod::Post);
        assert!("PATCH".parse::<WebhookMethod>().is_err());
    }
}
