//! Renders a descriptor and a plaintext credential into vendor syntax.
//!
//! Pure functions: no I/O and no logging. The result holds the password, so
//! callers log it only through [`ConnectionString::redacted`].

use super::descriptor::ConnectionDescriptor;
use super::string::ConnectionString;
use crate::error::DbWatchError;
use crate::models::{BackendKind, FIREBIRD_DEFAULT_PORT};
use crate::security::Credential;
use crate::Result;

/// Passthrough parameter naming the Firebird authentication plugin.
pub const AUTH_PLUGIN_PARAM: &str = "auth_plugin_name";

/// Renders the vendor connection string for the descriptor's backend.
///
/// # Errors
/// Returns error if an embedded server port is out of range
///
/// # Example
/// ```rust
/// use dbwatch_core::security::Credential;
/// use dbwatch_core::{BackendKind, ConnectionDescriptor, build_connection_string};
///
/// let descriptor = ConnectionDescriptor::new(BackendKind::Oracle, "dbhost", "apw_user", "/ORCL")?
///     .with_port(1521);
/// let rendered = build_connection_string(&descriptor, &Credential::new("pw".to_string()))?;
/// assert_eq!(
///     rendered.expose(),
///     "Data Source=dbhost:1521/ORCL;User Id=apw_user;Password=pw;"
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn build_connection_string(
    descriptor: &ConnectionDescriptor,
    credential: &Credential,
) -> Result<ConnectionString> {
    match descriptor.backend() {
        BackendKind::Oracle => Ok(build_oracle(descriptor, credential)),
        BackendKind::Firebird => build_firebird(descriptor, credential),
    }
}

fn build_oracle(descriptor: &ConnectionDescriptor, credential: &Credential) -> ConnectionString {
    let mut data_source = descriptor.server().to_string();
    if let Some(port) = descriptor.port() {
        data_source.push(':');
        data_source.push_str(&port.to_string());
    }
    let service = descriptor.database();
    if !service.starts_with('/') {
        data_source.push('/');
    }
    data_source.push_str(service);

    ConnectionString::new()
        .with("Data Source", data_source)
        .with("User Id", descriptor.user())
        .with("Password", credential.expose())
}

fn build_firebird(
    descriptor: &ConnectionDescriptor,
    credential: &Credential,
) -> Result<ConnectionString> {
    let (host, embedded_port) = split_server_port(descriptor.server())?;
    let port = embedded_port
        .or(descriptor.port())
        .unwrap_or(FIREBIRD_DEFAULT_PORT);
    let path = normalize_firebird_path(descriptor.database());

    let mut rendered = ConnectionString::new()
        .with("User", descriptor.user())
        .with("Password", credential.expose())
        .with("Database", format!("{}:{}", host, path))
        .with("Port", port.to_string())
        .with("Dialect", "3")
        .with("Charset", "UTF8");

    if let Some(plugin) = descriptor.extra_param(AUTH_PLUGIN_PARAM) {
        rendered = rendered.with(AUTH_PLUGIN_PARAM, plugin);
    }

    Ok(rendered)
}

/// Splits a trailing `:port` off a server name.
///
/// A suffix that is not all digits is not a port and the server is returned
/// unchanged. An empty suffix (`fbhost:`) is dropped.
///
/// # Errors
/// Returns error if the numeric suffix is zero or exceeds `u16`
pub fn split_server_port(server: &str) -> Result<(&str, Option<u16>)> {
    match server.rsplit_once(':') {
        Some((host, suffix))
            if !host.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let port = suffix
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| {
                    DbWatchError::configuration(format!("Invalid port in server '{}'", server))
                })?;
            Ok((host, Some(port)))
        }
        Some((host, "")) if !host.is_empty() => Ok((host, None)),
        _ => Ok((server, None)),
    }
}

/// Converts a database path to Firebird's native backslash separators.
///
/// Handles mixed URL and drive-letter forms: a leading slash in front of a
/// drive letter (`/D:/DATA`) is dropped.
pub fn normalize_firebird_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let trimmed = if bytes.len() >= 3
        && (bytes[0] == b'/' || bytes[0] == b'\\')
        && bytes[1].is_ascii_alphabetic()
        && bytes[2] == b':'
    {
        &path[1..]
    } else {
        path
    };
    trimmed.replace('/', "\\")
}
