//! Imports connection settings from the pharmacy suite's own files.
//!
//! `apman.ini` (windows-1250) names the active database section through
//! `[PARAMETRY] ALIAS_BAZY`; that section supplies `DB_TYPE`, `DB_SERVER`,
//! `DB_USER` and `DB_PATH`. The licence file carries the customer number
//! used by the non-interactive setup to derive the `apw_user` password.

use crate::connection::{ConnectionDescriptor, split_server_port};
use crate::error::DbWatchError;
use crate::models::BackendKind;
use crate::security::Credential;
use crate::Result;
use encoding_rs::WINDOWS_1250;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Well-known `apman.ini` locations, checked in order.
pub const APMAN_CANDIDATES: &[&str] = &[
    r"C:\KS\APW\apman.ini",
    r"D:\KS\APW\apman.ini",
    r"E:\KS\APW\apman.ini",
    r"F:\KS\APW\apman.ini",
];

/// Well-known licence file locations, checked in order.
pub const LICENSE_CANDIDATES: &[&str] = &[
    r"C:\KS\APW\AP\licencja_aow.xml",
    r"D:\KS\APW\AP\licencja_aow.xml",
    r"E:\KS\APW\AP\licencja_aow.xml",
    r"F:\KS\APW\AP\licencja_aow.xml",
];

/// Namespace of the licence document.
pub const LICENSE_NAMESPACE: &str = "http://www.kamsoft.pl/ks";

/// Element holding the customer number.
const LICENSE_ID_ELEMENT: &[u8] = b"id-knt-ks";

/// The only account the non-interactive setup can derive a password for.
pub const AUTO_CONFIG_USER: &str = "apw_user";

/// Database settings read from `apman.ini`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApmanSettings {
    pub db_type: String,
    pub db_server: String,
    pub db_user: String,
    pub db_path: String,
}

impl ApmanSettings {
    /// Converts the raw settings into a descriptor.
    ///
    /// Firebird servers keep any `host:port` suffix for the builder to split.
    /// Oracle servers written as `host:port/service` are decomposed; without
    /// a service suffix `DB_PATH` names the service.
    ///
    /// # Errors
    /// Returns `UnsupportedBackend` for an unknown `DB_TYPE`, or a
    /// configuration error if mandatory values are missing
    pub fn to_descriptor(&self) -> Result<ConnectionDescriptor> {
        let backend: BackendKind = self.db_type.parse()?;
        match backend {
            BackendKind::Firebird => ConnectionDescriptor::new(
                backend,
                &self.db_server,
                &self.db_user,
                &self.db_path,
            ),
            BackendKind::Oracle => {
                let (host_port, service) = match self.db_server.split_once('/') {
                    Some((host_port, service)) => (host_port, format!("/{}", service)),
                    None => (self.db_server.as_str(), self.db_path.clone()),
                };
                let (host, port) = split_server_port(host_port)?;
                let descriptor = ConnectionDescriptor::new(backend, host, &self.db_user, service)?;
                Ok(match port {
                    Some(port) => descriptor.with_port(port),
                    None => descriptor,
                })
            }
        }
    }
}

/// Returns the explicit path, or the first well-known candidate that exists.
///
/// # Errors
/// Returns `Bootstrap` if the explicit path is missing or no candidate exists
pub fn locate(explicit: Option<&Path>, candidates: &[&str], what: &str) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(DbWatchError::bootstrap(format!(
            "{} not found at {}",
            what,
            path.display()
        )));
    }

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
        .ok_or_else(|| DbWatchError::bootstrap(format!("Could not find {}", what)))
}

/// Parses `apman.ini` text already decoded to UTF-8.
///
/// # Errors
/// Returns `Bootstrap` if `[PARAMETRY] ALIAS_BAZY` or the section it names
/// is missing
pub fn parse_apman(text: &str) -> Result<ApmanSettings> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let name = name.trim().to_uppercase();
            sections.entry(name.clone()).or_default();
            current = Some(name);
        } else if let (Some(section), Some((key, value))) = (&current, trimmed.split_once('=')) {
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_uppercase(), value.trim().to_string());
        }
    }

    let alias = sections
        .get("PARAMETRY")
        .and_then(|params| params.get("ALIAS_BAZY"))
        .filter(|alias| !alias.is_empty())
        .ok_or_else(|| DbWatchError::bootstrap("Missing PARAMETRY section or ALIAS_BAZY parameter"))?;

    let database = sections
        .get(&alias.to_uppercase())
        .ok_or_else(|| DbWatchError::bootstrap(format!("Missing database section [{}]", alias)))?;

    let value = |key: &str| database.get(key).cloned().unwrap_or_default();

    Ok(ApmanSettings {
        db_type: value("DB_TYPE"),
        db_server: value("DB_SERVER"),
        db_user: value("DB_USER"),
        db_path: value("DB_PATH"),
    })
}

/// Reads and parses an `apman.ini` file.
///
/// # Errors
/// Returns error if the file cannot be read or lacks the database section
pub fn read_apman(path: &Path) -> Result<ApmanSettings> {
    let bytes = std::fs::read(path)
        .map_err(|e| DbWatchError::io(format!("Failed to read {}", path.display()), e))?;
    let (text, _) = WINDOWS_1250.decode_without_bom_handling(&bytes);
    tracing::debug!(path = %path.display(), "Parsing apman.ini");
    parse_apman(&text)
}

/// Extracts the customer number from licence XML.
///
/// # Errors
/// Returns `Bootstrap` if the XML is malformed or has no non-empty
/// `id-knt-ks` element in the licence namespace
pub fn parse_license_id(xml: &str) -> Result<String> {
    let mut reader = NsReader::from_str(xml);
    let mut inside = false;
    let mut value = String::new();

    loop {
        match reader.read_resolved_event() {
            Ok((ResolveResult::Bound(Namespace(ns)), Event::Start(e)))
                if ns == LICENSE_NAMESPACE.as_bytes() && e.local_name().as_ref() == LICENSE_ID_ELEMENT =>
            {
                inside = true;
            }
            Ok((_, Event::Text(text))) if inside => {
                let text = text
                    .unescape()
                    .map_err(|e| DbWatchError::bootstrap(format!("Invalid licence XML: {}", e)))?;
                value.push_str(&text);
            }
            Ok((_, Event::CData(data))) if inside => {
                value.push_str(&String::from_utf8_lossy(&data.into_inner()));
            }
            Ok((_, Event::End(_))) if inside => break,
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DbWatchError::bootstrap(format!("Invalid licence XML: {}", e)));
            }
        }
    }

    let id = value.trim();
    if id.is_empty() {
        return Err(DbWatchError::bootstrap(
            "Licence file has no id-knt-ks customer number",
        ));
    }
    Ok(id.to_string())
}

/// Reads the licence file, trying UTF-8 before windows-1250.
///
/// # Errors
/// Returns error if the file cannot be read or parsed
pub fn read_license_id(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| DbWatchError::io(format!("Failed to read {}", path.display()), e))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(path = %path.display(), "Licence file is not UTF-8, decoding as windows-1250");
            WINDOWS_1250.decode_without_bom_handling(e.as_bytes()).0.into_owned()
        }
    };
    parse_license_id(text.trim_start_matches('\u{feff}'))
}

/// Password the suite assigns to `apw_user` for a customer.
///
/// # Errors
/// Returns `Bootstrap` if the configured user is not `apw_user`
pub fn auto_config_credential(settings: &ApmanSettings, customer_id: &str) -> Result<Credential> {
    if !settings.db_user.eq_ignore_ascii_case(AUTO_CONFIG_USER) {
        return Err(DbWatchError::bootstrap(format!(
            "DB_USER ({}) is not '{}'; automatic configuration requires {}",
            settings.db_user, AUTO_CONFIG_USER, AUTO_CONFIG_USER
        )));
    }
    Ok(Credential::new(format!("{}{}", AUTO_CONFIG_USER, customer_id)))
}
