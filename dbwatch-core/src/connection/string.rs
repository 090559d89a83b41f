//! Vendor key/value connection strings (`Key=Value;Key=Value;`).
//!
//! Both supported drivers consume the same ADO-style syntax. Values holding
//! `;`, `"` or surrounding whitespace are double-quoted with inner quotes
//! doubled. Key lookups ignore ASCII case.

use crate::error::DbWatchError;
use crate::Result;
use std::fmt;

/// Keys whose values are never rendered by `redacted()`.
const SECRET_KEYS: &[&str] = &["password", "pwd"];

/// Ordered key/value pairs in the syntax the vendor driver expects.
///
/// The full form contains the plaintext password, so `Debug` is redacted and
/// there is no `Display`. Use [`ConnectionString::expose`] only when handing
/// the string to a driver and [`ConnectionString::redacted`] for logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: Vec<(String, String)>,
}

impl ConnectionString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing any existing entry with the same key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self
            .pairs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Renders the complete string, including any password.
    pub fn expose(&self) -> String {
        self.render(false)
    }

    /// Renders the string with secret values replaced by `****`.
    pub fn redacted(&self) -> String {
        self.render(true)
    }

    fn render(&self, redact: bool) -> String {
        let mut out = String::new();
        for (key, value) in &self.pairs {
            out.push_str(key);
            out.push('=');
            if redact && is_secret_key(key) {
                out.push_str("****");
            } else {
                push_value(&mut out, value);
            }
            out.push(';');
        }
        out
    }

    /// Parses `Key=Value;` pairs, honoring double-quoted values.
    ///
    /// # Errors
    /// Returns error if a pair lacks `=`, a key is empty, or a quoted value is
    /// unterminated
    pub fn parse(input: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        let mut chars = input.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace() || *c == ';').is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(c) = chars.next_if(|c| *c != '=' && *c != ';') {
                key.push(c);
            }
            let key = key.trim().to_string();
            if chars.next() != Some('=') {
                return Err(DbWatchError::configuration(format!(
                    "connection string entry '{}' has no value",
                    key
                )));
            }
            if key.is_empty() {
                return Err(DbWatchError::configuration(
                    "connection string contains an empty key",
                ));
            }

            while chars.next_if(|c| *c == ' ' || *c == '\t').is_some() {}

            let mut value = String::new();
            if chars.next_if_eq(&'"').is_some() {
                loop {
                    match chars.next() {
                        Some('"') if chars.next_if_eq(&'"').is_some() => value.push('"'),
                        Some('"') => break,
                        Some(c) => value.push(c),
                        None => {
                            return Err(DbWatchError::configuration(format!(
                                "unterminated quoted value for '{}'",
                                key
                            )));
                        }
                    }
                }
                while chars.next_if(|c| *c == ' ' || *c == '\t').is_some() {}
                if chars.peek().is_some_and(|c| *c != ';') {
                    return Err(DbWatchError::configuration(format!(
                        "unexpected text after quoted value for '{}'",
                        key
                    )));
                }
            } else {
                while let Some(c) = chars.next_if(|c| *c != ';') {
                    value.push(c);
                }
                value.truncate(value.trim_end().len());
            }

            pairs.push((key, value));
        }

        Ok(Self { pairs })
    }
}

fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS.iter().any(|s| s.eq_ignore_ascii_case(key))
}

fn needs_quoting(value: &str) -> bool {
    value.contains(';')
        || value.contains('"')
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace)
}

fn push_value(out: &mut String, value: &str) {
    if needs_quoting(value) {
        out.push('"');
        out.push_str(&value.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(value);
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionString")
            .field(&self.redacted())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uses_trailing_separator() {
        let cs = ConnectionString::new()
            .with("User", "apw_user")
            .with("Port", "3050");
        assert_eq!(cs.expose(), "User=apw_user;Port=3050;");
    }

    #[test]
    fn test_with_replaces_case_insensitively() {
        let cs = ConnectionString::new()
            .with("auth_plugin_name", "Srp")
            .with("AUTH_PLUGIN_NAME", "Srp256");
        assert_eq!(cs.get("Auth_Plugin_Name"), Some("Srp256"));
        assert_eq!(cs.pairs().count(), 1);
    }

    #[test]
    fn test_values_with_separators_are_quoted() {
        let cs = ConnectionString::new().with("Password", "pa;ss\"word");
        assert_eq!(cs.expose(), "Password=\"pa;ss\"\"word\";");

        let parsed = ConnectionString::parse(&cs.expose()).unwrap();
        assert_eq!(parsed.get("password"), Some("pa;ss\"word"));
    }

    #[test]
    fn test_parse_trims_unquoted_values() {
        let parsed = ConnectionString::parse(" User = apw_user ; Dialect=3").unwrap();
        assert_eq!(parsed.get("user"), Some("apw_user"));
        assert_eq!(parsed.get("dialect"), Some("3"));
    }

    #[test]
    fn test_parse_keeps_equals_inside_value() {
        let parsed = ConnectionString::parse("Password=a=b;").unwrap();
        assert_eq!(parsed.get("Password"), Some("a=b"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConnectionString::parse("NoValue;").is_err());
        assert!(ConnectionString::parse("=x;").is_err());
        assert!(ConnectionString::parse("Password=\"open").is_err());
        assert!(ConnectionString::parse("Password=\"x\"junk;").is_err());
    }

    #[test]
    fn test_redacted_hides_password() {
        let cs = ConnectionString::new()
            .with("User Id", "apw_user")
            .with("Password", "secret123");
        let redacted = cs.redacted();
        assert!(!redacted.contains("secret123"));
        assert!(redacted.contains("Password=****;"));
        assert!(!format!("{:?}", cs).contains("secret123"));
    }
}
