//! Sensitive data marker for automatic redaction
//!
//! Connection credentials travel inside `DbConfig`, which is logged at
//! startup. Wrapping them in `Sensitive<T>` keeps them out of every
//! `Debug`/`Display` rendering while still deserializing transparently.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const REDACTED: &str = "***REDACTED***";

/// Wrapper for sensitive data that redacts itself in Debug, Display and Serialize
///
/// # Example
///
/// ```
/// use lookupdao_core_types::Sensitive;
///
/// let password = Sensitive::new("secret123");
/// assert_eq!(format!("{:?}", password), "***REDACTED***");
/// assert_eq!(password.expose(), &"secret123");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    /// Wrap a sensitive value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the underlying sensitive value
    ///
    /// Only the storage engine adapter should need this.
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Consume the wrapper and return the inner value
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Sensitive)
    }
}

// Serializing never leaks the secret: dumped configs carry the marker instead.
impl<T> Serialize for Sensitive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_debug_redaction() {
        let secret = Sensitive::new("my-secret-password");
        let debug_str = format!("{:?}", secret);
        assert_eq!(debug_str, REDACTED);
        assert!(!debug_str.contains("my-secret-password"));
    }

    #[test]
    fn test_sensitive_expose_and_into_inner() {
        let secret = Sensitive::new(String::from("test"));
        assert_eq!(secret.expose(), "test");
        assert_eq!(secret.into_inner(), "test");
    }

    #[test]
    fn test_sensitive_deserializes_transparently() {
        #[derive(Deserialize, Debug)]
        struct Credentials {
            user: String,
            password: Sensitive<String>,
        }

        let creds: Credentials = toml::from_str("user = \"alice\"\npassword = \"hunter2\"").unwrap();
        assert_eq!(creds.user, "alice");
        assert_eq!(creds.password.expose(), "hunter2");

        let debug_str = format!("{:?}", creds);
        assert!(debug_str.contains("alice"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_sensitive_serializes_redacted() {
        let secret = Sensitive::new("hunter2".to_string());
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, format!("\"{}\"", REDACTED));
    }
}
