//! Validated device identifiers.
//!
//! Every endpoint that accepts a device key parses it into a [`DeviceKey`]
//! before touching any component, so invalid input is never stored and never
//! used as a map key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeviceKeyError;

/// Maximum device key length in characters.
pub const MAX_DEVICE_KEY_LEN: usize = 64;

/// A device key restricted to `[A-Za-z0-9_-]{1,64}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn parse(raw: &str) -> Result<Self, DeviceKeyError> {
        validate(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(raw: &str) -> Result<(), DeviceKeyError> {
    if raw.is_empty() {
        return Err(DeviceKeyError::Empty);
    }
    if let Some(bad) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(DeviceKeyError::InvalidChar(bad));
    }
    // All remaining chars are ASCII, so byte length == char count.
    if raw.len() > MAX_DEVICE_KEY_LEN {
        return Err(DeviceKeyError::TooLong {
            len: raw.len(),
            max: MAX_DEVICE_KEY_LEN,
        });
    }
    Ok(())
}

impl FromStr for DeviceKey {
    type Err = DeviceKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceKey {
    type Error = DeviceKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)?;
        Ok(Self(value))
    }
}

impl From<DeviceKey> for String {
    fn from(key: DeviceKey) -> Self {
        key.0
    }
}

impl AsRef<str> for DeviceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_charset() {
        for key in ["dev-1", "ESP32_kitchen", "a", "0123456789", "-_-"] {
            assert!(DeviceKey::parse(key).is_ok(), "{key} should be valid");
        }
    }

    #[test]
    fn accepts_exactly_max_len() {
        let key = "k".repeat(MAX_DEVICE_KEY_LEN);
        assert_eq!(DeviceKey::parse(&key).unwrap().as_str(), key);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(DeviceKey::parse(""), Err(DeviceKeyError::Empty));
    }

    #[test]
    fn rejects_too_long() {
        let key = "k".repeat(MAX_DEVICE_KEY_LEN + 1);
        assert_eq!(
            DeviceKey::parse(&key),
            Err(DeviceKeyError::TooLong { len: 65, max: 64 })
        );
    }

    #[test]
    fn rejects_bad_chars() {
        assert_eq!(
            DeviceKey::parse("dev 1"),
            Err(DeviceKeyError::InvalidChar(' '))
        );
        assert_eq!(
            DeviceKey::parse("../etc"),
            Err(DeviceKeyError::InvalidChar('.'))
        );
        assert_eq!(
            DeviceKey::parse("dév"),
            Err(DeviceKeyError::InvalidChar('é'))
        );
    }

    #[test]
    fn deserialize_validates() {
        let ok: DeviceKey = serde_json::from_str(r#""dev-1""#).unwrap();
        assert_eq!(ok.as_str(), "dev-1");
        assert!(serde_json::from_str::<DeviceKey>(r#""dev/1""#).is_err());
    }
}
