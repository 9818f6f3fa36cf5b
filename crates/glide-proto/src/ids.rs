//! Matrix room identifiers.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Validated Matrix room identifier.
///
/// # Invariants
///
/// - Starts with the `!` sigil.
/// - Contains a `:` separating a non-empty opaque localpart from a non-empty
///   server name.
///
/// The server name is not resolved or further validated; the homeserver is
/// the authority on whether a room exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Parse and validate a room id.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let Some(rest) = value.strip_prefix('!') else {
            return Err(ProtocolError::InvalidRoomId { value, reason: "missing '!' sigil" });
        };
        let Some((localpart, server)) = rest.split_once(':') else {
            return Err(ProtocolError::InvalidRoomId { value, reason: "missing ':' separator" });
        };
        if localpart.is_empty() {
            return Err(ProtocolError::InvalidRoomId { value, reason: "empty localpart" });
        }
        if server.is_empty() {
            return Err(ProtocolError::InvalidRoomId { value, reason: "empty server name" });
        }
        Ok(Self(value))
    }

    /// The full identifier, including sigil and server name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Server name part (everything after the first `:`).
    pub fn server_name(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, server)| server)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for RoomId {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_id() {
        let id = RoomId::parse("!abc123:example.org").unwrap();
        assert_eq!(id.as_str(), "!abc123:example.org");
        assert_eq!(id.server_name(), "example.org");
    }

    #[test]
    fn server_name_may_contain_port() {
        let id = RoomId::parse("!abc:localhost:8448").unwrap();
        assert_eq!(id.server_name(), "localhost:8448");
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in ["abc:example.org", "!abc", "!:example.org", "!abc:", "", "#alias:example.org"] {
            assert!(
                matches!(RoomId::parse(bad), Err(ProtocolError::InvalidRoomId { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn deserialization_validates() {
        let ok: RoomId = serde_json::from_str("\"!a:b\"").unwrap();
        assert_eq!(ok.as_str(), "!a:b");

        assert!(serde_json::from_str::<RoomId>("\"not-a-room\"").is_err());
    }
}
