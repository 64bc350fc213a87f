// ── Core identity type ──
//
// Every cached entity is keyed by the id the server assigned it. The
// server is inconsistent about whether those ids are integers or strings,
// so EntityId accepts both and compares them structurally.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical identifier for any server entity (ticket, user, message).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum EntityId {
    Numeric(u64),
    Text(String),
}

impl EntityId {
    pub fn as_numeric(&self) -> Option<u64> {
        match self {
            Self::Numeric(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Numeric(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Numeric(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Numeric(n) => Self::Numeric(n),
            Raw::Text(s) => Self::from(s),
        })
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl From<u64> for EntityId {
    fn from(n: u64) -> Self {
        Self::Numeric(n)
    }
}

/// Digit-only strings normalise to `Numeric` so `"42"` and `42` match.
impl From<String> for EntityId {
    fn from(s: String) -> Self {
        match s.parse::<u64>() {
            Ok(n) => Self::Numeric(n),
            Err(_) => Self::Text(s),
        }
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings_normalise() {
        assert_eq!(EntityId::from("42"), EntityId::Numeric(42));
        assert_eq!(EntityId::from("ticket-9"), EntityId::Text("ticket-9".into()));
    }

    #[test]
    fn deserializes_both_shapes() {
        let ids: Vec<EntityId> = serde_json::from_str(r#"[7, "abc", "7"]"#).unwrap();
        assert_eq!(ids[0].as_numeric(), Some(7));
        assert_eq!(ids[1].as_text(), Some("abc"));
        assert_eq!(ids[2], ids[0]);
    }

    #[test]
    fn display_is_bare() {
        assert_eq!(EntityId::Numeric(5).to_string(), "5");
        assert_eq!(EntityId::from("u-1").to_string(), "u-1");
    }
}
