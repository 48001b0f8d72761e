//! The change-feed anchor token
//!
//! An [`Anchor`] names a point in the change history the host has consumed
//! up to. It is a pair of a *version* string, which only changes when the
//! store is reset (first run or incompatible schema), and a monotonically
//! increasing *iteration*. A version change invalidates every anchor issued
//! before the reset and forces the host into a full resync.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Number of letters in a generated anchor version string.
const VERSION_LEN: usize = 4;

/// Opaque (version, iteration) token identifying a point in the change feed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Anchor {
    /// Store generation; changes only on reset
    pub version: String,
    /// Monotonic change-batch counter within a generation
    pub iteration: i64,
}

impl Anchor {
    /// Creates an anchor from its parts
    #[must_use]
    pub fn new(version: impl Into<String>, iteration: i64) -> Self {
        Self {
            version: version.into(),
            iteration,
        }
    }

    /// The anchor one committed batch ahead of this one
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            version: self.version.clone(),
            iteration: self.iteration + 1,
        }
    }
}

/// Generates a fresh anchor version string: four uppercase ASCII letters
///
/// Randomness comes from UUID bytes so the engine does not need a separate
/// RNG dependency.
#[must_use]
pub fn generate_anchor_version() -> String {
    Uuid::new_v4().as_bytes()[..VERSION_LEN]
        .iter()
        .map(|b| char::from(b'A' + b % 26))
        .collect()
}

impl Display for Anchor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.version, self.iteration)
    }
}

impl FromStr for Anchor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (version, iteration) = s
            .rsplit_once('-')
            .ok_or_else(|| DomainError::InvalidAnchor(format!("missing separator: {s}")))?;

        if version.is_empty() {
            return Err(DomainError::InvalidAnchor(format!("empty version: {s}")));
        }

        let iteration = iteration
            .parse::<i64>()
            .map_err(|e| DomainError::InvalidAnchor(format!("bad iteration in '{s}': {e}")))?;

        Ok(Self {
            version: version.to_string(),
            iteration,
        })
    }
}

impl TryFrom<String> for Anchor {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Anchor> for String {
    fn from(anchor: Anchor) -> Self {
        anchor.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let anchor = Anchor::new("KQZB", 17);
        assert_eq!(anchor.to_string(), "KQZB-17");
        let parsed: Anchor = "KQZB-17".parse().unwrap();
        assert_eq!(parsed, anchor);
    }

    #[test]
    fn test_next_increments_iteration_only() {
        let anchor = Anchor::new("KQZB", 3);
        let next = anchor.next();
        assert_eq!(next.version, "KQZB");
        assert_eq!(next.iteration, 4);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Anchor>().is_err());
        assert!("KQZB".parse::<Anchor>().is_err());
        assert!("-5".parse::<Anchor>().is_err());
        assert!("KQZB-x".parse::<Anchor>().is_err());
    }

    #[test]
    fn test_generated_version_shape() {
        let version = generate_anchor_version();
        assert_eq!(version.len(), 4);
        assert!(version.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_serde_roundtrip() {
        let anchor = Anchor::new("ABCD", 42);
        let json = serde_json::to_string(&anchor).unwrap();
        assert_eq!(json, "\"ABCD-42\"");
        let parsed: Anchor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, anchor);
    }
}
