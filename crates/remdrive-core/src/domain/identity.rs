//! Stable item identifiers
//!
//! Every remote entry gets an [`ItemId`] the first time it is observed. The
//! identifier is reused on every later observation of the same name in the
//! same container, so it stays stable across content updates, renames and
//! moves. Symbolic-link identities carry a `@` tag in the first position so
//! they can be classified without a store lookup.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Well-known identifier of the tree root.
///
/// Generated identifiers are 13-character UUID prefixes (position 9 is
/// always `-`), so the literal can never collide with one.
const ROOT_ID: &str = "root";

/// Tag marking a symbolic-link identity.
const SYMLINK_TAG: char = '@';

/// Length of a generated identifier.
const GENERATED_LEN: usize = 13;

/// Stable, opaque identifier for a cached remote entry
///
/// Identity is minted once, by [`ItemId::generate`], and from then on the
/// same value follows the entry through renames and moves. The identifier
/// doubles as the primary key of the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Mints a new identifier
    ///
    /// Symbolic-link identities are tagged by replacing the first character
    /// with `@` so [`is_symlink`](ItemId::is_symlink) stays a cheap prefix
    /// test.
    #[must_use]
    pub fn generate(symlink: bool) -> Self {
        let raw: String = Uuid::new_v4().to_string().chars().take(GENERATED_LEN).collect();
        if symlink {
            let mut tagged = String::with_capacity(GENERATED_LEN);
            tagged.push(SYMLINK_TAG);
            tagged.extend(raw.chars().skip(1));
            Self(tagged)
        } else {
            Self(raw)
        }
    }

    /// The well-known root container identifier
    #[must_use]
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// Creates an identifier from a stored raw value
    ///
    /// # Errors
    /// Returns `DomainError::InvalidId` if the value is empty or contains `/`.
    pub fn new(raw: String) -> Result<Self, DomainError> {
        if raw.is_empty() {
            return Err(DomainError::InvalidId("identifier cannot be empty".to_string()));
        }
        if raw.contains('/') {
            return Err(DomainError::InvalidId(format!(
                "identifier contains '/': {raw}"
            )));
        }
        Ok(Self(raw))
    }

    /// Returns true for the root container identifier
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    /// Returns true for symbolic-link identities
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.0.starts_with(SYMLINK_TAG)
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ItemId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

// ============================================================================
// Collision rename policy
// ============================================================================

/// Produces a non-colliding name proposal for a write that would land on a
/// different live item.
///
/// The final space-separated token, if it is an integer, is treated as a
/// counter and incremented: `"notes"` becomes `"notes 2"`, `"notes 7"`
/// becomes `"notes 8"`, `"file 2 3"` becomes `"file 2 4"`. A trailing
/// token that does not
/// parse as an integer restarts the counter at 2. Pure and total; callers
/// loop until the proposal is free.
#[must_use]
pub fn renamed_name(name: &str) -> String {
    if let Some((base, suffix)) = name.rsplit_once(' ') {
        if !base.is_empty() && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            let next = suffix.parse::<i64>().map(|n| n.saturating_add(1)).unwrap_or(2);
            return format!("{} {}", base.trim_end(), next);
        }
    }
    format!("{name} 2")
}
