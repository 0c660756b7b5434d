//! Participant identifiers.
//!
//! Identifiers are case-insensitive: every constructor lowercases its input,
//! so equality, ordering and topic derivation all operate on the normalized
//! form.

use std::fmt;

use crate::error::{Error, Result};
use crate::topic::TOPIC_SEPARATOR;

fn check(raw: &str) -> Result<()> {
    let reason = if raw.is_empty() {
        "identifier is empty"
    } else if raw.chars().any(char::is_whitespace) {
        "identifier contains whitespace"
    } else if raw.contains(TOPIC_SEPARATOR) {
        "identifier contains the topic separator"
    } else if raw.contains(['.', '*', '>']) {
        "identifier contains a reserved subject character"
    } else {
        return Ok(());
    };
    Err(Error::InvalidParticipant {
        id: raw.to_string(),
        reason,
    })
}

/// One side of a two-party session, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Normalize an identifier without validating it.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_lowercase())
    }

    /// Normalize and validate an identifier received from a client.
    ///
    /// Rejects empty identifiers and identifiers containing whitespace, the
    /// topic separator `-`, or the subject tokens `.`, `*` and `>`. Either
    /// would let one topic name describe more than one pair.
    pub fn parse(raw: &str) -> Result<Self> {
        check(raw)?;
        Ok(Self::new(raw))
    }

    /// Check an already normalized identifier against the rules of [`parse`].
    ///
    /// [`parse`]: Self::parse
    pub fn validate(&self) -> Result<()> {
        check(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl AsRef<str> for ParticipantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
