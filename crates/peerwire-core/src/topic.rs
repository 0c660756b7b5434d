//! Canonical topic naming for two-party sessions.
//!
//! Both sides of a call derive the topic independently from `(self, peer)`.
//! Because the two identifiers are ordered before they are joined, the pair
//! `(alice, bob)` and the pair `(bob, alice)` land on the same topic without
//! any handshake between the two connections.

use std::fmt;

use crate::participant::ParticipantId;

/// Namespace prefix shared by every session topic.
pub const TOPIC_PREFIX: &str = "video";

/// Separator between the prefix and the two identifiers.
pub const TOPIC_SEPARATOR: char = '-';

/// Bus topic addressing exactly one two-party session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the order-independent topic for a pair of participants.
///
/// The result names exactly one pair as long as neither id contains
/// [`TOPIC_SEPARATOR`], which [`ParticipantId::parse`] guarantees.
pub fn derive_topic(a: &ParticipantId, b: &ParticipantId) -> Topic {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    Topic(format!(
        "{TOPIC_PREFIX}{TOPIC_SEPARATOR}{low}{TOPIC_SEPARATOR}{high}"
    ))
}
