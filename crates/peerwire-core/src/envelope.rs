//! Messages as they travel over the bus.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use uuid::Uuid;

use crate::participant::ParticipantId;

/// Identifies one live session instance.
///
/// A participant may hold several sessions at once (reconnects, duplicate
/// tabs), so echo suppression keys on this id rather than on the participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Who published an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub participant: ParticipantId,
    pub session: SessionId,
}

/// An opaque payload tagged with its origin.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Origin,
    pub payload: Bytes,
}

impl Envelope {
    pub const fn new(origin: Origin, payload: Bytes) -> Self {
        Self { origin, payload }
    }

    /// Whether this envelope was published by the given session.
    pub fn is_from(&self, session: SessionId) -> bool {
        self.origin.session == session
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn session_id_round_trips_through_display() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
    }

    #[test]
    fn is_from_matches_session_not_participant() {
        let mine = SessionId::new();
        let envelope = Envelope::new(
            Origin {
                participant: ParticipantId::new("alice"),
                session: mine,
            },
            Bytes::from_static(b"offer"),
        );
        assert!(envelope.is_from(mine));
        assert!(!envelope.is_from(SessionId::new()));
    }
}
