//! `peerwire` Core Library
//!
//! Shared functionality for `peerwire` components:
//! - Participant identifiers and canonical topic naming
//! - Bus envelopes tagged with their origin session
//! - Configuration resolution and hierarchy
//! - Common error types and tracing setup

pub mod config;
pub mod envelope;
pub mod error;
pub mod participant;
pub mod topic;
pub mod tracing_init;

pub use config::Config;
pub use envelope::{Envelope, Origin, SessionId};
pub use error::{Error, Result};
pub use participant::ParticipantId;
pub use topic::{Topic, derive_topic};
