//! Debate engine: the coordinator state machine and the pure pieces it
//! drives.
//!
//! - `consensus` turns weighted opinions into one decision
//! - `context` assembles the per-round briefing
//! - `coordinator` runs a session end to end
//! - `record` packages a concluded session

pub mod consensus;
pub mod context;
pub mod coordinator;
pub mod record;

pub use coordinator::{CallOutcome, Coordinator, ParticipantFailure};
