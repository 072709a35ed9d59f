//! QUORUM: multi-participant weighted-vote trading consensus engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod alerts;
pub mod config;
pub mod data;
pub mod engine;
pub mod memory;
pub mod participants;
pub mod server;
pub mod types;
