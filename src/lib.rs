//! Vigil: Resilient Activity Tracking
//!
//! Tracks foreground usage sessions, evaluates them against per-owner limits,
//! and keeps every state-changing request in a durable offline queue that a
//! background coordinator replays once the remote service is reachable.

pub mod cli;
pub mod config;
pub mod consent;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod monitor;
pub mod queue;
pub mod sync;
pub mod threshold;
pub mod types;
