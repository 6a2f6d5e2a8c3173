//! Generic "submit blocking work, receive the outcome on the caller context" machinery.
//!
//! - channel: batons, reply routes, and the worker/caller task traits
//! - lane: per-session FIFO that keeps native calls on one handle from overlapping
//! - manager: the worker pool and the completion dispatcher

pub(crate) mod channel;
pub(crate) mod lane;
pub(crate) mod manager;

pub use manager::{EngineConfig, TaskEngine};
