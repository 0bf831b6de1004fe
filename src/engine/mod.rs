//! Engine module housing the orchestration layer.
//!
//! `EngineHandle` wires capture, the analysis thread, the trainer session
//! task and the beat clock together and exposes commands, snapshots and
//! subscriptions to the CLI and tests.

pub mod core;

pub use core::{CaptureHandle, EngineHandle};
