//! Projection replay process (event-sourced).
//!
//! A replay is a long-running re-derivation of one read model from the full
//! event log. Its lifecycle and progress counters are themselves recorded as
//! events so operators can inspect a run after a crash or a cancellation.

pub mod process;
pub mod status;

pub use process::{
    CancelReplay, FailReplay, ProgressUpdated, ProjectionReplay, ReplayCancelled, ReplayCommand,
    ReplayEvent, ReplayFailed, ReplayId, ReplayProgress, ReplayStarted, ReportProgress,
    SetTotalEvents, StartReplay, TotalEventsSet,
};
pub use status::ReplayStatus;
