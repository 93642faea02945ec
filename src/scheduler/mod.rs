//! Recurring sweep scheduler
//!
//! Sweeps a fixed list of targets once at startup and then on a fixed
//! interval. Runs never overlap: a run executes inline in the event loop and
//! ticks missed while it was active are skipped.

mod daemon;

pub use daemon::{
    shutdown_signal, RunSummary, Scheduler, SchedulerCommand, SchedulerConfig, SchedulerEvent,
    SchedulerHandle, DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_RUN_TIMEOUT, DEFAULT_SYNC_INTERVAL,
};
