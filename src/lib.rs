//! Timed CAN/CAN-FD trace replay with loopback latency measurement.
//!
//! A recorded trace is replayed onto a bus with its original inter-frame
//! timing. Every frame is sent with the bus configured to deliver our own
//! frames back, and the time until that echo arrives is recorded. Several
//! workers can replay independent traces at once; their statistics are
//! merged into one [`stats::AggregateReport`].

pub mod config;
pub mod core;
pub mod hardware;
pub mod input;
pub mod playback;
pub mod report;
pub mod stats;

pub use crate::config::ReplayConfig;
pub use crate::core::{build, Frame, FrameError, FramePolicy, RawId, TraceRecord};
pub use crate::playback::{run_workers, Assignment, ReplayOptions, ReplayWorker};
pub use crate::stats::{AggregateReport, LatencySummary, WorkerOutcome, WorkerStats};
