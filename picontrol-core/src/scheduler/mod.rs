//! Scan-loop timing
//!
//! All deadlines are measured against a free-running millisecond counter
//! that wraps; comparisons go through [`elapsed`] so the wrap is harmless.

pub mod timer;

pub use timer::{elapsed, Scheduler, Timer, TimerId};
