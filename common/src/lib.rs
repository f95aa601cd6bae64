//! Shared utilities used across the apm-metrics workspace.

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
