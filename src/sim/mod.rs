//! Simulation Harness.
//!
//! Wraps controllers into runnable systems and sessions, and reads the packed
//! trace format used by the command-line driver.

/// Multi-channel session with epoch reporting and the run summary.
pub mod session;

/// One channel plus the per-cycle rank/controller ordering.
pub mod system;

/// Packed 64-bit trace records.
pub mod trace;

pub use session::{Session, SessionReport};
pub use system::{LogSink, MemorySystem};
pub use trace::{TimedRecord, TraceReader, TraceRecord};
