//! Common types shared throughout the simulator.
//!
//! This module provides the transaction types submitted by clients and the
//! error type returned by every fallible operation.

/// Memory transaction definitions.
pub mod data;

/// Error types.
pub mod error;

pub use data::{Payload, Transaction, TransactionKind};
pub use error::{BusKind, SimError, SimResult};
