//! Simulator Error Types.
//!
//! Every fatal condition the controller can hit is a variant of [`SimError`].
//! Invariant breaches (bus collisions, unmatched read data, unexpected
//! packets) are returned from the per-cycle update and end the run; the
//! configuration variants are raised while building a [`crate::config::Config`].

use std::io;

use thiserror::Error;

use crate::dram::packet::CommandKind;

/// Which of the two controller-driven buses a collision happened on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusKind {
    /// The command/address bus.
    Command,
    /// The write-data bus.
    Data,
}

impl std::fmt::Display for BusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusKind::Command => f.write_str("command"),
            BusKind::Data => f.write_str("data"),
        }
    }
}

/// Errors raised by the simulator.
#[derive(Debug, Error)]
pub enum SimError {
    /// A packet was placed on a bus slot that was still occupied.
    #[error("{bus} bus collision at cycle {cycle}")]
    BusCollision { bus: BusKind, cycle: u64 },

    /// Read data came back for an address with no pending read.
    #[error("no pending read matches returned data for {address:#x}")]
    UnmatchedReadReturn { address: u64 },

    /// A packet of the wrong kind reached the controller.
    #[error("controller received unexpected {kind:?} packet")]
    UnexpectedPacket { kind: CommandKind },

    /// The configured memory type is neither DRAM nor NVM.
    #[error("unknown memory type '{0}' (expected 'dram' or 'nvm')")]
    UnknownMemoryType(String),

    /// A numeric parameter was never set.
    #[error("cannot continue without key '{0}' set")]
    MissingParameter(String),

    /// A parameter value could not be parsed.
    #[error("could not parse line {line} (non-numeric value '{value}' for '{key}')")]
    InvalidValue {
        key: String,
        value: String,
        line: usize,
    },

    /// A configuration line had no `=`.
    #[error("malformed line {0} (missing equals)")]
    MalformedLine(usize),

    /// The parameter set is self-inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Report(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type SimResult<T> = Result<T, SimError>;
