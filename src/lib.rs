//! Cycle-Accurate Memory Channel Simulator Library.
//!
//! This crate models the controller side of a DDR-style memory channel, one
//! clock cycle at a time. It covers volatile DRAM with periodic refresh and
//! non-volatile memory (phase-change style) that needs no refresh but has
//! different read/write energy.
//!
//! # Architecture
//!
//! * **Controller**: per-channel scheduler that turns transactions into
//!   bank commands, enforces every inter-command delay and tracks completions.
//! * **Banks**: per-bank state machine driven by a declarative transition table.
//! * **Buses**: single-slot command and data buses with collision detection.
//! * **Power**: low-power entry/exit policy and per-rank energy accounting.
//!
//! # Modules
//!
//! * `common`: Transactions, payloads and error handling.
//! * `config`: TOML and legacy ini configuration loading.
//! * `dram`: Controller, bank table, buses, refresh, power and collaborators.
//! * `sim`: Channels, sessions and trace replay.
//! * `stats`: Epoch reports and the end-of-run summary.

/// Shared transaction types and error handling.
///
/// Provides the request type clients submit and the [`common::error::SimError`]
/// returned by every fallible operation.
pub mod common;

/// Configuration for device geometry, timing, currents and controller policy.
///
/// Loads TOML files or legacy `key=value` parameter files and derives the
/// values the controller needs (read/write latency, rank count, refresh period).
pub mod config;

/// Memory controller and the channel components it drives.
pub mod dram;

/// Simulation harness: channels, multi-channel sessions and traces.
pub mod sim;

/// Per-epoch statistics and session-wide aggregates.
///
/// Tracks bandwidth, latency, per-bank accesses and energy, and renders them
/// as text or JSON.
pub mod stats;
