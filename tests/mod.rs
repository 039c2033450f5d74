//! Test module organization.
//!
//! This module organizes all integration tests for the memory channel simulator.



/// Configuration loading, ini parsing and derived value tests.
mod config_tests;

/// End-to-end controller tests: latency, data round trips and fatal errors.
mod controller_tests;




/// Packed trace decoding and replay tests.
mod trace_tests;
