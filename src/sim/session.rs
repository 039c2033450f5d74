//! Multi-Channel Session.
//!
//! A `Session` owns every channel of one simulation run, routes transactions
//! to channels by address range, prints epoch statistics at a fixed cadence
//! and produces the end-of-run summary. All run-long aggregates live in the
//! session's [`SessionTotals`], so independent sessions never share state.

use std::io::Write;

use serde::Serialize;

use crate::common::data::Transaction;
use crate::common::error::{SimError, SimResult};
use crate::config::Config;
use crate::dram::address::InterleavedMapper;
use crate::dram::controller::CompletionSink;
use crate::sim::system::{LogSink, MemorySystem};
use crate::stats::{EpochReport, SessionSummary, SessionTotals};

/// Everything a session reported, for machine-readable output.
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub epochs: Vec<EpochReport>,
    pub summary: SessionSummary,
}

/// A set of channels advanced in lock step.
pub struct Session {
    channels: Vec<MemorySystem>,
    /// Exclusive upper address bound of each channel.
    bounds: Vec<u64>,
    totals: SessionTotals,
    epoch_length: u64,
    t_ck: f64,
    cycle: u64,
    epochs: Vec<EpochReport>,
    out: Box<dyn Write>,
}

impl Session {
    /// Creates one channel per configuration, each logging its completions.
    pub fn new(configs: &[Config], out: Box<dyn Write>) -> SimResult<Self> {
        let sinks = configs
            .iter()
            .map(|_| Box::new(LogSink) as Box<dyn CompletionSink>)
            .collect();
        Self::with_sinks(configs, sinks, out)
    }

    /// Creates one channel per configuration with the given sinks.
    ///
    /// The epoch length and clock period are taken from the first channel.
    ///
    /// # Errors
    ///
    /// Fails on an empty channel list, a sink count mismatch or any invalid
    /// channel configuration.
    pub fn with_sinks(
        configs: &[Config],
        sinks: Vec<Box<dyn CompletionSink>>,
        out: Box<dyn Write>,
    ) -> SimResult<Self> {
        let Some(first) = configs.first() else {
            return Err(SimError::InvalidConfig("a session needs at least one channel".to_string()));
        };
        if sinks.len() != configs.len() {
            return Err(SimError::InvalidConfig(format!(
                "{} channels but {} completion sinks",
                configs.len(),
                sinks.len()
            )));
        }

        let mut channels = Vec::with_capacity(configs.len());
        let mut bounds = Vec::with_capacity(configs.len());
        let mut end = 0u64;
        for (i, (config, sink)) in configs.iter().zip(sinks).enumerate() {
            channels.push(MemorySystem::new(i, config, sink)?);
            end += InterleavedMapper::new(config, config.num_ranks()).capacity();
            bounds.push(end);
        }

        Ok(Self {
            channels,
            bounds,
            totals: SessionTotals::default(),
            epoch_length: first.system.epoch_length,
            t_ck: first.device.t_ck,
            cycle: 0,
            epochs: Vec::new(),
            out,
        })
    }

    /// Channel that owns `address`. Addresses past the last channel wrap.
    pub fn route(&self, address: u64) -> usize {
        let total = self.bounds.last().copied().unwrap_or(1).max(1);
        let local = address % total;
        self.bounds
            .iter()
            .position(|&end| local < end)
            .unwrap_or(0)
    }

    pub fn will_accept_transaction(&self, address: u64) -> bool {
        self.channels[self.route(address)].will_accept_transaction()
    }

    /// Submits `txn` to the channel owning its address.
    pub fn add_transaction(&mut self, txn: Transaction) -> bool {
        let ch = self.route(txn.address);
        self.channels[ch].add_transaction(txn)
    }

    /// Advances every channel by one cycle, printing epoch statistics when
    /// an epoch boundary is crossed.
    pub fn update(&mut self) -> SimResult<()> {
        for ch in &mut self.channels {
            ch.update()?;
        }
        self.cycle += 1;
        if self.epoch_length > 0 && self.cycle % self.epoch_length == 0 {
            self.print_stats(false)?;
        }
        Ok(())
    }

    fn print_stats(&mut self, final_stats: bool) -> SimResult<()> {
        for ch in &mut self.channels {
            let report = ch
                .controller_mut()
                .print_stats(final_stats, &mut self.totals, self.out.as_mut())?;
            self.epochs.push(report);
        }
        Ok(())
    }

    /// Prints the final statistics of every channel and the session summary.
    pub fn finish(mut self) -> SimResult<SessionReport> {
        self.print_stats(true)?;
        for ch in &self.channels {
            ch.controller().absorb_into(&mut self.totals);
        }
        let summary = self.totals.summary(self.cycle, self.t_ck);
        summary.write_text(self.out.as_mut())?;
        self.out.flush()?;
        Ok(SessionReport {
            epochs: self.epochs,
            summary,
        })
    }

    pub fn is_drained(&self) -> bool {
        self.channels.iter().all(MemorySystem::is_drained)
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, i: usize) -> &MemorySystem {
        &self.channels[i]
    }

    pub fn totals(&self) -> &SessionTotals {
        &self.totals
    }
}
