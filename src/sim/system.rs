//! Single-Channel Memory System.
//!
//! A `MemorySystem` pairs one [`MemoryController`] with its ranks and keeps
//! the per-cycle ordering between them: ranks are updated first so that any
//! read data they finish is visible to the controller in the same cycle.

use crate::common::data::Transaction;
use crate::common::error::SimResult;
use crate::config::Config;
use crate::dram::controller::{CompletionSink, MemoryController};

/// Sink that reports completions through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl CompletionSink for LogSink {
    fn read_complete(&mut self, channel: usize, address: u64, cycle: u64, _data: Option<&[u8]>) {
        log::trace!("[ch{}] cycle {}: read {:#x} done", channel, cycle, address);
    }

    fn write_complete(&mut self, channel: usize, address: u64, cycle: u64) {
        log::trace!("[ch{}] cycle {}: write {:#x} done", channel, cycle, address);
    }

    fn report_power(
        &mut self,
        channel: usize,
        rank: usize,
        background: f64,
        burst: f64,
        refresh: f64,
        actpre: f64,
    ) {
        log::debug!(
            "[ch{}] rank {} power: bg={:.3}W burst={:.3}W ref={:.3}W actpre={:.3}W",
            channel,
            rank,
            background,
            burst,
            refresh,
            actpre
        );
    }
}

/// One memory channel together with its ranks.
pub struct MemorySystem {
    controller: MemoryController,
}

impl MemorySystem {
    /// Builds a channel from `config`.
    ///
    /// # Errors
    ///
    /// Propagates configuration errors from the controller.
    pub fn new(channel: usize, config: &Config, sink: Box<dyn CompletionSink>) -> SimResult<Self> {
        Ok(Self {
            controller: MemoryController::new(channel, config, sink)?,
        })
    }

    /// Wraps an already built controller.
    pub fn from_controller(controller: MemoryController) -> Self {
        Self { controller }
    }

    pub fn will_accept_transaction(&self) -> bool {
        self.controller.will_accept_transaction()
    }

    /// Submits a transaction; `false` means the caller should retry later.
    pub fn add_transaction(&mut self, txn: Transaction) -> bool {
        self.controller.add_transaction(txn)
    }

    /// Advances ranks, then the controller, by one cycle.
    pub fn update(&mut self) -> SimResult<()> {
        self.controller.update_ranks()?;
        self.controller.update()
    }

    pub fn is_drained(&self) -> bool {
        self.controller.is_drained()
    }

    pub fn controller(&self) -> &MemoryController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut MemoryController {
        &mut self.controller
    }
}
