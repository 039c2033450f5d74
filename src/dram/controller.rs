//! Memory Controller.
//!
//! One `MemoryController` drives one channel. Each call to
//! [`MemoryController::update`] advances the channel by exactly one clock
//! cycle, running a fixed sequence of steps whose order matters: later steps
//! observe state changed by earlier ones within the same cycle.
//!
//! 1. Advance deferred bank phase changes.
//! 2. Deliver bus packets whose transfer finished.
//! 3. Move due write data onto the data bus and retire its write.
//! 4. Run the refresh interlock (volatile memory only).
//! 5. Issue one command from the command queue.
//! 6. Translate one pending transaction into commands.
//! 7. Apply the low-power policy and accrue background energy.
//! 8. Match returned read data to its pending read.
//! 9. Count down refresh timers.
//! 10. Step the command queue's clock.
//! 11. Advance the controller clock.

use std::collections::VecDeque;
use std::io::Write;

use crate::common::data::Transaction;
use crate::common::error::{SimError, SimResult};
use crate::config::{Config, MemoryType, RowBufferPolicy};
use crate::dram::address::{AddressMapper, InterleavedMapper};
use crate::dram::bank::{BankTable, ReadMode};
use crate::dram::bus::BusScheduler;
use crate::dram::packet::{BusPacket, CommandKind};
use crate::dram::power::{PowerAccountant, PowerDecision};
use crate::dram::queue::{BankQueues, CommandQueue};
use crate::dram::rank::{DataRank, Rank};
use crate::dram::refresh::{RefreshAction, RefreshManager};
use crate::dram::timing::TimingParams;
use crate::dram::translator::TransactionTranslator;
use crate::stats::{ChannelStats, EpochReport, ReportContext, SessionTotals};

/// Receiver of completion and power notifications.
///
/// Every method is called synchronously from inside
/// [`MemoryController::update`] or [`MemoryController::print_stats`].
pub trait CompletionSink {
    fn read_complete(&mut self, _channel: usize, _address: u64, _cycle: u64, _data: Option<&[u8]>) {}

    fn write_complete(&mut self, _channel: usize, _address: u64, _cycle: u64) {}

    /// Per-rank power of the epoch just reported, in watts.
    fn report_power(
        &mut self,
        _channel: usize,
        _rank: usize,
        _background: f64,
        _burst: f64,
        _refresh: f64,
        _actpre: f64,
    ) {
    }
}

/// Sink that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl CompletionSink for NullSink {}

/// A transaction that has been translated and awaits completion.
#[derive(Debug)]
struct InFlight {
    txn: Transaction,
    rank: usize,
    bank: usize,
}

/// Per-channel scheduler.
pub struct MemoryController {
    channel: usize,
    memory_type: MemoryType,
    read_mode: ReadMode,
    t_ck: f64,
    bytes_per_transaction: u64,
    trans_queue_depth: usize,

    banks: BankTable,
    bus: BusScheduler,
    refresh: RefreshManager,
    power: PowerAccountant,
    translator: TransactionTranslator,
    queue: Box<dyn CommandQueue>,
    ranks: Vec<Box<dyn Rank>>,
    mapper: Box<dyn AddressMapper>,
    sink: Box<dyn CompletionSink>,

    transaction_queue: VecDeque<Transaction>,
    pending_reads: Vec<InFlight>,
    pending_writes: Vec<InFlight>,
    returns: VecDeque<BusPacket>,

    stats: ChannelStats,
    current_cycle: u64,
}

impl MemoryController {
    /// Creates a controller with the bundled queue, ranks and address mapping.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or names an unknown memory type.
    pub fn new(channel: usize, config: &Config, sink: Box<dyn CompletionSink>) -> SimResult<Self> {
        config.validate()?;
        let memory_type = config.memory_type_val()?;
        let num_ranks = config.num_ranks();
        let queue = Box::new(BankQueues::new(config, num_ranks, memory_type));
        let ranks = (0..num_ranks)
            .map(|i| Box::new(DataRank::new(i, config)) as Box<dyn Rank>)
            .collect();
        let mapper = Box::new(InterleavedMapper::new(config, num_ranks));
        Self::with_parts(channel, config, queue, ranks, mapper, sink)
    }

    /// Creates a controller around caller-supplied collaborators.
    ///
    /// The number of ranks is taken from `ranks`.
    pub fn with_parts(
        channel: usize,
        config: &Config,
        queue: Box<dyn CommandQueue>,
        ranks: Vec<Box<dyn Rank>>,
        mapper: Box<dyn AddressMapper>,
        sink: Box<dyn CompletionSink>,
    ) -> SimResult<Self> {
        let memory_type = config.memory_type_val()?;
        let num_ranks = ranks.len();
        if num_ranks == 0 {
            return Err(SimError::InvalidConfig("a channel needs at least one rank".to_string()));
        }
        let num_banks = config.device.num_banks;
        let row_policy = config.row_buffer_policy_val();
        let timing = TimingParams::from_config(config);
        let read_mode = match (memory_type, row_policy) {
            (MemoryType::Nvm, RowBufferPolicy::ClosePage) => ReadMode::NvmClosePage,
            _ => ReadMode::Standard,
        };

        log::info!(
            "channel {}: {:?}, {} ranks x {} banks, {:?}, RL={} WL={}",
            channel,
            memory_type,
            num_ranks,
            num_banks,
            row_policy,
            timing.rl,
            timing.wl
        );

        Ok(Self {
            channel,
            memory_type,
            read_mode,
            t_ck: config.device.t_ck,
            bytes_per_transaction: config.bytes_per_transaction(),
            trans_queue_depth: config.system.trans_queue_depth,
            banks: BankTable::new(num_ranks, num_banks, timing),
            bus: BusScheduler::new(&timing),
            refresh: RefreshManager::new(
                num_ranks,
                config.refresh_period_cycles(),
                timing.t_xp,
                memory_type,
            ),
            power: PowerAccountant::new(config, num_ranks),
            translator: TransactionTranslator::new(row_policy, memory_type),
            queue,
            ranks,
            mapper,
            sink,
            transaction_queue: VecDeque::new(),
            pending_reads: Vec::new(),
            pending_writes: Vec::new(),
            returns: VecDeque::new(),
            stats: ChannelStats::new(num_ranks, num_banks),
            current_cycle: 0,
        })
    }

    /// Returns `true` if the transaction queue has a free slot.
    pub fn will_accept_transaction(&self) -> bool {
        self.transaction_queue.len() < self.trans_queue_depth
    }

    /// Submits a transaction.
    ///
    /// Returns `false`, dropping `txn`, when the transaction queue is full.
    pub fn add_transaction(&mut self, mut txn: Transaction) -> bool {
        if !self.will_accept_transaction() {
            return false;
        }
        txn.arrival = self.current_cycle;
        self.transaction_queue.push_back(txn);
        true
    }

    /// Accepts read data returned by a rank.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedPacket` for anything but a data packet.
    pub fn receive_from_bus(&mut self, packet: BusPacket) -> SimResult<()> {
        if packet.kind != CommandKind::Data {
            return Err(SimError::UnexpectedPacket { kind: packet.kind });
        }
        self.returns.push_back(packet);
        Ok(())
    }

    /// Advances every attached rank by one cycle and collects finished read
    /// data. Runs before [`MemoryController::update`] in the same cycle.
    pub fn update_ranks(&mut self) -> SimResult<()> {
        for i in 0..self.ranks.len() {
            if let Some(packet) = self.ranks[i].update() {
                self.receive_from_bus(packet)?;
            }
        }
        Ok(())
    }

    /// Advances the controller by one clock cycle.
    ///
    /// # Errors
    ///
    /// Bus collisions and unmatched read data are fatal.
    pub fn update(&mut self) -> SimResult<()> {
        let now = self.current_cycle;

        self.banks.tick_countdowns();

        self.deliver_bus_packets(now);

        if let Some(moved) = self.bus.advance_write_fifo(now)? {
            self.retire_write(&moved, now);
        }

        if !self.refresh.is_inert() {
            if let Some(RefreshAction::Refresh(rank)) = self.refresh.poll() {
                self.queue.need_refresh(rank);
            }
        }

        self.issue_command(now)?;

        self.admit_transaction();

        self.update_power(now);

        if let Some(data) = self.returns.pop_front() {
            self.complete_read(data, now)?;
        }

        self.refresh.tick();
        self.queue.step();

        if log::log_enabled!(log::Level::Trace) {
            for rank in 0..self.banks.num_ranks() {
                log::trace!("cycle {} rank {}: {}", now, rank, self.banks.dump(rank));
            }
        }

        self.current_cycle += 1;
        Ok(())
    }

    fn deliver_bus_packets(&mut self, now: u64) {
        let delivered = self.bus.tick();
        if let Some(cmd) = delivered.command {
            if cmd.kind == CommandKind::Refresh {
                self.refresh.refresh_delivered(cmd.rank);
            }
            log::trace!("cycle {}: {:?} delivered to rank {}", now, cmd.kind, cmd.rank);
            self.ranks[cmd.rank].receive_from_bus(cmd);
        }
        if let Some(data) = delivered.data {
            self.sink.write_complete(self.channel, data.address, now);
            self.ranks[data.rank].receive_from_bus(data);
        }
    }

    fn retire_write(&mut self, moved: &BusPacket, now: u64) {
        let Some(i) = self
            .pending_writes
            .iter()
            .position(|w| w.txn.address == moved.address)
        else {
            return;
        };
        let w = self.pending_writes.remove(i);
        self.stats
            .record_write(w.rank, w.bank, now - w.txn.arrival);
    }

    fn issue_command(&mut self, now: u64) -> SimResult<()> {
        if self.bus.command_busy() {
            return Ok(());
        }
        let Some(mut cmd) = self.queue.pop(&self.banks) else {
            return Ok(());
        };
        if cmd.kind.is_write() {
            let payload = cmd.data.take();
            let data = BusPacket::data_for(&cmd, payload);
            self.bus.queue_write_data(data);
        }
        self.banks.apply(&cmd, self.read_mode, now)?;
        self.power.record_command(&cmd);
        self.bus.place_command(cmd, now)
    }

    fn admit_transaction(&mut self) {
        let Some((i, at)) = self.translator.select(
            &self.transaction_queue,
            self.mapper.as_ref(),
            self.queue.as_ref(),
        ) else {
            return;
        };
        let Some(mut txn) = self.transaction_queue.remove(i) else {
            return;
        };
        let (activate, column) = self.translator.translate(&mut txn, &at);
        self.queue.enqueue(activate);
        self.queue.enqueue(column);

        let entry = InFlight {
            txn,
            rank: at.rank,
            bank: at.bank,
        };
        if entry.txn.is_read() {
            self.stats.reads_received_per_rank[at.rank] += 1;
            self.pending_reads.push(entry);
        } else {
            self.stats.writes_received_per_rank[at.rank] += 1;
            self.pending_writes.push(entry);
        }
    }

    fn update_power(&mut self, now: u64) {
        for rank in 0..self.banks.num_ranks() {
            let state = self.refresh.rank(rank).clone();
            let decision = self.power.decide(
                self.queue.is_empty(rank),
                state.refresh_waiting,
                self.banks.all_idle(rank),
                state.powered_down,
                now,
                self.banks.get(rank, 0).next_power_up,
            );
            match decision {
                PowerDecision::Enter => {
                    log::debug!("cycle {}: rank {} enters power-down", now, rank);
                    self.refresh.rank_mut(rank).powered_down = true;
                    self.ranks[rank].power_down();
                    self.banks.power_down(rank, now);
                }
                PowerDecision::Exit => {
                    log::debug!("cycle {}: rank {} exits power-down", now, rank);
                    self.refresh.rank_mut(rank).powered_down = false;
                    self.ranks[rank].power_up();
                    self.banks.power_up(rank, now);
                }
                PowerDecision::Stay => {}
            }
            let powered_down = self.refresh.rank(rank).powered_down;
            self.power
                .accrue_background(rank, self.banks.any_active(rank), powered_down);
        }
    }

    fn complete_read(&mut self, data: BusPacket, now: u64) -> SimResult<()> {
        let Some(i) = self
            .pending_reads
            .iter()
            .position(|r| r.txn.address == data.address)
        else {
            return Err(SimError::UnmatchedReadReturn {
                address: data.address,
            });
        };
        let r = self.pending_reads.remove(i);
        let latency = now - r.txn.arrival;
        self.stats.record_read(r.rank, r.bank, latency);
        log::debug!(
            "cycle {}: read {:#x} complete after {} cycles",
            now,
            data.address,
            latency
        );
        self.sink
            .read_complete(self.channel, data.address, now, data.data.as_deref());
        Ok(())
    }

    /// Writes the epoch report to `out`, folds it into `totals` and resets
    /// the per-epoch counters.
    pub fn print_stats(
        &mut self,
        final_stats: bool,
        totals: &mut SessionTotals,
        out: &mut dyn Write,
    ) -> SimResult<EpochReport> {
        let energy: Vec<_> = (0..self.banks.num_ranks())
            .map(|r| *self.power.energy(r))
            .collect();
        let report = self.stats.epoch_report(&ReportContext {
            channel: self.channel,
            memory_type: self.memory_type,
            cycle: self.current_cycle,
            final_stats,
            t_ck: self.t_ck,
            bytes_per_transaction: self.bytes_per_transaction,
            energy: &energy,
            pending_reads: self.pending_reads.len(),
        });
        report.write_text(out)?;
        totals.fold(&report);
        for r in &report.ranks {
            self.sink.report_power(
                self.channel,
                r.rank,
                r.background_power,
                r.burst_power,
                r.refresh_power,
                r.actpre_power,
            );
        }
        self.reset_stats();
        Ok(report)
    }

    /// Clears per-epoch counters; run-long totals are kept.
    pub fn reset_stats(&mut self) {
        self.stats.reset_epoch();
        self.power.reset_epoch();
    }

    /// Adds this channel's run-long counters to `totals`.
    pub fn absorb_into(&self, totals: &mut SessionTotals) {
        totals.absorb_channel(
            self.memory_type,
            &self.stats,
            self.power.counts(),
            self.queue.row_hits(),
        );
    }

    /// Returns `true` once every accepted transaction has completed.
    pub fn is_drained(&self) -> bool {
        self.transaction_queue.is_empty()
            && self.pending_reads.is_empty()
            && self.pending_writes.is_empty()
            && self.returns.is_empty()
            && !self.bus.data_busy()
            && self.bus.pending_write_data() == 0
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    pub fn current_cycle(&self) -> u64 {
        self.current_cycle
    }

    pub fn banks(&self) -> &BankTable {
        &self.banks
    }

    pub fn bus(&self) -> &BusScheduler {
        &self.bus
    }

    pub fn refresh(&self) -> &RefreshManager {
        &self.refresh
    }

    pub fn power(&self) -> &PowerAccountant {
        &self.power
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn mapper(&self) -> &dyn AddressMapper {
        self.mapper.as_ref()
    }

    pub fn pending_read_count(&self) -> usize {
        self.pending_reads.len()
    }

    pub fn pending_write_count(&self) -> usize {
        self.pending_writes.len()
    }

    pub fn transaction_queue_len(&self) -> usize {
        self.transaction_queue.len()
    }
}
