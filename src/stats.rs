//! Memory system statistics collection and reporting.
//!
//! Each controller keeps a [`ChannelStats`] with per-epoch counters (reads,
//! writes and read latency per bank) and run-long totals (bank accesses,
//! latency samples, the latency histogram). At the end of every epoch the
//! controller turns them into an [`EpochReport`], prints it, folds it into
//! the session's [`SessionTotals`] and clears the per-epoch part.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

use crate::config::MemoryType;
use crate::dram::power::{CommandCounts, EnergyAccumulators};

/// Width of one latency histogram bucket, in cycles.
pub const HISTOGRAM_BIN_SIZE: u64 = 10;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Read latencies bucketed by [`HISTOGRAM_BIN_SIZE`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LatencyHistogram {
    bins: BTreeMap<u64, u64>,
}

impl LatencyHistogram {
    pub fn record(&mut self, latency: u64) {
        *self
            .bins
            .entry((latency / HISTOGRAM_BIN_SIZE) * HISTOGRAM_BIN_SIZE)
            .or_insert(0) += 1;
    }

    /// Bucket start to sample count.
    pub fn bins(&self) -> &BTreeMap<u64, u64> {
        &self.bins
    }

    pub fn count(&self) -> u64 {
        self.bins.values().sum()
    }
}

/// Counters of one channel.
#[derive(Clone, Debug)]
pub struct ChannelStats {
    num_banks: usize,
    /// Reads completed this epoch, per bank.
    pub reads_per_bank: Vec<u64>,
    /// Writes completed this epoch, per bank.
    pub writes_per_bank: Vec<u64>,
    /// Sum of read latencies completed this epoch, per bank.
    pub epoch_latency_per_bank: Vec<u64>,
    /// Accesses of earlier epochs, per bank.
    pub grand_total_bank_accesses: Vec<u64>,
    /// Read transactions translated per rank, whole run.
    pub reads_received_per_rank: Vec<u64>,
    /// Write transactions translated per rank, whole run.
    pub writes_received_per_rank: Vec<u64>,
    /// Transactions completed, whole run.
    pub total_transactions: u64,
    /// Read latencies in 10-cycle bins, whole run.
    pub histogram: LatencyHistogram,
    /// Every read latency, whole run.
    pub read_latencies: Vec<u64>,
    /// Every write latency, whole run.
    pub write_latencies: Vec<u64>,
}

impl ChannelStats {
    pub fn new(num_ranks: usize, num_banks: usize) -> Self {
        let n = num_ranks * num_banks;
        Self {
            num_banks,
            reads_per_bank: vec![0; n],
            writes_per_bank: vec![0; n],
            epoch_latency_per_bank: vec![0; n],
            grand_total_bank_accesses: vec![0; n],
            reads_received_per_rank: vec![0; num_ranks],
            writes_received_per_rank: vec![0; num_ranks],
            total_transactions: 0,
            histogram: LatencyHistogram::default(),
            read_latencies: Vec::new(),
            write_latencies: Vec::new(),
        }
    }

    fn index(&self, rank: usize, bank: usize) -> usize {
        rank * self.num_banks + bank
    }

    pub fn num_ranks(&self) -> usize {
        self.reads_received_per_rank.len()
    }

    /// Records a completed read.
    pub fn record_read(&mut self, rank: usize, bank: usize, latency: u64) {
        let i = self.index(rank, bank);
        self.reads_per_bank[i] += 1;
        self.epoch_latency_per_bank[i] += latency;
        self.total_transactions += 1;
        self.read_latencies.push(latency);
        self.histogram.record(latency);
    }

    /// Records a write whose data has reached the data bus.
    pub fn record_write(&mut self, rank: usize, bank: usize, latency: u64) {
        let i = self.index(rank, bank);
        self.writes_per_bank[i] += 1;
        self.total_transactions += 1;
        self.write_latencies.push(latency);
    }

    pub fn reads(&self, rank: usize, bank: usize) -> u64 {
        self.reads_per_bank[self.index(rank, bank)]
    }

    pub fn writes(&self, rank: usize, bank: usize) -> u64 {
        self.writes_per_bank[self.index(rank, bank)]
    }

    /// Moves this epoch's bank accesses into the grand totals and clears the
    /// per-epoch counters.
    pub fn reset_epoch(&mut self) {
        for i in 0..self.reads_per_bank.len() {
            self.grand_total_bank_accesses[i] += self.reads_per_bank[i] + self.writes_per_bank[i];
            self.reads_per_bank[i] = 0;
            self.writes_per_bank[i] = 0;
            self.epoch_latency_per_bank[i] = 0;
        }
    }

    /// Builds the report of the current epoch.
    pub fn epoch_report(&self, ctx: &ReportContext<'_>) -> EpochReport {
        let cycles = ctx.cycle.max(1) as f64;
        let seconds = cycles * ctx.t_ck * 1e-9;
        let power_deno = cycles * ctx.t_ck * 1e3;
        let bytes = ctx.bytes_per_transaction;
        let gbps = |count: u64| (count as f64 * bytes as f64 / GIB) / seconds;

        let mut banks = Vec::with_capacity(self.reads_per_bank.len());
        let mut ranks = Vec::with_capacity(self.num_ranks());
        let mut read_latency_cycles = 0;
        let (mut reads, mut writes) = (0, 0);

        for (rank, energy) in ctx.energy.iter().enumerate() {
            let (mut rank_reads, mut rank_writes) = (0, 0);
            for bank in 0..self.num_banks {
                let i = self.index(rank, bank);
                let r = self.reads_per_bank[i];
                let w = self.writes_per_bank[i];
                let average_latency_ns = if r == 0 {
                    0.0
                } else {
                    self.epoch_latency_per_bank[i] as f64 / r as f64 * ctx.t_ck
                };
                banks.push(BankReport {
                    rank,
                    bank,
                    reads: r,
                    writes: w,
                    bandwidth_gbps: gbps(r + w),
                    average_latency_ns,
                });
                read_latency_cycles += self.epoch_latency_per_bank[i];
                rank_reads += r;
                rank_writes += w;
            }
            reads += rank_reads;
            writes += rank_writes;
            ranks.push(RankReport {
                rank,
                reads: rank_reads,
                writes: rank_writes,
                reads_received: self.reads_received_per_rank[rank],
                writes_received: self.writes_received_per_rank[rank],
                background_power: energy.background / power_deno,
                actpre_power: energy.actpre / power_deno,
                burst_power: energy.burst / power_deno,
                refresh_power: energy.refresh / power_deno,
                average_power: (energy.burst + energy.refresh + energy.actpre) / power_deno,
                energy: *energy,
            });
        }

        EpochReport {
            channel: ctx.channel,
            memory: ctx.memory_type_name(),
            cycle: ctx.cycle,
            final_stats: ctx.final_stats,
            bytes_per_transaction: bytes,
            total_transactions: self.total_transactions,
            total_bytes: self.total_transactions * bytes,
            bandwidth_gbps: banks.iter().map(|b| b.bandwidth_gbps).sum(),
            read_bandwidth_gbps: gbps(reads),
            write_bandwidth_gbps: gbps(writes),
            read_latency_cycles,
            average_read_latency_ns: if reads == 0 {
                0.0
            } else {
                read_latency_cycles as f64 / reads as f64 * ctx.t_ck
            },
            reads,
            writes,
            pending_reads: ctx.pending_reads,
            banks,
            ranks,
            histogram: ctx.final_stats.then(|| self.histogram.bins().clone()),
            grand_total_bank_accesses: ctx.final_stats.then(|| {
                (0..self.reads_per_bank.len())
                    .map(|i| {
                        self.grand_total_bank_accesses[i]
                            + self.reads_per_bank[i]
                            + self.writes_per_bank[i]
                    })
                    .collect()
            }),
        }
    }
}

/// Controller state needed to turn counters into a report.
#[derive(Debug)]
pub struct ReportContext<'a> {
    pub channel: usize,
    pub memory_type: MemoryType,
    pub cycle: u64,
    pub final_stats: bool,
    pub t_ck: f64,
    pub bytes_per_transaction: u64,
    pub energy: &'a [EnergyAccumulators],
    pub pending_reads: usize,
}

impl ReportContext<'_> {
    fn memory_type_name(&self) -> &'static str {
        match self.memory_type {
            MemoryType::Dram => "dram",
            MemoryType::Nvm => "nvm",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BankReport {
    pub rank: usize,
    pub bank: usize,
    pub reads: u64,
    pub writes: u64,
    pub bandwidth_gbps: f64,
    pub average_latency_ns: f64,
}

/// Per-rank traffic and power. Power figures are in watts.
#[derive(Clone, Debug, Serialize)]
pub struct RankReport {
    pub rank: usize,
    pub reads: u64,
    pub writes: u64,
    pub reads_received: u64,
    pub writes_received: u64,
    pub background_power: f64,
    pub actpre_power: f64,
    pub burst_power: f64,
    pub refresh_power: f64,
    pub average_power: f64,
    pub energy: EnergyAccumulators,
}

/// Statistics of one channel for one epoch.
#[derive(Clone, Debug, Serialize)]
pub struct EpochReport {
    pub channel: usize,
    pub memory: &'static str,
    pub cycle: u64,
    pub final_stats: bool,
    pub bytes_per_transaction: u64,
    pub total_transactions: u64,
    pub total_bytes: u64,
    pub bandwidth_gbps: f64,
    pub read_bandwidth_gbps: f64,
    pub write_bandwidth_gbps: f64,
    pub read_latency_cycles: u64,
    pub average_read_latency_ns: f64,
    pub reads: u64,
    pub writes: u64,
    pub pending_reads: usize,
    pub banks: Vec<BankReport>,
    pub ranks: Vec<RankReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histogram: Option<BTreeMap<u64, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grand_total_bank_accesses: Option<Vec<u64>>,
}

impl EpochReport {
    /// Writes the human-readable report.
    pub fn write_text(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "\n==========================================================")?;
        writeln!(
            out,
            "CHANNEL {} ({}) STATISTICS @ cycle {}",
            self.channel,
            self.memory.to_uppercase(),
            self.cycle
        )?;
        writeln!(out, "==========================================================")?;
        writeln!(
            out,
            "transactions             {} ({} bytes)",
            self.total_transactions, self.total_bytes
        )?;
        writeln!(out, "bandwidth                {:.3} GB/s", self.bandwidth_gbps)?;
        writeln!(out, "  bw.read                {:.3} GB/s", self.read_bandwidth_gbps)?;
        writeln!(out, "  bw.write               {:.3} GB/s", self.write_bandwidth_gbps)?;
        writeln!(out, "latency.read             {:.3} ns", self.average_read_latency_ns)?;
        for r in &self.ranks {
            writeln!(out, "----------------------------------------------------------")?;
            writeln!(out, "RANK {}", r.rank)?;
            writeln!(
                out,
                "  reads                  {} ({} bytes)",
                r.reads,
                r.reads * self.bytes_per_transaction
            )?;
            writeln!(
                out,
                "  writes                 {} ({} bytes)",
                r.writes,
                r.writes * self.bytes_per_transaction
            )?;
            writeln!(
                out,
                "  received               {} reads, {} writes",
                r.reads_received, r.writes_received
            )?;
            writeln!(out, "  power.average          {:.3} W", r.average_power)?;
            writeln!(out, "  power.actpre           {:.3} W", r.actpre_power)?;
            writeln!(out, "  power.burst            {:.3} W", r.burst_power)?;
            writeln!(out, "  power.refresh          {:.3} W", r.refresh_power)?;
        }
        if let Some(histogram) = &self.histogram {
            writeln!(out, "----------------------------------------------------------")?;
            writeln!(out, "READ LATENCY HISTOGRAM ({} bins)", histogram.len())?;
            for (start, count) in histogram {
                let label = format!("[{}-{}]", start, start + HISTOGRAM_BIN_SIZE - 1);
                writeln!(out, "  {:<22} {}", label, count)?;
            }
        }
        if let Some(totals) = &self.grand_total_bank_accesses {
            let per_rank = self.banks.len() / self.ranks.len().max(1);
            writeln!(out, "----------------------------------------------------------")?;
            writeln!(out, "BANK USAGE")?;
            for (rank, chunk) in totals.chunks(per_rank.max(1)).enumerate() {
                let row: Vec<String> = chunk.iter().map(u64::to_string).collect();
                writeln!(out, "  rank {:<17} {}", rank, row.join(" "))?;
            }
        }
        writeln!(out, "----------------------------------------------------------")?;
        writeln!(out, "pending_reads            {}", self.pending_reads)?;
        Ok(())
    }
}

/// Per-memory-type counters for the session summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub reads: u64,
    pub writes: u64,
    pub row_buffer_hits: u64,
    pub commands: CommandCounts,
}

/// Totals accumulated across every channel and epoch of a session.
#[derive(Clone, Debug, Default)]
pub struct SessionTotals {
    pub bandwidth: f64,
    pub read_bandwidth: f64,
    pub write_bandwidth: f64,
    pub read_latency_cycles: u64,
    pub reads: u64,
    pub writes: u64,
    pub actpre_energy: f64,
    pub burst_energy: f64,
    pub refresh_energy: f64,
    pub read_latencies: Vec<u64>,
    pub write_latencies: Vec<u64>,
    pub dram: KindCounts,
    pub nvm: KindCounts,
}

impl SessionTotals {
    /// Adds one epoch report of one channel.
    pub fn fold(&mut self, report: &EpochReport) {
        self.bandwidth += report.bandwidth_gbps;
        self.read_bandwidth += report.read_bandwidth_gbps;
        self.write_bandwidth += report.write_bandwidth_gbps;
        self.read_latency_cycles += report.read_latency_cycles;
        self.reads += report.reads;
        self.writes += report.writes;
        for r in &report.ranks {
            self.actpre_energy += r.energy.actpre;
            self.burst_energy += r.energy.burst;
            self.refresh_energy += r.energy.refresh;
        }
    }

    /// Adds the run-long counters of a channel once it has finished.
    pub fn absorb_channel(
        &mut self,
        memory_type: MemoryType,
        stats: &ChannelStats,
        commands: CommandCounts,
        row_buffer_hits: u64,
    ) {
        self.read_latencies.extend_from_slice(&stats.read_latencies);
        self.write_latencies.extend_from_slice(&stats.write_latencies);
        let kind = match memory_type {
            MemoryType::Dram => &mut self.dram,
            MemoryType::Nvm => &mut self.nvm,
        };
        kind.reads += stats.reads_received_per_rank.iter().sum::<u64>();
        kind.writes += stats.writes_received_per_rank.iter().sum::<u64>();
        kind.row_buffer_hits += row_buffer_hits;
        kind.commands.act_pre += commands.act_pre;
        kind.commands.burst += commands.burst;
        kind.commands.refresh += commands.refresh;
    }

    /// Builds the end-of-run summary for a session of `cycles` cycles.
    pub fn summary(&self, cycles: u64, t_ck: f64) -> SessionSummary {
        let deno = cycles.max(1) as f64 * t_ck * 1e3;
        let total_energy = self.actpre_energy + self.burst_energy + self.refresh_energy;
        let mean = |sum: u64, n: usize| {
            if n == 0 {
                0.0
            } else {
                sum as f64 / n as f64 * t_ck
            }
        };
        SessionSummary {
            cycles,
            bandwidth_gbps: self.bandwidth,
            read_bandwidth_gbps: self.read_bandwidth,
            write_bandwidth_gbps: self.write_bandwidth,
            read_latency_ns: mean(self.read_latency_cycles, self.reads as usize),
            write_latency_ns: mean(
                self.write_latencies.iter().sum(),
                self.write_latencies.len(),
            ),
            reads: self.reads,
            writes: self.writes,
            dram: self.dram,
            nvm: self.nvm,
            total_power: total_energy / deno,
            actpre_power: self.actpre_energy / deno,
            burst_power: self.burst_energy / deno,
            refresh_power: self.refresh_energy / deno,
            total_energy: total_energy / 1e9,
            actpre_energy: self.actpre_energy / 1e9,
            burst_energy: self.burst_energy / 1e9,
            refresh_energy: self.refresh_energy / 1e9,
            read_deciles: deciles(&self.read_latencies),
            write_deciles: deciles(&self.write_latencies),
        }
    }
}

/// Latency at each tenth of the sorted sample, in cycles.
///
/// Decile `m` is element `len * m / 10 - 1`, clamped to the first element.
/// An empty sample yields all zeros.
pub fn deciles(samples: &[u64]) -> Vec<u64> {
    if samples.is_empty() {
        return vec![0; 10];
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    (1..=10)
        .map(|m| {
            let idx = (sorted.len() * m / 10).saturating_sub(1);
            sorted[idx]
        })
        .collect()
}

/// End-of-run summary of a whole session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub cycles: u64,
    pub bandwidth_gbps: f64,
    pub read_bandwidth_gbps: f64,
    pub write_bandwidth_gbps: f64,
    pub read_latency_ns: f64,
    pub write_latency_ns: f64,
    pub reads: u64,
    pub writes: u64,
    pub dram: KindCounts,
    pub nvm: KindCounts,
    pub total_power: f64,
    pub actpre_power: f64,
    pub burst_power: f64,
    pub refresh_power: f64,
    pub total_energy: f64,
    pub actpre_energy: f64,
    pub burst_energy: f64,
    pub refresh_energy: f64,
    pub read_deciles: Vec<u64>,
    pub write_deciles: Vec<u64>,
}

impl SessionSummary {
    /// Writes the summary in the same layout as the epoch reports.
    pub fn write_text(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "\n==========================================================")?;
        writeln!(out, "MEMORY SYSTEM SUMMARY")?;
        writeln!(out, "==========================================================")?;
        writeln!(out, "sim_cycles               {}", self.cycles)?;
        writeln!(out, "bandwidth                {:.3} GB/s", self.bandwidth_gbps)?;
        writeln!(out, "  bw.read                {:.3} GB/s", self.read_bandwidth_gbps)?;
        writeln!(out, "  bw.write               {:.3} GB/s", self.write_bandwidth_gbps)?;
        writeln!(out, "latency.read             {:.3} ns", self.read_latency_ns)?;
        writeln!(out, "latency.write            {:.3} ns", self.write_latency_ns)?;
        writeln!(out, "reads                    {}", self.reads)?;
        writeln!(out, "writes                   {}", self.writes)?;
        writeln!(out, "----------------------------------------------------------")?;
        writeln!(out, "TRAFFIC BY MEMORY TYPE")?;
        for (name, k) in [("dram", &self.dram), ("nvm", &self.nvm)] {
            let rows = [
                ("reads", k.reads),
                ("writes", k.writes),
                ("row_hits", k.row_buffer_hits),
                ("cmd.actpre", k.commands.act_pre),
                ("cmd.burst", k.commands.burst),
                ("cmd.refresh", k.commands.refresh),
            ];
            for (field, value) in rows {
                writeln!(out, "  {:<22} {}", format!("{}.{}", name, field), value)?;
            }
        }
        writeln!(out, "----------------------------------------------------------")?;
        writeln!(out, "POWER / ENERGY")?;
        writeln!(out, "  power.total            {:.3} W", self.total_power)?;
        writeln!(out, "  power.actpre           {:.3} W", self.actpre_power)?;
        writeln!(out, "  power.burst            {:.3} W", self.burst_power)?;
        writeln!(out, "  power.refresh          {:.3} W", self.refresh_power)?;
        writeln!(out, "  energy.total           {:.6} J", self.total_energy)?;
        writeln!(out, "  energy.actpre          {:.6} J", self.actpre_energy)?;
        writeln!(out, "  energy.burst           {:.6} J", self.burst_energy)?;
        writeln!(out, "  energy.refresh         {:.6} J", self.refresh_energy)?;
        writeln!(out, "----------------------------------------------------------")?;
        writeln!(out, "LATENCY DECILES (cycles)")?;
        let fmt = |v: &[u64]| v.iter().map(u64::to_string).collect::<Vec<_>>().join(" ");
        writeln!(out, "  read                   {}", fmt(&self.read_deciles))?;
        writeln!(out, "  write                  {}", fmt(&self.write_deciles))?;
        writeln!(out, "==========================================================")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_bins_by_ten() {
        let mut h = LatencyHistogram::default();
        for lat in [3, 9, 10, 25] {
            h.record(lat);
        }
        assert_eq!(h.bins().get(&0), Some(&2));
        assert_eq!(h.bins().get(&10), Some(&1));
        assert_eq!(h.bins().get(&20), Some(&1));
        assert_eq!(h.count(), 4);
    }

    #[test]
    fn deciles_clamp_small_samples() {
        assert_eq!(deciles(&[7]), vec![7; 10]);
        let d = deciles(&(1..=20).rev().collect::<Vec<_>>());
        assert_eq!(d[0], 2);
        assert_eq!(d[9], 20);
    }
}
