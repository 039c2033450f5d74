//! Command Queue.
//!
//! The controller hands translated commands to a [`CommandQueue`] and pops
//! at most one issuable command per cycle. The queue owns the issuability
//! decision; the controller applies whatever it pops without re-checking.
//!
//! [`BankQueues`] is the reference implementation. It keeps one FIFO per
//! bank (or per rank) and visits them round robin. A command is issuable
//! when the bank state machine's table allows it and, for ACTIVATE, fewer
//! than four activates are in flight inside the rank's `tFAW` window.

use std::collections::VecDeque;

use crate::config::{
    Config, MemoryType, QueuingStructure, RowBufferPolicy, SchedulingPolicy,
};
use crate::dram::bank::{BankPhase, BankTable, ReadMode};
use crate::dram::packet::{BusPacket, CommandKind};

const FAW_ACTIVATES: usize = 4;

/// Contract between the controller and its command storage.
pub trait CommandQueue {
    /// Stores a command. Callers check [`CommandQueue::has_room_for`] first.
    fn enqueue(&mut self, packet: BusPacket);

    /// Removes and returns one command that may be issued this cycle.
    fn pop(&mut self, banks: &BankTable) -> Option<BusPacket>;

    /// Returns `true` if `n` more commands fit in the queue of (rank, bank).
    fn has_room_for(&self, n: usize, rank: usize, bank: usize) -> bool;

    /// Returns `true` if nothing is queued for `rank`.
    fn is_empty(&self, rank: usize) -> bool;

    /// Requests a refresh of `rank`.
    fn need_refresh(&mut self, rank: usize);

    /// Advances the queue's clock by one cycle.
    fn step(&mut self);

    /// ACTIVATEs skipped because their row was already open.
    fn row_hits(&self) -> u64 {
        0
    }
}

/// Round-robin per-bank (or per-rank) command FIFOs.
#[derive(Debug)]
pub struct BankQueues {
    queues: Vec<Vec<VecDeque<BusPacket>>>,
    depth: usize,
    structure: QueuingStructure,
    scheduling: SchedulingPolicy,
    row_policy: RowBufferPolicy,
    read_mode: ReadMode,
    total_row_accesses: u64,
    t_faw: u64,
    /// Next (rank, queue) to visit.
    next: (usize, usize),
    pending_refresh: VecDeque<usize>,
    /// Remaining tFAW cycles of each recent activate, per rank.
    faw: Vec<VecDeque<u64>>,
    row_accesses: Vec<Vec<u64>>,
    clock: u64,
    row_hits: u64,
}

impl BankQueues {
    pub fn new(config: &Config, num_ranks: usize, memory_type: MemoryType) -> Self {
        let structure = config.queuing_structure_val();
        let row_policy = config.row_buffer_policy_val();
        let num_banks = config.device.num_banks;
        let per_rank = match structure {
            QueuingStructure::PerRank => 1,
            QueuingStructure::PerRankPerBank => num_banks,
        };
        let read_mode = if memory_type == MemoryType::Nvm && row_policy == RowBufferPolicy::ClosePage
        {
            ReadMode::NvmClosePage
        } else {
            ReadMode::Standard
        };
        Self {
            queues: vec![vec![VecDeque::new(); per_rank]; num_ranks],
            depth: config.system.cmd_queue_depth,
            structure,
            scheduling: config.scheduling_policy_val(),
            row_policy,
            read_mode,
            total_row_accesses: config.system.total_row_accesses.max(1),
            t_faw: config.device.t_faw,
            next: (0, 0),
            pending_refresh: VecDeque::new(),
            faw: vec![VecDeque::new(); num_ranks],
            row_accesses: vec![vec![0; num_banks]; num_ranks],
            clock: 0,
            row_hits: 0,
        }
    }

    /// Commands queued for (rank, bank).
    pub fn len(&self, rank: usize, bank: usize) -> usize {
        let q = self.queue_index(bank);
        self.queues[rank][q]
            .iter()
            .filter(|p| p.bank == bank)
            .count()
    }

    fn queue_index(&self, bank: usize) -> usize {
        match self.structure {
            QueuingStructure::PerRank => 0,
            QueuingStructure::PerRankPerBank => bank,
        }
    }

    fn advance(&self, (rank, q): (usize, usize)) -> (usize, usize) {
        let ranks = self.queues.len();
        let per_rank = self.queues.first().map_or(1, Vec::len);
        match self.scheduling {
            SchedulingPolicy::RankThenBankRoundRobin => {
                if rank + 1 < ranks {
                    (rank + 1, q)
                } else {
                    (0, (q + 1) % per_rank)
                }
            }
            SchedulingPolicy::BankThenRankRoundRobin => {
                if q + 1 < per_rank {
                    (rank, q + 1)
                } else {
                    ((rank + 1) % ranks, 0)
                }
            }
        }
    }

    fn is_row_hit(&self, packet: &BusPacket, banks: &BankTable) -> bool {
        let bank = banks.get(packet.rank, packet.bank);
        self.row_policy == RowBufferPolicy::OpenPage
            && bank.phase == BankPhase::RowActive
            && bank.state_change_countdown == 0
            && bank.open_row == Some(packet.row)
            && self.row_accesses[packet.rank][packet.bank] < self.total_row_accesses
    }

    fn can_issue(&self, packet: &BusPacket, banks: &BankTable) -> bool {
        if !banks.is_issuable(packet, self.read_mode, self.clock) {
            return false;
        }
        match packet.kind {
            CommandKind::Activate => self.faw[packet.rank].len() < FAW_ACTIVATES,
            kind if kind.is_column() => {
                banks.get(packet.rank, packet.bank).open_row == Some(packet.row)
            }
            _ => true,
        }
    }

    /// Scans one queue, considering only the oldest command of each bank.
    fn take_issuable(&mut self, rank: usize, q: usize, banks: &BankTable) -> Option<BusPacket> {
        let mut seen: Vec<usize> = Vec::new();
        let mut idx = 0;
        while idx < self.queues[rank][q].len() {
            let (bank, hit, ready) = {
                let p = &self.queues[rank][q][idx];
                let hit = p.kind == CommandKind::Activate && self.is_row_hit(p, banks);
                (p.bank, hit, !hit && self.can_issue(p, banks))
            };
            if seen.contains(&bank) {
                idx += 1;
                continue;
            }
            if hit {
                self.queues[rank][q].remove(idx);
                self.row_hits += 1;
                continue;
            }
            if ready {
                return self.queues[rank][q].remove(idx);
            }
            seen.push(bank);
            idx += 1;
        }
        None
    }

    fn first_for_bank(&self, rank: usize, bank: usize) -> Option<&BusPacket> {
        self.queues[rank][self.queue_index(bank)]
            .iter()
            .find(|p| p.bank == bank)
    }

    fn precharge_if_ready(&self, banks: &BankTable, rank: usize, bank: usize) -> Option<BusPacket> {
        let state = banks.get(rank, bank);
        let ready = state.phase == BankPhase::RowActive
            && state.state_change_countdown == 0
            && self.clock >= state.next_precharge;
        ready.then(|| {
            BusPacket::command(
                CommandKind::Precharge,
                0,
                rank,
                bank,
                state.open_row.unwrap_or(0),
                0,
            )
        })
    }

    /// Index of the queued column command that still needs the open `row` of
    /// (rank, bank). Open-page ACTIVATEs of that row queued ahead of it are
    /// passed over.
    fn open_row_command(&self, rank: usize, bank: usize, row: u64) -> Option<usize> {
        let queue = &self.queues[rank][self.queue_index(bank)];
        for (idx, p) in queue.iter().enumerate().filter(|(_, p)| p.bank == bank) {
            match p.kind {
                CommandKind::Activate
                    if self.row_policy == RowBufferPolicy::OpenPage && p.row == row =>
                {
                    continue
                }
                kind if kind.is_column() && p.row == row => return Some(idx),
                _ => return None,
            }
        }
        None
    }

    /// Removes the column command at `idx` and drops the row-hit ACTIVATEs
    /// of the same bank queued ahead of it.
    fn take_open_row_command(&mut self, rank: usize, bank: usize, idx: usize) -> Option<BusPacket> {
        let q = self.queue_index(bank);
        let queue = &mut self.queues[rank][q];
        let packet = queue.remove(idx)?;
        let before = queue.len();
        let mut pos = 0;
        queue.retain(|p| {
            let hit = pos < idx && p.bank == bank && p.kind == CommandKind::Activate;
            pos += 1;
            !hit
        });
        self.row_hits += (before - queue.len()) as u64;
        Some(packet)
    }

    /// Finishes the column commands bound to the rank's open rows, closes
    /// those rows, then refreshes the rank once all banks idle.
    fn refresh_step(&mut self, rank: usize, banks: &BankTable) -> Option<BusPacket> {
        let mut blocked = false;
        for bank in 0..banks.num_banks() {
            let state = banks.get(rank, bank);
            if state.phase != BankPhase::RowActive || state.state_change_countdown != 0 {
                continue;
            }
            if let Some(idx) = state
                .open_row
                .and_then(|row| self.open_row_command(rank, bank, row))
            {
                let q = self.queue_index(bank);
                if self.can_issue(&self.queues[rank][q][idx], banks) {
                    return self.take_open_row_command(rank, bank, idx);
                }
                blocked = true;
                continue;
            }
            if let Some(pre) = self.precharge_if_ready(banks, rank, bank) {
                return Some(pre);
            }
            blocked = true;
        }
        if blocked {
            return None;
        }
        let refresh = BusPacket::command(CommandKind::Refresh, 0, rank, 0, 0, 0);
        if banks.is_issuable(&refresh, self.read_mode, self.clock) {
            self.pending_refresh.pop_front();
            return Some(refresh);
        }
        None
    }

    /// Precharges an open row whose bank is waiting on a different row.
    fn resolve_conflict(&self, banks: &BankTable, skip_rank: Option<usize>) -> Option<BusPacket> {
        for rank in 0..self.queues.len() {
            if Some(rank) == skip_rank {
                continue;
            }
            for bank in 0..banks.num_banks() {
                let conflicted = matches!(
                    self.first_for_bank(rank, bank),
                    Some(p) if p.kind == CommandKind::Activate
                );
                if conflicted {
                    if let Some(pre) = self.precharge_if_ready(banks, rank, bank) {
                        return Some(pre);
                    }
                }
            }
        }
        None
    }

    fn note_issue(&mut self, packet: &BusPacket) {
        match packet.kind {
            CommandKind::Activate => {
                self.faw[packet.rank].push_back(self.t_faw);
                self.row_accesses[packet.rank][packet.bank] = 0;
            }
            CommandKind::Precharge => self.row_accesses[packet.rank][packet.bank] = 0,
            kind if kind.is_column() => self.row_accesses[packet.rank][packet.bank] += 1,
            _ => {}
        }
        log::debug!(
            "cycle {}: issue {:?} r{} b{} row {} col {}",
            self.clock,
            packet.kind,
            packet.rank,
            packet.bank,
            packet.row,
            packet.column
        );
    }
}

impl CommandQueue for BankQueues {
    fn enqueue(&mut self, packet: BusPacket) {
        let q = self.queue_index(packet.bank);
        let queue = &mut self.queues[packet.rank][q];
        if queue.len() >= self.depth {
            log::warn!(
                "command queue r{} q{} over depth {}; caller ignored has_room_for",
                packet.rank,
                q,
                self.depth
            );
        }
        queue.push_back(packet);
    }

    fn pop(&mut self, banks: &BankTable) -> Option<BusPacket> {
        let refreshing = self.pending_refresh.front().copied();
        if let Some(rank) = refreshing {
            if let Some(packet) = self.refresh_step(rank, banks) {
                self.note_issue(&packet);
                return Some(packet);
            }
        }

        let slots = self.queues.len() * self.queues.first().map_or(0, Vec::len);
        let mut cursor = self.next;
        for _ in 0..slots {
            let (rank, q) = cursor;
            cursor = self.advance(cursor);
            if Some(rank) == refreshing {
                continue;
            }
            if let Some(packet) = self.take_issuable(rank, q, banks) {
                self.next = cursor;
                self.note_issue(&packet);
                return Some(packet);
            }
        }

        if self.row_policy == RowBufferPolicy::OpenPage {
            if let Some(packet) = self.resolve_conflict(banks, refreshing) {
                self.note_issue(&packet);
                return Some(packet);
            }
        }
        None
    }

    fn has_room_for(&self, n: usize, rank: usize, bank: usize) -> bool {
        self.queues[rank][self.queue_index(bank)].len() + n <= self.depth
    }

    fn is_empty(&self, rank: usize) -> bool {
        self.queues[rank].iter().all(VecDeque::is_empty)
    }

    fn need_refresh(&mut self, rank: usize) {
        if !self.pending_refresh.contains(&rank) {
            self.pending_refresh.push_back(rank);
        }
    }

    fn step(&mut self) {
        for window in &mut self.faw {
            for left in window.iter_mut() {
                *left = left.saturating_sub(1);
            }
            while window.front() == Some(&0) {
                window.pop_front();
            }
        }
        self.clock += 1;
    }

    fn row_hits(&self) -> u64 {
        self.row_hits
    }
}
