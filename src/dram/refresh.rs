//! Refresh Scheduling.
//!
//! Each rank of a volatile channel must be refreshed once per refresh
//! period. Countdowns are staggered at start-up so that ranks fall due one
//! after another, and a round-robin pointer hands them to the command queue
//! in that order. A rank sitting in power-down is flagged early enough that
//! the power policy can wake it before its refresh falls due.

use crate::config::MemoryType;

/// Per-rank refresh and power bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RankState {
    /// Rank is in power-down.
    pub powered_down: bool,
    /// Cycles until the rank's next refresh falls due.
    pub refresh_countdown: u64,
    /// A refresh has been requested and not yet delivered.
    pub refresh_waiting: bool,
}

/// What the controller must do for the rank under the refresh pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshAction {
    /// The rank is due; tell the command queue to refresh it.
    Refresh(usize),
    /// The rank is powered down and due within `tXP`; it must be woken.
    Wake(usize),
}

/// Staggered per-rank refresh countdowns.
#[derive(Clone, Debug)]
pub struct RefreshManager {
    ranks: Vec<RankState>,
    period: u64,
    t_xp: u64,
    /// `None` on persistent memory, which is never refreshed.
    next_rank: Option<usize>,
}

impl RefreshManager {
    /// Creates the manager with rank `i` first due at
    /// `ceil(period / num_ranks) * (i + 1)`.
    pub fn new(num_ranks: usize, period: u64, t_xp: u64, memory_type: MemoryType) -> Self {
        let n = num_ranks.max(1) as u64;
        let step = period.div_ceil(n);
        let ranks = (0..num_ranks)
            .map(|i| RankState {
                powered_down: false,
                refresh_countdown: step * (i as u64 + 1),
                refresh_waiting: false,
            })
            .collect();
        let next_rank = match memory_type {
            MemoryType::Dram if num_ranks > 0 => Some(0),
            _ => None,
        };
        Self {
            ranks,
            period,
            t_xp,
            next_rank,
        }
    }

    /// Returns `true` when no refresh will ever be requested.
    pub fn is_inert(&self) -> bool {
        self.next_rank.is_none()
    }

    pub fn rank(&self, rank: usize) -> &RankState {
        &self.ranks[rank]
    }

    pub fn rank_mut(&mut self, rank: usize) -> &mut RankState {
        &mut self.ranks[rank]
    }

    pub fn ranks(&self) -> &[RankState] {
        &self.ranks
    }

    /// Checks the rank under the round-robin pointer.
    ///
    /// A due rank is marked waiting, its countdown is reset to a full period
    /// and the pointer moves on.
    pub fn poll(&mut self) -> Option<RefreshAction> {
        let r = self.next_rank?;
        let n = self.ranks.len();
        let state = &mut self.ranks[r];
        if state.refresh_countdown == 0 {
            state.refresh_waiting = true;
            state.refresh_countdown = self.period;
            self.next_rank = Some((r + 1) % n);
            log::debug!("rank {} due for refresh", r);
            Some(RefreshAction::Refresh(r))
        } else if state.powered_down && state.refresh_countdown <= self.t_xp {
            state.refresh_waiting = true;
            Some(RefreshAction::Wake(r))
        } else {
            None
        }
    }

    /// Clears the waiting flag once REFRESH has reached the rank.
    pub fn refresh_delivered(&mut self, rank: usize) {
        self.ranks[rank].refresh_waiting = false;
    }

    /// Decrements every countdown by one cycle.
    pub fn tick(&mut self) {
        for state in &mut self.ranks {
            state.refresh_countdown = state.refresh_countdown.saturating_sub(1);
        }
    }
}
