//! Bank State Machine.
//!
//! Every (rank, bank) pair owns a [`BankState`]: its phase, the row it has
//! open and the earliest cycle at which each command class may next be
//! issued to it. Commands change that state through a static transition
//! table keyed by command kind and read mode; the controller looks up the
//! entry and applies it without re-checking timing. The command queue uses
//! the same table to decide what is issuable.
//!
//! Window updates never move a window backwards: each rule computes
//! `now + delay` and keeps the larger of that and the current value.

use std::fmt;

use crate::common::error::{SimError, SimResult};
use crate::dram::packet::{BusPacket, CommandKind};
use crate::dram::timing::{Delay, TimingParams};

/// Phase of one bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BankPhase {
    Idle,
    RowActive,
    Precharging,
    Refreshing,
    PowerDown,
}

impl fmt::Display for BankPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BankPhase::Idle => "idle",
            BankPhase::RowActive => "active",
            BankPhase::Precharging => "pre",
            BankPhase::Refreshing => "ref",
            BankPhase::PowerDown => "lowp",
        };
        f.write_str(s)
    }
}

/// Selects the READ entry of the transition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Regular column read.
    Standard,
    /// Close-page read on persistent memory: the row is released without a
    /// precharge.
    NvmClosePage,
}

/// A timing window of a bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    Activate,
    Read,
    Write,
    Precharge,
    PowerUp,
}

/// Banks a window rule applies to, relative to the addressed bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// The addressed bank only.
    Bank,
    /// Every other bank of the addressed rank.
    OtherBanks,
    /// Every bank of the addressed rank.
    Rank,
    /// Banks of other ranks that currently have a row open.
    OpenBanksOtherRanks,
}

/// `window = max(now + delay, window)` for every bank in `scope`.
#[derive(Clone, Copy, Debug)]
pub struct WindowRule {
    pub scope: Scope,
    pub window: Window,
    pub delay: Delay,
}

/// One row of the transition table.
#[derive(Debug)]
pub struct Transition {
    /// Phases the addressed bank (every bank of the rank, for rank-wide
    /// commands) must be in for the command to be issuable.
    pub from: &'static [BankPhase],
    /// Window that must have opened before the command is issuable.
    pub gate: Window,
    /// Phase entered on issue.
    pub enter: BankPhase,
    /// The phase change and countdown apply to every bank of the rank.
    pub rank_wide: bool,
    /// Countdown started on issue; its expiry is resolved by
    /// [`BankTable::tick_countdowns`].
    pub countdown: Option<Delay>,
    pub windows: &'static [WindowRule],
    /// Raise the bank's read and write windows to its activate window.
    pub column_follows_activate: bool,
}

const fn rule(scope: Scope, window: Window, delay: Delay) -> WindowRule {
    WindowRule {
        scope,
        window,
        delay,
    }
}

static ACTIVATE: Transition = Transition {
    from: &[BankPhase::Idle],
    gate: Window::Activate,
    enter: BankPhase::RowActive,
    rank_wide: false,
    countdown: None,
    windows: &[
        rule(Scope::Bank, Window::Activate, Delay::Rc),
        rule(Scope::Bank, Window::Precharge, Delay::Ras),
        rule(Scope::Bank, Window::Read, Delay::RcdMinusAl),
        rule(Scope::Bank, Window::Write, Delay::RcdMinusAl),
        rule(Scope::OtherBanks, Window::Activate, Delay::Rrd),
    ],
    column_follows_activate: false,
};

const READ_SPACING: [WindowRule; 4] = [
    rule(Scope::Rank, Window::Read, Delay::ColumnToColumn),
    rule(Scope::Rank, Window::Write, Delay::ReadToWrite),
    rule(Scope::OpenBanksOtherRanks, Window::Read, Delay::RankSwitch),
    rule(Scope::OpenBanksOtherRanks, Window::Write, Delay::ReadToWrite),
];

const WRITE_SPACING: [WindowRule; 4] = [
    rule(Scope::Rank, Window::Write, Delay::ColumnToColumn),
    rule(Scope::Rank, Window::Read, Delay::WriteToReadBank),
    rule(Scope::OpenBanksOtherRanks, Window::Write, Delay::RankSwitch),
    rule(Scope::OpenBanksOtherRanks, Window::Read, Delay::WriteToReadRank),
];

static READ: Transition = Transition {
    from: &[BankPhase::RowActive],
    gate: Window::Read,
    enter: BankPhase::RowActive,
    rank_wide: false,
    countdown: None,
    windows: &[
        rule(Scope::Bank, Window::Precharge, Delay::ReadToPre),
        READ_SPACING[0],
        READ_SPACING[1],
        READ_SPACING[2],
        READ_SPACING[3],
    ],
    column_follows_activate: false,
};

static READ_NVM_CLOSE: Transition = Transition {
    from: &[BankPhase::RowActive],
    gate: Window::Read,
    enter: BankPhase::RowActive,
    rank_wide: false,
    countdown: Some(Delay::NvmReadCountdown),
    windows: &[
        rule(Scope::Bank, Window::Activate, Delay::NvmReadRelease),
        READ_SPACING[0],
        READ_SPACING[1],
        READ_SPACING[2],
        READ_SPACING[3],
    ],
    column_follows_activate: false,
};

static READ_P: Transition = Transition {
    from: &[BankPhase::RowActive],
    gate: Window::Read,
    enter: BankPhase::RowActive,
    rank_wide: false,
    countdown: Some(Delay::ReadToPre),
    windows: &[
        rule(Scope::Bank, Window::Activate, Delay::ReadAutoPre),
        READ_SPACING[0],
        READ_SPACING[1],
        READ_SPACING[2],
        READ_SPACING[3],
    ],
    column_follows_activate: true,
};

static WRITE: Transition = Transition {
    from: &[BankPhase::RowActive],
    gate: Window::Write,
    enter: BankPhase::RowActive,
    rank_wide: false,
    countdown: None,
    windows: &[
        rule(Scope::Bank, Window::Precharge, Delay::WriteToPre),
        WRITE_SPACING[0],
        WRITE_SPACING[1],
        WRITE_SPACING[2],
        WRITE_SPACING[3],
    ],
    column_follows_activate: false,
};

static WRITE_P: Transition = Transition {
    from: &[BankPhase::RowActive],
    gate: Window::Write,
    enter: BankPhase::RowActive,
    rank_wide: false,
    countdown: Some(Delay::WriteToPre),
    windows: &[
        rule(Scope::Bank, Window::Activate, Delay::WriteAutoPre),
        WRITE_SPACING[0],
        WRITE_SPACING[1],
        WRITE_SPACING[2],
        WRITE_SPACING[3],
    ],
    column_follows_activate: true,
};

static PRECHARGE: Transition = Transition {
    from: &[BankPhase::RowActive],
    gate: Window::Precharge,
    enter: BankPhase::Precharging,
    rank_wide: false,
    countdown: Some(Delay::Rp),
    windows: &[rule(Scope::Bank, Window::Activate, Delay::Rp)],
    column_follows_activate: false,
};

static REFRESH: Transition = Transition {
    from: &[BankPhase::Idle],
    gate: Window::Activate,
    enter: BankPhase::Refreshing,
    rank_wide: true,
    countdown: Some(Delay::Rfc),
    windows: &[rule(Scope::Rank, Window::Activate, Delay::Rfc)],
    column_follows_activate: false,
};

impl Transition {
    /// Returns the table entry for a command, or `None` for data packets.
    pub fn lookup(kind: CommandKind, mode: ReadMode) -> Option<&'static Transition> {
        match (kind, mode) {
            (CommandKind::Activate, _) => Some(&ACTIVATE),
            (CommandKind::Read, ReadMode::Standard) => Some(&READ),
            (CommandKind::Read, ReadMode::NvmClosePage) => Some(&READ_NVM_CLOSE),
            (CommandKind::ReadP, _) => Some(&READ_P),
            (CommandKind::Write, _) => Some(&WRITE),
            (CommandKind::WriteP, _) => Some(&WRITE_P),
            (CommandKind::Precharge, _) => Some(&PRECHARGE),
            (CommandKind::Refresh, _) => Some(&REFRESH),
            (CommandKind::Data, _) => None,
        }
    }
}

/// State of one bank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BankState {
    /// Current phase of the bank.
    pub phase: BankPhase,
    /// Most recent command applied to the bank.
    pub last_command: Option<CommandKind>,
    /// Cycles until the pending phase change; 0 when none is pending.
    pub state_change_countdown: u64,
    /// Row held in the row buffer, if any.
    pub open_row: Option<u64>,
    /// Earliest cycle an ACTIVATE may issue.
    pub next_activate: u64,
    /// Earliest cycle a READ or READ_P may issue.
    pub next_read: u64,
    /// Earliest cycle a WRITE or WRITE_P may issue.
    pub next_write: u64,
    /// Earliest cycle a PRECHARGE may issue.
    pub next_precharge: u64,
    /// Earliest cycle the rank may leave power-down.
    pub next_power_up: u64,
}

impl Default for BankState {
    fn default() -> Self {
        Self {
            phase: BankPhase::Idle,
            last_command: None,
            state_change_countdown: 0,
            open_row: None,
            next_activate: 0,
            next_read: 0,
            next_write: 0,
            next_precharge: 0,
            next_power_up: 0,
        }
    }
}

impl BankState {
    /// Returns the current value of a window.
    pub fn window(&self, window: Window) -> u64 {
        match window {
            Window::Activate => self.next_activate,
            Window::Read => self.next_read,
            Window::Write => self.next_write,
            Window::Precharge => self.next_precharge,
            Window::PowerUp => self.next_power_up,
        }
    }

    /// Raises a window to `at` if it is currently earlier.
    pub fn raise(&mut self, window: Window, at: u64) {
        let slot = match window {
            Window::Activate => &mut self.next_activate,
            Window::Read => &mut self.next_read,
            Window::Write => &mut self.next_write,
            Window::Precharge => &mut self.next_precharge,
            Window::PowerUp => &mut self.next_power_up,
        };
        *slot = (*slot).max(at);
    }
}

/// Bank states of a whole channel, indexed by rank then bank.
#[derive(Clone, Debug)]
pub struct BankTable {
    banks: Vec<Vec<BankState>>,
    timing: TimingParams,
}

impl BankTable {
    /// Creates a table with every bank idle and every window open.
    pub fn new(num_ranks: usize, num_banks: usize, timing: TimingParams) -> Self {
        Self {
            banks: vec![vec![BankState::default(); num_banks]; num_ranks],
            timing,
        }
    }

    pub fn num_ranks(&self) -> usize {
        self.banks.len()
    }

    pub fn num_banks(&self) -> usize {
        self.banks.first().map_or(0, Vec::len)
    }

    pub fn timing(&self) -> &TimingParams {
        &self.timing
    }

    pub fn get(&self, rank: usize, bank: usize) -> &BankState {
        &self.banks[rank][bank]
    }

    pub fn rank(&self, rank: usize) -> &[BankState] {
        &self.banks[rank]
    }

    /// Iterates over every bank of the channel.
    pub fn iter(&self) -> impl Iterator<Item = &BankState> {
        self.banks.iter().flatten()
    }

    /// Returns `true` if every bank of `rank` is idle.
    pub fn all_idle(&self, rank: usize) -> bool {
        self.banks[rank].iter().all(|b| b.phase == BankPhase::Idle)
    }

    /// Returns `true` if any bank of `rank` has a row open or is refreshing.
    pub fn any_active(&self, rank: usize) -> bool {
        self.banks[rank]
            .iter()
            .any(|b| matches!(b.phase, BankPhase::RowActive | BankPhase::Refreshing))
    }

    /// Returns `true` if `cmd` may be issued at `now`.
    ///
    /// A command is issuable when the addressed bank (every bank of the rank
    /// for REFRESH) is in one of the entry's source phases and its gating
    /// window has opened. Data packets are never issuable.
    pub fn is_issuable(&self, cmd: &BusPacket, mode: ReadMode, now: u64) -> bool {
        let Some(t) = Transition::lookup(cmd.kind, mode) else {
            return false;
        };
        let ready = |b: &BankState| t.from.contains(&b.phase) && now >= b.window(t.gate);
        if t.rank_wide {
            self.banks[cmd.rank].iter().all(ready)
        } else {
            ready(&self.banks[cmd.rank][cmd.bank])
        }
    }

    /// Applies the transition of `cmd` issued at `now`.
    pub fn apply(&mut self, cmd: &BusPacket, mode: ReadMode, now: u64) -> SimResult<()> {
        let t = Transition::lookup(cmd.kind, mode)
            .ok_or(SimError::UnexpectedPacket { kind: cmd.kind })?;
        let countdown = t.countdown.map_or(0, |d| self.timing.delay(d).max(1));

        {
            let targets: Vec<usize> = if t.rank_wide {
                (0..self.num_banks()).collect()
            } else {
                vec![cmd.bank]
            };
            for b in targets {
                let bank = &mut self.banks[cmd.rank][b];
                bank.phase = t.enter;
                bank.last_command = Some(cmd.kind);
                bank.state_change_countdown = countdown;
                match cmd.kind {
                    CommandKind::Activate => bank.open_row = Some(cmd.row),
                    CommandKind::Precharge | CommandKind::Refresh => bank.open_row = None,
                    _ => {}
                }
            }
        }

        for r in t.windows {
            let at = now + self.timing.delay(r.delay);
            self.raise_scope(cmd.rank, cmd.bank, r.scope, r.window, at);
        }

        if t.column_follows_activate {
            let bank = &mut self.banks[cmd.rank][cmd.bank];
            let activate = bank.next_activate;
            bank.raise(Window::Read, activate);
            bank.raise(Window::Write, activate);
        }
        Ok(())
    }

    fn raise_scope(&mut self, rank: usize, bank: usize, scope: Scope, window: Window, at: u64) {
        match scope {
            Scope::Bank => self.banks[rank][bank].raise(window, at),
            Scope::OtherBanks => {
                for (i, b) in self.banks[rank].iter_mut().enumerate() {
                    if i != bank {
                        b.raise(window, at);
                    }
                }
            }
            Scope::Rank => {
                for b in self.banks[rank].iter_mut() {
                    b.raise(window, at);
                }
            }
            Scope::OpenBanksOtherRanks => {
                for (r, banks) in self.banks.iter_mut().enumerate() {
                    if r == rank {
                        continue;
                    }
                    for b in banks.iter_mut().filter(|b| b.phase == BankPhase::RowActive) {
                        b.raise(window, at);
                    }
                }
            }
        }
    }

    /// Advances every pending phase change by one cycle.
    ///
    /// An auto-precharge access chains into a `tRP` precharge; every other
    /// expiry returns the bank to idle.
    pub fn tick_countdowns(&mut self) {
        let t_rp = self.timing.t_rp;
        for bank in self.banks.iter_mut().flatten() {
            if bank.state_change_countdown == 0 {
                continue;
            }
            bank.state_change_countdown -= 1;
            if bank.state_change_countdown > 0 {
                continue;
            }
            match (bank.phase, bank.last_command) {
                (BankPhase::RowActive, Some(CommandKind::ReadP | CommandKind::WriteP)) => {
                    bank.phase = BankPhase::Precharging;
                    bank.last_command = Some(CommandKind::Precharge);
                    bank.state_change_countdown = t_rp.max(1);
                    bank.open_row = None;
                }
                _ => {
                    bank.phase = BankPhase::Idle;
                    bank.open_row = None;
                }
            }
        }
    }

    /// Puts every bank of `rank` into power-down at `now`.
    pub fn power_down(&mut self, rank: usize, now: u64) {
        let t_cke = self.timing.t_cke;
        for bank in self.banks[rank].iter_mut() {
            bank.phase = BankPhase::PowerDown;
            bank.raise(Window::PowerUp, now + t_cke);
        }
    }

    /// Starts the power-up of `rank` at `now`; banks reach idle after `tXP`.
    pub fn power_up(&mut self, rank: usize, now: u64) {
        let t_xp = self.timing.t_xp;
        for bank in self.banks[rank].iter_mut() {
            bank.state_change_countdown = t_xp.max(1);
            bank.raise(Window::Activate, now + t_xp);
        }
    }

    /// One-line rendering of a rank's bank phases.
    pub fn dump(&self, rank: usize) -> String {
        self.banks[rank]
            .iter()
            .map(|b| match (b.phase, b.open_row) {
                (BankPhase::RowActive, Some(row)) => format!("[{}]", row),
                (phase, _) => format!("[{}]", phase),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn table() -> BankTable {
        let mut cfg = Config::default();
        cfg.system.num_ranks = Some(2);
        BankTable::new(2, 8, TimingParams::from_config(&cfg))
    }

    fn cmd(kind: CommandKind, rank: usize, bank: usize) -> BusPacket {
        BusPacket::command(kind, 0, rank, bank, 7, 0)
    }

    #[test]
    fn activate_opens_row_and_spaces_siblings() {
        let mut t = table();
        t.apply(&cmd(CommandKind::Activate, 0, 1), ReadMode::Standard, 100)
            .unwrap();
        let b = t.get(0, 1);
        let tp = *t.timing();
        assert_eq!(b.phase, BankPhase::RowActive);
        assert_eq!(b.open_row, Some(7));
        assert_eq!(b.next_activate, 100 + tp.t_rc);
        assert_eq!(b.next_precharge, 100 + tp.t_ras);
        assert_eq!(b.next_read, 100 + tp.t_rcd - tp.al);
        assert_eq!(t.get(0, 0).next_activate, 100 + tp.t_rrd);
        assert_eq!(t.get(1, 0).next_activate, 0);
    }

    #[test]
    fn windows_never_regress() {
        let mut t = table();
        t.apply(&cmd(CommandKind::Activate, 0, 0), ReadMode::Standard, 100)
            .unwrap();
        let before = t.get(0, 0).next_activate;
        t.apply(&cmd(CommandKind::Precharge, 0, 0), ReadMode::Standard, 101)
            .unwrap();
        assert_eq!(t.get(0, 0).next_activate, before);
    }

    #[test]
    fn read_p_chains_into_precharge_then_idle() {
        let mut t = table();
        let tp = *t.timing();
        t.apply(&cmd(CommandKind::Activate, 0, 0), ReadMode::Standard, 0)
            .unwrap();
        t.apply(&cmd(CommandKind::ReadP, 0, 0), ReadMode::Standard, 10)
            .unwrap();
        let b = t.get(0, 0);
        assert_eq!(b.next_read, b.next_activate);
        for _ in 0..tp.delay(Delay::ReadToPre) {
            t.tick_countdowns();
        }
        assert_eq!(t.get(0, 0).phase, BankPhase::Precharging);
        for _ in 0..tp.t_rp {
            t.tick_countdowns();
        }
        assert_eq!(t.get(0, 0).phase, BankPhase::Idle);
    }

    #[test]
    fn nvm_close_read_releases_row_without_precharge() {
        let mut t = table();
        let tp = *t.timing();
        t.apply(&cmd(CommandKind::Activate, 0, 0), ReadMode::Standard, 0)
            .unwrap();
        t.apply(&cmd(CommandKind::Read, 0, 0), ReadMode::NvmClosePage, 10)
            .unwrap();
        for _ in 0..tp.delay(Delay::NvmReadCountdown) {
            assert_ne!(t.get(0, 0).phase, BankPhase::Precharging);
            t.tick_countdowns();
        }
        assert_eq!(t.get(0, 0).phase, BankPhase::Idle);
    }

    #[test]
    fn refresh_needs_whole_rank_idle() {
        let mut t = table();
        let refresh = cmd(CommandKind::Refresh, 0, 0);
        assert!(t.is_issuable(&refresh, ReadMode::Standard, 0));
        t.apply(&cmd(CommandKind::Activate, 0, 3), ReadMode::Standard, 0)
            .unwrap();
        assert!(!t.is_issuable(&refresh, ReadMode::Standard, 100));
        assert!(t.is_issuable(&cmd(CommandKind::Refresh, 1, 0), ReadMode::Standard, 0));
    }

    #[test]
    fn data_packets_have_no_transition() {
        let mut t = table();
        let err = t.apply(&cmd(CommandKind::Data, 0, 0), ReadMode::Standard, 0);
        assert!(matches!(
            err,
            Err(SimError::UnexpectedPacket {
                kind: CommandKind::Data
            })
        ));
    }
}
