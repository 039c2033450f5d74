//! Energy Accounting and Low-Power Policy.
//!
//! Energy is charged per issued command from array and row-buffer energy
//! constants, and per cycle per rank from one of three background currents.
//! The accountant also decides when an idle rank should enter power-down and
//! when a powered-down rank must wake up.

use serde::Serialize;

use crate::config::Config;
use crate::dram::packet::{BusPacket, CommandKind};

/// Energy totals of one rank for the current epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct EnergyAccumulators {
    pub background: f64,
    pub burst: f64,
    pub actpre: f64,
    pub refresh: f64,
}

impl EnergyAccumulators {
    pub fn total(&self) -> f64 {
        self.background + self.burst + self.actpre + self.refresh
    }
}

/// Issued-command counts, accumulated over the whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommandCounts {
    pub act_pre: u64,
    pub burst: u64,
    pub refresh: u64,
}

/// Outcome of the low-power check for one rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerDecision {
    Enter,
    Exit,
    Stay,
}

/// Per-rank energy model.
#[derive(Clone, Debug)]
pub struct PowerAccountant {
    energy: Vec<EnergyAccumulators>,
    counts: CommandCounts,
    activate_energy: f64,
    restore_energy: f64,
    read_burst_energy: f64,
    write_burst_energy: f64,
    refresh_energy: f64,
    active_background: f64,
    powerdown_background: f64,
    idle_background: f64,
    use_low_power: bool,
}

impl PowerAccountant {
    pub fn new(config: &Config, num_ranks: usize) -> Self {
        let d = &config.device;
        let bus = config.system.jedec_data_bus_bits as f64;
        let cols = d.num_cols as f64;
        let devices = config.num_devices() as f64;
        let refresh_ratio = if d.t_rc == 0 { 0 } else { d.t_rfc / d.t_rc };
        Self {
            energy: vec![EnergyAccumulators::default(); num_ranks],
            counts: CommandCounts::default(),
            activate_energy: d.array_read_energy * cols * bus,
            restore_energy: d.array_write_energy * cols * bus,
            read_burst_energy: d.row_buffer_read_energy * bus * d.bl as f64,
            write_burst_energy: d.row_buffer_write_energy * bus * d.bl as f64,
            refresh_energy: (d.array_read_energy + d.array_write_energy)
                * cols
                * d.device_width as f64
                * 8.0
                * d.num_banks as f64
                * refresh_ratio as f64,
            active_background: d.currents.idd3n as f64 * devices,
            powerdown_background: d.currents.idd2p as f64 * devices,
            idle_background: d.currents.idd2n as f64 * devices,
            use_low_power: config.system.use_low_power,
        }
    }

    /// Charges the energy of an issued command to its rank.
    pub fn record_command(&mut self, cmd: &BusPacket) {
        let e = &mut self.energy[cmd.rank];
        match cmd.kind {
            CommandKind::Activate => {
                e.actpre += self.activate_energy;
                self.counts.act_pre += 1;
            }
            CommandKind::Precharge => {
                e.actpre += self.restore_energy;
                self.counts.act_pre += 1;
            }
            CommandKind::Read => {
                e.burst += self.read_burst_energy;
                self.counts.burst += 1;
            }
            CommandKind::ReadP => {
                e.actpre += self.restore_energy;
                e.burst += self.read_burst_energy;
                self.counts.act_pre += 1;
                self.counts.burst += 1;
            }
            CommandKind::Write => {
                e.burst += self.write_burst_energy;
                self.counts.burst += 1;
            }
            CommandKind::WriteP => {
                e.actpre += self.restore_energy;
                e.burst += self.write_burst_energy;
                self.counts.act_pre += 1;
                self.counts.burst += 1;
            }
            CommandKind::Refresh => {
                e.refresh += self.refresh_energy;
                self.counts.refresh += 1;
            }
            CommandKind::Data => {}
        }
    }

    /// Accrues one cycle of background energy for `rank`.
    ///
    /// `any_active` means some bank has a row open or is refreshing.
    pub fn accrue_background(&mut self, rank: usize, any_active: bool, powered_down: bool) {
        let rate = if any_active {
            self.active_background
        } else if powered_down {
            self.powerdown_background
        } else {
            self.idle_background
        };
        self.energy[rank].background += rate;
    }

    /// Low-power decision for one rank.
    ///
    /// An idle rank with nothing queued and no refresh waiting enters
    /// power-down; a powered-down rank leaves it once work or a refresh
    /// appears and its power-up window has opened.
    pub fn decide(
        &self,
        queue_empty: bool,
        refresh_waiting: bool,
        all_idle: bool,
        powered_down: bool,
        now: u64,
        next_power_up: u64,
    ) -> PowerDecision {
        if !self.use_low_power {
            return PowerDecision::Stay;
        }
        if queue_empty && !refresh_waiting {
            if all_idle && !powered_down {
                return PowerDecision::Enter;
            }
        } else if powered_down && now >= next_power_up {
            return PowerDecision::Exit;
        }
        PowerDecision::Stay
    }

    pub fn energy(&self, rank: usize) -> &EnergyAccumulators {
        &self.energy[rank]
    }

    pub fn counts(&self) -> CommandCounts {
        self.counts
    }

    /// Clears the per-epoch energy totals; command counts persist.
    pub fn reset_epoch(&mut self) {
        for e in &mut self.energy {
            *e = EnergyAccumulators::default();
        }
    }
}
