//! Channel configuration.
//!
//! A [`Config`] has a `[device]` table (geometry, timing, currents, energies)
//! and a `[system]` table (queues, policies, memory type). It is normally
//! loaded from TOML; legacy `key=value` files go through [`ini::ParamRegistry`]
//! and produce the same structure.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::common::error::{SimError, SimResult};

/// Legacy key=value parameter files.
pub mod ini;

const DEFAULT_TOTAL_STORAGE_MB: u64 = 2048;
const DEFAULT_QUEUE_DEPTH: usize = 32;
const DEFAULT_EPOCH_LENGTH: u64 = 100_000;

/// Kind of memory behind a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryType {
    /// Volatile DRAM; needs periodic refresh.
    Dram,
    /// Persistent phase-change memory; never refreshed.
    Nvm,
}

/// Whether a row is left open after a column access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowBufferPolicy {
    OpenPage,
    ClosePage,
}

/// Order in which the command queue visits its queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulingPolicy {
    RankThenBankRoundRobin,
    BankThenRankRoundRobin,
}

/// Granularity of the command queue's storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueuingStructure {
    PerRank,
    PerRankPerBank,
}

/// Full channel configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

/// Device-level parameters, as printed on a part's datasheet.
///
/// Timing values are in clock cycles except `refresh_period` (ns) and
/// `t_ck` (ns per cycle).
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_num_banks")]
    pub num_banks: usize,
    #[serde(default = "default_num_rows")]
    pub num_rows: u64,
    #[serde(default = "default_num_cols")]
    pub num_cols: u64,
    #[serde(default = "default_device_width")]
    pub device_width: u64,

    #[serde(default = "default_refresh_period")]
    pub refresh_period: u64,
    #[serde(default = "default_t_ck")]
    pub t_ck: f64,
    #[serde(default = "default_cl")]
    pub cl: u64,
    #[serde(default)]
    pub al: u64,
    #[serde(default = "default_bl")]
    pub bl: u64,
    #[serde(default = "default_t_ras")]
    pub t_ras: u64,
    #[serde(default = "default_t_rcd")]
    pub t_rcd: u64,
    #[serde(default = "default_t_rrd")]
    pub t_rrd: u64,
    #[serde(default = "default_t_rc")]
    pub t_rc: u64,
    #[serde(default = "default_t_rp")]
    pub t_rp: u64,
    #[serde(default = "default_t_ccd")]
    pub t_ccd: u64,
    #[serde(default = "default_t_rtp")]
    pub t_rtp: u64,
    #[serde(default = "default_t_wtr")]
    pub t_wtr: u64,
    #[serde(default = "default_t_wr")]
    pub t_wr: u64,
    #[serde(default = "default_t_rtrs")]
    pub t_rtrs: u64,
    #[serde(default = "default_t_rfc")]
    pub t_rfc: u64,
    #[serde(default = "default_t_faw")]
    pub t_faw: u64,
    #[serde(default = "default_t_cke")]
    pub t_cke: u64,
    #[serde(default = "default_t_xp")]
    pub t_xp: u64,
    #[serde(default = "default_t_cmd")]
    pub t_cmd: u64,

    #[serde(default)]
    pub currents: CurrentConfig,
    #[serde(default = "default_vdd")]
    pub vdd: f64,

    #[serde(default = "default_array_read_energy")]
    pub array_read_energy: f64,
    #[serde(default = "default_array_write_energy")]
    pub array_write_energy: f64,
    #[serde(default = "default_row_buffer_read_energy")]
    pub row_buffer_read_energy: f64,
    #[serde(default = "default_row_buffer_write_energy")]
    pub row_buffer_write_energy: f64,
}

/// IDD currents in mA.
#[derive(Debug, Deserialize, Clone)]
pub struct CurrentConfig {
    #[serde(default = "d_idd0")]
    pub idd0: u64,
    #[serde(default = "d_idd1")]
    pub idd1: u64,
    #[serde(default = "d_idd2p")]
    pub idd2p: u64,
    #[serde(default = "d_idd2q")]
    pub idd2q: u64,
    #[serde(default = "d_idd2n")]
    pub idd2n: u64,
    #[serde(default = "d_idd3pf")]
    pub idd3pf: u64,
    #[serde(default = "d_idd3ps")]
    pub idd3ps: u64,
    #[serde(default = "d_idd3n")]
    pub idd3n: u64,
    #[serde(default = "d_idd4w")]
    pub idd4w: u64,
    #[serde(default = "d_idd4r")]
    pub idd4r: u64,
    #[serde(default = "d_idd5")]
    pub idd5: u64,
    #[serde(default = "d_idd6")]
    pub idd6: u64,
    #[serde(default = "d_idd6l")]
    pub idd6l: u64,
    #[serde(default = "d_idd7")]
    pub idd7: u64,
}

/// Controller and system-level parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    #[serde(default = "default_memory_type")]
    pub memory_type: String,

    #[serde(default = "default_bus_bits")]
    pub jedec_data_bus_bits: u64,

    #[serde(default = "default_queue_depth")]
    pub trans_queue_depth: usize,

    #[serde(default = "default_queue_depth")]
    pub cmd_queue_depth: usize,

    #[serde(default = "default_epoch_length")]
    pub epoch_length: u64,

    #[serde(default = "default_use_low_power")]
    pub use_low_power: bool,

    #[serde(default = "default_total_row_accesses")]
    pub total_row_accesses: u64,

    #[serde(default = "default_row_buffer_policy")]
    pub row_buffer_policy: String,

    #[serde(default = "default_scheduling_policy")]
    pub scheduling_policy: String,

    #[serde(default = "default_queuing_structure")]
    pub queuing_structure: String,

    /// Channel capacity in MB; determines the rank count.
    #[serde(default = "default_total_storage")]
    pub total_storage_mb: u64,

    /// Explicit rank count, overriding `total_storage_mb`.
    #[serde(default)]
    pub num_ranks: Option<usize>,
}

impl Config {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> SimResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects parameter sets the controller cannot run with.
    pub fn validate(&self) -> SimResult<()> {
        let d = &self.device;
        let s = &self.system;
        if d.num_banks == 0 || d.num_rows == 0 || d.num_cols == 0 || d.device_width == 0 {
            return Err(SimError::InvalidConfig(
                "device geometry must be non-zero".to_string(),
            ));
        }
        if d.bl < 2 || d.bl % 2 != 0 {
            return Err(SimError::InvalidConfig(format!(
                "burst length must be even and at least 2, got {}",
                d.bl
            )));
        }
        if d.cl + d.al == 0 {
            return Err(SimError::InvalidConfig("CL + AL must be at least 1".to_string()));
        }
        if d.t_cmd == 0 {
            return Err(SimError::InvalidConfig("tCMD must be at least 1".to_string()));
        }
        if d.t_ck <= 0.0 {
            return Err(SimError::InvalidConfig("tCK must be positive".to_string()));
        }
        if s.trans_queue_depth == 0 || s.cmd_queue_depth < 2 {
            return Err(SimError::InvalidConfig(
                "transaction queue needs one slot and command queues two".to_string(),
            ));
        }
        if s.jedec_data_bus_bits < d.device_width {
            return Err(SimError::InvalidConfig(
                "data bus is narrower than one device".to_string(),
            ));
        }
        self.memory_type_val()?;
        Ok(())
    }

    /// Read latency, `CL + AL`.
    pub fn rl(&self) -> u64 {
        self.device.cl + self.device.al
    }

    /// Write latency, `RL - 1`.
    pub fn wl(&self) -> u64 {
        self.rl().saturating_sub(1)
    }

    /// Devices ganged on the data bus of one rank.
    pub fn num_devices(&self) -> u64 {
        self.system.jedec_data_bus_bits / self.device.device_width
    }

    /// Capacity of one rank in MB.
    pub fn megs_per_rank(&self) -> u64 {
        let d = &self.device;
        let bits = d.num_rows * (d.num_cols * d.device_width) * d.num_banks as u64;
        (bits * self.num_devices() / 8) >> 20
    }

    /// Rank count, from the explicit override or the channel capacity.
    pub fn num_ranks(&self) -> usize {
        if let Some(n) = self.system.num_ranks {
            return n.max(1);
        }
        if self.system.total_storage_mb == 0 {
            return 1;
        }
        let per_rank = self.megs_per_rank().max(1);
        let ranks = self.system.total_storage_mb / per_rank;
        if ranks == 0 {
            log::warn!(
                "cannot create memory system with {}MB, defaulting to minimum size of {}MB",
                self.system.total_storage_mb,
                per_rank
            );
            return 1;
        }
        ranks as usize
    }

    /// Refresh interval in clock cycles.
    pub fn refresh_period_cycles(&self) -> u64 {
        (self.device.refresh_period as f64 / self.device.t_ck) as u64
    }

    /// Bytes moved by one read or write burst.
    pub fn bytes_per_transaction(&self) -> u64 {
        self.system.jedec_data_bus_bits * self.device.bl / 8
    }

    /// Parsed memory type; an unknown value is fatal.
    pub fn memory_type_val(&self) -> SimResult<MemoryType> {
        match self.system.memory_type.to_ascii_lowercase().as_str() {
            "dram" => Ok(MemoryType::Dram),
            "nvm" | "pcm" => Ok(MemoryType::Nvm),
            other => Err(SimError::UnknownMemoryType(other.to_string())),
        }
    }

    /// Parsed row buffer policy, defaulting to close page.
    pub fn row_buffer_policy_val(&self) -> RowBufferPolicy {
        match self.system.row_buffer_policy.as_str() {
            "open_page" => RowBufferPolicy::OpenPage,
            "close_page" => RowBufferPolicy::ClosePage,
            other => {
                log::warn!(
                    "unknown row buffer policy '{}'; valid values are 'open_page' or 'close_page', defaulting to close page",
                    other
                );
                RowBufferPolicy::ClosePage
            }
        }
    }

    /// Parsed scheduling policy, defaulting to bank-then-rank.
    pub fn scheduling_policy_val(&self) -> SchedulingPolicy {
        match self.system.scheduling_policy.as_str() {
            "rank_then_bank_round_robin" => SchedulingPolicy::RankThenBankRoundRobin,
            "bank_then_rank_round_robin" => SchedulingPolicy::BankThenRankRoundRobin,
            other => {
                log::warn!(
                    "unknown scheduling policy '{}'; defaulting to bank_then_rank_round_robin",
                    other
                );
                SchedulingPolicy::BankThenRankRoundRobin
            }
        }
    }

    /// Parsed queuing structure, defaulting to per rank per bank.
    pub fn queuing_structure_val(&self) -> QueuingStructure {
        match self.system.queuing_structure.as_str() {
            "per_rank_per_bank" => QueuingStructure::PerRankPerBank,
            "per_rank" => QueuingStructure::PerRank,
            other => {
                log::warn!(
                    "unknown queuing structure '{}'; defaulting to per_rank_per_bank",
                    other
                );
                QueuingStructure::PerRankPerBank
            }
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            num_banks: default_num_banks(),
            num_rows: default_num_rows(),
            num_cols: default_num_cols(),
            device_width: default_device_width(),
            refresh_period: default_refresh_period(),
            t_ck: default_t_ck(),
            cl: default_cl(),
            al: 0,
            bl: default_bl(),
            t_ras: default_t_ras(),
            t_rcd: default_t_rcd(),
            t_rrd: default_t_rrd(),
            t_rc: default_t_rc(),
            t_rp: default_t_rp(),
            t_ccd: default_t_ccd(),
            t_rtp: default_t_rtp(),
            t_wtr: default_t_wtr(),
            t_wr: default_t_wr(),
            t_rtrs: default_t_rtrs(),
            t_rfc: default_t_rfc(),
            t_faw: default_t_faw(),
            t_cke: default_t_cke(),
            t_xp: default_t_xp(),
            t_cmd: default_t_cmd(),
            currents: CurrentConfig::default(),
            vdd: default_vdd(),
            array_read_energy: default_array_read_energy(),
            array_write_energy: default_array_write_energy(),
            row_buffer_read_energy: default_row_buffer_read_energy(),
            row_buffer_write_energy: default_row_buffer_write_energy(),
        }
    }
}

impl Default for CurrentConfig {
    fn default() -> Self {
        Self {
            idd0: d_idd0(),
            idd1: d_idd1(),
            idd2p: d_idd2p(),
            idd2q: d_idd2q(),
            idd2n: d_idd2n(),
            idd3pf: d_idd3pf(),
            idd3ps: d_idd3ps(),
            idd3n: d_idd3n(),
            idd4w: d_idd4w(),
            idd4r: d_idd4r(),
            idd5: d_idd5(),
            idd6: d_idd6(),
            idd6l: d_idd6l(),
            idd7: d_idd7(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            memory_type: default_memory_type(),
            jedec_data_bus_bits: default_bus_bits(),
            trans_queue_depth: default_queue_depth(),
            cmd_queue_depth: default_queue_depth(),
            epoch_length: default_epoch_length(),
            use_low_power: default_use_low_power(),
            total_row_accesses: default_total_row_accesses(),
            row_buffer_policy: default_row_buffer_policy(),
            scheduling_policy: default_scheduling_policy(),
            queuing_structure: default_queuing_structure(),
            total_storage_mb: default_total_storage(),
            num_ranks: None,
        }
    }
}

fn default_num_banks() -> usize {
    8
}

fn default_num_rows() -> u64 {
    16384
}

fn default_num_cols() -> u64 {
    1024
}

fn default_device_width() -> u64 {
    8
}

fn default_refresh_period() -> u64 {
    7800
}

fn default_t_ck() -> f64 {
    1.5
}

fn default_cl() -> u64 {
    10
}

fn default_bl() -> u64 {
    8
}

fn default_t_ras() -> u64 {
    24
}

fn default_t_rcd() -> u64 {
    10
}

fn default_t_rrd() -> u64 {
    4
}

fn default_t_rc() -> u64 {
    34
}

fn default_t_rp() -> u64 {
    10
}

fn default_t_ccd() -> u64 {
    4
}

fn default_t_rtp() -> u64 {
    5
}

fn default_t_wtr() -> u64 {
    5
}

fn default_t_wr() -> u64 {
    10
}

fn default_t_rtrs() -> u64 {
    1
}

fn default_t_rfc() -> u64 {
    74
}

fn default_t_faw() -> u64 {
    20
}

fn default_t_cke() -> u64 {
    4
}

fn default_t_xp() -> u64 {
    4
}

fn default_t_cmd() -> u64 {
    1
}

fn default_vdd() -> f64 {
    1.5
}

fn default_array_read_energy() -> f64 {
    1.17
}

fn default_array_write_energy() -> f64 {
    0.39
}

fn default_row_buffer_read_energy() -> f64 {
    0.93
}

fn default_row_buffer_write_energy() -> f64 {
    1.02
}

fn d_idd0() -> u64 {
    110
}

fn d_idd1() -> u64 {
    150
}

fn d_idd2p() -> u64 {
    12
}

fn d_idd2q() -> u64 {
    60
}

fn d_idd2n() -> u64 {
    65
}

fn d_idd3pf() -> u64 {
    40
}

fn d_idd3ps() -> u64 {
    40
}

fn d_idd3n() -> u64 {
    62
}

fn d_idd4w() -> u64 {
    220
}

fn d_idd4r() -> u64 {
    200
}

fn d_idd5() -> u64 {
    240
}

fn d_idd6() -> u64 {
    6
}

fn d_idd6l() -> u64 {
    9
}

fn d_idd7() -> u64 {
    490
}

fn default_memory_type() -> String {
    "dram".to_string()
}

fn default_bus_bits() -> u64 {
    64
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

fn default_epoch_length() -> u64 {
    DEFAULT_EPOCH_LENGTH
}

fn default_use_low_power() -> bool {
    true
}

fn default_total_row_accesses() -> u64 {
    4
}

fn default_row_buffer_policy() -> String {
    "open_page".to_string()
}

fn default_scheduling_policy() -> String {
    "rank_then_bank_round_robin".to_string()
}

fn default_queuing_structure() -> String {
    "per_rank_per_bank".to_string()
}

fn default_total_storage() -> u64 {
    DEFAULT_TOTAL_STORAGE_MB
}
