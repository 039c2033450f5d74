//! Timing Parameters.
//!
//! Holds the raw JEDEC-style constants of a device in clock cycles and
//! computes the composite delays the bank state machine applies. All
//! composite delays saturate at zero instead of wrapping.

use crate::config::Config;

/// Raw timing constants, in clock cycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimingParams {
    pub cl: u64,
    pub al: u64,
    pub bl: u64,
    pub rl: u64,
    pub wl: u64,
    pub t_ras: u64,
    pub t_rcd: u64,
    pub t_rrd: u64,
    pub t_rc: u64,
    pub t_rp: u64,
    pub t_ccd: u64,
    pub t_rtp: u64,
    pub t_wtr: u64,
    pub t_wr: u64,
    pub t_rtrs: u64,
    pub t_rfc: u64,
    pub t_faw: u64,
    pub t_cke: u64,
    pub t_xp: u64,
    pub t_cmd: u64,
}

/// Named delay, resolved against a [`TimingParams`] by [`TimingParams::delay`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delay {
    /// `tRC`
    Rc,
    /// `tRAS`
    Ras,
    /// `tRCD - AL`
    RcdMinusAl,
    /// `tRRD`
    Rrd,
    /// `tRP`
    Rp,
    /// `tRFC`
    Rfc,
    /// `max(tCCD, BL/2)`
    ColumnToColumn,
    /// `BL/2 + tRTRS`
    RankSwitch,
    /// `AL + BL/2 + max(tRTP, 2) - 2`
    ReadToPre,
    /// `WL + BL/2 + tWR`
    WriteToPre,
    /// `RL + BL/2 + tRTRS - WL`
    ReadToWrite,
    /// `AL + tRTP + tRP`
    ReadAutoPre,
    /// `WL + BL/2 + tWR + tRP`
    WriteAutoPre,
    /// `WL + BL/2 + tWTR`
    WriteToReadBank,
    /// `WL + BL/2 + tRTRS - RL`
    WriteToReadRank,
    /// `AL + tRTP`, the row release of a close-page NVM read.
    NvmReadRelease,
    /// `AL + BL/2`
    NvmReadCountdown,
}

impl TimingParams {
    /// Extracts the timing constants of `config`.
    pub fn from_config(config: &Config) -> Self {
        let d = &config.device;
        Self {
            cl: d.cl,
            al: d.al,
            bl: d.bl,
            rl: config.rl(),
            wl: config.wl(),
            t_ras: d.t_ras,
            t_rcd: d.t_rcd,
            t_rrd: d.t_rrd,
            t_rc: d.t_rc,
            t_rp: d.t_rp,
            t_ccd: d.t_ccd,
            t_rtp: d.t_rtp,
            t_wtr: d.t_wtr,
            t_wr: d.t_wr,
            t_rtrs: d.t_rtrs,
            t_rfc: d.t_rfc,
            t_faw: d.t_faw,
            t_cke: d.t_cke,
            t_xp: d.t_xp,
            t_cmd: d.t_cmd,
        }
    }

    /// Cycles a burst occupies the data bus.
    pub fn burst_cycles(&self) -> u64 {
        self.bl / 2
    }

    /// Resolves a named delay to cycles.
    pub fn delay(&self, d: Delay) -> u64 {
        let half = self.burst_cycles();
        match d {
            Delay::Rc => self.t_rc,
            Delay::Ras => self.t_ras,
            Delay::RcdMinusAl => self.t_rcd.saturating_sub(self.al),
            Delay::Rrd => self.t_rrd,
            Delay::Rp => self.t_rp,
            Delay::Rfc => self.t_rfc,
            Delay::ColumnToColumn => self.t_ccd.max(half),
            Delay::RankSwitch => half + self.t_rtrs,
            Delay::ReadToPre => (self.al + half + self.t_rtp.max(2)).saturating_sub(2),
            Delay::WriteToPre => self.wl + half + self.t_wr,
            Delay::ReadToWrite => (self.rl + half + self.t_rtrs).saturating_sub(self.wl),
            Delay::ReadAutoPre => self.al + self.t_rtp + self.t_rp,
            Delay::WriteAutoPre => self.wl + half + self.t_wr + self.t_rp,
            Delay::WriteToReadBank => self.wl + half + self.t_wtr,
            Delay::WriteToReadRank => (self.wl + half + self.t_rtrs).saturating_sub(self.rl),
            Delay::NvmReadRelease => self.al + self.t_rtp,
            Delay::NvmReadCountdown => self.al + half,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ddr3() -> TimingParams {
        TimingParams::from_config(&Config::default())
    }

    #[test]
    fn derived_delays_match_ddr3_defaults() {
        let t = ddr3();
        assert_eq!(t.rl, 10);
        assert_eq!(t.wl, 9);
        assert_eq!(t.delay(Delay::ReadToPre), 4 + 5 - 2);
        assert_eq!(t.delay(Delay::WriteToPre), 9 + 4 + 10);
        assert_eq!(t.delay(Delay::ReadToWrite), 10 + 4 + 1 - 9);
        assert_eq!(t.delay(Delay::WriteToReadBank), 9 + 4 + 5);
        assert_eq!(t.delay(Delay::WriteToReadRank), 9 + 4 + 1 - 10);
        assert_eq!(t.delay(Delay::ColumnToColumn), 4);
    }

    #[test]
    fn write_to_read_rank_floors_at_zero() {
        let mut t = ddr3();
        t.rl = 40;
        assert_eq!(t.delay(Delay::WriteToReadRank), 0);
    }
}
