//! Legacy `key=value` parameter files.
//!
//! Device and system parameters can also come from two flat files, one per
//! scope, with `;` comments. Every recognised key has a fixed type and scope;
//! values are stored as a tagged [`ParamValue`] and turned into a regular
//! [`Config`] once both files and any command-line overrides are in.
//!
//! Unknown keys and keys found in the other scope's file are warnings.
//! Unset booleans default to `false`, unset strings keep the TOML default,
//! and an unset numeric key is an error.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::common::error::{SimError, SimResult};
use crate::config::Config;

/// File a parameter belongs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamScope {
    Device,
    System,
}

/// Type of a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    UInt,
    Float,
    Bool,
    Str,
}

/// A parsed parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    UInt(u64),
    Float(f64),
    Bool(bool),
    Str(String),
}

/// Definition of one recognised key.
#[derive(Debug)]
pub struct ParamSpec {
    pub key: &'static str,
    pub kind: ParamKind,
    pub scope: ParamScope,
}

const fn dev(key: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec {
        key,
        kind,
        scope: ParamScope::Device,
    }
}

const fn sys(key: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec {
        key,
        kind,
        scope: ParamScope::System,
    }
}

use ParamKind::{Bool, Float, Str, UInt};

/// Every key the reader understands.
pub static PARAMS: &[ParamSpec] = &[
    dev("NUM_BANKS", UInt),
    dev("NUM_ROWS", UInt),
    dev("NUM_COLS", UInt),
    dev("DEVICE_WIDTH", UInt),
    dev("REFRESH_PERIOD", UInt),
    dev("tCK", Float),
    dev("CL", UInt),
    dev("AL", UInt),
    dev("BL", UInt),
    dev("tRAS", UInt),
    dev("tRCD", UInt),
    dev("tRRD", UInt),
    dev("tRC", UInt),
    dev("tRP", UInt),
    dev("tCCD", UInt),
    dev("tRTP", UInt),
    dev("tWTR", UInt),
    dev("tWR", UInt),
    dev("tRTRS", UInt),
    dev("tRFC", UInt),
    dev("tFAW", UInt),
    dev("tCKE", UInt),
    dev("tXP", UInt),
    dev("tCMD", UInt),
    dev("IDD0", UInt),
    dev("IDD1", UInt),
    dev("IDD2P", UInt),
    dev("IDD2Q", UInt),
    dev("IDD2N", UInt),
    dev("IDD3Pf", UInt),
    dev("IDD3Ps", UInt),
    dev("IDD3N", UInt),
    dev("IDD4W", UInt),
    dev("IDD4R", UInt),
    dev("IDD5", UInt),
    dev("IDD6", UInt),
    dev("IDD6L", UInt),
    dev("IDD7", UInt),
    dev("Vdd", Float),
    dev("ArrayReadEnergy", Float),
    dev("ArrayWriteEnergy", Float),
    dev("RowBufferReadEnergy", Float),
    dev("RowBufferWriteEnergy", Float),
    sys("NUM_CHANS", UInt),
    sys("JEDEC_DATA_BUS_BITS", UInt),
    sys("TRANS_QUEUE_DEPTH", UInt),
    sys("CMD_QUEUE_DEPTH", UInt),
    sys("EPOCH_LENGTH", UInt),
    sys("USE_LOW_POWER", Bool),
    sys("TOTAL_ROW_ACCESSES", UInt),
    sys("ROW_BUFFER_POLICY", Str),
    sys("SCHEDULING_POLICY", Str),
    sys("ADDRESS_MAPPING_SCHEME", Str),
    sys("QUEUING_STRUCTURE", Str),
    sys("MEMORY_TYPE", Str),
    sys("DEBUG_TRANS_Q", Bool),
    sys("DEBUG_CMD_Q", Bool),
    sys("DEBUG_ADDR_MAP", Bool),
    sys("DEBUG_BANKSTATE", Bool),
    sys("DEBUG_BUS", Bool),
    sys("DEBUG_BANKS", Bool),
    sys("DEBUG_POWER", Bool),
    sys("VIS_FILE_OUTPUT", Bool),
    sys("VERIFICATION_OUTPUT", Bool),
];

const MAPPING_SCHEMES: [&str; 7] = [
    "scheme1", "scheme2", "scheme3", "scheme4", "scheme5", "scheme6", "scheme7",
];

/// Typed name-to-value parameter store.
#[derive(Clone, Debug, Default)]
pub struct ParamRegistry {
    values: BTreeMap<&'static str, ParamValue>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the definition of `key`.
    pub fn spec(key: &str) -> Option<&'static ParamSpec> {
        PARAMS.iter().find(|p| p.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Parses and stores one value.
    ///
    /// `file_scope` is the scope of the file being read, or `None` for a
    /// command-line override, which skips the misplaced-key check.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if a numeric key gets a non-numeric value.
    pub fn set_key(
        &mut self,
        key: &str,
        value: &str,
        file_scope: Option<ParamScope>,
        line: usize,
    ) -> SimResult<()> {
        let Some(spec) = Self::spec(key) else {
            log::warn!("unknown key '{}' in ini file", key);
            return Ok(());
        };
        let invalid = || SimError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            line,
        };
        let parsed = match spec.kind {
            ParamKind::UInt => ParamValue::UInt(value.parse().map_err(|_| invalid())?),
            ParamKind::Float => ParamValue::Float(value.parse().map_err(|_| invalid())?),
            ParamKind::Bool => ParamValue::Bool(value == "true" || value == "1"),
            ParamKind::Str => ParamValue::Str(value.to_string()),
        };
        match (file_scope, spec.scope) {
            (Some(ParamScope::System), ParamScope::Device) => {
                log::warn!("found device parameter {} in system config file", key)
            }
            (Some(ParamScope::Device), ParamScope::System) => {
                log::warn!("found system parameter {} in device config file", key)
            }
            _ => {}
        }
        log::debug!("set {}={:?}", key, parsed);
        self.values.insert(spec.key, parsed);
        Ok(())
    }

    /// Reads the contents of one parameter file.
    ///
    /// # Errors
    ///
    /// Fails on a line without `=` or on a non-numeric numeric value.
    pub fn read_ini(&mut self, contents: &str, scope: ParamScope) -> SimResult<()> {
        for (i, raw) in contents.lines().enumerate() {
            let line_number = i + 1;
            let line = match raw.find(';') {
                Some(at) => &raw[..at],
                None => raw,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(SimError::MalformedLine(line_number))?;
            self.set_key(key.trim(), value.trim(), Some(scope), line_number)?;
        }
        Ok(())
    }

    pub fn read_ini_file(&mut self, path: impl AsRef<Path>, scope: ParamScope) -> SimResult<()> {
        let contents = fs::read_to_string(path)?;
        self.read_ini(&contents, scope)
    }

    /// Splits `KEY=value,KEY=value` into pairs; malformed items are skipped
    /// with a warning.
    pub fn parse_overrides(list: &str) -> Vec<(String, String)> {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .filter_map(|item| match item.split_once('=') {
                Some((k, v)) => Some((k.trim().to_string(), v.trim().to_string())),
                None => {
                    log::warn!("ignoring override '{}' (expected KEY=value)", item);
                    None
                }
            })
            .collect()
    }

    /// Applies command-line overrides after the files have been read.
    pub fn override_keys(&mut self, overrides: &[(String, String)]) -> SimResult<()> {
        for (key, value) in overrides {
            log::info!("override {} -> {}", key, value);
            self.set_key(key, value, None, 0)?;
        }
        Ok(())
    }

    /// Checks that every numeric key was set and defaults unset booleans.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` for the first unset numeric key.
    pub fn check(&mut self) -> SimResult<()> {
        for spec in PARAMS {
            if self.values.contains_key(spec.key) {
                continue;
            }
            match spec.kind {
                ParamKind::UInt | ParamKind::Float => {
                    return Err(SimError::MissingParameter(spec.key.to_string()));
                }
                ParamKind::Bool => {
                    log::warn!("key {} not found in ini file, defaulting to false", spec.key);
                    self.values.insert(spec.key, ParamValue::Bool(false));
                }
                ParamKind::Str => {
                    log::debug!("key {} not found in ini file, keeping default", spec.key);
                }
            }
        }
        Ok(())
    }

    fn uint(&self, key: &str) -> SimResult<u64> {
        match self.values.get(key) {
            Some(ParamValue::UInt(v)) => Ok(*v),
            _ => Err(SimError::MissingParameter(key.to_string())),
        }
    }

    fn float(&self, key: &str) -> SimResult<f64> {
        match self.values.get(key) {
            Some(ParamValue::Float(v)) => Ok(*v),
            _ => Err(SimError::MissingParameter(key.to_string())),
        }
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(ParamValue::Bool(true)))
    }

    fn string(&self, key: &str) -> Option<String> {
        match self.values.get(key) {
            Some(ParamValue::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Number of channels requested by `NUM_CHANS` (at least one).
    pub fn num_channels(&self) -> usize {
        self.uint("NUM_CHANS").map_or(1, |n| n.max(1) as usize)
    }

    /// Builds the configuration, validating it.
    ///
    /// `total_storage_mb` overrides the channel capacity when given.
    pub fn to_config(&mut self, total_storage_mb: Option<u64>) -> SimResult<Config> {
        self.check()?;
        let mut config = Config::default();

        let d = &mut config.device;
        d.num_banks = self.uint("NUM_BANKS")? as usize;
        d.num_rows = self.uint("NUM_ROWS")?;
        d.num_cols = self.uint("NUM_COLS")?;
        d.device_width = self.uint("DEVICE_WIDTH")?;
        d.refresh_period = self.uint("REFRESH_PERIOD")?;
        d.t_ck = self.float("tCK")?;
        d.cl = self.uint("CL")?;
        d.al = self.uint("AL")?;
        d.bl = self.uint("BL")?;
        d.t_ras = self.uint("tRAS")?;
        d.t_rcd = self.uint("tRCD")?;
        d.t_rrd = self.uint("tRRD")?;
        d.t_rc = self.uint("tRC")?;
        d.t_rp = self.uint("tRP")?;
        d.t_ccd = self.uint("tCCD")?;
        d.t_rtp = self.uint("tRTP")?;
        d.t_wtr = self.uint("tWTR")?;
        d.t_wr = self.uint("tWR")?;
        d.t_rtrs = self.uint("tRTRS")?;
        d.t_rfc = self.uint("tRFC")?;
        d.t_faw = self.uint("tFAW")?;
        d.t_cke = self.uint("tCKE")?;
        d.t_xp = self.uint("tXP")?;
        d.t_cmd = self.uint("tCMD")?;
        d.vdd = self.float("Vdd")?;
        d.array_read_energy = self.float("ArrayReadEnergy")?;
        d.array_write_energy = self.float("ArrayWriteEnergy")?;
        d.row_buffer_read_energy = self.float("RowBufferReadEnergy")?;
        d.row_buffer_write_energy = self.float("RowBufferWriteEnergy")?;

        let c = &mut d.currents;
        c.idd0 = self.uint("IDD0")?;
        c.idd1 = self.uint("IDD1")?;
        c.idd2p = self.uint("IDD2P")?;
        c.idd2q = self.uint("IDD2Q")?;
        c.idd2n = self.uint("IDD2N")?;
        c.idd3pf = self.uint("IDD3Pf")?;
        c.idd3ps = self.uint("IDD3Ps")?;
        c.idd3n = self.uint("IDD3N")?;
        c.idd4w = self.uint("IDD4W")?;
        c.idd4r = self.uint("IDD4R")?;
        c.idd5 = self.uint("IDD5")?;
        c.idd6 = self.uint("IDD6")?;
        c.idd6l = self.uint("IDD6L")?;
        c.idd7 = self.uint("IDD7")?;

        let s = &mut config.system;
        s.jedec_data_bus_bits = self.uint("JEDEC_DATA_BUS_BITS")?;
        s.trans_queue_depth = self.uint("TRANS_QUEUE_DEPTH")? as usize;
        s.cmd_queue_depth = self.uint("CMD_QUEUE_DEPTH")? as usize;
        s.epoch_length = self.uint("EPOCH_LENGTH")?;
        s.use_low_power = self.flag("USE_LOW_POWER");
        s.total_row_accesses = self.uint("TOTAL_ROW_ACCESSES")?;
        if let Some(v) = self.string("ROW_BUFFER_POLICY") {
            s.row_buffer_policy = v.to_ascii_lowercase();
        }
        if let Some(v) = self.string("SCHEDULING_POLICY") {
            s.scheduling_policy = v.to_ascii_lowercase();
        }
        if let Some(v) = self.string("QUEUING_STRUCTURE") {
            s.queuing_structure = v.to_ascii_lowercase();
        }
        if let Some(v) = self.string("MEMORY_TYPE") {
            s.memory_type = v;
        }
        if let Some(total) = total_storage_mb {
            s.total_storage_mb = total;
        }

        match self.string("ADDRESS_MAPPING_SCHEME") {
            Some(scheme) if !MAPPING_SCHEMES.contains(&scheme.as_str()) => log::warn!(
                "unknown address mapping scheme '{}', using low-order interleaving",
                scheme
            ),
            _ => {}
        }
        let debug_flags: Vec<&str> = PARAMS
            .iter()
            .filter(|p| p.key.starts_with("DEBUG_") && self.flag(p.key))
            .map(|p| p.key)
            .collect();
        if !debug_flags.is_empty() {
            log::info!(
                "{} requested; per-cycle traces are emitted at RUST_LOG=trace",
                debug_flags.join(", ")
            );
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let mut p = ParamRegistry::new();
        p.read_ini("; header\n\nCL=11 ; trailing\n  \nAL=1\t\n", ParamScope::Device)
            .unwrap();
        assert_eq!(p.get("CL"), Some(&ParamValue::UInt(11)));
        assert_eq!(p.get("AL"), Some(&ParamValue::UInt(1)));
    }

    #[test]
    fn line_without_equals_reports_its_number() {
        let mut p = ParamRegistry::new();
        let err = p.read_ini("CL=10\nBL 8\n", ParamScope::Device).unwrap_err();
        assert!(matches!(err, SimError::MalformedLine(2)));
    }

    #[test]
    fn booleans_accept_true_or_one() {
        let mut p = ParamRegistry::new();
        p.set_key("USE_LOW_POWER", "1", None, 0).unwrap();
        assert_eq!(p.get("USE_LOW_POWER"), Some(&ParamValue::Bool(true)));
        p.set_key("USE_LOW_POWER", "yes", None, 0).unwrap();
        assert_eq!(p.get("USE_LOW_POWER"), Some(&ParamValue::Bool(false)));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut p = ParamRegistry::new();
        p.set_key("NOT_A_KEY", "3", Some(ParamScope::System), 4).unwrap();
        assert!(!p.is_set("NOT_A_KEY"));
    }
}
