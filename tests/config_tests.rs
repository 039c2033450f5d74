//! Integration tests for configuration loading.

use pretty_assertions::assert_eq;
use rstest::rstest;

use memchannel::common::error::SimError;
use memchannel::config::ini::{ParamRegistry, ParamScope, ParamValue};
use memchannel::config::{
    Config, MemoryType, QueuingStructure, RowBufferPolicy, SchedulingPolicy,
};

const DEVICE_INI: &str = include_str!("../configs/ini/device_ddr3.ini");
const SYSTEM_INI: &str = include_str!("../configs/ini/system.ini");

fn registry() -> ParamRegistry {
    let mut p = ParamRegistry::new();
    p.read_ini(DEVICE_INI, ParamScope::Device).unwrap();
    p.read_ini(SYSTEM_INI, ParamScope::System).unwrap();
    p
}

/// Tests the derived values of the default configuration.
#[test]
fn test_default_derived_values() {
    let cfg = Config::default();
    assert_eq!(cfg.rl(), 10);
    assert_eq!(cfg.wl(), 9);
    assert_eq!(cfg.num_devices(), 8);
    assert_eq!(cfg.megs_per_rank(), 1024);
    assert_eq!(cfg.num_ranks(), 2);
    assert_eq!(cfg.refresh_period_cycles(), 5200);
    assert_eq!(cfg.bytes_per_transaction(), 64);
}

/// Tests that the rank count follows the channel capacity.
#[rstest]
#[case(1024, 1)]
#[case(4096, 4)]
#[case(512, 1)]
fn test_num_ranks_from_storage(#[case] total_mb: u64, #[case] ranks: usize) {
    let mut cfg = Config::default();
    cfg.system.total_storage_mb = total_mb;
    assert_eq!(cfg.num_ranks(), ranks);
}

/// Tests that AL feeds into both read and write latency.
#[test]
fn test_additive_latency_shifts_rl_and_wl() {
    let mut cfg = Config::default();
    cfg.device.al = 2;
    assert_eq!(cfg.rl(), 12);
    assert_eq!(cfg.wl(), 11);
}

/// Tests that the bundled TOML files load and validate.
#[test]
fn test_bundled_toml_configs() {
    let ddr3 = Config::from_toml_str(include_str!("../configs/ddr3.toml")).unwrap();
    assert_eq!(ddr3.memory_type_val().unwrap(), MemoryType::Dram);
    assert_eq!(ddr3.row_buffer_policy_val(), RowBufferPolicy::OpenPage);

    let pcm = Config::from_toml_str(include_str!("../configs/pcm.toml")).unwrap();
    assert_eq!(pcm.memory_type_val().unwrap(), MemoryType::Nvm);
    assert_eq!(pcm.row_buffer_policy_val(), RowBufferPolicy::ClosePage);
    assert_eq!(pcm.device.t_wr, 60);
}

/// Tests that omitted TOML fields take their defaults.
#[test]
fn test_partial_toml_uses_defaults() {
    let cfg = Config::from_toml_str("[device]\ncl = 12\n[system]\nnum_ranks = 1\n").unwrap();
    assert_eq!(cfg.device.cl, 12);
    assert_eq!(cfg.device.t_rcd, Config::default().device.t_rcd);
    assert_eq!(cfg.num_ranks(), 1);
}

/// Tests that unknown policy names fall back to their defaults.
#[test]
fn test_unknown_policies_default() {
    let mut cfg = Config::default();
    cfg.system.row_buffer_policy = "sometimes_open".to_string();
    cfg.system.scheduling_policy = "random".to_string();
    cfg.system.queuing_structure = "global".to_string();
    assert_eq!(cfg.row_buffer_policy_val(), RowBufferPolicy::ClosePage);
    assert_eq!(
        cfg.scheduling_policy_val(),
        SchedulingPolicy::BankThenRankRoundRobin
    );
    assert_eq!(cfg.queuing_structure_val(), QueuingStructure::PerRankPerBank);
    assert!(cfg.validate().is_ok());
}

/// Tests that inconsistent parameters are rejected.
#[rstest]
#[case::odd_burst("[device]\nbl = 3\n")]
#[case::zero_banks("[device]\nnum_banks = 0\n")]
#[case::zero_tck("[device]\nt_ck = 0.0\n")]
#[case::tiny_cmd_queue("[system]\ncmd_queue_depth = 1\n")]
fn test_invalid_toml_rejected(#[case] toml: &str) {
    assert!(matches!(
        Config::from_toml_str(toml),
        Err(SimError::InvalidConfig(_))
    ));
}

/// Tests that an unknown memory type is an error.
#[test]
fn test_unknown_memory_type() {
    let err = Config::from_toml_str("[system]\nmemory_type = \"flash\"\n").unwrap_err();
    assert!(matches!(err, SimError::UnknownMemoryType(ref t) if t == "flash"));
}

/// Tests that the bundled ini pair produces the same device as the defaults.
#[test]
fn test_ini_pair_builds_config() {
    let mut p = registry();
    let cfg = p.to_config(None).unwrap();
    let d = Config::default().device;
    assert_eq!(cfg.device.t_rcd, d.t_rcd);
    assert_eq!(cfg.device.currents.idd4r, d.currents.idd4r);
    assert_eq!(cfg.device.t_ck, 1.5);
    assert_eq!(cfg.system.row_buffer_policy, "open_page");
    assert!(cfg.system.use_low_power);
    assert_eq!(cfg.num_ranks(), 2);
    assert_eq!(p.num_channels(), 1);
}

/// Tests that the storage size passed alongside the ini files sets the rank count.
#[test]
fn test_ini_storage_size() {
    let cfg = registry().to_config(Some(4096)).unwrap();
    assert_eq!(cfg.num_ranks(), 4);
}

/// Tests that a missing numeric key is fatal.
#[test]
fn test_missing_numeric_key() {
    let mut p = ParamRegistry::new();
    let device: String = DEVICE_INI
        .lines()
        .filter(|l| !l.starts_with("tRCD"))
        .collect::<Vec<_>>()
        .join("\n");
    p.read_ini(&device, ParamScope::Device).unwrap();
    p.read_ini(SYSTEM_INI, ParamScope::System).unwrap();

    match p.to_config(None) {
        Err(SimError::MissingParameter(key)) => assert_eq!(key, "tRCD"),
        other => panic!("expected MissingParameter, got {:?}", other),
    }
}

/// Tests that a missing boolean defaults to false.
#[test]
fn test_missing_boolean_defaults_false() {
    let mut p = ParamRegistry::new();
    p.read_ini(DEVICE_INI, ParamScope::Device).unwrap();
    let system: String = SYSTEM_INI
        .lines()
        .filter(|l| !l.starts_with("USE_LOW_POWER"))
        .collect::<Vec<_>>()
        .join("\n");
    p.read_ini(&system, ParamScope::System).unwrap();

    let cfg = p.to_config(None).unwrap();
    assert!(!cfg.system.use_low_power);
    assert_eq!(p.get("DEBUG_BUS"), Some(&ParamValue::Bool(false)));
}

/// Tests that a non-numeric value for a numeric key is an error.
#[test]
fn test_non_numeric_value() {
    let mut p = ParamRegistry::new();
    let err = p
        .read_ini("NUM_BANKS=8\nCL=ten\n", ParamScope::Device)
        .unwrap_err();
    match err {
        SimError::InvalidValue { key, value, line } => {
            assert_eq!((key.as_str(), value.as_str(), line), ("CL", "ten", 2));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

/// Tests that a key in the other scope's file is still applied.
#[test]
fn test_misplaced_key_still_applies() {
    let mut p = registry();
    p.read_ini("CL=12\n", ParamScope::System).unwrap();
    p.read_ini("EPOCH_LENGTH=500\n", ParamScope::Device).unwrap();
    let cfg = p.to_config(None).unwrap();
    assert_eq!(cfg.device.cl, 12);
    assert_eq!(cfg.system.epoch_length, 500);
}

/// Tests that command-line overrides win over file values.
#[test]
fn test_overrides_replace_file_values() {
    let mut p = registry();
    let overrides = ParamRegistry::parse_overrides("CL=14, ROW_BUFFER_POLICY=close_page,bogus");
    assert_eq!(
        overrides,
        vec![
            ("CL".to_string(), "14".to_string()),
            ("ROW_BUFFER_POLICY".to_string(), "close_page".to_string()),
        ]
    );
    p.override_keys(&overrides).unwrap();

    let cfg = p.to_config(None).unwrap();
    assert_eq!(cfg.device.cl, 14);
    assert_eq!(cfg.wl(), 13);
    assert_eq!(cfg.row_buffer_policy_val(), RowBufferPolicy::ClosePage);
}

/// Tests that the memory type can be selected from the system file.
#[test]
fn test_ini_memory_type() {
    let mut p = registry();
    p.override_keys(&[("MEMORY_TYPE".to_string(), "pcm".to_string())])
        .unwrap();
    let cfg = p.to_config(None).unwrap();
    assert_eq!(cfg.memory_type_val().unwrap(), MemoryType::Nvm);
}
