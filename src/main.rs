//! Memory Channel Simulator CLI.
//!
//! Replays a packed trace against one or more memory channels and prints
//! per-epoch and end-of-run statistics.
//!
//! # Usage
//!
//! Channels can be configured in two ways:
//! 1. **TOML**: one `--config` file per channel (DRAM and NVM may be mixed).
//! 2. **Legacy ini**: a `--device-ini` / `--system-ini` pair, optionally
//!    adjusted with `-o KEY=value,...`; `NUM_CHANS` identical channels are built.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::process;

use clap::Parser;

extern crate memchannel;

use memchannel::common::error::{SimError, SimResult};
use memchannel::config::ini::{ParamRegistry, ParamScope};
use memchannel::config::Config;
use memchannel::sim::{Session, TimedRecord, TraceReader};

/// Upper bound on cycles spent draining after the trace is exhausted.
const DRAIN_LIMIT: u64 = 10_000_000;

/// Command-line arguments for the trace-driven simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Cycle-Accurate Memory Channel Simulator")]
struct Args {
    /// TOML channel configuration; repeat for more channels.
    #[arg(short, long)]
    config: Vec<String>,

    #[arg(short, long, requires = "system_ini", conflicts_with = "config")]
    device_ini: Option<String>,

    #[arg(short, long, requires = "device_ini")]
    system_ini: Option<String>,

    /// Comma-separated KEY=value overrides for the ini parameters.
    #[arg(short, long)]
    overrides: Option<String>,

    /// Total storage per channel in MB (ini mode).
    #[arg(long)]
    size: Option<u64>,

    /// Packed trace file.
    #[arg(short, long)]
    trace: String,

    /// Number of records to replay (default: the whole trace).
    #[arg(short, long)]
    num: Option<u64>,

    /// Submit every record as soon as possible, ignoring trace timers.
    #[arg(long)]
    no_timing: bool,

    /// Keep running after the last submission until every channel is idle.
    #[arg(long)]
    drain: bool,

    /// Write epoch reports and the summary as JSON to this path.
    #[arg(long)]
    json: Option<String>,

    /// Suppress the text reports on stdout.
    #[arg(short, long)]
    quiet: bool,
}

fn load_configs(args: &Args) -> SimResult<Vec<Config>> {
    if let (Some(device), Some(system)) = (&args.device_ini, &args.system_ini) {
        let mut params = ParamRegistry::new();
        params.read_ini_file(device, ParamScope::Device)?;
        params.read_ini_file(system, ParamScope::System)?;
        if let Some(list) = &args.overrides {
            params.override_keys(&ParamRegistry::parse_overrides(list))?;
        }
        let config = params.to_config(args.size)?;
        return Ok(vec![config; params.num_channels()]);
    }
    if args.config.is_empty() {
        return Err(SimError::InvalidConfig(
            "no channel configuration (use --config or --device-ini/--system-ini)".to_string(),
        ));
    }
    if args.overrides.is_some() {
        log::warn!("-o overrides only apply to ini configurations; ignoring");
    }
    args.config.iter().map(Config::load).collect()
}

fn print_configuration(configs: &[Config]) {
    println!("Global Configuration");
    println!("--------------------");
    for (i, c) in configs.iter().enumerate() {
        println!("Channel {}:", i);
        println!("  Memory Type:        {}", c.system.memory_type);
        println!(
            "  Geometry:           {} ranks x {} banks x {} rows x {} cols",
            c.num_ranks(),
            c.device.num_banks,
            c.device.num_rows,
            c.device.num_cols
        );
        println!("  tCK:                {} ns", c.device.t_ck);
        println!("  RL / WL:            {} / {}", c.rl(), c.wl());
        println!("  Row Buffer Policy:  {:?}", c.row_buffer_policy_val());
        println!("  Low Power:          {}", c.system.use_low_power);
    }
    println!("--------------------");
}

fn run(args: &Args) -> SimResult<()> {
    let configs = load_configs(args)?;
    let burst_bytes = configs[0].bytes_per_transaction() as usize;
    if !args.quiet {
        print_configuration(&configs);
    }

    let out: Box<dyn Write> = if args.quiet {
        Box::new(io::sink())
    } else {
        Box::new(io::stdout())
    };
    let mut session = Session::new(&configs, out)?;

    let mut records = TraceReader::new(BufReader::new(File::open(&args.trace)?));
    let limit = args.num.unwrap_or(u64::MAX);
    let mut accepted = 0u64;
    let mut next: Option<TimedRecord> = None;

    while accepted < limit {
        if next.is_none() {
            next = match records.next() {
                Some(record) => Some(record?),
                None => break,
            };
        }
        if let Some(t) = next {
            if (args.no_timing || session.cycle() >= t.cycle)
                && session.add_transaction(t.record.to_transaction(burst_bytes))
            {
                accepted += 1;
                next = None;
            }
        }
        session.update()?;
    }
    log::info!("{} records submitted by cycle {}", accepted, session.cycle());

    if args.drain {
        let start = session.cycle();
        while !session.is_drained() {
            if session.cycle() - start >= DRAIN_LIMIT {
                log::warn!("channels still busy after {} drain cycles", DRAIN_LIMIT);
                break;
            }
            session.update()?;
        }
    }

    let report = session.finish()?;
    if let Some(path) = &args.json {
        serde_json::to_writer_pretty(File::create(path)?, &report)?;
        log::info!("wrote JSON report to {}", path);
    }
    Ok(())
}

/// Main entry point for the trace-driven simulator.
///
/// Any simulation or configuration error is fatal: it is logged, printed on
/// stderr and the process exits with status 1.
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        log::error!("{}", e);
        eprintln!("\n[!] FATAL: {}", e);
        process::exit(1);
    }
}
