//! Integration tests for the memory controller.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use rstest::rstest;

use memchannel::common::data::Transaction;
use memchannel::common::error::SimError;
use memchannel::config::{Config, MemoryType};
use memchannel::dram::address::InterleavedMapper;
use memchannel::dram::bank::BankPhase;
use memchannel::dram::controller::{CompletionSink, MemoryController, NullSink};
use memchannel::dram::packet::{BusPacket, CommandKind};
use memchannel::dram::queue::BankQueues;
use memchannel::dram::rank::{DataRank, Rank};
use memchannel::sim::MemorySystem;

/// A completion observed by [`RecordingSink`].
#[derive(Clone, Debug, PartialEq)]
enum Event {
    Read {
        address: u64,
        cycle: u64,
        data: Option<Vec<u8>>,
    },
    Write {
        address: u64,
        cycle: u64,
    },
}

/// Sink that records every completion into a shared log.
#[derive(Clone, Default)]
struct RecordingSink {
    events: Rc<RefCell<Vec<Event>>>,
}

impl CompletionSink for RecordingSink {
    fn read_complete(&mut self, _channel: usize, address: u64, cycle: u64, data: Option<&[u8]>) {
        self.events.borrow_mut().push(Event::Read {
            address,
            cycle,
            data: data.map(<[u8]>::to_vec),
        });
    }

    fn write_complete(&mut self, _channel: usize, address: u64, cycle: u64) {
        self.events.borrow_mut().push(Event::Write { address, cycle });
    }
}

/// Two-rank DDR3 channel without low-power transitions.
fn quiet_config() -> Config {
    let mut cfg = Config::default();
    cfg.system.num_ranks = Some(2);
    cfg.system.use_low_power = false;
    cfg
}

fn system_with_sink(cfg: &Config) -> (MemorySystem, Rc<RefCell<Vec<Event>>>) {
    let sink = RecordingSink::default();
    let events = sink.events.clone();
    let sys = MemorySystem::new(0, cfg, Box::new(sink)).unwrap();
    (sys, events)
}

fn reads(events: &[Event]) -> Vec<&Event> {
    events
        .iter()
        .filter(|e| matches!(e, Event::Read { .. }))
        .collect()
}

/// Tests that a read to an idle bank completes after exactly
/// tRCD + CL + AL + BL/2 + tCMD + 1 cycles.
#[test]
fn test_read_latency_to_idle_bank() {
    let cfg = quiet_config();
    let d = &cfg.device;
    let expected = d.t_rcd + d.cl + d.al + d.bl / 2 + d.t_cmd + 1;
    let (mut sys, events) = system_with_sink(&cfg);

    for _ in 0..3 {
        sys.update().unwrap();
    }
    let issued_at = sys.controller().current_cycle();
    assert!(sys.add_transaction(Transaction::read(0x40)));

    for _ in 0..200 {
        sys.update().unwrap();
        if !reads(&events.borrow()).is_empty() {
            break;
        }
    }

    let log = events.borrow();
    match reads(&log).first() {
        Some(Event::Read { cycle, address, .. }) => {
            assert_eq!(*address, 0x40);
            assert_eq!(*cycle - issued_at, expected);
        }
        other => panic!("read never completed: {:?}", other),
    }
    assert_eq!(sys.controller().stats().read_latencies, vec![expected]);
}

/// Tests that with additive latency the READ is posted AL cycles early, so
/// the end-to-end latency does not grow.
#[test]
fn test_additive_latency_posts_read_early() {
    let mut cfg = quiet_config();
    cfg.device.al = 3;
    let d = &cfg.device;
    let expected = d.t_rcd + d.cl + d.bl / 2 + d.t_cmd + 1;
    let (mut sys, events) = system_with_sink(&cfg);

    assert!(sys.add_transaction(Transaction::read(0x80)));
    for _ in 0..200 {
        sys.update().unwrap();
    }

    let log = events.borrow();
    assert_eq!(reads(&log).len(), 1);
    assert_eq!(sys.controller().stats().read_latencies, vec![expected]);
}

/// Tests four writes followed by four reads to distinct (rank, bank) pairs:
/// every transaction completes, each touched bank sees one write and the
/// reads return the written data.
#[test]
fn test_writes_then_reads_round_trip_data() {
    let mut cfg = quiet_config();
    cfg.system.trans_queue_depth = 4;
    let mapper = InterleavedMapper::new(&cfg, 2);
    let targets = [(0, 0), (1, 3), (0, 5), (1, 7)];
    let addresses: Vec<u64> = targets
        .iter()
        .map(|&(rank, bank)| mapper.encode(rank, bank, 17, 0))
        .collect();
    let burst = cfg.bytes_per_transaction() as usize;
    let payload = |i: usize| vec![0xa0 + i as u8; burst];

    let (mut sys, events) = system_with_sink(&cfg);
    let mut pending: Vec<Transaction> = addresses
        .iter()
        .enumerate()
        .map(|(i, &a)| Transaction::write(a, payload(i)))
        .chain(addresses.iter().map(|&a| Transaction::read(a)))
        .collect();
    pending.reverse();

    for _ in 0..5_000 {
        if let Some(txn) = pending.last() {
            if sys.will_accept_transaction() {
                assert!(sys.add_transaction(txn.clone()));
                pending.pop();
            }
        }
        sys.update().unwrap();
        if pending.is_empty() && sys.is_drained() {
            break;
        }
    }

    assert!(pending.is_empty());
    assert!(sys.is_drained());

    let log = events.borrow();
    let writes = log.iter().filter(|e| matches!(e, Event::Write { .. })).count();
    assert_eq!(writes, 4);
    let completed = reads(&log);
    assert_eq!(completed.len(), 4);
    for (i, &address) in addresses.iter().enumerate() {
        let data = completed.iter().find_map(|e| match e {
            Event::Read { address: a, data, .. } if *a == address => data.clone(),
            _ => None,
        });
        assert_eq!(data, Some(payload(i)));
    }

    let stats = sys.controller().stats();
    for &(rank, bank) in &targets {
        assert_eq!(stats.writes(rank, bank), 1);
        assert_eq!(stats.reads(rank, bank), 1);
    }
    assert_eq!(stats.writes(0, 1), 0);
}

/// Tests that the admission queue rejects transactions beyond its depth.
#[test]
fn test_add_transaction_rejects_when_full() {
    let mut cfg = quiet_config();
    cfg.system.trans_queue_depth = 2;
    let mut ctrl = MemoryController::new(0, &cfg, Box::new(NullSink)).unwrap();

    assert!(ctrl.add_transaction(Transaction::read(0x000)));
    assert!(ctrl.add_transaction(Transaction::read(0x040)));
    assert!(!ctrl.will_accept_transaction());
    assert!(!ctrl.add_transaction(Transaction::read(0x080)));
    assert_eq!(ctrl.transaction_queue_len(), 2);
}

/// Tests that per-rank received counts grow when a transaction is
/// translated, not while it waits in the admission queue.
#[test]
fn test_received_counts_follow_translation() {
    let cfg = quiet_config();
    let mapper = InterleavedMapper::new(&cfg, 2);
    let mut ctrl = MemoryController::new(0, &cfg, Box::new(NullSink)).unwrap();

    assert!(ctrl.add_transaction(Transaction::read(mapper.encode(1, 0, 4, 0))));
    assert!(ctrl.add_transaction(Transaction::write(mapper.encode(1, 2, 4, 0), vec![7; 64])));
    assert_eq!(ctrl.stats().reads_received_per_rank, vec![0, 0]);
    assert_eq!(ctrl.stats().writes_received_per_rank, vec![0, 0]);

    ctrl.update_ranks().unwrap();
    ctrl.update().unwrap();
    assert_eq!(ctrl.stats().reads_received_per_rank, vec![0, 1]);
    assert_eq!(ctrl.stats().writes_received_per_rank, vec![0, 0]);
    assert_eq!(ctrl.transaction_queue_len(), 1);

    ctrl.update_ranks().unwrap();
    ctrl.update().unwrap();
    assert_eq!(ctrl.stats().writes_received_per_rank, vec![0, 1]);
}

/// Rank that answers every update with one fixed packet.
struct ScriptedRank {
    reply: Option<BusPacket>,
}

impl Rank for ScriptedRank {
    fn receive_from_bus(&mut self, _packet: BusPacket) {}

    fn update(&mut self) -> Option<BusPacket> {
        self.reply.take()
    }

    fn power_down(&mut self) {}

    fn power_up(&mut self) {}
}

fn scripted_system(reply: BusPacket) -> MemorySystem {
    let cfg = quiet_config();
    let ranks: Vec<Box<dyn Rank>> = vec![
        Box::new(ScriptedRank { reply: Some(reply) }),
        Box::new(DataRank::new(1, &cfg)),
    ];
    let ctrl = MemoryController::with_parts(
        0,
        &cfg,
        Box::new(BankQueues::new(&cfg, 2, MemoryType::Dram)),
        ranks,
        Box::new(InterleavedMapper::new(&cfg, 2)),
        Box::new(NullSink),
    )
    .unwrap();
    MemorySystem::from_controller(ctrl)
}

/// Tests that read data with no matching pending read is fatal.
#[test]
fn test_unmatched_read_return_is_fatal() {
    let read = BusPacket::command(CommandKind::Read, 0x1234_0000, 0, 0, 0, 0);
    let mut sys = scripted_system(BusPacket::data_for(&read, None));

    match sys.update() {
        Err(SimError::UnmatchedReadReturn { address }) => assert_eq!(address, 0x1234_0000),
        other => panic!("expected UnmatchedReadReturn, got {:?}", other),
    }
}

/// Tests that a rank sending anything but data is fatal.
#[test]
fn test_non_data_packet_from_rank_is_fatal() {
    let mut sys = scripted_system(BusPacket::command(CommandKind::Activate, 0, 0, 0, 0, 0));

    assert!(matches!(
        sys.update(),
        Err(SimError::UnexpectedPacket {
            kind: CommandKind::Activate
        })
    ));
}

/// Tests that an idle rank powers down on the first cycle and that a woken
/// rank returns to idle exactly tXP cycles after the exit decision.
#[test]
fn test_low_power_entry_and_exit() {
    let mut cfg = quiet_config();
    cfg.system.use_low_power = true;
    let t_xp = cfg.device.t_xp;
    let mut ctrl = MemoryController::new(0, &cfg, Box::new(NullSink)).unwrap();

    ctrl.update_ranks().unwrap();
    ctrl.update().unwrap();
    assert!(ctrl.refresh().rank(0).powered_down);
    assert!(ctrl.banks().rank(0).iter().all(|b| b.phase == BankPhase::PowerDown));

    for _ in 0..10 {
        ctrl.update_ranks().unwrap();
        ctrl.update().unwrap();
    }
    assert!(ctrl.add_transaction(Transaction::read(0)));
    ctrl.update_ranks().unwrap();
    ctrl.update().unwrap();
    assert!(!ctrl.refresh().rank(0).powered_down);

    for _ in 1..t_xp {
        ctrl.update_ranks().unwrap();
        ctrl.update().unwrap();
        assert_eq!(ctrl.banks().get(0, 7).phase, BankPhase::PowerDown);
    }
    ctrl.update_ranks().unwrap();
    ctrl.update().unwrap();
    assert_eq!(ctrl.banks().get(0, 7).phase, BankPhase::Idle);
    assert!(ctrl.refresh().rank(1).powered_down);
}

/// Tests that an NVM channel never issues a refresh.
#[test]
fn test_nvm_channel_never_refreshes() {
    let mut cfg = quiet_config();
    cfg.system.memory_type = "nvm".to_string();
    cfg.device.refresh_period = 300;
    let mut sys = MemorySystem::new(0, &cfg, Box::new(NullSink)).unwrap();

    for _ in 0..2_000 {
        sys.update().unwrap();
    }
    assert!(sys.controller().refresh().is_inert());
    assert_eq!(sys.controller().power().counts().refresh, 0);
}

/// Tests that a DRAM channel refreshes every rank once per period.
#[test]
fn test_dram_channel_refreshes_each_rank() {
    let mut cfg = quiet_config();
    cfg.device.refresh_period = 300;
    let period = cfg.refresh_period_cycles();
    let mut sys = MemorySystem::new(0, &cfg, Box::new(NullSink)).unwrap();

    for _ in 0..(period + period / 2) {
        sys.update().unwrap();
    }
    assert_eq!(sys.controller().power().counts().refresh, 2);
}

/// Tests that a read whose ACTIVATE issues just before its rank falls due for
/// refresh still completes, and the refresh still happens.
#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(5)]
fn test_read_completes_across_refresh(#[case] lead: u64) {
    let cfg = quiet_config();
    let period = cfg.refresh_period_cycles();
    let due = period.div_ceil(2);
    let (mut sys, events) = system_with_sink(&cfg);

    while sys.controller().current_cycle() < due - lead {
        sys.update().unwrap();
    }
    assert!(sys.add_transaction(Transaction::read(0)));
    for _ in 0..period / 4 {
        sys.update().unwrap();
    }

    assert_eq!(reads(&events.borrow()).len(), 1);
    assert_eq!(sys.controller().pending_read_count(), 0);
    assert!(sys.is_drained());
    assert_eq!(sys.controller().power().counts().refresh, 1);
}

/// Tests that mixed traffic to one rank drains while refreshes keep firing.
#[test]
fn test_traffic_drains_under_frequent_refresh() {
    let mut cfg = quiet_config();
    cfg.device.refresh_period = 300;
    let mapper = InterleavedMapper::new(&cfg, 2);
    let mut pending: Vec<Transaction> = (0..40u64)
        .map(|i| {
            let a = mapper.encode(0, (i % 8) as usize, i % 5, 0);
            if i % 2 == 0 {
                Transaction::read(a)
            } else {
                Transaction::write(a, vec![i as u8; cfg.bytes_per_transaction() as usize])
            }
        })
        .collect();
    pending.reverse();
    let (mut sys, events) = system_with_sink(&cfg);

    for _ in 0..20_000 {
        if let Some(txn) = pending.last() {
            if sys.add_transaction(txn.clone()) {
                pending.pop();
            }
        }
        sys.update().unwrap();
        if pending.is_empty() && sys.is_drained() {
            break;
        }
    }

    assert!(pending.is_empty());
    assert!(sys.is_drained());
    assert_eq!(events.borrow().len(), 40);
    assert!(sys.controller().power().counts().refresh > 1);
}

/// Tests that a controller rejects a configuration naming an unknown memory.
#[test]
fn test_unknown_memory_type_is_rejected() {
    let mut cfg = quiet_config();
    cfg.system.memory_type = "sram".to_string();
    assert!(matches!(
        MemoryController::new(0, &cfg, Box::new(NullSink)),
        Err(SimError::UnknownMemoryType(_))
    ));
}
