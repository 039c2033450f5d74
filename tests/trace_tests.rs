//! Integration tests for trace decoding and replay.

use std::io::{self, Cursor};

use pretty_assertions::assert_eq;
use rstest::rstest;

use memchannel::common::data::TransactionKind;
use memchannel::config::Config;
use memchannel::sim::{Session, TraceReader, TraceRecord};

fn pack(timer: u64, read: bool, address: u64) -> u64 {
    (timer << 30) | ((read as u64) << 29) | ((address & 0xffff_ffff) >> 3)
}

fn trace_bytes(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Tests field extraction from packed records.
#[rstest]
#[case(pack(0, true, 0x0), 0, true, 0x0)]
#[case(pack(1, false, 0x40), 1, false, 0x40)]
#[case(pack(0xf_ffff, true, 0xffff_fff8), 0xf_ffff, true, 0xffff_fff8)]
fn test_decode(
    #[case] word: u64,
    #[case] timer: u64,
    #[case] is_read: bool,
    #[case] address: u64,
) {
    assert_eq!(
        TraceRecord::decode(word),
        TraceRecord {
            timer,
            is_read,
            address
        }
    );
}

/// Tests that the address drops the low three bits and keeps 32 bits.
#[test]
fn test_address_alignment() {
    let word = 0x0000_0001_ffff_ffffu64;
    let r = TraceRecord::decode(word);
    assert_eq!(r.address, 0xffff_fff8);
    assert_eq!(r.address % 8, 0);
}

/// Tests that issue cycles accumulate five cycles per timer tick.
#[test]
fn test_issue_cycles() {
    let bytes = trace_bytes(&[pack(4, true, 0), pack(1, false, 64), pack(7, true, 128)]);
    let cycles: Vec<u64> = TraceReader::new(Cursor::new(bytes))
        .map(|r| r.unwrap().cycle)
        .collect();
    assert_eq!(cycles, vec![0, 20, 25]);
}

/// Tests that writes carry a full burst of address-derived data.
#[test]
fn test_write_payload() {
    let txn = TraceRecord::decode(pack(0, false, 0x1238)).to_transaction(64);
    assert_eq!(txn.kind, TransactionKind::Write);
    let payload = txn.payload.unwrap();
    assert_eq!(payload.len(), 64);
    assert_eq!(&payload[..8], &0x1238u64.to_le_bytes());

    let read = TraceRecord::decode(pack(0, true, 0x40)).to_transaction(64);
    assert!(read.payload.is_none());
}

/// Tests replaying a short trace the way the command-line driver does.
#[test]
fn test_replay_completes_every_record() {
    let mut cfg = Config::default();
    cfg.system.trans_queue_depth = 2;
    let words: Vec<u64> = (0..16u64)
        .map(|i| pack(1, i % 2 == 1, (i / 2) * 0x40))
        .collect();
    let records: Vec<_> = TraceReader::new(Cursor::new(trace_bytes(&words)))
        .collect::<Result<_, _>>()
        .unwrap();

    let mut session = Session::new(&[cfg], Box::new(io::sink())).unwrap();
    let mut next = 0;
    for _ in 0..10_000 {
        if let Some(t) = records.get(next) {
            if session.cycle() >= t.cycle && session.add_transaction(t.record.to_transaction(64)) {
                next += 1;
            }
        }
        session.update().unwrap();
        if next == records.len() && session.is_drained() {
            break;
        }
    }
    assert_eq!(next, records.len());

    let report = session.finish().unwrap();
    assert_eq!(report.summary.reads, 8);
    assert_eq!(report.summary.writes, 8);
}
