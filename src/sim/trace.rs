//! Packed Trace Reader.
//!
//! Traces are flat files of 64-bit little-endian records. Each record packs
//! an inter-arrival timer, a read/write flag and a 32-bit word address:
//!
//! | bits    | field                         |
//! |---------|-------------------------------|
//! | 30..49  | timer (units of 5 cycles)     |
//! | 29      | 1 = read, 0 = write           |
//! | 0..28   | address bits 3..31            |
//!
//! The first record issues at cycle 0; record `k` issues `5 * timer` cycles
//! after record `k - 1`, using the timer of the earlier record.

use std::io::{self, Read};

use crate::common::data::Transaction;
use crate::common::error::SimResult;

/// Cycles represented by one timer tick.
pub const TIMER_SCALE: u64 = 5;

/// One decoded trace record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    pub timer: u64,
    pub is_read: bool,
    pub address: u64,
}

impl TraceRecord {
    /// Unpacks a raw record.
    pub fn decode(word: u64) -> Self {
        Self {
            timer: (word >> 30) & 0xf_ffff,
            is_read: (word >> 29) & 1 == 1,
            address: (word << 3) & 0xffff_ffff,
        }
    }

    /// Builds the transaction for this record.
    ///
    /// Writes carry `burst_bytes` bytes repeating the little-endian address,
    /// so the data read back later can be checked against its location.
    pub fn to_transaction(&self, burst_bytes: usize) -> Transaction {
        if self.is_read {
            Transaction::read(self.address)
        } else {
            let pattern = self.address.to_le_bytes();
            let payload = pattern.iter().copied().cycle().take(burst_bytes).collect();
            Transaction::write(self.address, payload)
        }
    }
}

/// A record together with the cycle it should be issued at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedRecord {
    pub cycle: u64,
    pub record: TraceRecord,
}

/// Iterator over the records of a trace stream.
///
/// A trailing partial record is ignored.
pub struct TraceReader<R> {
    inner: R,
    next_cycle: u64,
}

impl<R: Read> TraceReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            next_cycle: 0,
        }
    }

    fn read_word(&mut self) -> SimResult<Option<u64>> {
        let mut buf = [0u8; 8];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled < buf.len() {
            if filled > 0 {
                log::warn!("ignoring {} trailing trace bytes", filled);
            }
            return Ok(None);
        }
        Ok(Some(u64::from_le_bytes(buf)))
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = SimResult<TimedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_word() {
            Ok(Some(word)) => {
                let record = TraceRecord::decode(word);
                let cycle = self.next_cycle;
                self.next_cycle += TIMER_SCALE * record.timer;
                Some(Ok(TimedRecord { cycle, record }))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
