//! Address Mapping.
//!
//! Splits a physical address into the coordinates of the bank that stores
//! it. The controller only depends on the [`AddressMapper`] trait; the
//! bundled [`InterleavedMapper`] places consecutive bursts on consecutive
//! ranks, then banks, so that streaming traffic spreads across the channel.

use crate::config::Config;

/// Coordinates of an address inside the memory system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DecodedAddress {
    pub channel: usize,
    pub rank: usize,
    pub bank: usize,
    pub row: u64,
    pub column: u64,
}

/// Physical address to bank coordinates.
pub trait AddressMapper {
    fn decode(&self, address: u64) -> DecodedAddress;
}

fn bits_for(n: u64) -> u32 {
    n.max(1).next_power_of_two().trailing_zeros()
}

fn field(address: u64, shift: u32, width: u32) -> u64 {
    (address >> shift) & ((1u64 << width) - 1)
}

/// Low-order interleaving: `row | column | bank | rank | offset`.
///
/// The offset covers one burst (`bus_bits * BL / 8` bytes). Column indices
/// are burst aligned, so the column field holds `NUM_COLS / BL` values.
/// Rank and bank counts that are not powers of two fold back with a modulo.
#[derive(Clone, Debug)]
pub struct InterleavedMapper {
    offset_bits: u32,
    rank_bits: u32,
    bank_bits: u32,
    column_bits: u32,
    row_bits: u32,
    burst_bits: u32,
    num_ranks: usize,
    num_banks: usize,
}

impl InterleavedMapper {
    pub fn new(config: &Config, num_ranks: usize) -> Self {
        let d = &config.device;
        let burst_bits = bits_for(d.bl);
        Self {
            offset_bits: bits_for(config.bytes_per_transaction()),
            rank_bits: bits_for(num_ranks as u64),
            bank_bits: bits_for(d.num_banks as u64),
            column_bits: bits_for(d.num_cols).saturating_sub(burst_bits),
            row_bits: bits_for(d.num_rows),
            burst_bits,
            num_ranks: num_ranks.max(1),
            num_banks: d.num_banks.max(1),
        }
    }

    fn rank_shift(&self) -> u32 {
        self.offset_bits
    }

    fn bank_shift(&self) -> u32 {
        self.rank_shift() + self.rank_bits
    }

    fn column_shift(&self) -> u32 {
        self.bank_shift() + self.bank_bits
    }

    fn row_shift(&self) -> u32 {
        self.column_shift() + self.column_bits
    }

    /// Bytes addressable through this mapping.
    pub fn capacity(&self) -> u64 {
        1u64 << (self.row_shift() + self.row_bits)
    }

    /// Builds the address of the first byte of a burst.
    pub fn encode(&self, rank: usize, bank: usize, row: u64, column: u64) -> u64 {
        ((rank as u64) << self.rank_shift())
            | ((bank as u64) << self.bank_shift())
            | ((column >> self.burst_bits) << self.column_shift())
            | (row << self.row_shift())
    }
}

impl AddressMapper for InterleavedMapper {
    fn decode(&self, address: u64) -> DecodedAddress {
        let row_shift = self.row_shift();
        let decoded = DecodedAddress {
            channel: (address >> (row_shift + self.row_bits)) as usize,
            rank: field(address, self.rank_shift(), self.rank_bits) as usize % self.num_ranks,
            bank: field(address, self.bank_shift(), self.bank_bits) as usize % self.num_banks,
            row: field(address, row_shift, self.row_bits),
            column: field(address, self.column_shift(), self.column_bits) << self.burst_bits,
        };
        log::trace!("map {:#x} -> {:?}", address, decoded);
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_bursts_rotate_ranks_then_banks() {
        let cfg = Config::default();
        let m = InterleavedMapper::new(&cfg, 2);
        let burst = cfg.bytes_per_transaction();
        assert_eq!(m.decode(0).rank, 0);
        assert_eq!(m.decode(burst).rank, 1);
        let next = m.decode(2 * burst);
        assert_eq!((next.rank, next.bank), (0, 1));
    }

    #[test]
    fn encode_inverts_decode() {
        let cfg = Config::default();
        let m = InterleavedMapper::new(&cfg, 2);
        let addr = m.encode(1, 5, 1234, 64);
        let d = m.decode(addr);
        assert_eq!((d.rank, d.bank, d.row, d.column), (1, 5, 1234, 64));
        assert_eq!(d.channel, 0);
    }
}
