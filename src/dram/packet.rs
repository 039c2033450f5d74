//! Bus Packets.
//!
//! Everything that crosses the command or data bus between the controller
//! and a rank is a [`BusPacket`]. Commands carry no payload; `Data` packets
//! carry write data towards a rank or read data back from it.

use crate::common::data::Payload;

/// Command (or data) type carried by a bus packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Opens a row.
    Activate,
    /// Column read, row stays open.
    Read,
    /// Column read with auto-precharge.
    ReadP,
    /// Column write, row stays open.
    Write,
    /// Column write with auto-precharge.
    WriteP,
    /// Closes the open row of one bank.
    Precharge,
    /// Refreshes every bank of a rank.
    Refresh,
    /// Data burst.
    Data,
}

impl CommandKind {
    /// Returns `true` for column reads.
    pub fn is_read(self) -> bool {
        matches!(self, CommandKind::Read | CommandKind::ReadP)
    }

    /// Returns `true` for column writes.
    pub fn is_write(self) -> bool {
        matches!(self, CommandKind::Write | CommandKind::WriteP)
    }

    /// Returns `true` for column accesses of either direction.
    pub fn is_column(self) -> bool {
        self.is_read() || self.is_write()
    }
}

/// A packet on the command or data bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusPacket {
    /// Command carried, or `Data` for a data transfer.
    pub kind: CommandKind,
    /// Physical address of the originating transaction (0 for refresh).
    pub address: u64,
    /// Target rank.
    pub rank: usize,
    /// Target bank within the rank.
    pub bank: usize,
    /// Target row.
    pub row: u64,
    /// Target column.
    pub column: u64,
    /// Write payload, or read data on a returning packet.
    pub data: Option<Payload>,
}

impl BusPacket {
    /// Creates a command packet without payload.
    pub fn command(
        kind: CommandKind,
        address: u64,
        rank: usize,
        bank: usize,
        row: u64,
        column: u64,
    ) -> Self {
        Self {
            kind,
            address,
            rank,
            bank,
            row,
            column,
            data: None,
        }
    }

    /// Creates the data packet that accompanies (or answers) `cmd`.
    pub fn data_for(cmd: &BusPacket, data: Option<Payload>) -> Self {
        Self {
            kind: CommandKind::Data,
            data,
            ..cmd.clone()
        }
    }
}
