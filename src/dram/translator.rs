//! Transaction Translation.
//!
//! Turns an accepted read or write into the ACTIVATE and column command
//! pair the command queue schedules. The column command kind depends on the
//! row buffer policy and, for reads, on whether the channel is persistent
//! memory.

use std::collections::VecDeque;

use crate::common::data::{Transaction, TransactionKind};
use crate::config::{MemoryType, RowBufferPolicy};
use crate::dram::address::{AddressMapper, DecodedAddress};
use crate::dram::packet::{BusPacket, CommandKind};
use crate::dram::queue::CommandQueue;

/// Chooses and builds the commands for a transaction.
#[derive(Clone, Copy, Debug)]
pub struct TransactionTranslator {
    row_policy: RowBufferPolicy,
    memory_type: MemoryType,
}

impl TransactionTranslator {
    pub fn new(row_policy: RowBufferPolicy, memory_type: MemoryType) -> Self {
        Self {
            row_policy,
            memory_type,
        }
    }

    /// Column command for a transaction kind.
    ///
    /// Open page keeps rows open (READ / WRITE). Close page auto-precharges
    /// (READ_P / WRITE_P), except persistent-memory reads which release the
    /// row with a plain READ.
    pub fn column_kind(&self, kind: TransactionKind) -> CommandKind {
        match (self.row_policy, kind) {
            (RowBufferPolicy::OpenPage, TransactionKind::Read) => CommandKind::Read,
            (RowBufferPolicy::OpenPage, TransactionKind::Write) => CommandKind::Write,
            (RowBufferPolicy::ClosePage, TransactionKind::Read) => match self.memory_type {
                MemoryType::Nvm => CommandKind::Read,
                MemoryType::Dram => CommandKind::ReadP,
            },
            (RowBufferPolicy::ClosePage, TransactionKind::Write) => CommandKind::WriteP,
        }
    }

    /// Index of the oldest pending transaction whose bank queue can take two
    /// more commands, with its decoded address.
    pub fn select(
        &self,
        pending: &VecDeque<Transaction>,
        mapper: &dyn AddressMapper,
        queue: &dyn CommandQueue,
    ) -> Option<(usize, DecodedAddress)> {
        pending.iter().enumerate().find_map(|(i, txn)| {
            let at = mapper.decode(txn.address);
            queue.has_room_for(2, at.rank, at.bank).then_some((i, at))
        })
    }

    /// Builds the ACTIVATE and column command for `txn`.
    ///
    /// A write's payload moves from the transaction onto the column command,
    /// where it stays until the controller queues the write data.
    pub fn translate(&self, txn: &mut Transaction, at: &DecodedAddress) -> (BusPacket, BusPacket) {
        let activate = BusPacket::command(
            CommandKind::Activate,
            txn.address,
            at.rank,
            at.bank,
            at.row,
            at.column,
        );
        let mut column = BusPacket::command(
            self.column_kind(txn.kind),
            txn.address,
            at.rank,
            at.bank,
            at.row,
            at.column,
        );
        column.data = txn.payload.take();
        (activate, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_page_nvm_reads_skip_auto_precharge() {
        let t = TransactionTranslator::new(RowBufferPolicy::ClosePage, MemoryType::Nvm);
        assert_eq!(t.column_kind(TransactionKind::Read), CommandKind::Read);
        assert_eq!(t.column_kind(TransactionKind::Write), CommandKind::WriteP);
        let t = TransactionTranslator::new(RowBufferPolicy::ClosePage, MemoryType::Dram);
        assert_eq!(t.column_kind(TransactionKind::Read), CommandKind::ReadP);
    }
}
