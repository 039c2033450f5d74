//! Memory Transaction Types.
//!
//! This module defines the requests a client submits to a memory channel.
//! A transaction is owned by the caller until the controller accepts it and
//! is dropped by the controller once its completion has been reported.

/// Data carried by a write, or returned by a read.
pub type Payload = Vec<u8>;

/// Type of memory transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// Data read.
    ///
    /// Completed through the read callback once the rank has returned the
    /// data burst.
    Read,

    /// Data write.
    ///
    /// Completed through the write callback once the write burst has left
    /// the data bus.
    Write,
}

/// A request submitted to a memory channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Read or write.
    pub kind: TransactionKind,
    /// Physical address.
    pub address: u64,
    /// Write data; ignored for reads.
    pub payload: Option<Payload>,
    /// Controller cycle at which the transaction was accepted.
    pub arrival: u64,
}

impl Transaction {
    /// Creates a read of `address`.
    pub fn read(address: u64) -> Self {
        Self {
            kind: TransactionKind::Read,
            address,
            payload: None,
            arrival: 0,
        }
    }

    /// Creates a write of `payload` to `address`.
    pub fn write(address: u64, payload: Payload) -> Self {
        Self {
            kind: TransactionKind::Write,
            address,
            payload: Some(payload),
            arrival: 0,
        }
    }

    /// Returns `true` for reads.
    pub fn is_read(&self) -> bool {
        self.kind == TransactionKind::Read
    }
}
