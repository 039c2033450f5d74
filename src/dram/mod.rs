//! DRAM / NVM channel model.
//!
//! The core of the simulator: the per-bank timing state machine, bus
//! arbitration, refresh and power policy, and the controller that drives
//! them once per clock. The command queue, ranks and address mapping sit
//! behind traits so alternative models can be plugged in.

/// Address decoding into channel, rank, bank, row and column.
pub mod address;

/// Bank timing state and the command transition table.
pub mod bank;

/// Command and data bus slots and the write-data FIFO.
pub mod bus;

/// Per-cycle memory controller.
pub mod controller;

/// Commands and data exchanged between controller and ranks.
pub mod packet;

/// Energy accounting and low-power policy.
pub mod power;

/// Command queue contract and the per-bank reference queue.
pub mod queue;

/// Rank transport contract and a data-holding reference rank.
pub mod rank;

/// Staggered refresh scheduling.
pub mod refresh;

/// Raw and derived timing constants.
pub mod timing;

/// Transaction to command translation.
pub mod translator;

pub use address::{AddressMapper, DecodedAddress, InterleavedMapper};
pub use bank::{BankPhase, BankState, BankTable};
pub use controller::{CompletionSink, MemoryController, NullSink};
pub use packet::{BusPacket, CommandKind};
pub use queue::{BankQueues, CommandQueue};
pub use rank::{DataRank, Rank};
pub use timing::TimingParams;
