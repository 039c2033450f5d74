//! Channel Bus Arbitration.
//!
//! The controller drives two buses towards its ranks: the command/address
//! bus and the write-data bus. Each carries at most one packet at a time,
//! held for `tCMD` or `BL/2` cycles respectively before it is delivered.
//! Write data waits in a FIFO for the write latency to elapse before it may
//! claim the data bus.

use std::collections::VecDeque;

use crate::common::error::{BusKind, SimError, SimResult};
use crate::dram::packet::BusPacket;
use crate::dram::timing::TimingParams;

#[derive(Debug)]
struct Slot {
    packet: BusPacket,
    cycles_left: u64,
}

/// Packets whose bus transfer finished this cycle.
#[derive(Debug, Default)]
pub struct Delivered {
    pub command: Option<BusPacket>,
    pub data: Option<BusPacket>,
}

/// Single-slot command and data buses plus the write-data FIFO.
#[derive(Debug)]
pub struct BusScheduler {
    command: Option<Slot>,
    data: Option<Slot>,
    write_fifo: VecDeque<(u64, BusPacket)>,
    t_cmd: u64,
    burst_cycles: u64,
    wl: u64,
}

impl BusScheduler {
    pub fn new(timing: &TimingParams) -> Self {
        Self {
            command: None,
            data: None,
            write_fifo: VecDeque::new(),
            t_cmd: timing.t_cmd.max(1),
            burst_cycles: timing.burst_cycles().max(1),
            wl: timing.wl,
        }
    }

    /// Returns `true` while a command is in transit.
    pub fn command_busy(&self) -> bool {
        self.command.is_some()
    }

    /// Returns `true` while a data burst is in transit.
    pub fn data_busy(&self) -> bool {
        self.data.is_some()
    }

    /// Number of write bursts waiting for the write latency.
    pub fn pending_write_data(&self) -> usize {
        self.write_fifo.len()
    }

    /// Puts a command on the command bus for `tCMD` cycles.
    ///
    /// # Errors
    ///
    /// Returns `BusCollision` if a command is still in transit.
    pub fn place_command(&mut self, packet: BusPacket, now: u64) -> SimResult<()> {
        if self.command.is_some() {
            return Err(SimError::BusCollision {
                bus: BusKind::Command,
                cycle: now,
            });
        }
        log::trace!("cycle {}: cmd bus <- {:?} r{} b{}", now, packet.kind, packet.rank, packet.bank);
        self.command = Some(Slot {
            packet,
            cycles_left: self.t_cmd,
        });
        Ok(())
    }

    /// Puts a data burst on the data bus for `BL/2` cycles.
    ///
    /// # Errors
    ///
    /// Returns `BusCollision` if a burst is still in transit.
    pub fn place_data(&mut self, packet: BusPacket, now: u64) -> SimResult<()> {
        if self.data.is_some() {
            return Err(SimError::BusCollision {
                bus: BusKind::Data,
                cycle: now,
            });
        }
        log::trace!("cycle {}: data bus <- {:#x}", now, packet.address);
        self.data = Some(Slot {
            packet,
            cycles_left: self.burst_cycles,
        });
        Ok(())
    }

    /// Queues the data burst of a write command; it becomes eligible for the
    /// data bus `WL` cycles from now.
    pub fn queue_write_data(&mut self, packet: BusPacket) {
        self.write_fifo.push_back((self.wl, packet));
    }

    /// Counts down both bus slots and returns what finished its transfer.
    pub fn tick(&mut self) -> Delivered {
        Delivered {
            command: Self::tick_slot(&mut self.command),
            data: Self::tick_slot(&mut self.data),
        }
    }

    fn tick_slot(slot: &mut Option<Slot>) -> Option<BusPacket> {
        let s = slot.as_mut()?;
        s.cycles_left = s.cycles_left.saturating_sub(1);
        if s.cycles_left == 0 {
            slot.take().map(|s| s.packet)
        } else {
            None
        }
    }

    /// Counts down the write-data FIFO and moves its head onto the data bus
    /// once its latency has elapsed.
    ///
    /// Returns a copy of the burst that was placed on the bus, if any.
    pub fn advance_write_fifo(&mut self, now: u64) -> SimResult<Option<BusPacket>> {
        for (countdown, _) in self.write_fifo.iter_mut() {
            *countdown = countdown.saturating_sub(1);
        }
        match self.write_fifo.front() {
            Some((0, _)) => {}
            _ => return Ok(None),
        }
        let Some((_, packet)) = self.write_fifo.pop_front() else {
            return Ok(None);
        };
        let moved = packet.clone();
        self.place_data(packet, now)?;
        Ok(Some(moved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dram::packet::CommandKind;

    fn bus() -> BusScheduler {
        BusScheduler::new(&TimingParams::from_config(&Config::default()))
    }

    fn pkt(kind: CommandKind) -> BusPacket {
        BusPacket::command(kind, 0x40, 0, 0, 0, 0)
    }

    #[test]
    fn command_slot_rejects_second_packet() {
        let mut b = bus();
        b.place_command(pkt(CommandKind::Activate), 5).unwrap();
        let err = b.place_command(pkt(CommandKind::Read), 5).unwrap_err();
        assert!(matches!(
            err,
            SimError::BusCollision {
                bus: BusKind::Command,
                cycle: 5
            }
        ));
    }

    #[test]
    fn command_delivered_after_t_cmd() {
        let mut b = bus();
        b.place_command(pkt(CommandKind::Activate), 0).unwrap();
        let d = b.tick();
        assert_eq!(d.command.map(|p| p.kind), Some(CommandKind::Activate));
        assert!(!b.command_busy());
    }

    #[test]
    fn write_data_waits_write_latency_then_occupies_burst() {
        let mut b = bus();
        b.queue_write_data(pkt(CommandKind::Data));
        for cycle in 1..9 {
            assert!(b.advance_write_fifo(cycle).unwrap().is_none());
        }
        assert!(b.advance_write_fifo(9).unwrap().is_some());
        assert!(b.data_busy());
        for _ in 0..3 {
            assert!(b.tick().data.is_none());
        }
        assert!(b.tick().data.is_some());
    }
}
