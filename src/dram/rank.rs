//! Rank Transport.
//!
//! A rank receives commands and write data from the controller's buses and
//! returns read data on its own data lines. [`DataRank`] keeps the bytes
//! written to each address so reads return what was last written; it does
//! not model per-bank timing, which the controller already enforces.

use std::collections::{HashMap, VecDeque};

use crate::common::data::Payload;
use crate::config::Config;
use crate::dram::packet::{BusPacket, CommandKind};

/// One rank attached to a channel.
pub trait Rank {
    /// Accepts a command or data burst delivered by the controller.
    fn receive_from_bus(&mut self, packet: BusPacket);

    /// Advances one cycle; returns read data whose transfer has finished.
    fn update(&mut self) -> Option<BusPacket>;

    fn power_down(&mut self);

    fn power_up(&mut self);
}

/// Rank that stores write payloads and answers reads after `RL + BL/2`.
#[derive(Debug)]
pub struct DataRank {
    id: usize,
    rl: u64,
    burst_cycles: u64,
    store: HashMap<u64, Payload>,
    returns: VecDeque<(u64, BusPacket)>,
    outgoing: Option<(u64, BusPacket)>,
    powered_down: bool,
}

impl DataRank {
    pub fn new(id: usize, config: &Config) -> Self {
        Self {
            id,
            rl: config.rl(),
            burst_cycles: (config.device.bl / 2).max(1),
            store: HashMap::new(),
            returns: VecDeque::new(),
            outgoing: None,
            powered_down: false,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_powered_down(&self) -> bool {
        self.powered_down
    }

    /// Payload last written to `address`.
    pub fn stored(&self, address: u64) -> Option<&Payload> {
        self.store.get(&address)
    }
}

impl Rank for DataRank {
    fn receive_from_bus(&mut self, packet: BusPacket) {
        match packet.kind {
            CommandKind::Read | CommandKind::ReadP => {
                let data = self.store.get(&packet.address).cloned();
                let reply = BusPacket::data_for(&packet, data);
                self.returns.push_back((self.rl, reply));
            }
            CommandKind::Data => {
                if let Some(data) = packet.data {
                    self.store.insert(packet.address, data);
                }
            }
            kind => log::trace!("rank {} <- {:?} b{}", self.id, kind, packet.bank),
        }
    }

    fn update(&mut self) -> Option<BusPacket> {
        let mut finished = None;
        if let Some((left, _)) = self.outgoing.as_mut() {
            *left -= 1;
            if *left == 0 {
                finished = self.outgoing.take().map(|(_, p)| p);
            }
        }

        for (countdown, _) in self.returns.iter_mut() {
            *countdown = countdown.saturating_sub(1);
        }
        if self.outgoing.is_none() && matches!(self.returns.front(), Some((0, _))) {
            if let Some((_, packet)) = self.returns.pop_front() {
                self.outgoing = Some((self.burst_cycles, packet));
            }
        }
        finished
    }

    fn power_down(&mut self) {
        self.powered_down = true;
    }

    fn power_up(&mut self) {
        self.powered_down = false;
    }
}
