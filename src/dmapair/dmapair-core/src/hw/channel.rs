use super::Bus;
use crate::constants::ctrl::*;
use crate::constants::dreq::DREQ_FORCE;
use crate::utils;
use log::{debug, error, warn};

/// Claimed DMA channel. Only handed out by [`super::DmaController::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(u8);

impl ChannelHandle {
    pub(crate) fn new(index: u8) -> Self {
        ChannelHandle(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// This channel's bit in status and trigger masks
    pub fn bit(self) -> u32 {
        utils::channel_bit(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Transmit,
    Receive,
}

/// Element width of one DMA beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSize {
    Byte,
    HalfWord,
    Word,
}

impl TransferSize {
    pub fn bytes(self) -> u32 {
        match self {
            TransferSize::Byte => 1,
            TransferSize::HalfWord => 2,
            TransferSize::Word => 4,
        }
    }

    fn bits(self) -> u32 {
        match self {
            TransferSize::Byte => 0,
            TransferSize::HalfWord => 1,
            TransferSize::Word => 2,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(TransferSize::Byte),
            1 => Some(TransferSize::HalfWord),
            2 => Some(TransferSize::Word),
            _ => None,
        }
    }
}

/// What paces a channel: a permanent request or a peripheral DREQ line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Force,
    Dreq(u8),
}

impl TriggerSource {
    pub fn treq_sel(self) -> u8 {
        match self {
            TriggerSource::Force => DREQ_FORCE,
            TriggerSource::Dreq(line) => line & TREQ_SEL_MASK as u8,
        }
    }

    pub fn from_treq_sel(sel: u8) -> Self {
        match sel & TREQ_SEL_MASK as u8 {
            DREQ_FORCE => TriggerSource::Force,
            line => TriggerSource::Dreq(line),
        }
    }

    fn is_requesting(self, dreq: u64) -> bool {
        match self {
            TriggerSource::Force => true,
            TriggerSource::Dreq(line) => 1u64
                .checked_shl(line as u32)
                .map_or(false, |bit| dreq & bit != 0),
        }
    }
}

/// Static transfer shape of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub direction: Direction,
    pub read_increment: bool,
    pub write_increment: bool,
    pub trigger: TriggerSource,
    pub size: TransferSize,
    pub chain_to: Option<ChannelHandle>, // None chains to self, i.e. no chaining
    pub irq_quiet: bool,
    pub bswap: bool,
    pub high_priority: bool,
    pub enable: bool,
}

impl ChannelConfig {
    /// Byte-wide, unpaced, unchained. Transmit walks its source buffer into a
    /// fixed data register; receive does the reverse.
    pub fn new(direction: Direction) -> Self {
        let transmit = direction == Direction::Transmit;
        Self {
            direction,
            read_increment: transmit,
            write_increment: !transmit,
            trigger: TriggerSource::Force,
            size: TransferSize::Byte,
            chain_to: None,
            irq_quiet: false,
            bswap: false,
            high_priority: false,
            enable: true,
        }
    }

    pub fn with_increments(mut self, read: bool, write: bool) -> Self {
        self.read_increment = read;
        self.write_increment = write;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerSource) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_size(mut self, size: TransferSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_chain_to(mut self, target: ChannelHandle) -> Self {
        self.chain_to = Some(target);
        self
    }

    pub fn with_irq_quiet(mut self, quiet: bool) -> Self {
        self.irq_quiet = quiet;
        self
    }

    pub fn with_bswap(mut self, bswap: bool) -> Self {
        self.bswap = bswap;
        self
    }

    pub fn with_high_priority(mut self, high: bool) -> Self {
        self.high_priority = high;
        self
    }

    /// Chain target, with a self-chain meaning "none"
    pub fn chain_target(&self, own: ChannelHandle) -> Option<ChannelHandle> {
        self.chain_to.filter(|target| *target != own)
    }

    /// Packs into the channel control word (BUSY is left clear)
    pub fn to_ctrl(&self, own: ChannelHandle) -> u32 {
        let chain = self.chain_to.unwrap_or(own).index() as u32;
        (self.enable as u32) * EN
            | (self.high_priority as u32) * HIGH_PRIORITY
            | self.size.bits() << DATA_SIZE_SHIFT
            | (self.read_increment as u32) * INCR_READ
            | (self.write_increment as u32) * INCR_WRITE
            | (chain & CHAIN_TO_MASK) << CHAIN_TO_SHIFT
            | (self.trigger.treq_sel() as u32) << TREQ_SEL_SHIFT
            | (self.irq_quiet as u32) * IRQ_QUIET
            | (self.bswap as u32) * BSWAP
    }

    /// Unpacks a control word; direction is not part of the word.
    /// Returns `None` for the reserved data size encoding.
    pub fn from_ctrl(word: u32, own: ChannelHandle, direction: Direction) -> Option<Self> {
        let size = TransferSize::from_bits((word >> DATA_SIZE_SHIFT) & DATA_SIZE_MASK)?;
        let chain = ((word >> CHAIN_TO_SHIFT) & CHAIN_TO_MASK) as u8;
        Some(Self {
            direction,
            read_increment: word & INCR_READ != 0,
            write_increment: word & INCR_WRITE != 0,
            trigger: TriggerSource::from_treq_sel(((word >> TREQ_SEL_SHIFT) & TREQ_SEL_MASK) as u8),
            size,
            chain_to: if chain == own.index() {
                None
            } else {
                Some(ChannelHandle::new(chain))
            },
            irq_quiet: word & IRQ_QUIET != 0,
            bswap: word & BSWAP != 0,
            high_priority: word & HIGH_PRIORITY != 0,
            enable: word & EN != 0,
        })
    }
}

/// Result of offering one bus cycle to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelStep {
    Idle,
    Moved,
    Completed,
    Fault,
}

/// Live register state of one hardware channel
pub(crate) struct Channel {
    handle: ChannelHandle,
    config: Option<ChannelConfig>,
    read_addr: u32,
    write_addr: u32,
    trans_count: u32,
    busy: bool,
    busy_tail: u32, // Cycles BUSY keeps reading 1 after completion
    started: bool,
    bus_error: bool,
}

impl Channel {
    pub fn new(index: u8) -> Self {
        Self {
            handle: ChannelHandle::new(index),
            config: None,
            read_addr: 0,
            write_addr: 0,
            trans_count: 0,
            busy: false,
            busy_tail: 0,
            started: false,
            bus_error: false,
        }
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle
    }

    pub fn config(&self) -> Option<ChannelConfig> {
        self.config
    }

    pub fn set_config(&mut self, config: ChannelConfig) {
        self.config = Some(config);
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn bus_error(&self) -> bool {
        self.bus_error
    }

    pub fn is_busy(&self) -> bool {
        self.busy || self.busy_tail > 0
    }

    pub fn is_high_priority(&self) -> bool {
        self.config.map_or(false, |config| config.high_priority)
    }

    pub fn is_requesting(&self, dreq: u64) -> bool {
        self.busy
            && self
                .config
                .map_or(false, |config| config.trigger.is_requesting(dreq))
    }

    pub fn ctrl(&self) -> u32 {
        let word = self
            .config
            .map_or(0, |config| config.to_ctrl(self.handle));
        word | (self.is_busy() as u32) * BUSY
    }

    /// Run the BUSY tail down by one cycle
    pub fn settle(&mut self) {
        self.busy_tail = self.busy_tail.saturating_sub(1);
    }

    pub fn hold_busy(&mut self, cycles: u32) {
        self.busy_tail = cycles;
    }

    pub fn rearm(&mut self, read_addr: u32, write_addr: u32, len: u32) {
        if self.busy {
            warn!("Rearming DMA channel {} while busy", self.handle.index());
        }
        self.read_addr = read_addr;
        self.write_addr = write_addr;
        self.trans_count = len;
    }

    /// Begin a transfer; false if the channel cannot start
    pub fn start(&mut self) -> bool {
        let config = match self.config {
            Some(config) if config.enable => config,
            _ => {
                warn!("Trigger ignored on disabled DMA channel {}", self.handle.index());
                return false;
            }
        };
        if self.busy {
            debug!("Trigger ignored on busy DMA channel {}", self.handle.index());
            return false;
        }
        if self.trans_count == 0 {
            warn!("Trigger ignored on unarmed DMA channel {}", self.handle.index());
            return false;
        }
        debug!(
            "DMA channel {} start: 0x{:08x} -> 0x{:08x} x{} ({:?})",
            self.handle.index(),
            self.read_addr,
            self.write_addr,
            self.trans_count,
            config.size
        );
        self.busy = true;
        self.busy_tail = 0;
        self.started = true;
        self.bus_error = false;
        true
    }

    pub fn abort(&mut self) {
        self.busy = false;
        self.busy_tail = 0;
        self.trans_count = 0;
    }

    /// Move one element if the channel is running
    pub fn step(&mut self, bus: &mut Bus<'_>) -> ChannelStep {
        let config = match self.config {
            Some(config) if self.busy => config,
            _ => return ChannelStep::Idle,
        };

        let value = match bus.read(self.read_addr, config.size) {
            Some(value) => value,
            None => return self.fault(),
        };
        let value = if config.bswap {
            utils::bswap(value, config.size)
        } else {
            value
        };
        if bus.write(self.write_addr, config.size, value).is_none() {
            return self.fault();
        }

        if config.read_increment {
            self.read_addr = self.read_addr.wrapping_add(config.size.bytes());
        }
        if config.write_increment {
            self.write_addr = self.write_addr.wrapping_add(config.size.bytes());
        }

        self.trans_count -= 1;
        if self.trans_count == 0 {
            self.busy = false;
            ChannelStep::Completed
        } else {
            ChannelStep::Moved
        }
    }

    fn fault(&mut self) -> ChannelStep {
        error!(
            "Bus error on DMA channel {}, transfer aborted with {} elements left",
            self.handle.index(),
            self.trans_count
        );
        self.bus_error = true;
        self.abort();
        ChannelStep::Fault
    }
}
