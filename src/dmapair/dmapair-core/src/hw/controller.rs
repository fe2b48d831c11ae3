use super::channel::{Channel, ChannelStep};
use super::{Bus, ChannelConfig, ChannelHandle, ClearSemantics, StatusRegister, TriggerSource};
use crate::constants::dreq::DREQ_FORCE;
use crate::constants::{NUM_CHANNELS, NUM_IRQ_LINES};
use crate::error::Error;
use crate::utils::iter_bits;
use log::{debug, warn};

/// One interrupt output of the DMA block
struct IrqLine {
    enable: u32, // INTE: channels routed to this line
    status: StatusRegister,
    raised: u64, // Completion bits delivered to this line
}

/// Fixed pool of DMA channels plus the interrupt status registers they share
pub struct DmaController {
    channels: [Channel; NUM_CHANNELS],
    claimed: u32,
    lines: [IrqLine; NUM_IRQ_LINES],
    busy_lag: u32,
    suppressed: u32, // One-shot: swallow the next completion bit of these channels
    completions: [u64; NUM_CHANNELS],
}

impl DmaController {
    pub fn new(clear: ClearSemantics) -> Self {
        Self {
            channels: core::array::from_fn(|index| Channel::new(index as u8)),
            claimed: 0,
            lines: core::array::from_fn(|_| IrqLine::new(clear)),
            busy_lag: 0,
            suppressed: 0,
            completions: [0; NUM_CHANNELS],
        }
    }

    /// Keep BUSY reading 1 for `cycles` bus cycles after the status bit is set
    pub fn with_busy_lag(mut self, cycles: u32) -> Self {
        self.busy_lag = cycles;
        self
    }

    /// Acquire the lowest unclaimed channel
    pub fn claim(&mut self) -> Result<ChannelHandle, Error> {
        let index = (0..NUM_CHANNELS)
            .find(|index| self.claimed & (1 << index) == 0)
            .ok_or(Error::ResourceExhausted)?;
        self.claimed |= 1 << index;
        debug!("Claimed DMA channel {}", index);
        Ok(self.channels[index].handle())
    }

    pub fn claimed_mask(&self) -> u32 {
        self.claimed
    }

    /// Set the static transfer shape.
    /// Re-applying the same configuration is a no-op; changing it once the
    /// channel has been started is refused. DREQ numbers from `DREQ_FORCE`
    /// up are rejected, since the control word cannot tell them from Force.
    pub fn configure(&mut self, handle: ChannelHandle, config: ChannelConfig) -> Result<(), Error> {
        if let TriggerSource::Dreq(line) = config.trigger {
            if line >= DREQ_FORCE {
                return Err(Error::InvalidTrigger(line));
            }
        }
        let channel = self.channel_mut(handle)?;
        match channel.config() {
            Some(current) if current == config => Ok(()),
            Some(_) if channel.has_started() => Err(Error::ConfigurationLocked(handle.index())),
            _ => {
                channel.set_config(config);
                Ok(())
            }
        }
    }

    pub fn config(&self, handle: ChannelHandle) -> Result<Option<ChannelConfig>, Error> {
        Ok(self.channel(handle)?.config())
    }

    /// Reset pointers and transfer count for the next trigger
    pub fn rearm(
        &mut self,
        handle: ChannelHandle,
        read_addr: u32,
        write_addr: u32,
        len: u32,
    ) -> Result<(), Error> {
        if len == 0 {
            return Err(Error::InvalidLength);
        }
        self.channel_mut(handle)?.rearm(read_addr, write_addr, len);
        Ok(())
    }

    /// Start every channel in `mask` within the same bus cycle
    pub fn trigger_mask(&mut self, mask: u32) {
        let stray = mask & !self.claimed;
        if stray != 0 {
            warn!("Trigger mask 0x{:x} names unclaimed channels", stray);
        }
        for index in iter_bits(mask & self.claimed) {
            self.channels[index].start();
        }
    }

    /// True until the channel's transfer count has run out
    pub fn is_busy(&self, handle: ChannelHandle) -> bool {
        self.channel(handle).map_or(false, |channel| channel.is_busy())
    }

    /// Stop a channel without raising its completion bit
    pub fn abort(&mut self, handle: ChannelHandle) -> Result<(), Error> {
        self.channel_mut(handle)?.abort();
        Ok(())
    }

    pub fn bus_error(&self, handle: ChannelHandle) -> bool {
        self.channel(handle).map_or(false, |channel| channel.bus_error())
    }

    /// Control word readback, BUSY included
    pub fn ctrl(&self, handle: ChannelHandle) -> Result<u32, Error> {
        Ok(self.channel(handle)?.ctrl())
    }

    /// Route (or unroute) a channel's completion to an interrupt line
    pub fn set_irq_enabled(
        &mut self,
        line: usize,
        handle: ChannelHandle,
        enabled: bool,
    ) -> Result<(), Error> {
        self.channel(handle)?;
        let irq = self.lines.get_mut(line).ok_or(Error::InvalidLine(line))?;
        if enabled {
            irq.enable |= handle.bit();
        } else {
            irq.enable &= !handle.bit();
        }
        Ok(())
    }

    pub fn irq_enabled(&self, line: usize) -> Result<u32, Error> {
        Ok(self.line(line)?.enable)
    }

    /// Status register shared by every channel routed to `line`
    pub fn status(&self, line: usize) -> Result<&StatusRegister, Error> {
        Ok(&self.line(line)?.status)
    }

    /// Completion bits delivered to `line` since power-up
    pub fn raised_count(&self, line: usize) -> u64 {
        self.lines.get(line).map_or(0, |irq| irq.raised)
    }

    /// Transfers the hardware has completed on this channel
    pub fn completion_count(&self, handle: ChannelHandle) -> u64 {
        self.completions
            .get(handle.index() as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Drop the status update of this channel's next completion
    pub fn suppress_next_status(&mut self, handle: ChannelHandle) {
        self.suppressed |= handle.bit();
    }

    /// Run one bus cycle; returns the mask of channels that completed
    pub fn tick(&mut self, bus: &mut Bus<'_>, dreq: u64) -> u32 {
        for channel in self.channels.iter_mut() {
            channel.settle();
        }

        let mut completed = 0;
        for &high in [true, false].iter() {
            for channel in self.channels.iter_mut() {
                if channel.is_high_priority() != high || !channel.is_requesting(dreq) {
                    continue;
                }
                if channel.step(bus) == ChannelStep::Completed {
                    completed |= channel.handle().bit();
                }
            }
        }

        if completed != 0 {
            self.complete(completed);
        }
        completed
    }

    fn complete(&mut self, completed: u32) {
        for index in iter_bits(completed) {
            self.completions[index] += 1;
            let channel = &mut self.channels[index];
            channel.hold_busy(self.busy_lag);
            let handle = channel.handle();
            let config = match channel.config() {
                Some(config) => config,
                None => continue,
            };

            if self.suppressed & handle.bit() != 0 {
                self.suppressed &= !handle.bit();
                debug!("Completion status of DMA channel {} dropped", index);
            } else if !config.irq_quiet {
                for irq in self.lines.iter_mut() {
                    if irq.enable & handle.bit() != 0 {
                        irq.status.raise(handle.bit());
                        irq.raised += 1;
                    }
                }
            }

            if let Some(target) = config.chain_target(handle) {
                debug!("DMA channel {} chains to {}", index, target.index());
                if let Some(next) = self.channels.get_mut(target.index() as usize) {
                    next.start();
                }
            }
        }
    }

    fn line(&self, line: usize) -> Result<&IrqLine, Error> {
        self.lines.get(line).ok_or(Error::InvalidLine(line))
    }

    fn channel(&self, handle: ChannelHandle) -> Result<&Channel, Error> {
        let index = handle.index();
        if index as usize >= NUM_CHANNELS {
            return Err(Error::InvalidChannel(index));
        }
        if self.claimed & handle.bit() == 0 {
            return Err(Error::NotClaimed(index));
        }
        Ok(&self.channels[index as usize])
    }

    fn channel_mut(&mut self, handle: ChannelHandle) -> Result<&mut Channel, Error> {
        self.channel(handle)?;
        Ok(&mut self.channels[handle.index() as usize])
    }
}

impl IrqLine {
    fn new(clear: ClearSemantics) -> Self {
        Self {
            enable: 0,
            status: StatusRegister::new(clear),
            raised: 0,
        }
    }
}
