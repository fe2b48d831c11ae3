//! Cycle-stepped stand-in for the DMA block and its interrupt controller.
//!
//! Every [`Simulator::step`] is one bus cycle: the peripheral raises its DREQ
//! lines, the channels move at most one element each, and then any asserted
//! interrupt line whose dispatch latency has elapsed runs its handler. That
//! last part is the preemption point of the main loop.

use crate::constants::sim::{MAX_FAULTS, STORM_THRESHOLD};
use crate::constants::{defaults, NUM_IRQ_LINES};
use crate::driver::DmaBus;
use crate::error::Error;
use crate::hw::{Bus, ChannelHandle, DmaController, InterruptHandler};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    /// Bus cycles an interrupt line stays asserted before its handler runs
    pub dispatch_latency: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dispatch_latency: defaults::DISPATCH_LATENCY,
        }
    }
}

/// Misbehaviour scheduled at a given bus cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Hold off every interrupt dispatch for `cycles` bus cycles starting at `at`
    MaskInterrupts { at: u64, cycles: u64 },
    /// Run the handler of `line` even though nothing is pending
    SpuriousDispatch { at: u64, line: usize },
    /// The channel's next completion never reaches the status register
    DropStatus { at: u64, channel: ChannelHandle },
}

impl Fault {
    fn at(&self) -> u64 {
        match *self {
            Fault::MaskInterrupts { at, .. }
            | Fault::SpuriousDispatch { at, .. }
            | Fault::DropStatus { at, .. } => at,
        }
    }
}

/// Per-line dispatch bookkeeping
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStats {
    pub dispatches: u64,
    /// Dispatches with no new completion delivered since the previous one
    pub stale_dispatches: u64,
}

pub struct Simulator<'a> {
    dma: DmaController,
    bus: Bus<'a>,
    config: SimConfig,
    handlers: [Option<&'a dyn InterruptHandler>; NUM_IRQ_LINES],

    cycle: u64,
    asserted_for: [u32; NUM_IRQ_LINES],
    raised_at_dispatch: [u64; NUM_IRQ_LINES],
    spurious: [bool; NUM_IRQ_LINES],
    masked_until: u64,
    faults: heapless::Vec<Fault, MAX_FAULTS>,
    lines: [LineStats; NUM_IRQ_LINES],
}

impl<'a> Simulator<'a> {
    pub fn new(dma: DmaController, bus: Bus<'a>, config: SimConfig) -> Self {
        Self {
            dma,
            bus,
            config,
            handlers: [None; NUM_IRQ_LINES],
            cycle: 0,
            asserted_for: [0; NUM_IRQ_LINES],
            raised_at_dispatch: [0; NUM_IRQ_LINES],
            spurious: [false; NUM_IRQ_LINES],
            masked_until: 0,
            faults: heapless::Vec::new(),
            lines: [LineStats::default(); NUM_IRQ_LINES],
        }
    }

    /// Exclusive handler for `line`; replaces any earlier registration
    pub fn register_handler(
        &mut self,
        line: usize,
        handler: &'a dyn InterruptHandler,
    ) -> Result<(), Error> {
        let slot = self
            .handlers
            .get_mut(line)
            .ok_or(Error::InvalidLine(line))?;
        *slot = Some(handler);
        Ok(())
    }

    /// Schedule a fault; hands it back if the schedule is full
    pub fn inject(&mut self, fault: Fault) -> Result<(), Fault> {
        self.faults.push(fault)
    }

    pub fn dma(&self) -> &DmaController {
        &self.dma
    }

    pub fn dma_mut(&mut self) -> &mut DmaController {
        &mut self.dma
    }

    pub fn bus(&self) -> &Bus<'a> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus<'a> {
        &mut self.bus
    }

    /// Bus cycles run so far
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn line_stats(&self, line: usize) -> LineStats {
        self.lines.get(line).copied().unwrap_or_default()
    }

    /// One bus cycle, followed by interrupt dispatch
    pub fn step(&mut self) {
        self.cycle += 1;
        self.apply_faults();

        let dreq = self.bus.tick_peripheral();
        self.dma.tick(&mut self.bus, dreq);

        for line in 0..NUM_IRQ_LINES {
            self.dispatch(line);
        }
    }

    /// Step until `done` holds or `max_cycles` have run; true if it held
    pub fn run_until<F>(&mut self, max_cycles: u64, mut done: F) -> bool
    where
        F: FnMut(&Simulator<'a>) -> bool,
    {
        for _ in 0..max_cycles {
            self.step();
            if done(self) {
                return true;
            }
        }
        false
    }

    fn apply_faults(&mut self) {
        let cycle = self.cycle;
        for index in 0..self.faults.len() {
            let fault = self.faults[index];
            if fault.at() != cycle {
                continue;
            }
            debug!("Injecting {:?} at cycle {}", fault, cycle);
            match fault {
                Fault::MaskInterrupts { cycles, .. } => {
                    self.masked_until = self.masked_until.max(cycle.saturating_add(cycles));
                }
                Fault::SpuriousDispatch { line, .. } => {
                    if let Some(flag) = self.spurious.get_mut(line) {
                        *flag = true;
                    }
                }
                Fault::DropStatus { channel, .. } => self.dma.suppress_next_status(channel),
            }
        }
    }

    fn dispatch(&mut self, line: usize) {
        let handler = match self.handlers[line] {
            Some(handler) => handler,
            None => return,
        };
        if self.cycle < self.masked_until {
            return;
        }

        let spurious = core::mem::replace(&mut self.spurious[line], false);
        if !spurious {
            let asserted = self
                .dma
                .status(line)
                .map_or(false, |status| status.is_asserted());
            if !asserted {
                self.asserted_for[line] = 0;
                return;
            }
            if self.asserted_for[line] < self.config.dispatch_latency {
                self.asserted_for[line] += 1;
                return;
            }
        }
        self.asserted_for[line] = 0;

        let raised = self.dma.raised_count(line);
        let stats = &mut self.lines[line];
        stats.dispatches += 1;
        if raised == self.raised_at_dispatch[line] {
            stats.stale_dispatches += 1;
            if stats.stale_dispatches == STORM_THRESHOLD {
                warn!(
                    "Interrupt storm on line {}: {} dispatches without a new completion",
                    line, STORM_THRESHOLD
                );
            }
        }
        self.raised_at_dispatch[line] = raised;

        if let Ok(status) = self.dma.status(line) {
            handler.on_interrupt(status);
        }
    }
}

impl<'a> DmaBus for Simulator<'a> {
    fn rearm(
        &mut self,
        handle: ChannelHandle,
        read_addr: u32,
        write_addr: u32,
        len: u32,
    ) -> Result<(), Error> {
        self.dma.rearm(handle, read_addr, write_addr, len)
    }

    fn trigger_mask(&mut self, mask: u32) {
        self.dma.trigger_mask(mask)
    }

    fn is_busy(&self, handle: ChannelHandle) -> bool {
        self.dma.is_busy(handle)
    }

    fn pending(&self, line: usize) -> u32 {
        self.dma.status(line).map_or(0, |status| status.read())
    }

    fn relax(&mut self) {
        self.step()
    }
}
