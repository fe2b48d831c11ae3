use crate::constants::bus::SRAM_BASE;
use crate::constants::defaults;
use crate::coordinator::{ChannelPair, CompletionCoordinator};
use crate::error::Error;
use crate::hw::ChannelHandle;
use crate::instrument::{CycleReport, DebugLines, DiagnosticSink, Line};
use crate::retry::{BoundedRetry, RetryOutcome};
use log::{debug, warn};

/// What the driver needs from the DMA block.
///
/// `relax` is one iteration of the busy-poll. On silicon it is a spin hint
/// and the hardware (and the interrupt) make progress on their own; a
/// simulator advances one bus cycle and dispatches pending interrupts there.
pub trait DmaBus {
    fn rearm(
        &mut self,
        handle: ChannelHandle,
        read_addr: u32,
        write_addr: u32,
        len: u32,
    ) -> Result<(), Error>;
    fn trigger_mask(&mut self, mask: u32);
    fn is_busy(&self, handle: ChannelHandle) -> bool;
    /// Non-destructive read of the status register of `line`
    fn pending(&self, line: usize) -> u32;
    fn relax(&mut self);
}

impl<T: DmaBus + ?Sized> DmaBus for &mut T {
    fn rearm(
        &mut self,
        handle: ChannelHandle,
        read_addr: u32,
        write_addr: u32,
        len: u32,
    ) -> Result<(), Error> {
        (**self).rearm(handle, read_addr, write_addr, len)
    }

    fn trigger_mask(&mut self, mask: u32) {
        (**self).trigger_mask(mask)
    }

    fn is_busy(&self, handle: ChannelHandle) -> bool {
        (**self).is_busy(handle)
    }

    fn pending(&self, line: usize) -> u32 {
        (**self).pending(line)
    }

    fn relax(&mut self) {
        (**self).relax()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Armed,
    AwaitingCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { polls: u32 },
    /// The wait budget ran out; the driver carries on with the next cycle
    Missed { polls: u32 },
}

/// Read/write addresses the pair is rearmed with every cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferBuffers {
    pub tx_read: u32,
    pub tx_write: u32,
    pub rx_read: u32,
    pub rx_write: u32,
}

impl Default for TransferBuffers {
    fn default() -> Self {
        Self {
            tx_read: SRAM_BASE,
            tx_write: SRAM_BASE + 0x100,
            rx_read: SRAM_BASE + 0x200,
            rx_write: SRAM_BASE + 0x300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub transfer_len: u32,
    pub poll_budget: u32,
    pub report_every: u64, // Zero disables periodic reports
    pub buffers: TransferBuffers,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            transfer_len: defaults::TRANSFER_LEN,
            poll_budget: defaults::POLL_BUDGET,
            report_every: defaults::REPORT_EVERY,
            buffers: TransferBuffers::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriverStats {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    pub missed_completions: u64,
    pub polls: u64,
}

/// Main-loop half of the paired transfer: Idle -> Armed -> AwaitingCompletion -> Idle
pub struct TransferCycleDriver<'a, B: DmaBus> {
    bus: B,
    coordinator: &'a CompletionCoordinator<'a>,
    lines: &'a dyn DebugLines,
    config: DriverConfig,
    retry: BoundedRetry,
    state: CycleState,
    stats: DriverStats,
}

impl<'a, B: DmaBus> TransferCycleDriver<'a, B> {
    pub fn new(
        bus: B,
        coordinator: &'a CompletionCoordinator<'a>,
        lines: &'a dyn DebugLines,
        config: DriverConfig,
    ) -> Self {
        Self {
            bus,
            coordinator,
            lines,
            config,
            retry: BoundedRetry::new(config.poll_budget),
            state: CycleState::Idle,
            stats: DriverStats::default(),
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Idle -> Armed: clear flags, rearm both channels, start them with one write
    pub fn arm(&mut self) -> Result<(), Error> {
        let ChannelPair { tx, rx } = self.coordinator.pair();
        let buffers = self.config.buffers;
        let len = self.config.transfer_len;

        self.coordinator.reset_flags();
        self.bus.rearm(tx, buffers.tx_read, buffers.tx_write, len)?;
        self.bus.rearm(rx, buffers.rx_read, buffers.rx_write, len)?;

        self.lines.toggle(Line::CycleStart);
        self.bus.trigger_mask(tx.bit() | rx.bit());

        self.stats.cycles_started += 1;
        self.state = CycleState::Armed;
        Ok(())
    }

    /// Armed -> AwaitingCompletion -> Idle.
    /// Done means both flags set, no residual status bit for either channel
    /// and neither channel busy; no single signal is trusted on its own.
    pub fn await_completion(&mut self) -> CycleOutcome {
        self.state = CycleState::AwaitingCompletion;

        let pair = self.coordinator.pair();
        let mask = pair.mask();
        let line = self.coordinator.line();
        let coordinator = self.coordinator;
        let bus = &mut self.bus;

        let outcome = self.retry.run(|| {
            bus.relax();
            coordinator.both_complete()
                && bus.pending(line) & mask == 0
                && !bus.is_busy(pair.tx)
                && !bus.is_busy(pair.rx)
        });
        self.stats.polls += outcome.attempts() as u64;
        self.state = CycleState::Idle;

        match outcome {
            RetryOutcome::Ready { attempts } => {
                self.stats.cycles_completed += 1;
                debug!(
                    "Cycle {} complete after {} polls",
                    self.stats.cycles_started, attempts
                );
                CycleOutcome::Completed { polls: attempts }
            }
            RetryOutcome::Exhausted { attempts } => {
                self.stats.missed_completions += 1;
                self.lines.toggle(Line::Missed);
                let (tx_done, rx_done) = coordinator.flags();
                warn!(
                    "Missed completion in cycle {}: tx={} rx={} pending=0x{:x} busy={}/{}",
                    self.stats.cycles_started,
                    tx_done,
                    rx_done,
                    self.bus.pending(line),
                    self.bus.is_busy(pair.tx),
                    self.bus.is_busy(pair.rx)
                );
                CycleOutcome::Missed { polls: attempts }
            }
        }
    }

    /// One full cycle. A missed completion is an outcome, not an error.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, Error> {
        self.arm()?;
        Ok(self.await_completion())
    }

    /// Run `count` cycles, reporting to `sink` at the configured cadence
    pub fn run_cycles(
        &mut self,
        count: u64,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<DriverStats, Error> {
        for _ in 0..count {
            self.run_reported(sink)?;
        }
        Ok(self.stats)
    }

    /// Run cycles until `stop` returns true (checked before each cycle)
    pub fn run_until<F>(&mut self, mut stop: F, sink: &mut dyn DiagnosticSink) -> Result<DriverStats, Error>
    where
        F: FnMut() -> bool,
    {
        while !stop() {
            self.run_reported(sink)?;
        }
        Ok(self.stats)
    }

    /// The always-on control loop; only returns if rearming fails
    pub fn run_forever(&mut self, sink: &mut dyn DiagnosticSink) -> Error {
        loop {
            if let Err(e) = self.run_reported(sink) {
                return e;
            }
        }
    }

    pub fn report(&self) -> CycleReport {
        let irq = self.coordinator.stats();
        CycleReport {
            cycles: self.stats.cycles_started,
            completed: self.stats.cycles_completed,
            missed: self.stats.missed_completions,
            tx_completions: irq.tx_completions,
            rx_completions: irq.rx_completions,
            handler_entries: irq.handler_entries,
            imbalance: irq.imbalance(),
        }
    }

    fn run_reported(&mut self, sink: &mut dyn DiagnosticSink) -> Result<CycleOutcome, Error> {
        let outcome = self.run_cycle()?;
        let every = self.config.report_every;
        if every != 0 && self.stats.cycles_started % every == 0 {
            // Best effort
            let _ = sink.report(&self.report());
        }
        Ok(outcome)
    }
}
