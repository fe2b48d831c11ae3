//! Completion coordinator: the interrupt-side half of the paired transfer.
//!
//! The handler is a pure observe / acknowledge / publish stage:
//!
//! 1. snapshot the status register exactly once,
//! 2. fold each of the pair's bits into its completion flag,
//! 3. acknowledge exactly once, after the flags are written, hinting every
//!    bit seen in the snapshot,
//! 4. return.
//!
//! Flags are written with `Release` and read by the driver with `Acquire`,
//! so a flag observed set implies every write the handler made before it is
//! visible too. The handler is the only writer that sets a flag; the driver
//! is the only one that clears them, between cycles.

use crate::hw::{ChannelHandle, InterruptHandler, StatusRegister};
use crate::instrument::{DebugLines, Line};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// What the handler writes to the acknowledgment path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// Hint every bit of the snapshot
    Snapshot,
    /// Hint only the transmit channel's bit. Works on silicon whose
    /// acknowledgment clears the whole register; on write-one-to-clear
    /// silicon it strands the receive bit and the line never de-asserts.
    FirstChannel,
}

/// The transmit/receive channels completing in lockstep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPair {
    pub tx: ChannelHandle,
    pub rx: ChannelHandle,
}

impl ChannelPair {
    pub fn new(tx: ChannelHandle, rx: ChannelHandle) -> Self {
        Self { tx, rx }
    }

    /// Both channels' bits, as used for the trigger and status masks
    pub fn mask(&self) -> u32 {
        self.tx.bit() | self.rx.bit()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub line: usize,
    pub ack: AckPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            line: 0,
            ack: AckPolicy::Snapshot,
        }
    }
}

/// Counters kept by the handler; observability only
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub handler_entries: u32,
    pub acknowledgements: u32,
    pub empty_entries: u32,
    pub tx_completions: u32,
    pub rx_completions: u32,
}

impl CoordinatorStats {
    /// Transmit minus receive completions; non-zero means one side drifted
    pub fn imbalance(&self) -> i64 {
        self.tx_completions as i64 - self.rx_completions as i64
    }
}

/// Owned completion state shared by the interrupt handler and the driver
pub struct CompletionCoordinator<'a> {
    pair: ChannelPair,
    config: CoordinatorConfig,
    lines: &'a dyn DebugLines,

    tx_done: AtomicBool,
    rx_done: AtomicBool,

    entries: AtomicU32,
    acks: AtomicU32,
    empty: AtomicU32,
    tx_completions: AtomicU32,
    rx_completions: AtomicU32,
}

impl<'a> CompletionCoordinator<'a> {
    pub fn new(pair: ChannelPair, config: CoordinatorConfig, lines: &'a dyn DebugLines) -> Self {
        Self {
            pair,
            config,
            lines,
            tx_done: AtomicBool::new(false),
            rx_done: AtomicBool::new(false),
            entries: AtomicU32::new(0),
            acks: AtomicU32::new(0),
            empty: AtomicU32::new(0),
            tx_completions: AtomicU32::new(0),
            rx_completions: AtomicU32::new(0),
        }
    }

    pub fn pair(&self) -> ChannelPair {
        self.pair
    }

    pub fn line(&self) -> usize {
        self.config.line
    }

    pub fn ack_policy(&self) -> AckPolicy {
        self.config.ack
    }

    /// Current (tx, rx) completion flags
    pub fn flags(&self) -> (bool, bool) {
        (
            self.tx_done.load(Ordering::Acquire),
            self.rx_done.load(Ordering::Acquire),
        )
    }

    pub fn both_complete(&self) -> bool {
        let (tx, rx) = self.flags();
        tx && rx
    }

    /// Driver-side reset, only between cycles
    pub fn reset_flags(&self) {
        self.tx_done.store(false, Ordering::Release);
        self.rx_done.store(false, Ordering::Release);
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            handler_entries: self.entries.load(Ordering::Relaxed),
            acknowledgements: self.acks.load(Ordering::Relaxed),
            empty_entries: self.empty.load(Ordering::Relaxed),
            tx_completions: self.tx_completions.load(Ordering::Relaxed),
            rx_completions: self.rx_completions.load(Ordering::Relaxed),
        }
    }

    fn publish(&self, flag: &AtomicBool, count: &AtomicU32, line: Line) {
        flag.store(true, Ordering::Release);
        count.fetch_add(1, Ordering::Relaxed);
        self.lines.toggle(line);
    }
}

impl<'a> InterruptHandler for CompletionCoordinator<'a> {
    fn on_interrupt(&self, status: &StatusRegister) {
        self.entries.fetch_add(1, Ordering::Relaxed);

        // Both bits may already be set by the time we get here
        let snapshot = status.read();
        self.lines.set(Line::Interrupt, snapshot != 0);

        let tx_bit = self.pair.tx.bit();
        let rx_bit = self.pair.rx.bit();
        if snapshot & tx_bit != 0 {
            self.publish(&self.tx_done, &self.tx_completions, Line::TxDone);
        }
        if snapshot & rx_bit != 0 {
            self.publish(&self.rx_done, &self.rx_completions, Line::RxDone);
        }
        if snapshot & self.pair.mask() == 0 {
            // Line raced with an earlier acknowledgment; nothing to attribute
            self.empty.fetch_add(1, Ordering::Relaxed);
        }

        let hint = match self.config.ack {
            AckPolicy::Snapshot => snapshot,
            AckPolicy::FirstChannel => tx_bit,
        };
        status.acknowledge(hint);
        self.acks.fetch_add(1, Ordering::Relaxed);

        self.lines.set(Line::Interrupt, status.read() != 0);
    }
}

#[cfg(test)]
mod coordinator_tests {
    use super::*;
    use crate::hw::{ClearSemantics, DmaController};
    use crate::instrument::LineBank;

    fn claim_pair() -> ChannelPair {
        let mut dma = DmaController::new(ClearSemantics::ClearAll);
        let tx = dma.claim().unwrap();
        let rx = dma.claim().unwrap();
        ChannelPair::new(tx, rx)
    }

    #[test]
    fn test_both_bits_in_one_entry() {
        let pair = claim_pair();
        let lines = LineBank::new();
        let coordinator = CompletionCoordinator::new(pair, CoordinatorConfig::default(), &lines);
        let status = StatusRegister::new(ClearSemantics::WriteOneToClear);

        status.raise(pair.mask());
        coordinator.on_interrupt(&status);

        assert_eq!(coordinator.flags(), (true, true));
        assert_eq!(status.read(), 0);
        assert_eq!(status.acknowledge_count(), 1);
        let stats = coordinator.stats();
        assert_eq!(stats.handler_entries, 1);
        assert_eq!(stats.acknowledgements, 1);
        assert_eq!(stats.imbalance(), 0);
        assert_eq!(lines.edges(Line::TxDone), 1);
        assert_eq!(lines.edges(Line::RxDone), 1);
        // Raised on entry, dropped once the register cleared
        assert_eq!(lines.edges(Line::Interrupt), 2);
        assert!(!lines.get(Line::Interrupt));
    }

    #[test]
    fn test_flags_accumulate_across_entries() {
        let pair = claim_pair();
        let coordinator =
            CompletionCoordinator::new(pair, CoordinatorConfig::default(), &crate::instrument::NoLines);
        let status = StatusRegister::new(ClearSemantics::ClearAll);

        status.raise(pair.tx.bit());
        coordinator.on_interrupt(&status);
        assert_eq!(coordinator.flags(), (true, false));
        assert!(!coordinator.both_complete());

        status.raise(pair.rx.bit());
        coordinator.on_interrupt(&status);
        assert_eq!(coordinator.flags(), (true, true));
        assert_eq!(status.acknowledge_count(), 2);

        coordinator.reset_flags();
        assert_eq!(coordinator.flags(), (false, false));
        // Counters survive a flag reset
        assert_eq!(coordinator.stats().tx_completions, 1);
    }

    #[test]
    fn test_empty_snapshot_is_a_no_op() {
        let pair = claim_pair();
        let lines = LineBank::new();
        let coordinator = CompletionCoordinator::new(pair, CoordinatorConfig::default(), &lines);
        let status = StatusRegister::new(ClearSemantics::ClearAll);

        coordinator.on_interrupt(&status);

        assert_eq!(coordinator.flags(), (false, false));
        assert_eq!(status.acknowledge_count(), 1);
        let stats = coordinator.stats();
        assert_eq!(stats.empty_entries, 1);
        assert_eq!(stats.tx_completions, 0);
        assert_eq!(stats.rx_completions, 0);
        for line in Line::ALL.iter() {
            assert_eq!(lines.edges(*line), 0);
        }
    }

    #[test]
    fn test_first_channel_hint_strands_sibling() {
        let pair = claim_pair();
        let config = CoordinatorConfig {
            line: 0,
            ack: AckPolicy::FirstChannel,
        };
        let coordinator = CompletionCoordinator::new(pair, config, &crate::instrument::NoLines);

        let w1c = StatusRegister::new(ClearSemantics::WriteOneToClear);
        w1c.raise(pair.mask());
        coordinator.on_interrupt(&w1c);
        assert_eq!(w1c.read(), pair.rx.bit());

        let clear_all = StatusRegister::new(ClearSemantics::ClearAll);
        clear_all.raise(pair.mask());
        coordinator.on_interrupt(&clear_all);
        assert_eq!(clear_all.read(), 0);
    }

    #[test]
    fn test_foreign_bits_are_acknowledged_not_attributed() {
        let pair = claim_pair();
        let coordinator =
            CompletionCoordinator::new(pair, CoordinatorConfig::default(), &crate::instrument::NoLines);
        let status = StatusRegister::new(ClearSemantics::WriteOneToClear);

        status.raise(1 << 9);
        coordinator.on_interrupt(&status);
        assert_eq!(coordinator.flags(), (false, false));
        assert_eq!(status.read(), 0);
        assert_eq!(coordinator.stats().empty_entries, 1);
    }
}
