use core::sync::atomic::{AtomicU32, Ordering};
use log::info;

const NUM_LINES: usize = 5;

/// Debug output lines, one per observable event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    TxDone,
    RxDone,
    CycleStart,
    Interrupt,
    Missed,
}

impl Line {
    pub const ALL: [Line; NUM_LINES] = [
        Line::TxDone,
        Line::RxDone,
        Line::CycleStart,
        Line::Interrupt,
        Line::Missed,
    ];

    pub fn index(self) -> u8 {
        match self {
            Line::TxDone => 0,
            Line::RxDone => 1,
            Line::CycleStart => 2,
            Line::Interrupt => 3,
            Line::Missed => 4,
        }
    }

    pub fn from_index(index: u8) -> Option<Line> {
        Line::ALL.get(index as usize).copied()
    }
}

/// Independent boolean outputs for external instrumentation.
/// Writes never feed back into the coordinator or the driver.
pub trait DebugLines {
    fn set(&self, line: Line, level: bool);
    fn get(&self, line: Line) -> bool;

    fn toggle(&self, line: Line) {
        self.set(line, !self.get(line));
    }
}

/// Lines that go nowhere
pub struct NoLines;

impl DebugLines for NoLines {
    fn set(&self, _line: Line, _level: bool) {}

    fn get(&self, _line: Line) -> bool {
        false
    }
}

/// Latched line levels with an edge counter per line
pub struct LineBank {
    levels: AtomicU32,
    edges: [AtomicU32; NUM_LINES],
}

impl LineBank {
    pub fn new() -> Self {
        Self {
            levels: AtomicU32::new(0),
            edges: Default::default(),
        }
    }

    /// Level changes seen on `line`
    pub fn edges(&self, line: Line) -> u32 {
        self.edges[line.index() as usize].load(Ordering::Relaxed)
    }
}

impl DebugLines for LineBank {
    fn set(&self, line: Line, level: bool) {
        let bit = 1 << line.index();
        let previous = if level {
            self.levels.fetch_or(bit, Ordering::Relaxed)
        } else {
            self.levels.fetch_and(!bit, Ordering::Relaxed)
        };
        if (previous & bit != 0) != level {
            self.edges[line.index() as usize].fetch_add(1, Ordering::Relaxed);
        }
    }

    fn get(&self, line: Line) -> bool {
        self.levels.load(Ordering::Relaxed) & (1 << line.index()) != 0
    }
}

/// Periodic progress snapshot handed to a [`DiagnosticSink`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub cycles: u64,
    pub completed: u64,
    pub missed: u64,
    pub tx_completions: u32,
    pub rx_completions: u32,
    pub handler_entries: u32,
    pub imbalance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkError;

/// Best-effort progress reporting; the driver ignores failures
pub trait DiagnosticSink {
    fn report(&mut self, report: &CycleReport) -> Result<(), SinkError>;
}

/// Reports through the `log` facade
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, report: &CycleReport) -> Result<(), SinkError> {
        info!(
            "cycles={} completed={} missed={} tx={} rx={} imbalance={} irqs={}",
            report.cycles,
            report.completed,
            report.missed,
            report.tx_completions,
            report.rx_completions,
            report.imbalance,
            report.handler_entries
        );
        Ok(())
    }
}

/// Discards every report
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&mut self, _report: &CycleReport) -> Result<(), SinkError> {
        Ok(())
    }
}
