use dmapair_core::instrument::{CycleReport, DiagnosticSink, SinkError};
use log::debug;
use std::io::Write;

/// Writes one progress line per report to any byte sink (stdout by default)
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleSink {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        ConsoleSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DiagnosticSink for ConsoleSink<W> {
    fn report(&mut self, report: &CycleReport) -> Result<(), SinkError> {
        writeln!(
            self.out,
            "cycles: {:>8}  completed: {:>8}  missed: {:>4}  tx/rx: {}/{}  imbalance: {:+}  irqs: {}",
            report.cycles,
            report.completed,
            report.missed,
            report.tx_completions,
            report.rx_completions,
            report.imbalance,
            report.handler_entries
        )
        .and_then(|_| self.out.flush())
        .map_err(|e| {
            debug!("Console report dropped: {}", e);
            SinkError
        })
    }
}
