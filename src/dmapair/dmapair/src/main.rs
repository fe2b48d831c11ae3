#[macro_use]
extern crate clap;
use crossbeam_channel::{bounded, Receiver}; // Shutdown signalling
use log::{error, info, warn};
use std::fmt;

use dmapair_core::constants::bus::{PERIPH_BASE, SRAM_BASE};
use dmapair_core::coordinator::{AckPolicy, ChannelPair, CompletionCoordinator, CoordinatorConfig};
use dmapair_core::driver::{DriverConfig, TransferBuffers, TransferCycleDriver};
use dmapair_core::hw::{
    Bus, ChannelConfig, ClearSemantics, Direction, DmaController, Sram, TriggerSource,
};
use dmapair_core::instrument::{DebugLines, DiagnosticSink, LineBank};
use dmapair_core::sim::{SimConfig, Simulator};
use dmapair_peripherals::console::ConsoleSink;
use dmapair_peripherals::loopback::{LoopbackSerial, DREQ_RX, DREQ_TX, REG_DATA};
use dmapair_peripherals::streamer::ProbeStreamer;

const IRQ_LINE: usize = 0;
// Each buffer gets its own 256-byte slot in SRAM
const MAX_TRANSFER_LEN: u32 = 0x100;

struct Options {
    clear: ClearSemantics,
    ack: AckPolicy,
    cycles: Option<u64>, // None runs until Ctrl-C
    driver: DriverConfig,
    latency: u32,
    divider: u32,
    probe: Option<String>,
}

enum AppError {
    Dma(dmapair_core::Error),
    Probe(std::io::Error),
}

impl From<dmapair_core::Error> for AppError {
    fn from(e: dmapair_core::Error) -> Self {
        AppError::Dma(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Probe(e)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Dma(e) => write!(f, "DMA setup failed: {}", e),
            AppError::Probe(e) => write!(f, "Probe streamer failed: {}", e),
        }
    }
}

fn cycle_args<'a, 'b>(cmd: clap::App<'a, 'b>, default_cycles: &'a str) -> clap::App<'a, 'b> {
    cmd.arg(
        clap::Arg::with_name("cycles")
            .long("cycles")
            .takes_value(true)
            .default_value(default_cycles)
            .help("Transfer cycles to run, 0 runs until Ctrl-C"),
    )
    .arg(
        clap::Arg::with_name("budget")
            .long("budget")
            .takes_value(true)
            .default_value("10000")
            .help("Polls allowed per cycle before it counts as missed"),
    )
    .arg(
        clap::Arg::with_name("length")
            .long("length")
            .takes_value(true)
            .default_value("4")
            .help("Elements moved by each channel per cycle (1-256)"),
    )
    .arg(
        clap::Arg::with_name("report-every")
            .long("report-every")
            .takes_value(true)
            .default_value("1000")
            .help("Cycles between progress reports, 0 disables them"),
    )
    .arg(
        clap::Arg::with_name("latency")
            .long("latency")
            .takes_value(true)
            .default_value("1")
            .help("Bus cycles between interrupt assertion and handler entry"),
    )
    .arg(
        clap::Arg::with_name("divider")
            .long("divider")
            .takes_value(true)
            .default_value("4")
            .help("Bus cycles per byte on the loopback serial line"),
    )
    .arg(
        clap::Arg::with_name("probe")
            .long("probe")
            .takes_value(true)
            .value_name("ADDR")
            .help("Stream debug line edges to TCP clients on ADDR"),
    )
}

/// Configures command-line interface using clap
fn get_cli_config<'a>() -> clap::ArgMatches<'a> {
    let description = "Paired tx/rx DMA transfers with interrupt-driven completion";
    clap::App::new("dmapair")
        .version("0.1")
        .about(description)
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .subcommand(cycle_args(
            clap::SubCommand::with_name("run")
                .about("Run the transfer loop on silicon that clears every status bit"),
            "0",
        ))
        .subcommand(cycle_args(
            clap::SubCommand::with_name("storm")
                .about("Acknowledge only the first channel on write-one-to-clear silicon"),
            "10",
        ))
        .get_matches()
}

fn parse_options(matches: &clap::ArgMatches<'_>, clear: ClearSemantics, ack: AckPolicy) -> Options {
    let cycles = value_t!(matches, "cycles", u64).unwrap_or_else(|e| e.exit());
    let length = value_t!(matches, "length", u32).unwrap_or_else(|e| e.exit());
    let buffers = TransferBuffers {
        tx_read: SRAM_BASE,
        tx_write: PERIPH_BASE + REG_DATA,
        rx_read: PERIPH_BASE + REG_DATA,
        rx_write: SRAM_BASE + MAX_TRANSFER_LEN,
    };

    Options {
        clear,
        ack,
        cycles: if cycles == 0 { None } else { Some(cycles) },
        driver: DriverConfig {
            transfer_len: length,
            poll_budget: value_t!(matches, "budget", u32).unwrap_or_else(|e| e.exit()),
            report_every: value_t!(matches, "report-every", u64)
                .unwrap_or_else(|e| e.exit()),
            buffers,
        },
        latency: value_t!(matches, "latency", u32).unwrap_or_else(|e| e.exit()),
        divider: value_t!(matches, "divider", u32).unwrap_or_else(|e| e.exit()),
        probe: matches.value_of("probe").map(String::from),
    }
}

// tx: SRAM -> serial DATA, rx: serial DATA -> SRAM, both paced by the serial block
fn claim_pair(dma: &mut DmaController) -> Result<ChannelPair, dmapair_core::Error> {
    let tx = dma.claim()?;
    let rx = dma.claim()?;
    dma.configure(
        tx,
        ChannelConfig::new(Direction::Transmit).with_trigger(TriggerSource::Dreq(DREQ_TX)),
    )?;
    dma.configure(
        rx,
        ChannelConfig::new(Direction::Receive).with_trigger(TriggerSource::Dreq(DREQ_RX)),
    )?;
    dma.set_irq_enabled(IRQ_LINE, tx, true)?;
    dma.set_irq_enabled(IRQ_LINE, rx, true)?;
    info!("Claimed DMA channels {} (tx) and {} (rx)", tx.index(), rx.index());
    Ok(ChannelPair::new(tx, rx))
}

// Counting pattern the receive buffer is checked against after the run
fn load_payload(sram: &mut Sram, addr: u32, len: u32) -> Result<Vec<u8>, dmapair_core::Error> {
    let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
    if !sram.load(addr, &payload) {
        error!("Payload of {} bytes does not fit SRAM at 0x{:08x}", len, addr);
        return Err(dmapair_core::Error::InvalidLength);
    }
    Ok(payload)
}

fn run(options: Options, stop: Receiver<()>) -> Result<(), AppError> {
    let len = options.driver.transfer_len;
    if len == 0 || len > MAX_TRANSFER_LEN {
        return Err(dmapair_core::Error::InvalidLength.into());
    }

    let probe = match options.probe.as_deref() {
        Some(addr) => Some(ProbeStreamer::bind(addr)?),
        None => None,
    };
    let bank = LineBank::new();
    let lines: &dyn DebugLines = match probe.as_ref() {
        Some(streamer) => streamer,
        None => &bank,
    };

    let mut serial = LoopbackSerial::new(options.divider);
    let mut dma = DmaController::new(options.clear);
    let pair = claim_pair(&mut dma)?;
    let coordinator = CompletionCoordinator::new(
        pair,
        CoordinatorConfig {
            line: IRQ_LINE,
            ack: options.ack,
        },
        lines,
    );

    let sim_config = SimConfig {
        dispatch_latency: options.latency,
    };
    let mut sim = Simulator::new(dma, Bus::new(&mut serial), sim_config);
    sim.register_handler(IRQ_LINE, &coordinator)?;
    let payload = load_payload(sim.bus_mut().sram_mut(), options.driver.buffers.tx_read, len)?;

    let mut sink = ConsoleSink::stdout();
    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, lines, options.driver);
    let mut remaining = options.cycles;
    let stats = driver.run_until(
        || {
            if !stop.is_empty() {
                return true;
            }
            match remaining.as_mut() {
                Some(0) => true,
                Some(n) => {
                    *n -= 1;
                    false
                }
                None => false,
            }
        },
        &mut sink,
    )?;
    let report = driver.report();
    let _ = sink.report(&report);
    drop(driver);

    let rx_write = options.driver.buffers.rx_write;
    if sim.bus().sram().slice(rx_write, len as usize) != Some(&payload[..]) {
        warn!("Receive buffer does not match the transmitted payload");
    }
    let irq = sim.line_stats(IRQ_LINE);
    info!(
        "Done: {} cycles, {} missed, {} dispatches ({} stale), imbalance {}",
        stats.cycles_started,
        stats.missed_completions,
        irq.dispatches,
        irq.stale_dispatches,
        report.imbalance
    );
    drop(sim);

    let serial_stats = serial.stats();
    if serial_stats.overruns != 0 || serial_stats.underflows != 0 {
        warn!(
            "Loopback serial: {} overruns, {} underflows",
            serial_stats.overruns, serial_stats.underflows
        );
    }
    if let Some(streamer) = probe.as_ref() {
        if streamer.dropped() != 0 {
            warn!("{} probe edges dropped", streamer.dropped());
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();

    // Set up Ctrl-C handler with channel communication
    let (signal_sender, signal_receiver) = bounded(1);
    let handler_result = ctrlc::set_handler(move || {
        if signal_sender.is_full() {
            std::process::exit(-1); // Second Ctrl-C while still winding down
        }
        let _send_result = signal_sender.send(());
    });

    if let Err(e) = handler_result {
        error!("Signal handler failed: {:?}", e);
        std::process::exit(1);
    }

    let cli_matches = get_cli_config();
    let options = match cli_matches.subcommand() {
        ("run", Some(sub)) => parse_options(sub, ClearSemantics::ClearAll, AckPolicy::Snapshot),
        ("storm", Some(sub)) => {
            parse_options(sub, ClearSemantics::WriteOneToClear, AckPolicy::FirstChannel)
        }
        _ => {
            error!("Invalid mode specified");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(options, signal_receiver) {
        error!("{}", e);
        std::process::exit(1);
    }
}
