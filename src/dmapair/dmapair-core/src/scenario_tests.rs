// End-to-end runs of driver + coordinator against the simulated DMA block
use crate::coordinator::{AckPolicy, ChannelPair, CompletionCoordinator, CoordinatorConfig};
use crate::driver::{CycleOutcome, DriverConfig, TransferCycleDriver};
use crate::hw::{
    Bus, ChannelConfig, ClearSemantics, Direction, DmaController, Peripheral, TriggerSource,
};
use crate::instrument::{Line, LineBank, NullSink};
use crate::sim::{Fault, SimConfig, Simulator};

const TX_SRC: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];
const RX_SRC: [u8; 4] = [0x01, 0x02, 0x03, 0x04];

/// Memory-to-memory pair on line 0, rx optionally paced by a DREQ line
fn claim_pair(dma: &mut DmaController, rx_trigger: TriggerSource) -> ChannelPair {
    let tx = dma.claim().unwrap();
    let rx = dma.claim().unwrap();
    let tx_config = ChannelConfig::new(Direction::Transmit).with_increments(true, true);
    let rx_config = ChannelConfig::new(Direction::Receive)
        .with_increments(true, true)
        .with_trigger(rx_trigger);
    dma.configure(tx, tx_config).unwrap();
    dma.configure(rx, rx_config).unwrap();
    dma.set_irq_enabled(0, tx, true).unwrap();
    dma.set_irq_enabled(0, rx, true).unwrap();
    ChannelPair::new(tx, rx)
}

fn driver_config(poll_budget: u32) -> DriverConfig {
    DriverConfig {
        poll_budget,
        report_every: 0,
        ..DriverConfig::default()
    }
}

fn coordinator_config(ack: AckPolicy) -> CoordinatorConfig {
    CoordinatorConfig { line: 0, ack }
}

fn load_sources(sim: &mut Simulator<'_>, config: &DriverConfig) {
    let sram = sim.bus_mut().sram_mut();
    assert!(sram.load(config.buffers.tx_read, &TX_SRC));
    assert!(sram.load(config.buffers.rx_read, &RX_SRC));
}

/// Raises DREQ 1 once every `every` bus cycles
struct Pacer {
    cycle: u64,
    every: u64,
}

impl Peripheral for Pacer {
    fn read(&mut self, _offset: u32) -> u32 {
        0
    }

    fn write(&mut self, _offset: u32, _value: u32) {}

    fn tick(&mut self) -> u64 {
        self.cycle += 1;
        if self.cycle % self.every == 0 {
            1 << 1
        } else {
            0
        }
    }
}

#[test]
fn test_paired_transfer_completes() {
    let lines = LineBank::new();
    let mut dma = DmaController::new(ClearSemantics::ClearAll);
    let pair = claim_pair(&mut dma, TriggerSource::Force);
    let coordinator =
        CompletionCoordinator::new(pair, coordinator_config(AckPolicy::Snapshot), &lines);
    let mut sim = Simulator::new(dma, Bus::new_blank(), SimConfig::default());
    sim.register_handler(0, &coordinator).unwrap();
    let config = driver_config(100);
    load_sources(&mut sim, &config);

    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, &lines, config);
    // Four moves, then one cycle of dispatch latency
    assert_eq!(driver.run_cycle(), Ok(CycleOutcome::Completed { polls: 5 }));
    assert_eq!(coordinator.flags(), (true, true));
    let stats = driver.stats();
    assert_eq!(stats.cycles_completed, 1);
    assert_eq!(stats.missed_completions, 0);

    let status = sim.dma().status(0).unwrap();
    assert_eq!(status.read(), 0);
    assert_eq!(status.acknowledge_count(), 1);
    let sram = sim.bus().sram();
    assert_eq!(sram.slice(config.buffers.tx_write, 4), Some(&TX_SRC[..]));
    assert_eq!(sram.slice(config.buffers.rx_write, 4), Some(&RX_SRC[..]));
    assert_eq!(lines.edges(Line::TxDone), 1);
    assert_eq!(lines.edges(Line::RxDone), 1);
}

#[test]
fn test_repeated_cycles_are_identical() {
    let lines = LineBank::new();
    let mut dma = DmaController::new(ClearSemantics::ClearAll);
    let pair = claim_pair(&mut dma, TriggerSource::Force);
    let coordinator =
        CompletionCoordinator::new(pair, coordinator_config(AckPolicy::Snapshot), &lines);
    let mut sim = Simulator::new(dma, Bus::new_blank(), SimConfig::default());
    sim.register_handler(0, &coordinator).unwrap();
    let config = driver_config(100);
    load_sources(&mut sim, &config);

    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, &lines, config);
    let first = driver.run_cycle().unwrap();
    assert_eq!(coordinator.flags(), (true, true));
    let second = driver.run_cycle().unwrap();
    assert_eq!(coordinator.flags(), (true, true));
    assert_eq!(first, second);

    let stats = coordinator.stats();
    assert_eq!(stats.handler_entries, 2);
    assert_eq!(stats.tx_completions, 2);
    assert_eq!(stats.rx_completions, 2);
    drop(driver);
    assert_eq!(sim.dma().status(0).unwrap().read(), 0);
    assert_eq!(sim.dma().completion_count(pair.tx), 2);
    assert_eq!(sim.dma().completion_count(pair.rx), 2);
}

#[test]
fn test_first_channel_ack_storms_on_write_one_to_clear() {
    let lines = LineBank::new();
    let mut dma = DmaController::new(ClearSemantics::WriteOneToClear);
    let pair = claim_pair(&mut dma, TriggerSource::Force);
    let coordinator =
        CompletionCoordinator::new(pair, coordinator_config(AckPolicy::FirstChannel), &lines);
    let mut sim = Simulator::new(dma, Bus::new_blank(), SimConfig::default());
    sim.register_handler(0, &coordinator).unwrap();

    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, &lines, driver_config(200));
    assert_eq!(driver.run_cycle(), Ok(CycleOutcome::Missed { polls: 200 }));
    assert_eq!(driver.stats().missed_completions, 1);
    assert_eq!(lines.edges(Line::Missed), 1);
    drop(driver);

    // The receive bit was never acknowledged and keeps the line asserted
    let status = sim.dma().status(0).unwrap();
    assert_eq!(status.read(), pair.rx.bit());
    let hardware = sim.dma().completion_count(pair.tx) + sim.dma().completion_count(pair.rx);
    let stats = coordinator.stats();
    assert!(stats.handler_entries as u64 > hardware);
    assert_eq!(stats.acknowledgements, stats.handler_entries);
    assert_eq!(status.acknowledge_count(), stats.handler_entries);
    assert!(sim.line_stats(0).stale_dispatches > 0);
    assert!(stats.imbalance() < 0);
}

#[test]
fn test_ack_policy_controls_complete() {
    let cases = [
        (ClearSemantics::ClearAll, AckPolicy::FirstChannel),
        (ClearSemantics::WriteOneToClear, AckPolicy::Snapshot),
        (ClearSemantics::ClearAll, AckPolicy::Snapshot),
    ];
    for &(clear, ack) in cases.iter() {
        let lines = LineBank::new();
        let mut dma = DmaController::new(clear);
        let pair = claim_pair(&mut dma, TriggerSource::Force);
        let coordinator = CompletionCoordinator::new(pair, coordinator_config(ack), &lines);
        let mut sim = Simulator::new(dma, Bus::new_blank(), SimConfig::default());
        sim.register_handler(0, &coordinator).unwrap();

        let mut driver =
            TransferCycleDriver::new(&mut sim, &coordinator, &lines, driver_config(100));
        let stats = driver.run_cycles(50, &mut NullSink).unwrap();
        assert_eq!(stats.cycles_completed, 50, "{:?} / {:?}", clear, ack);
        assert_eq!(stats.missed_completions, 0, "{:?} / {:?}", clear, ack);
        drop(driver);
        assert_eq!(sim.line_stats(0).stale_dispatches, 0);
    }
}

#[test]
fn test_withheld_interrupt_is_missed_once_then_heals() {
    let lines = LineBank::new();
    let mut dma = DmaController::new(ClearSemantics::ClearAll);
    let pair = claim_pair(&mut dma, TriggerSource::Force);
    let coordinator =
        CompletionCoordinator::new(pair, coordinator_config(AckPolicy::Snapshot), &lines);
    let mut sim = Simulator::new(dma, Bus::new_blank(), SimConfig::default());
    sim.register_handler(0, &coordinator).unwrap();
    sim.inject(Fault::MaskInterrupts { at: 1, cycles: 150 }).unwrap();

    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, &lines, driver_config(100));
    assert_eq!(driver.run_cycle(), Ok(CycleOutcome::Missed { polls: 100 }));
    assert!(matches!(driver.run_cycle(), Ok(CycleOutcome::Completed { .. })));
    assert!(matches!(driver.run_cycle(), Ok(CycleOutcome::Completed { polls: 5 })));

    let stats = driver.stats();
    assert_eq!(stats.missed_completions, 1);
    assert_eq!(stats.cycles_completed, 2);
    assert_eq!(lines.edges(Line::Missed), 1);
    assert_eq!(coordinator.stats().imbalance(), 0);
}

#[test]
fn test_long_run_stays_balanced() {
    let lines = LineBank::new();
    let mut dma = DmaController::new(ClearSemantics::ClearAll);
    let pair = claim_pair(&mut dma, TriggerSource::Force);
    let coordinator =
        CompletionCoordinator::new(pair, coordinator_config(AckPolicy::Snapshot), &lines);
    let mut sim = Simulator::new(dma, Bus::new_blank(), SimConfig::default());
    sim.register_handler(0, &coordinator).unwrap();

    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, &lines, driver_config(100));
    let stats = driver.run_cycles(10_000, &mut NullSink).unwrap();
    assert_eq!(stats.cycles_completed, 10_000);
    assert_eq!(stats.missed_completions, 0);

    let report = driver.report();
    assert_eq!(report.imbalance, 0);
    assert_eq!(report.tx_completions, 10_000);
    assert_eq!(report.handler_entries, 10_000);
    drop(driver);
    assert_eq!(sim.dma().status(0).unwrap().acknowledge_count(), 10_000);
}

#[test]
fn test_spurious_entry_changes_nothing() {
    let lines = LineBank::new();
    let mut dma = DmaController::new(ClearSemantics::ClearAll);
    let pair = claim_pair(&mut dma, TriggerSource::Force);
    let coordinator =
        CompletionCoordinator::new(pair, coordinator_config(AckPolicy::Snapshot), &lines);
    let mut sim = Simulator::new(dma, Bus::new_blank(), SimConfig::default());
    sim.register_handler(0, &coordinator).unwrap();
    // Mid-transfer, nothing has completed yet
    sim.inject(Fault::SpuriousDispatch { at: 2, line: 0 }).unwrap();

    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, &lines, driver_config(100));
    assert_eq!(driver.run_cycle(), Ok(CycleOutcome::Completed { polls: 5 }));

    let stats = coordinator.stats();
    assert_eq!(stats.handler_entries, 2);
    assert_eq!(stats.empty_entries, 1);
    assert_eq!(stats.tx_completions, 1);
    assert_eq!(stats.rx_completions, 1);
    assert_eq!(lines.edges(Line::TxDone), 1);
    assert_eq!(lines.edges(Line::RxDone), 1);
}

#[test]
fn test_dropped_status_drifts_the_pair() {
    let lines = LineBank::new();
    let mut dma = DmaController::new(ClearSemantics::ClearAll);
    let pair = claim_pair(&mut dma, TriggerSource::Force);
    let coordinator =
        CompletionCoordinator::new(pair, coordinator_config(AckPolicy::Snapshot), &lines);
    let mut sim = Simulator::new(dma, Bus::new_blank(), SimConfig::default());
    sim.register_handler(0, &coordinator).unwrap();
    sim.inject(Fault::DropStatus { at: 1, channel: pair.rx }).unwrap();

    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, &lines, driver_config(50));
    assert_eq!(driver.run_cycle(), Ok(CycleOutcome::Missed { polls: 50 }));
    assert_eq!(coordinator.flags(), (true, false));
    let stats = driver.run_cycles(10, &mut NullSink).unwrap();
    assert_eq!(stats.missed_completions, 1);
    assert_eq!(stats.cycles_completed, 10);
    assert_eq!(coordinator.stats().imbalance(), 1);
}

#[test]
fn test_skewed_completions_take_two_entries() {
    let mut pacer = Pacer { cycle: 0, every: 3 };
    let lines = LineBank::new();
    let mut dma = DmaController::new(ClearSemantics::ClearAll);
    let pair = claim_pair(&mut dma, TriggerSource::Dreq(1));
    let coordinator =
        CompletionCoordinator::new(pair, coordinator_config(AckPolicy::Snapshot), &lines);
    let mut sim = Simulator::new(dma, Bus::new(&mut pacer), SimConfig::default());
    sim.register_handler(0, &coordinator).unwrap();

    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, &lines, driver_config(100));
    // Receive moves on cycles 3, 6, 9 and 12
    assert_eq!(driver.run_cycle(), Ok(CycleOutcome::Completed { polls: 13 }));
    let stats = coordinator.stats();
    assert_eq!(stats.handler_entries, 2);
    assert_eq!(stats.imbalance(), 0);
}

#[test]
fn test_busy_lag_holds_the_cycle_open() {
    let lines = LineBank::new();
    let mut dma = DmaController::new(ClearSemantics::ClearAll).with_busy_lag(3);
    let pair = claim_pair(&mut dma, TriggerSource::Force);
    let coordinator =
        CompletionCoordinator::new(pair, coordinator_config(AckPolicy::Snapshot), &lines);
    let mut sim = Simulator::new(dma, Bus::new_blank(), SimConfig::default());
    sim.register_handler(0, &coordinator).unwrap();

    let mut driver = TransferCycleDriver::new(&mut sim, &coordinator, &lines, driver_config(100));
    // Flags are set on poll 5 but BUSY reads 1 until poll 7
    assert_eq!(driver.run_cycle(), Ok(CycleOutcome::Completed { polls: 7 }));
}
