use dmapair_core::hw::Peripheral;
use heapless::Deque;
use log::{debug, warn};

pub const FIFO_DEPTH: usize = 8;

// Register offsets inside the peripheral window
pub const REG_DATA: u32 = 0x0;
pub const REG_STATUS: u32 = 0x4;

// DREQ lines raised by the loopback serial block
pub const DREQ_TX: u8 = 0;
pub const DREQ_RX: u8 = 1;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackStats {
    pub shifted: u64,    // Bytes moved from the tx FIFO to the rx FIFO
    pub overruns: u64,   // Writes dropped on a full tx FIFO
    pub underflows: u64, // Reads of an empty rx FIFO
}

/// Serial block with its TX pin wired straight back to RX.
///
/// Bytes written to DATA land in the transmit FIFO and shift out one every
/// `divider` bus cycles into the receive FIFO, where reads of DATA pick them
/// up. TX requests while the transmit FIFO has room, RX while the receive
/// FIFO holds data, so a tx/rx DMA pair paced by the two lines completes
/// with the receive side lagging by the shift time.
pub struct LoopbackSerial {
    tx_fifo: Deque<u8, FIFO_DEPTH>,
    rx_fifo: Deque<u8, FIFO_DEPTH>,
    divider: u32,
    countdown: u32,
    stats: LoopbackStats,
}

impl LoopbackSerial {
    pub fn new(divider: u32) -> Self {
        let divider = divider.max(1);
        LoopbackSerial {
            tx_fifo: Deque::new(),
            rx_fifo: Deque::new(),
            divider,
            countdown: divider,
            stats: LoopbackStats::default(),
        }
    }

    pub fn stats(&self) -> LoopbackStats {
        self.stats
    }

    // STATUS: [rx level (8-11) | tx level (0-3)]
    fn status(&self) -> u32 {
        (self.rx_fifo.len() as u32) << 8 | self.tx_fifo.len() as u32
    }

    fn shift(&mut self) {
        if self.rx_fifo.is_full() {
            return;
        }
        if let Some(byte) = self.tx_fifo.pop_front() {
            // Room was checked above
            let _ = self.rx_fifo.push_back(byte);
            self.stats.shifted += 1;
        }
    }
}

impl Peripheral for LoopbackSerial {
    fn read(&mut self, offset: u32) -> u32 {
        match offset {
            REG_DATA => match self.rx_fifo.pop_front() {
                Some(byte) => byte as u32,
                None => {
                    warn!("Loopback serial: read of empty receive FIFO");
                    self.stats.underflows += 1;
                    0
                }
            },
            REG_STATUS => self.status(),
            _ => {
                debug!("Loopback serial: read of unknown register 0x{:02x}", offset);
                0
            }
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            REG_DATA => {
                if self.tx_fifo.push_back(value as u8).is_err() {
                    warn!("Loopback serial: transmit FIFO overrun, 0x{:02x} dropped", value as u8);
                    self.stats.overruns += 1;
                }
            }
            _ => warn!(
                "Loopback serial: write to read-only register 0x{:02x} ignored",
                offset
            ),
        }
    }

    fn tick(&mut self) -> u64 {
        self.countdown -= 1;
        if self.countdown == 0 {
            self.countdown = self.divider;
            self.shift();
        }

        let mut dreq = 0;
        if !self.tx_fifo.is_full() {
            dreq |= 1 << DREQ_TX;
        }
        if !self.rx_fifo.is_empty() {
            dreq |= 1 << DREQ_RX;
        }
        dreq
    }
}
