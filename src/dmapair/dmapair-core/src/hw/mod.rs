mod channel;
mod controller;
mod periph;
mod sram;
mod status;

pub use channel::{ChannelConfig, ChannelHandle, Direction, TransferSize, TriggerSource};
pub use controller::DmaController;
pub use periph::Peripheral;
pub use sram::Sram;
pub use status::{ClearSemantics, StatusRegister};

use crate::constants::bus::{PERIPH_BASE, PERIPH_END, SRAM_BASE, SRAM_END, SRAM_SIZE};
use crate::utils;
use log::error;

/// Code run when an interrupt line of the DMA block is dispatched.
///
/// Handlers take `&self`: the same object is shared with the main loop, so
/// any state it publishes must live in atomics.
pub trait InterruptHandler {
    fn on_interrupt(&self, status: &StatusRegister);
}

/// System bus as seen by the DMA channels
/// Routes accesses to SRAM or to the attached peripheral's register window
pub struct Bus<'a> {
    sram: Sram,
    periph: Option<&'a mut dyn Peripheral>,
}

impl<'a> Bus<'a> {
    /// Bus with a peripheral mapped at `PERIPH_BASE`
    pub fn new(periph: &'a mut dyn Peripheral) -> Bus<'a> {
        Bus {
            sram: Sram::new(),
            periph: Some(periph),
        }
    }

    /// SRAM-only bus, used for memory-to-memory transfers
    pub fn new_blank() -> Bus<'a> {
        Bus {
            sram: Sram::new(),
            periph: None,
        }
    }

    pub fn sram(&self) -> &Sram {
        &self.sram
    }

    pub fn sram_mut(&mut self) -> &mut Sram {
        &mut self.sram
    }

    /// DREQ lines raised by the peripheral during this bus cycle
    pub fn tick_peripheral(&mut self) -> u64 {
        match self.periph.as_deref_mut() {
            Some(periph) => periph.tick(),
            None => 0,
        }
    }

    /// Element read; `None` signals a bus error
    pub fn read(&mut self, addr: u32, size: TransferSize) -> Option<u32> {
        match addr {
            SRAM_BASE..=SRAM_END if Self::fits_sram(addr, size) => {
                Some(self.sram.read((addr - SRAM_BASE) as usize, size))
            }
            PERIPH_BASE..=PERIPH_END => match self.periph.as_deref_mut() {
                Some(periph) => Some(utils::truncate(periph.read(addr - PERIPH_BASE), size)),
                None => {
                    error!("Read from unpopulated peripheral window (Addr: 0x{:08x})", addr);
                    None
                }
            },
            _ => {
                error!("Unmapped bus read (Addr: 0x{:08x})", addr);
                None
            }
        }
    }

    /// Element write; `None` signals a bus error
    pub fn write(&mut self, addr: u32, size: TransferSize, value: u32) -> Option<()> {
        match addr {
            SRAM_BASE..=SRAM_END if Self::fits_sram(addr, size) => {
                self.sram.write((addr - SRAM_BASE) as usize, size, value);
                Some(())
            }
            PERIPH_BASE..=PERIPH_END => match self.periph.as_deref_mut() {
                Some(periph) => {
                    periph.write(addr - PERIPH_BASE, utils::truncate(value, size));
                    Some(())
                }
                None => {
                    error!("Write to unpopulated peripheral window (Addr: 0x{:08x})", addr);
                    None
                }
            },
            _ => {
                error!("Unmapped bus write (Addr: 0x{:08x})", addr);
                None
            }
        }
    }

    fn fits_sram(addr: u32, size: TransferSize) -> bool {
        (addr - SRAM_BASE) as usize + size.bytes() as usize <= SRAM_SIZE
    }
}
