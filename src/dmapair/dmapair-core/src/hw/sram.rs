use super::TransferSize;
use crate::constants::bus::{SRAM_BASE, SRAM_SIZE};

/// Byte-addressed SRAM behind the bus, little-endian like the target core
pub struct Sram {
    bytes: [u8; SRAM_SIZE],
}

impl Sram {
    pub fn new() -> Self {
        Self {
            bytes: [0; SRAM_SIZE],
        }
    }

    /// Element read at a byte offset; the caller checks bounds
    pub fn read(&self, offset: usize, size: TransferSize) -> u32 {
        let width = size.bytes() as usize;
        self.bytes[offset..offset + width]
            .iter()
            .rev()
            .fold(0u32, |acc, byte| (acc << 8) | *byte as u32)
    }

    /// Element write at a byte offset; the caller checks bounds
    pub fn write(&mut self, offset: usize, size: TransferSize, value: u32) {
        let width = size.bytes() as usize;
        for (i, byte) in self.bytes[offset..offset + width].iter_mut().enumerate() {
            *byte = (value >> (8 * i)) as u8;
        }
    }

    /// Copies `data` to the bus address `addr`; false if it does not fit
    pub fn load(&mut self, addr: u32, data: &[u8]) -> bool {
        match Self::range(addr, data.len()) {
            Some((start, end)) => {
                self.bytes[start..end].copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// View of `len` bytes starting at bus address `addr`
    pub fn slice(&self, addr: u32, len: usize) -> Option<&[u8]> {
        Self::range(addr, len).map(|(start, end)| &self.bytes[start..end])
    }

    fn range(addr: u32, len: usize) -> Option<(usize, usize)> {
        let start = addr.checked_sub(SRAM_BASE)? as usize;
        let end = start.checked_add(len)?;
        if end > SRAM_SIZE {
            return None;
        }
        Some((start, end))
    }
}
