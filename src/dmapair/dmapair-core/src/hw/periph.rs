/// Register-mapped device on the peripheral window
/// The DMA block only sees its data registers and the DREQ lines it raises
pub trait Peripheral {
    /// Read and write a register at `offset` inside the peripheral window
    fn read(&mut self, offset: u32) -> u32;
    fn write(&mut self, offset: u32, value: u32);

    /// Advance one bus cycle and return the mask of asserted DREQ lines
    fn tick(&mut self) -> u64;
}
