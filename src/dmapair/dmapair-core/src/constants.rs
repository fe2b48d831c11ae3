// Channel pool and interrupt lines of the DMA block
pub const NUM_CHANNELS: usize = 12;
pub const NUM_IRQ_LINES: usize = 2;

pub mod bus {
    // Simulated SRAM window
    pub const SRAM_BASE: u32 = 0x2000_0000;
    pub const SRAM_SIZE: usize = 0x1000;
    pub const SRAM_END: u32 = SRAM_BASE + SRAM_SIZE as u32 - 1;

    // Register window of the attached peripheral
    pub const PERIPH_BASE: u32 = 0x4003_c000;
    pub const PERIPH_SIZE: u32 = 0x100;
    pub const PERIPH_END: u32 = PERIPH_BASE + PERIPH_SIZE - 1;
}

pub mod ctrl {
    // Channel control word layout
    pub const EN: u32 = 1 << 0;
    pub const HIGH_PRIORITY: u32 = 1 << 1;
    pub const DATA_SIZE_SHIFT: u32 = 2;
    pub const DATA_SIZE_MASK: u32 = 0b11;
    pub const INCR_READ: u32 = 1 << 4;
    pub const INCR_WRITE: u32 = 1 << 5;
    pub const CHAIN_TO_SHIFT: u32 = 11;
    pub const CHAIN_TO_MASK: u32 = 0xf;
    pub const TREQ_SEL_SHIFT: u32 = 15;
    pub const TREQ_SEL_MASK: u32 = 0x3f;
    pub const IRQ_QUIET: u32 = 1 << 21;
    pub const BSWAP: u32 = 1 << 22;
    pub const BUSY: u32 = 1 << 24; // Read-only
}

pub mod dreq {
    // Permanent request: the channel runs at full bus speed
    pub const DREQ_FORCE: u8 = 0x3f;
}

pub mod defaults {
    pub const TRANSFER_LEN: u32 = 4;
    pub const POLL_BUDGET: u32 = 10_000;
    pub const REPORT_EVERY: u64 = 1_000;
    pub const DISPATCH_LATENCY: u32 = 1;
}

pub mod sim {
    // Upper bound of scheduled faults per simulator
    pub const MAX_FAULTS: usize = 8;
    // Stale dispatches on one line before a storm is reported
    pub const STORM_THRESHOLD: u64 = 64;
}
