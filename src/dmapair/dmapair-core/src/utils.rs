use crate::hw::TransferSize;

// Single-bit mask for a channel index
pub fn channel_bit(index: u8) -> u32 {
    1 << index
}

// Indices of every set bit, lowest first
pub fn iter_bits(mask: u32) -> impl Iterator<Item = usize> {
    (0..32).filter(move |bit| mask & (1 << bit) != 0)
}

// Byte-swaps an element of the given width; bytes pass through untouched
pub fn bswap(value: u32, size: TransferSize) -> u32 {
    match size {
        TransferSize::Byte => value & 0xff,
        TransferSize::HalfWord => (value as u16).swap_bytes() as u32,
        TransferSize::Word => value.swap_bytes(),
    }
}

// Truncates a bus value to the element width
pub fn truncate(value: u32, size: TransferSize) -> u32 {
    match size {
        TransferSize::Byte => value & 0xff,
        TransferSize::HalfWord => value & 0xffff,
        TransferSize::Word => value,
    }
}
