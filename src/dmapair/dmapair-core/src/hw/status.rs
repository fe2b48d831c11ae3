use core::sync::atomic::{AtomicU32, Ordering};

/// How the hardware treats a write to the acknowledgment path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearSemantics {
    /// Any acknowledgment write clears every set bit, whatever mask it carries.
    /// This is what the silicon has been observed to do.
    ClearAll,
    /// Only the bits named in the write are cleared, as the datasheet says.
    WriteOneToClear,
}

/// Per-interrupt-line completion status, one bit per channel.
///
/// A bit reads 1 from the moment the hardware completes that channel's
/// transfer until an acknowledgment clears it. While any bit is set the
/// interrupt line stays asserted.
///
/// Every access is a single atomic operation; nothing is cached between calls.
pub struct StatusRegister {
    bits: AtomicU32,
    acks: AtomicU32,
    clear: ClearSemantics,
}

impl StatusRegister {
    pub const fn new(clear: ClearSemantics) -> Self {
        Self {
            bits: AtomicU32::new(0),
            acks: AtomicU32::new(0),
            clear,
        }
    }

    pub fn clear_semantics(&self) -> ClearSemantics {
        self.clear
    }

    /// Non-destructive read of the set bits
    pub fn read(&self) -> u32 {
        self.bits.load(Ordering::SeqCst)
    }

    /// Writes the acknowledgment path.
    ///
    /// Under [`ClearSemantics::ClearAll`] `bits_hint` is ignored and the whole
    /// register is cleared. Under [`ClearSemantics::WriteOneToClear`] only the
    /// hinted bits are cleared, so a hint naming one channel of a pair leaves
    /// the sibling's bit set: the line re-asserts as soon as the handler
    /// returns and the handler is re-entered for a bit it already serviced.
    /// Callers must hint every bit they observed.
    pub fn acknowledge(&self, bits_hint: u32) {
        match self.clear {
            ClearSemantics::ClearAll => {
                self.bits.store(0, Ordering::SeqCst);
            }
            ClearSemantics::WriteOneToClear => {
                self.bits.fetch_and(!bits_hint, Ordering::SeqCst);
            }
        }
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    /// Hardware-side set, performed by the DMA block when a channel completes
    pub fn raise(&self, bits: u32) {
        self.bits.fetch_or(bits, Ordering::SeqCst);
    }

    /// Whether the interrupt line is currently held
    pub fn is_asserted(&self) -> bool {
        self.read() != 0
    }

    /// Number of acknowledgment writes seen so far
    pub fn acknowledge_count(&self) -> u32 {
        self.acks.load(Ordering::Relaxed)
    }
}
