use core::fmt;

/// Errors surfaced by channel management and startup wiring.
///
/// A missed completion is not an error: the driver reports it through
/// [`crate::driver::CycleOutcome::Missed`] and keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Every channel of the pool has already been claimed
    ResourceExhausted,
    /// Channel index outside of the pool
    InvalidChannel(u8),
    /// Channel exists but was never claimed on this controller
    NotClaimed(u8),
    /// A different configuration was applied after the channel was started
    ConfigurationLocked(u8),
    /// Transfers must move at least one element
    InvalidLength,
    /// DREQ number that the control word cannot encode as a paced trigger
    InvalidTrigger(u8),
    /// Interrupt line index outside of the DMA block
    InvalidLine(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ResourceExhausted => write!(f, "no unclaimed DMA channel left"),
            Error::InvalidChannel(idx) => write!(f, "DMA channel {} does not exist", idx),
            Error::NotClaimed(idx) => write!(f, "DMA channel {} was not claimed", idx),
            Error::ConfigurationLocked(idx) => {
                write!(f, "DMA channel {} is in use and cannot be reconfigured", idx)
            }
            Error::InvalidLength => write!(f, "transfer length must be non-zero"),
            Error::InvalidTrigger(dreq) => write!(f, "DREQ {} is out of range", dreq),
            Error::InvalidLine(line) => write!(f, "interrupt line {} does not exist", line),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
