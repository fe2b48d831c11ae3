/// How a bounded wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Condition held on attempt number `attempts`
    Ready { attempts: u32 },
    /// Budget spent without the condition holding
    Exhausted { attempts: u32 },
}

impl RetryOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, RetryOutcome::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            RetryOutcome::Ready { attempts } | RetryOutcome::Exhausted { attempts } => attempts,
        }
    }
}

/// Busy-poll budget counted in attempts rather than wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRetry {
    max_attempts: u32,
}

impl BoundedRetry {
    pub const fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calls `attempt` until it returns true or the budget runs out
    pub fn run<F>(&self, mut attempt: F) -> RetryOutcome
    where
        F: FnMut() -> bool,
    {
        for attempts in 1..=self.max_attempts {
            if attempt() {
                return RetryOutcome::Ready { attempts };
            }
        }
        RetryOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}
