//! Registration errors

use core::fmt;
use ufmt::{uDisplay, uWrite, Formatter};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerError {
    /// A builder was started without a callback
    MissingCallback,
    /// Every one-byte id is held by a live timer
    IdsExhausted,
    /// The configured `max_timers` limit is reached
    CapacityReached,
    /// A handle was used after its registry was dropped
    RegistryDropped,
}

impl TimerError {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerError::MissingCallback => "missing callback",
            TimerError::IdsExhausted => "timer ids exhausted",
            TimerError::CapacityReached => "timer capacity reached",
            TimerError::RegistryDropped => "registry dropped",
        }
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl uDisplay for TimerError {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        f.write_str(self.as_str())
    }
}
