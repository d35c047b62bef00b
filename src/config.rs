//! Configuration constants and runtime registry settings

use crate::logger::LogLevel;

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// UART baud rate
pub const UART_BAUD: u32 = 9600;

/// Tick source resolution in milliseconds
pub const TICK_MS: u32 = 1;

/// First id handed out by a fresh registry
pub const FIRST_TIMER_ID: u8 = 1;

/// Default delay between dispatch passes for the host loop helpers
pub const DEFAULT_POLL_MS: u16 = 1;

/// How timer ids are handed out once the one-byte counter wraps.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IdPolicy {
    /// Plain wrapping counter. After 255 registrations ids repeat and two
    /// live timers may share one; lookups then act on the first match.
    Wrapping,
    /// Skip ids held by live records; fail with `IdsExhausted` when all
    /// 256 are taken.
    Unique,
}

/// Runtime settings for a `TimerRegistry`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    pub id_policy: IdPolicy,
    pub max_timers: Option<usize>,
    pub log_level: LogLevel,
}

impl RegistryConfig {
    pub const fn new() -> Self {
        Self {
            id_policy: IdPolicy::Unique,
            max_timers: None,
            log_level: LogLevel::Info,
        }
    }

    pub const fn id_policy(mut self, policy: IdPolicy) -> Self {
        self.id_policy = policy;
        self
    }

    /// Cap on live timers. A one-shot whose callback is running no longer
    /// counts, so it may re-register itself.
    pub const fn max_timers(mut self, max: usize) -> Self {
        self.max_timers = Some(max);
        self
    }

    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}
