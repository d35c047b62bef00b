//! Cooperative software timers for the ATmega128 and other single-context
//! targets. One tick source, any number of one-shot or periodic callbacks,
//! fired from a main-loop `dispatch`.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt))]

extern crate alloc;

pub mod config;
pub mod error;
pub mod hal;
pub mod logger;
pub mod rtos;

pub use config::{IdPolicy, RegistryConfig};
pub use error::TimerError;
pub use hal::{ManualTicks, TickSource};
pub use logger::{EventSink, LogLevel, TimerEvent, UfmtLogger};
pub use rtos::{RegistryHandle, TimerBuilder, TimerId, TimerRegistry};
