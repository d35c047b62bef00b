//! Software timers multiplexed over a single millisecond tick

pub mod builder;
pub mod registry;
pub mod timer;

pub use builder::TimerBuilder;
pub use registry::{RegistryHandle, TimerRegistry};
pub use timer::{Callback, TimerId};
