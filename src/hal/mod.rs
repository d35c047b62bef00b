pub mod tick;

#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub mod heap;
#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub mod timer;
#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub mod uart;

// Re-export commonly used types
pub use tick::{FnTicks, ManualTicks, TickSource};

#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub use heap::GLOBAL_ALLOCATOR;
#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub use timer::Millis;
#[cfg(all(target_arch = "avr", feature = "atmega128"))]
pub use uart::Uart;
