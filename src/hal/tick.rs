//! Millisecond tick sources

use alloc::rc::Rc;
use core::cell::Cell;

/// A free-running millisecond counter that wraps at `u32::MAX`.
pub trait TickSource {
    fn now(&self) -> u32;
}

impl<T: TickSource + ?Sized> TickSource for &T {
    #[inline]
    fn now(&self) -> u32 {
        (**self).now()
    }
}

impl<T: TickSource + ?Sized> TickSource for Rc<T> {
    #[inline]
    fn now(&self) -> u32 {
        (**self).now()
    }
}

/// Any `Fn() -> u32` reads as a tick source, e.g. a HAL `millis` function.
pub struct FnTicks<F>(pub F);

impl<F: Fn() -> u32> TickSource for FnTicks<F> {
    #[inline]
    fn now(&self) -> u32 {
        (self.0)()
    }
}

/// Tick counter advanced by hand. Used by host builds and tests; share it by
/// reference with the registry and move time forward from outside.
pub struct ManualTicks {
    tick_count: Cell<u32>,
}

impl ManualTicks {
    pub const fn new(start: u32) -> Self {
        Self {
            tick_count: Cell::new(start),
        }
    }

    #[inline]
    pub fn set(&self, ticks: u32) {
        self.tick_count.set(ticks);
    }

    /// Move time forward, wrapping like the hardware counter.
    #[inline]
    pub fn advance(&self, ms: u32) {
        let count = self.tick_count.get();
        self.tick_count.set(count.wrapping_add(ms));
    }
}

impl TickSource for ManualTicks {
    #[inline]
    fn now(&self) -> u32 {
        self.tick_count.get()
    }
}

impl Default for ManualTicks {
    fn default() -> Self {
        Self::new(0)
    }
}
