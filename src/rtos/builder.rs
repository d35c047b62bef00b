use alloc::boxed::Box;

use super::registry::TimerRegistry;
use super::timer::{Callback, TimerId};
use crate::error::TimerError;
use crate::hal::TickSource;

pub struct TimerBuilder {
    callback: Option<Callback>,
    interval: u32,
    auto_restart: bool,
}

impl TimerBuilder {
    pub fn new() -> Self {
        Self {
            callback: None,
            interval: 1000,
            auto_restart: false,
        }
    }

    pub fn callback<F: FnMut() + 'static>(mut self, callback: F) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn interval(mut self, interval_ms: u32) -> Self {
        self.interval = interval_ms;
        self
    }

    pub fn periodic(mut self) -> Self {
        self.auto_restart = true;
        self
    }

    pub fn one_shot(mut self) -> Self {
        self.auto_restart = false;
        self
    }

    pub fn start<C: TickSource>(
        self,
        registry: &mut TimerRegistry<C>,
    ) -> Result<TimerId, TimerError> {
        let callback = self.callback.ok_or(TimerError::MissingCallback)?;
        registry.register_boxed(self.interval, callback, self.auto_restart)
    }
}

impl Default for TimerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
