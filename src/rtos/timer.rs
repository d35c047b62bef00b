use alloc::boxed::Box;
use ufmt::{uDisplay, uWrite, Formatter};

use crate::config::{IdPolicy, FIRST_TIMER_ID};
use crate::error::TimerError;

/// Deferred work owned by a timer record.
pub type Callback = Box<dyn FnMut()>;

/// One-byte timer identifier handed out at registration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u8);

impl TimerId {
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<TimerId> for u8 {
    fn from(id: TimerId) -> u8 {
        id.0
    }
}

impl uDisplay for TimerId {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        uDisplay::fmt(&self.0, f)
    }
}

pub(crate) struct TimerRecord {
    pub id: TimerId,
    pub start: u32,
    pub interval: u32,
    // Taken out while the callback runs so the registry stays borrowable.
    pub callback: Option<Callback>,
    pub active: bool,
    pub auto_restart: bool,
}

impl TimerRecord {
    pub fn new(
        id: TimerId,
        now: u32,
        interval: u32,
        callback: Callback,
        auto_restart: bool,
    ) -> Self {
        Self {
            id,
            start: now,
            interval,
            callback: Some(callback),
            active: true,
            auto_restart,
        }
    }

    /// Elapsed ticks since the last arm; a single counter wrap is absorbed
    /// by the wrapping subtraction.
    #[inline]
    pub fn elapsed(&self, now: u32) -> u32 {
        now.wrapping_sub(self.start)
    }

    #[inline]
    pub fn is_due(&self, now: u32) -> bool {
        self.elapsed(now) >= self.interval
    }

    #[inline]
    pub fn remaining(&self, now: u32) -> u32 {
        self.interval.saturating_sub(self.elapsed(now))
    }

    #[inline]
    pub fn rearm(&mut self, now: u32) {
        self.start = now;
    }
}

/// Hands out ids from a wrapping one-byte counter.
pub(crate) struct IdAllocator {
    next_id: u8,
    policy: IdPolicy,
}

impl IdAllocator {
    pub const fn new(policy: IdPolicy) -> Self {
        Self {
            next_id: FIRST_TIMER_ID,
            policy,
        }
    }

    /// Next id for a new record. `in_use` reports whether a live record
    /// already holds an id; it is only consulted under `IdPolicy::Unique`.
    pub fn allocate(&mut self, in_use: impl Fn(TimerId) -> bool) -> Result<TimerId, TimerError> {
        match self.policy {
            IdPolicy::Wrapping => Ok(self.bump()),
            IdPolicy::Unique => {
                for _ in 0..=u8::MAX as u16 {
                    let id = self.bump();
                    if !in_use(id) {
                        return Ok(id);
                    }
                }
                Err(TimerError::IdsExhausted)
            }
        }
    }

    fn bump(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: u32, interval: u32) -> TimerRecord {
        TimerRecord::new(TimerId::new(1), start, interval, Box::new(|| {}), false)
    }

    #[test]
    fn due_and_remaining_follow_elapsed_time() {
        let rec = record(10, 100);
        assert!(!rec.is_due(109));
        assert_eq!(rec.remaining(60), 50);
        assert!(rec.is_due(110));
        assert_eq!(rec.remaining(110), 0);
        assert_eq!(rec.remaining(500), 0);
    }

    #[test]
    fn elapsed_survives_counter_wrap() {
        let rec = record(u32::MAX - 9, 20);
        assert_eq!(rec.elapsed(5), 15);
        assert!(!rec.is_due(5));
        assert!(rec.is_due(10));
    }

    #[test]
    fn zero_interval_is_due_immediately() {
        assert!(record(77, 0).is_due(77));
    }

    #[test]
    fn wrapping_ids_repeat_after_full_cycle() {
        let mut ids = IdAllocator::new(IdPolicy::Wrapping);
        let first = ids.allocate(|_| true).unwrap();
        assert_eq!(first.get(), FIRST_TIMER_ID);
        for _ in 0..255 {
            ids.allocate(|_| true).unwrap();
        }
        assert_eq!(ids.allocate(|_| true).unwrap(), first);
    }

    #[test]
    fn unique_ids_skip_live_ones() {
        let mut ids = IdAllocator::new(IdPolicy::Unique);
        let id = ids.allocate(|id| id.get() == 1 || id.get() == 2).unwrap();
        assert_eq!(id.get(), 3);
    }

    #[test]
    fn unique_ids_exhaust_when_all_live() {
        let mut ids = IdAllocator::new(IdPolicy::Unique);
        assert_eq!(ids.allocate(|_| true), Err(TimerError::IdsExhausted));
    }
}
