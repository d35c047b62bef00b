//! Cooperative software-timer registry driven by a millisecond tick source

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::convert::Infallible;
use core::mem;

use embedded_hal::blocking::delay::DelayMs;

use super::timer::{Callback, IdAllocator, TimerId, TimerRecord};
use crate::config::RegistryConfig;
use crate::error::TimerError;
use crate::hal::TickSource;
use crate::logger::{EventSink, TimerEvent};

struct Core<C> {
    clock: C,
    records: Vec<TimerRecord>,
    ids: IdAllocator,
    config: RegistryConfig,
    logger: Option<Box<dyn EventSink>>,
    dispatching: bool,
    // Index of the record whose callback is running
    firing: Option<usize>,
}

impl<C: TickSource> Core<C> {
    fn log(&mut self, tick: u32, event: TimerEvent) {
        if event.level() > self.config.log_level {
            return;
        }
        if let Some(logger) = self.logger.as_mut() {
            logger.log(tick, &event);
        }
    }

    /// Active records, not counting a one-shot whose callback is running:
    /// it is gone once the callback returns.
    fn live_count(&self) -> usize {
        self.records
            .iter()
            .enumerate()
            .filter(|(idx, r)| r.active && (r.auto_restart || self.firing != Some(*idx)))
            .count()
    }

    /// Capacity check and id assignment for a new record.
    fn admit(&mut self) -> Result<TimerId, TimerError> {
        let now = self.clock.now();
        if let Some(max) = self.config.max_timers {
            if self.live_count() >= max {
                self.log(now, TimerEvent::Rejected(TimerError::CapacityReached));
                return Err(TimerError::CapacityReached);
            }
        }

        // Records still awaiting the sweep keep their id reserved
        let records = &self.records;
        match self.ids.allocate(|id| records.iter().any(|r| r.id == id)) {
            Ok(id) => Ok(id),
            Err(err) => {
                self.log(now, TimerEvent::Rejected(err));
                Err(err)
            }
        }
    }

    fn push(&mut self, id: TimerId, interval: u32, callback: Callback, auto_restart: bool) {
        let now = self.clock.now();
        self.records
            .push(TimerRecord::new(id, now, interval, callback, auto_restart));
        self.log(
            now,
            TimerEvent::Registered {
                id,
                interval,
                periodic: auto_restart,
            },
        );
    }

    fn stop(&mut self, id: TimerId) {
        let now = self.clock.now();
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return;
        };
        if record.active {
            record.active = false;
            self.log(now, TimerEvent::Stopped(id));
        }
    }

    /// Deactivates everything. Outside a dispatch pass the records are
    /// handed back for dropping; during a pass the sweep reclaims them.
    fn stop_all(&mut self) -> Vec<TimerRecord> {
        let now = self.clock.now();
        let count = self.live_count();
        for record in self.records.iter_mut() {
            record.active = false;
        }
        self.log(now, TimerEvent::Cleared(count));
        if self.dispatching {
            Vec::new()
        } else {
            mem::take(&mut self.records)
        }
    }

    fn is_active(&self, id: TimerId) -> bool {
        self.records.iter().any(|r| r.id == id && r.active)
    }

    fn remaining(&self, id: TimerId) -> Option<u32> {
        let now = self.clock.now();
        self.records
            .iter()
            .find(|r| r.id == id && r.active)
            .map(|r| r.remaining(now))
    }
}

// Callbacks are never dropped or invoked while `Core` is borrowed, so a
// callback (or its destructor) may use a `RegistryHandle`.
fn register<C: TickSource>(
    core: &RefCell<Core<C>>,
    interval: u32,
    callback: Callback,
    auto_restart: bool,
) -> Result<TimerId, TimerError> {
    let admitted = core.borrow_mut().admit();
    let id = admitted?;
    core.borrow_mut().push(id, interval, callback, auto_restart);
    Ok(id)
}

fn stop_all<C: TickSource>(core: &RefCell<Core<C>>) {
    let released = core.borrow_mut().stop_all();
    drop(released);
}

/// Owns every timer record and fires callbacks from `dispatch`.
///
/// Single execution context only: call every method from the main loop,
/// never from an interrupt handler.
pub struct TimerRegistry<C: TickSource> {
    core: Rc<RefCell<Core<C>>>,
}

impl<C: TickSource> TimerRegistry<C> {
    pub fn new(clock: C) -> Self {
        Self::with_config(clock, RegistryConfig::new())
    }

    pub fn with_config(clock: C, config: RegistryConfig) -> Self {
        Self {
            core: Rc::new(RefCell::new(Core {
                clock,
                records: Vec::new(),
                ids: IdAllocator::new(config.id_policy),
                config,
                logger: None,
                dispatching: false,
                firing: None,
            })),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.core.borrow().config
    }

    /// Attach an event sink; events above the configured level are dropped.
    pub fn set_logger<L: EventSink + 'static>(&mut self, logger: L) {
        self.core.borrow_mut().logger = Some(Box::new(logger));
    }

    pub fn take_logger(&mut self) -> Option<Box<dyn EventSink>> {
        self.core.borrow_mut().logger.take()
    }

    /// A handle for use inside callbacks.
    pub fn handle(&self) -> RegistryHandle<C> {
        RegistryHandle {
            core: Rc::downgrade(&self.core),
        }
    }

    /// Fire `callback` once, `interval` ms from now. Zero fires on the next
    /// dispatch.
    pub fn register_one_shot<F>(
        &mut self,
        interval: u32,
        callback: F,
    ) -> Result<TimerId, TimerError>
    where
        F: FnMut() + 'static,
    {
        register(&self.core, interval, Box::new(callback), false)
    }

    /// Fire `callback` every `interval` ms until stopped.
    pub fn register_periodic<F>(
        &mut self,
        interval: u32,
        callback: F,
    ) -> Result<TimerId, TimerError>
    where
        F: FnMut() + 'static,
    {
        register(&self.core, interval, Box::new(callback), true)
    }

    pub(crate) fn register_boxed(
        &mut self,
        interval: u32,
        callback: Callback,
        auto_restart: bool,
    ) -> Result<TimerId, TimerError> {
        register(&self.core, interval, callback, auto_restart)
    }

    /// Mark the first record with `id` inactive. The record is removed on
    /// the next dispatch; unknown ids are ignored.
    pub fn stop(&mut self, id: TimerId) {
        self.core.borrow_mut().stop(id);
    }

    /// Drop every timer now without firing any callback.
    pub fn stop_all(&mut self) {
        stop_all(&self.core);
    }

    /// One scheduling pass. Returns the number of callbacks fired.
    ///
    /// `now` is read once; periodic timers rearm to it, so a late pass
    /// shifts their phase instead of firing twice. Records registered from
    /// inside a callback are first examined on the next pass.
    pub fn dispatch(&mut self) -> usize {
        let (now, pass_len) = {
            let mut core = self.core.borrow_mut();
            core.dispatching = true;
            (core.clock.now(), core.records.len())
        };

        let mut fired = 0;
        for idx in 0..pass_len {
            let mut callback = {
                let mut core = self.core.borrow_mut();
                let record = &mut core.records[idx];
                if !record.active || !record.is_due(now) {
                    continue;
                }
                let id = record.id;
                let callback = record.callback.take();
                core.firing = Some(idx);
                core.log(now, TimerEvent::Fired(id));
                callback
            };

            if let Some(f) = callback.as_mut() {
                f();
                fired += 1;
            }

            let mut core = self.core.borrow_mut();
            core.firing = None;
            let record = &mut core.records[idx];
            if record.active && record.auto_restart {
                record.rearm(now);
                record.callback = callback.take();
                let id = record.id;
                core.log(now, TimerEvent::Rearmed(id));
            } else {
                // One-shot, or stopped from inside its own callback
                record.active = false;
            }
            drop(core);
            drop(callback);
        }

        let released = self.sweep(now);
        drop(released);
        fired
    }

    /// Remove inactive records; their callbacks are returned for dropping
    /// once the registry is no longer borrowed.
    fn sweep(&mut self, now: u32) -> Vec<Callback> {
        let mut core = self.core.borrow_mut();
        let mut released = Vec::new();
        let mut removed = Vec::new();
        for record in core.records.iter_mut().filter(|r| !r.active) {
            removed.push(record.id);
            if let Some(callback) = record.callback.take() {
                released.push(callback);
            }
        }
        core.records.retain(|r| r.active);
        for id in removed {
            core.log(now, TimerEvent::Removed(id));
        }
        core.dispatching = false;
        released
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.core.borrow().is_active(id)
    }

    /// Milliseconds until `id` is due, 0 if it is due now or unknown.
    pub fn remaining_time(&self, id: TimerId) -> u32 {
        self.remaining(id).unwrap_or(0)
    }

    /// Like `remaining_time`, but `None` for an unknown or stopped id.
    pub fn remaining(&self, id: TimerId) -> Option<u32> {
        self.core.borrow().remaining(id)
    }

    /// Records held, including stopped ones awaiting the next dispatch.
    pub fn len(&self) -> usize {
        self.core.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch once, then report whether `id` has finished.
    ///
    /// A one-shot finishes after it fires, a periodic timer only once it is
    /// stopped. Use with `nb::block!`.
    pub fn wait(&mut self, id: TimerId) -> nb::Result<(), Infallible> {
        self.dispatch();
        if self.is_active(id) {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    /// Dispatch every `poll_ms` until no timers remain. Returns the number
    /// of passes. Never returns while a periodic timer is running.
    pub fn run_until_idle<D: DelayMs<u16>>(&mut self, delay: &mut D, poll_ms: u16) -> usize {
        let mut passes = 0;
        loop {
            self.dispatch();
            passes += 1;
            if self.is_empty() {
                return passes;
            }
            delay.delay_ms(poll_ms);
        }
    }

    pub fn run<D: DelayMs<u16>>(&mut self, delay: &mut D, poll_ms: u16) -> ! {
        loop {
            self.dispatch();
            delay.delay_ms(poll_ms);
        }
    }
}

impl<C: TickSource> Drop for TimerRegistry<C> {
    fn drop(&mut self) {
        let released = mem::take(&mut self.core.borrow_mut().records);
        drop(released);
    }
}

/// Weak access to a registry, for registering or stopping timers from
/// inside a callback.
pub struct RegistryHandle<C: TickSource> {
    core: Weak<RefCell<Core<C>>>,
}

impl<C: TickSource> RegistryHandle<C> {
    pub fn register_one_shot<F>(&self, interval: u32, callback: F) -> Result<TimerId, TimerError>
    where
        F: FnMut() + 'static,
    {
        let core = self.core.upgrade().ok_or(TimerError::RegistryDropped)?;
        register(&core, interval, Box::new(callback), false)
    }

    pub fn register_periodic<F>(&self, interval: u32, callback: F) -> Result<TimerId, TimerError>
    where
        F: FnMut() + 'static,
    {
        let core = self.core.upgrade().ok_or(TimerError::RegistryDropped)?;
        register(&core, interval, Box::new(callback), true)
    }

    pub fn stop(&self, id: TimerId) {
        if let Some(core) = self.core.upgrade() {
            core.borrow_mut().stop(id);
        }
    }

    pub fn stop_all(&self) {
        if let Some(core) = self.core.upgrade() {
            stop_all(&core);
        }
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.core
            .upgrade()
            .map_or(false, |core| core.borrow().is_active(id))
    }
}

impl<C: TickSource> Clone for RegistryHandle<C> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdPolicy;
    use crate::hal::ManualTicks;
    use core::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, impl FnMut() + 'static) {
        let hits = Rc::new(Cell::new(0));
        let inner = hits.clone();
        (hits, move || inner.set(inner.get() + 1))
    }

    #[test]
    fn one_shot_fires_once_and_is_removed() {
        let ticks = ManualTicks::new(0);
        let mut timers = TimerRegistry::new(&ticks);
        let (hits, cb) = counter();
        let id = timers.register_one_shot(100, cb).unwrap();
        assert_eq!(id.get(), 1);

        ticks.set(50);
        assert_eq!(timers.dispatch(), 0);
        ticks.set(100);
        assert_eq!(timers.dispatch(), 1);
        assert_eq!(hits.get(), 1);
        assert!(!timers.is_active(id));
        assert!(timers.is_empty());

        ticks.set(500);
        timers.dispatch();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn periodic_rearms_to_pass_tick() {
        let ticks = ManualTicks::new(0);
        let mut timers = TimerRegistry::new(&ticks);
        let (hits, cb) = counter();
        let id = timers.register_periodic(20, cb).unwrap();

        // Late pass: fires once, phase shifts to 35
        ticks.set(35);
        timers.dispatch();
        assert_eq!(hits.get(), 1);
        assert_eq!(timers.remaining_time(id), 20);

        ticks.set(54);
        timers.dispatch();
        assert_eq!(hits.get(), 1);
        ticks.set(55);
        timers.dispatch();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn stop_is_deferred_until_dispatch() {
        let ticks = ManualTicks::new(0);
        let mut timers = TimerRegistry::new(&ticks);
        let (hits, cb) = counter();
        let id = timers.register_one_shot(10, cb).unwrap();

        ticks.set(10);
        timers.stop(id);
        assert!(!timers.is_active(id));
        assert_eq!(timers.len(), 1);

        timers.dispatch();
        assert_eq!(hits.get(), 0);
        assert!(timers.is_empty());
    }

    #[test]
    fn stop_unknown_id_is_a_no_op() {
        let ticks = ManualTicks::new(0);
        let mut timers = TimerRegistry::new(&ticks);
        timers.register_periodic(5, || {}).unwrap();
        timers.stop(TimerId::new(200));
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.remaining(TimerId::new(200)), None);
        assert_eq!(timers.remaining_time(TimerId::new(200)), 0);
    }

    #[test]
    fn remaining_distinguishes_due_from_unknown() {
        let ticks = ManualTicks::new(0);
        let mut timers = TimerRegistry::new(&ticks);
        let id = timers.register_one_shot(30, || {}).unwrap();
        ticks.set(40);
        assert_eq!(timers.remaining(id), Some(0));
        timers.stop(id);
        assert_eq!(timers.remaining(id), None);
    }

    #[test]
    fn capacity_limit_rejects_registration() {
        let ticks = ManualTicks::new(0);
        let config = RegistryConfig::new().max_timers(2);
        let mut timers = TimerRegistry::with_config(&ticks, config);
        timers.register_one_shot(1, || {}).unwrap();
        let second = timers.register_one_shot(1, || {}).unwrap();
        assert_eq!(
            timers.register_one_shot(1, || {}),
            Err(TimerError::CapacityReached)
        );

        // Stopped records no longer count against the limit
        timers.stop(second);
        assert!(timers.register_one_shot(1, || {}).is_ok());
    }

    #[test]
    fn unique_policy_never_reuses_live_ids() {
        let ticks = ManualTicks::new(0);
        let mut timers = TimerRegistry::new(&ticks);
        let first = timers.register_periodic(10, || {}).unwrap();
        for _ in 0..254 {
            timers.register_one_shot(0, || {}).unwrap();
        }
        timers.dispatch();
        assert_eq!(timers.len(), 1);

        for _ in 0..300 {
            let id = timers.register_one_shot(0, || {}).unwrap();
            assert_ne!(id, first);
            timers.dispatch();
        }
    }

    #[test]
    fn unique_policy_exhausts_at_256_live_timers() {
        let ticks = ManualTicks::new(0);
        let mut timers = TimerRegistry::new(&ticks);
        for _ in 0..256 {
            timers.register_periodic(10, || {}).unwrap();
        }
        assert_eq!(
            timers.register_periodic(10, || {}),
            Err(TimerError::IdsExhausted)
        );
    }

    #[test]
    fn wrapping_policy_allows_duplicate_ids() {
        let ticks = ManualTicks::new(0);
        let config = RegistryConfig::new().id_policy(IdPolicy::Wrapping);
        let mut timers = TimerRegistry::with_config(&ticks, config);
        let first = timers.register_periodic(10, || {}).unwrap();
        for _ in 0..255 {
            timers.register_periodic(10, || {}).unwrap();
        }
        let dup = timers.register_periodic(50, || {}).unwrap();
        assert_eq!(dup, first);

        // Lookups hit the earliest record
        assert_eq!(timers.remaining_time(dup), 10);
        timers.stop(dup);
        assert!(timers.is_active(dup));
        assert_eq!(timers.remaining_time(dup), 50);
    }

    #[test]
    fn callbacks_dropped_exactly_once() {
        struct Tracked(Rc<Cell<u32>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let ticks = ManualTicks::new(0);
        let mut timers = TimerRegistry::new(&ticks);

        let fired = Tracked(drops.clone());
        timers
            .register_one_shot(0, move || {
                let _ = &fired;
            })
            .unwrap();
        let stopped = Tracked(drops.clone());
        let id = timers
            .register_periodic(5, move || {
                let _ = &stopped;
            })
            .unwrap();
        let kept = Tracked(drops.clone());
        timers
            .register_periodic(5, move || {
                let _ = &kept;
            })
            .unwrap();

        timers.dispatch();
        assert_eq!(drops.get(), 1);
        timers.stop(id);
        timers.dispatch();
        assert_eq!(drops.get(), 2);
        drop(timers);
        assert_eq!(drops.get(), 3);
    }

    #[test]
    fn callback_destructor_may_use_handle() {
        struct Guard {
            handle: RegistryHandle<Rc<ManualTicks>>,
            drops: Rc<Cell<u32>>,
        }
        impl Drop for Guard {
            fn drop(&mut self) {
                let _ = self.handle.register_one_shot(0, || {});
                self.handle.stop_all();
                self.drops.set(self.drops.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let ticks = Rc::new(ManualTicks::new(0));
        let mut timers = TimerRegistry::new(ticks.clone());
        let guard = {
            let handle = timers.handle();
            let drops = drops.clone();
            move || Guard {
                handle: handle.clone(),
                drops: drops.clone(),
            }
        };

        // Dropped after a one-shot fires, mid-pass
        let fired = guard();
        timers
            .register_one_shot(0, move || {
                let _ = &fired;
            })
            .unwrap();
        assert_eq!(timers.dispatch(), 1);
        assert_eq!(drops.get(), 1);
        assert!(timers.is_empty());

        // Dropped by an outside stop_all
        let cleared = guard();
        timers
            .register_periodic(10, move || {
                let _ = &cleared;
            })
            .unwrap();
        timers.stop_all();
        assert_eq!(drops.get(), 2);
        assert!(timers.is_empty());

        // Dropped with the registry
        let owned = guard();
        timers
            .register_periodic(10, move || {
                let _ = &owned;
            })
            .unwrap();
        let handle = timers.handle();
        drop(timers);
        assert_eq!(drops.get(), 3);
        assert_eq!(
            handle.register_one_shot(0, || {}),
            Err(TimerError::RegistryDropped)
        );
    }

    #[test]
    fn firing_one_shot_frees_its_capacity_slot() {
        let ticks = Rc::new(ManualTicks::new(0));
        let config = RegistryConfig::new().max_timers(1);
        let mut timers = TimerRegistry::with_config(ticks.clone(), config);
        let handle = timers.handle();
        let outcome = Rc::new(Cell::new(None));
        let (hits, cb) = counter();
        let mut cb = Some(cb);

        let slot = outcome.clone();
        timers
            .register_one_shot(0, move || {
                if let Some(cb) = cb.take() {
                    slot.set(Some(handle.register_one_shot(0, cb)));
                }
            })
            .unwrap();
        assert_eq!(
            timers.register_one_shot(0, || {}),
            Err(TimerError::CapacityReached)
        );

        timers.dispatch();
        assert!(matches!(outcome.get(), Some(Ok(_))));
        assert_eq!(timers.len(), 1);
        timers.dispatch();
        assert_eq!(hits.get(), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn firing_periodic_keeps_its_capacity_slot() {
        let ticks = Rc::new(ManualTicks::new(0));
        let config = RegistryConfig::new().max_timers(1);
        let mut timers = TimerRegistry::with_config(ticks.clone(), config);
        let handle = timers.handle();
        let outcome = Rc::new(Cell::new(None));

        let slot = outcome.clone();
        timers
            .register_periodic(5, move || {
                slot.set(Some(handle.register_one_shot(0, || {})));
            })
            .unwrap();

        ticks.set(5);
        timers.dispatch();
        assert_eq!(outcome.get(), Some(Err(TimerError::CapacityReached)));
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn reentrant_registration_waits_for_next_pass() {
        let ticks = Rc::new(ManualTicks::new(0));
        let mut timers = TimerRegistry::new(ticks.clone());
        let handle = timers.handle();
        let (hits, cb) = counter();
        let mut cb = Some(cb);

        timers
            .register_one_shot(0, move || {
                if let Some(cb) = cb.take() {
                    handle.register_one_shot(0, cb).unwrap();
                }
            })
            .unwrap();

        assert_eq!(timers.dispatch(), 1);
        assert_eq!(hits.get(), 0);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.dispatch(), 1);
        assert_eq!(hits.get(), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn periodic_can_stop_itself() {
        let ticks = Rc::new(ManualTicks::new(0));
        let mut timers = TimerRegistry::new(ticks.clone());
        let handle = timers.handle();
        let own_id = Rc::new(Cell::new(None));
        let (hits, mut cb) = counter();

        let slot = own_id.clone();
        let id = timers
            .register_periodic(10, move || {
                cb();
                if let Some(id) = slot.get() {
                    handle.stop(id);
                }
            })
            .unwrap();
        own_id.set(Some(id));

        ticks.set(10);
        timers.dispatch();
        assert_eq!(hits.get(), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn stop_all_from_callback_cancels_later_timers() {
        let ticks = Rc::new(ManualTicks::new(0));
        let mut timers = TimerRegistry::new(ticks.clone());
        let handle = timers.handle();
        let (hits, cb) = counter();

        timers.register_one_shot(0, move || handle.stop_all()).unwrap();
        timers.register_one_shot(0, cb).unwrap();

        assert_eq!(timers.dispatch(), 1);
        assert_eq!(hits.get(), 0);
        assert!(timers.is_empty());
    }

    #[test]
    fn handle_reports_dropped_registry() {
        let ticks = ManualTicks::new(0);
        let timers = TimerRegistry::new(&ticks);
        let handle = timers.handle();
        drop(timers);
        assert_eq!(
            handle.register_one_shot(1, || {}),
            Err(TimerError::RegistryDropped)
        );
        assert!(!handle.is_active(TimerId::new(1)));
    }

    #[test]
    fn wait_blocks_until_one_shot_fires() {
        let ticks = ManualTicks::new(0);
        let mut timers = TimerRegistry::new(&ticks);
        let id = timers.register_one_shot(3, || {}).unwrap();

        assert_eq!(timers.wait(id), Err(nb::Error::WouldBlock));
        ticks.set(3);
        assert_eq!(timers.wait(id), Ok(()));
    }
}
