//! Timer event logging over a serial-style text sink

use ufmt::{uDisplay, uWrite, uwrite, Formatter};

use crate::error::TimerError;
use crate::rtos::TimerId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Info = 1,
    Debug = 2,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    Registered {
        id: TimerId,
        interval: u32,
        periodic: bool,
    },
    Rejected(TimerError),
    Fired(TimerId),
    Rearmed(TimerId),
    Stopped(TimerId),
    Removed(TimerId),
    Cleared(usize),
}

impl TimerEvent {
    pub fn level(&self) -> LogLevel {
        match self {
            TimerEvent::Rejected(_) => LogLevel::Error,
            TimerEvent::Registered { .. } | TimerEvent::Stopped(_) | TimerEvent::Cleared(_) => {
                LogLevel::Info
            }
            TimerEvent::Fired(_) | TimerEvent::Rearmed(_) | TimerEvent::Removed(_) => {
                LogLevel::Debug
            }
        }
    }
}

impl uDisplay for TimerEvent {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        match *self {
            TimerEvent::Registered {
                id,
                interval,
                periodic,
            } => {
                let kind = if periodic { "periodic" } else { "one-shot" };
                uwrite!(f, "registered id={} interval={} {}", id, interval, kind)
            }
            TimerEvent::Rejected(err) => uwrite!(f, "rejected: {}", err),
            TimerEvent::Fired(id) => uwrite!(f, "fired id={}", id),
            TimerEvent::Rearmed(id) => uwrite!(f, "rearmed id={}", id),
            TimerEvent::Stopped(id) => uwrite!(f, "stopped id={}", id),
            TimerEvent::Removed(id) => uwrite!(f, "removed id={}", id),
            TimerEvent::Cleared(count) => uwrite!(f, "cleared {} timers", count),
        }
    }
}

/// Receives registry events. Sinks must not call back into the registry.
pub trait EventSink {
    fn log(&mut self, tick: u32, event: &TimerEvent);
}

/// Writes one `[TMR] <tick> <event>` line per event.
pub struct UfmtLogger<W: uWrite> {
    writer: W,
}

impl<W: uWrite> UfmtLogger<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: uWrite> EventSink for UfmtLogger<W> {
    fn log(&mut self, tick: u32, event: &TimerEvent) {
        let tag = match event.level() {
            LogLevel::Error => "[ERR]",
            LogLevel::Info => "[TMR]",
            LogLevel::Debug => "[DBG]",
        };
        // Serial output is best effort
        uwrite!(self.writer, "{} {} {}\r\n", tag, tick, event).ok();
    }
}
