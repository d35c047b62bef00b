//! Demo firmware: a heartbeat timer stopped by a one-shot after a few seconds.
//! On the ATmega128 it blinks PB0 and logs over USART0; on a host it runs the
//! same timers against a simulated clock and logs to stdout.
#![cfg_attr(target_arch = "avr", no_std)]
#![cfg_attr(target_arch = "avr", no_main)]

#[cfg(target_arch = "avr")]
mod firmware {
    use panic_halt as _;

    use avr_device::atmega128a::{Peripherals, PORTB};
    use soft_timer::hal::{Millis, Uart, GLOBAL_ALLOCATOR};
    use soft_timer::{TimerRegistry, UfmtLogger};

    const LED_MASK: u8 = 1 << 0;

    fn toggle_led() {
        unsafe {
            (*PORTB::ptr()).portb.modify(|r, w| w.bits(r.bits() ^ LED_MASK));
        }
    }

    #[avr_device::entry]
    fn main() -> ! {
        GLOBAL_ALLOCATOR.init();

        // Only fails if taken twice
        let dp = match Peripherals::take() {
            Some(dp) => dp,
            None => loop {},
        };

        unsafe {
            (*PORTB::ptr()).ddrb.modify(|r, w| w.bits(r.bits() | LED_MASK));
        }

        let millis = Millis::start(dp.TC0);
        let uart = Uart::new(dp.USART0);

        // Enable interrupts globally
        unsafe { avr_device::interrupt::enable() };

        let mut timers = TimerRegistry::new(millis);
        timers.set_logger(UfmtLogger::new(uart));

        let heartbeat = timers.register_periodic(500, toggle_led).ok();
        let handle = timers.handle();
        timers
            .register_one_shot(5000, move || {
                if let Some(id) = heartbeat {
                    handle.stop(id);
                }
            })
            .ok();

        loop {
            timers.dispatch();
        }
    }
}

#[cfg(not(target_arch = "avr"))]
fn main() {
    use std::cell::Cell;
    use std::convert::Infallible;
    use std::io::Write;
    use std::rc::Rc;

    use embedded_hal::blocking::delay::DelayMs;
    use soft_timer::config::DEFAULT_POLL_MS;
    use soft_timer::{LogLevel, ManualTicks, RegistryConfig, TimerRegistry, UfmtLogger};
    use ufmt::{uWrite, uwriteln};

    struct Stdout(std::io::Stdout);

    impl uWrite for Stdout {
        type Error = Infallible;

        fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
            // Console output is best effort
            self.0.write_all(s.as_bytes()).ok();
            Ok(())
        }
    }

    // Delay that moves the simulated clock instead of sleeping
    struct SimDelay(Rc<ManualTicks>);

    impl DelayMs<u16> for SimDelay {
        fn delay_ms(&mut self, ms: u16) {
            self.0.advance(u32::from(ms));
        }
    }

    let ticks = Rc::new(ManualTicks::new(0));
    let config = RegistryConfig::new().log_level(LogLevel::Debug);
    let mut timers = TimerRegistry::with_config(ticks.clone(), config);
    timers.set_logger(UfmtLogger::new(Stdout(std::io::stdout())));

    let beats = Rc::new(Cell::new(0u32));
    let counter = beats.clone();
    let heartbeat = timers.register_periodic(500, move || counter.set(counter.get() + 1));

    let handle = timers.handle();
    let stopper = timers.register_one_shot(5000, move || {
        if let Ok(id) = heartbeat {
            handle.stop(id);
        }
    });

    let mut out = Stdout(std::io::stdout());
    if let Err(err) = stopper {
        uwriteln!(out, "failed to register stopper: {}", err).ok();
        return;
    }

    let passes = timers.run_until_idle(&mut SimDelay(ticks.clone()), DEFAULT_POLL_MS);
    uwriteln!(
        out,
        "{} heartbeats in {} passes, idle at tick {}",
        beats.get(),
        passes,
        soft_timer::TickSource::now(&ticks)
    )
    .ok();
}
