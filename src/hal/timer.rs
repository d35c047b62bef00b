//! Timer0 millisecond counter for the ATmega128

use avr_device::atmega128a::TC0;
use avr_device::interrupt::Mutex;
use core::cell::Cell;

use super::tick::TickSource;
use crate::config::CPU_FREQ_HZ;

static MILLIS: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

// Timer0 prescaler select, CS02:0 (asynchronous timer table)
#[derive(Clone, Copy)]
pub enum Prescaler {
    Stop = 0,
    Direct = 1,
    Div8 = 2,
    Div32 = 3,
    Div64 = 4,
    Div128 = 5,
    Div256 = 6,
    Div1024 = 7,
}

impl Prescaler {
    /// Clock division applied by this setting; 0 when the timer is stopped.
    pub const fn divisor(self) -> u32 {
        match self {
            Prescaler::Stop => 0,
            Prescaler::Direct => 1,
            Prescaler::Div8 => 8,
            Prescaler::Div32 => 32,
            Prescaler::Div64 => 64,
            Prescaler::Div128 => 128,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }
}

const PRESCALER: Prescaler = Prescaler::Div64;
const WGM01_CTC: u8 = 1 << 3;
const OCIE0: u8 = 1 << 1;

// 16MHz/64 = 250kHz, 250 counts = 1ms
const COMPARE_COUNTS: u32 = CPU_FREQ_HZ / PRESCALER.divisor() / 1000 - 1;
const COMPARE_1MS: u8 = COMPARE_COUNTS as u8;

// OCR0 is eight bits wide
const _: () = assert!(COMPARE_COUNTS <= u8::MAX as u32);

/// Millisecond tick source driven by the Timer0 compare match interrupt.
pub struct Millis {
    _private: (),
}

impl Millis {
    /// Put Timer0 in CTC mode with a 1ms period and enable its interrupt.
    /// Global interrupts must be enabled by the caller.
    pub fn start(_tc0: TC0) -> Self {
        unsafe {
            let p = TC0::ptr();
            (*p).tccr0.write(|w| w.bits(0));
            (*p).tcnt0.write(|w| w.bits(0));
            (*p).ocr0.write(|w| w.bits(COMPARE_1MS));
            (*p).timsk.modify(|r, w| w.bits(r.bits() | OCIE0));
            (*p).tccr0.write(|w| w.bits(WGM01_CTC | PRESCALER as u8));
        }
        Self { _private: () }
    }

    pub fn stop(&mut self) {
        unsafe {
            let p = TC0::ptr();
            (*p).tccr0.write(|w| w.bits(Prescaler::Stop as u8));
            (*p).timsk.modify(|r, w| w.bits(r.bits() & !OCIE0));
        }
    }
}

impl TickSource for Millis {
    #[inline]
    fn now(&self) -> u32 {
        avr_device::interrupt::free(|cs| MILLIS.borrow(cs).get())
    }
}

#[avr_device::interrupt(atmega128a)]
fn TIMER0_COMP() {
    avr_device::interrupt::free(|cs| {
        let counter = MILLIS.borrow(cs);
        counter.set(counter.get().wrapping_add(crate::config::TICK_MS));
    });
}
