use avr_device::atmega128a::USART0;
use core::convert::Infallible;

use crate::config::{CPU_FREQ_HZ, UART_BAUD};

// (16_000_000 / (16 * 9600)) - 1 = 103
const UBRR: u16 = (CPU_FREQ_HZ / (16 * UART_BAUD) - 1) as u16;

const UDRE0: u8 = 1 << 5;
const TXEN0: u8 = 1 << 3;
// 8N1
const UCSZ_8BIT: u8 = 0x06;

/// Polled, transmit-only USART0 used as the log sink.
pub struct Uart {
    _usart: USART0,
}

impl Uart {
    pub fn new(usart: USART0) -> Self {
        unsafe {
            let p = USART0::ptr();
            (*p).ubrr0h.write(|w| w.bits((UBRR >> 8) as u8));
            (*p).ubrr0l.write(|w| w.bits(UBRR as u8));
            (*p).ucsr0c.write(|w| w.bits(UCSZ_8BIT));
            (*p).ucsr0b.write(|w| w.bits(TXEN0));
        }
        Self { _usart: usart }
    }

    pub fn write_byte(&mut self, byte: u8) {
        unsafe {
            let p = USART0::ptr();
            while (*p).ucsr0a.read().bits() & UDRE0 == 0 {}
            (*p).udr0.write(|w| w.bits(byte));
        }
    }
}

impl ufmt::uWrite for Uart {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}
