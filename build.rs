use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds (tests, the simulated demo) need no extra flags
    let target = env::var("TARGET").unwrap_or_default();
    if !target.contains("avr") {
        return;
    }

    // Configure the demo firmware for ATmega128
    println!("cargo:rustc-link-arg-bins=-mmcu=atmega128");
}
