//! WS2812 (NeoPixel) waveforms from a timer and a DMA channel, with no CPU time per bit.
//!
//! A fixed-period PWM carrier runs at the protocol's bit rate. At each rollover the
//! DMA engine copies the next byte of a duration buffer into the carrier's compare
//! register, so each period's high time encodes one bit. The CPU only composes the
//! buffer and arms the transfer.
//!
//! Start with [`led_strip::LedStrip`]. On the host (feature `host`, on by default) the
//! [`hal::sim`] board stands in for the hardware and captures the waveform it produces.
//!
//! # Glossary
//!
//! - **Carrier:** the fixed-period PWM timer. One period is one protocol bit (1.25 µs).
//! - **Duration code:** the number of timer ticks the output stays high within one period.
//!   A 0-bit and a 1-bit each have one code.
//! - **Duration buffer:** one code per protocol bit, framed by a lead-in sentinel and a
//!   trailing zero that holds the line low so the strip latches.
//! - **Generation:** the sequence number of an armed transfer. A transfer is in flight
//!   until its generation is marked complete.
//! - **DMA ([Direct Memory Access](https://en.wikipedia.org/wiki/Direct_memory_access)):**
//!   moves one byte from the buffer to the compare register per trigger.
#![cfg_attr(not(any(test, feature = "host")), no_std)]

// Compile-time checks: the host build simulates the hardware and logs through `log`
#[cfg(all(feature = "host", feature = "arm"))]
compile_error!("Cannot enable both 'host' and 'arm' features simultaneously");

#[cfg(all(feature = "host", feature = "defmt"))]
compile_error!("'defmt' needs a target build; disable default features to use it");

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

pub mod carrier;
pub mod dma;
pub mod duration_buffer;
mod error;
pub mod frame;
pub mod hal;
pub mod led_strip;
pub mod timing;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
