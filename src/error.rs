//! Crate-wide error type.

use crate::carrier::CarrierState;

/// Errors returned by strip configuration, composition, and transfer control.
///
/// Configuration errors come back from constructors before the carrier starts.
/// [`Error::Busy`] is the only error produced at runtime by a well-configured strip.
#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A duration code does not fit inside one carrier period.
    #[display("duration code {code} is not below the carrier period of {period} ticks")]
    DurationOutOfRange {
        /// Offending code.
        code: u8,
        /// Carrier period in ticks.
        period: u8,
    },

    /// The 1-bit code must be strictly longer than the 0-bit code, and the 0-bit code non-zero.
    #[display("duration codes out of order (low {low}, high {high})")]
    DurationsNotOrdered {
        /// 0-bit code.
        low: u8,
        /// 1-bit code.
        high: u8,
    },

    /// The carrier period cannot be programmed into the 8-bit timer.
    #[display("carrier period of {period} ticks is not programmable")]
    PeriodOutOfRange {
        /// Requested period in ticks.
        period: u32,
    },

    /// Clock and prescale give a tick rate of zero, or the arithmetic overflowed.
    #[display("timer tick rate is out of range")]
    TickRateOutOfRange,

    /// The number of colors does not match the number of LEDs.
    #[display("expected {expected} LED colors, got {actual}")]
    PatternLength {
        /// LEDs in the strip.
        expected: usize,
        /// Colors supplied.
        actual: usize,
    },

    /// A DMA transfer length does not fit the 13-bit length field.
    #[display("DMA transfer length {len} is out of range")]
    TransferLength {
        /// Requested length in bytes.
        len: usize,
    },

    /// A buffer or register lies outside the DMA engine's 16-bit address space.
    #[display("address is outside the DMA address space")]
    AddressOutOfRange,

    /// The DMA destination is not the carrier's compare register.
    #[display("DMA destination is not the carrier compare register")]
    DestinationMismatch,

    /// The carrier timer was asked for a transition its current state does not allow.
    #[display("carrier is {actual:?}, expected {expected:?}")]
    CarrierState {
        /// State required by the operation.
        expected: CarrierState,
        /// State the carrier was in.
        actual: CarrierState,
    },

    /// A transfer is in flight; the buffer may not be rewritten nor the channel re-armed.
    #[display("a transfer is still in flight")]
    Busy,

    /// A data entry of the duration buffer is neither the low nor the high code.
    #[display("buffer entry {index} holds invalid code {code}")]
    InvalidCode {
        /// Buffer index.
        index: usize,
        /// Code found.
        code: u8,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
