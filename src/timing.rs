//! Carrier timing profiles and the duration encoder.
//!
//! A [`TimingProfile`] fixes the carrier period and the two duration codes, all in
//! timer ticks. Each protocol bit becomes one code: the number of ticks the output
//! stays high inside one carrier period.
//!
//! # Example
//!
//! ```
//! use strip_carrier::timing::TimingProfile;
//!
//! let profile = TimingProfile::FULL_SPEED;
//! assert_eq!(profile.encode(true), 19);
//! assert_eq!(profile.encode(false), 10);
//! assert_eq!(profile.bit_period_ns(), 1250);
//! ```

use embassy_time::Duration;

use crate::{Error, Result};

/// System clock feeding the carrier timer on the reference board (24 MHz).
pub const CLOCK_HZ_DEFAULT: u32 = 24_000_000;

/// WS2812 bit period in nanoseconds.
pub const BIT_PERIOD_NS: u32 = 1250;

/// WS2812 high time of a 0-bit in nanoseconds.
pub const T0H_NS: u32 = 400;

/// WS2812 high time of a 1-bit in nanoseconds.
pub const T1H_NS: u32 = 800;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

// ============================================================================
// Prescale
// ============================================================================

/// Clock divider applied in front of the carrier counter.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescale {
    /// Count every clock.
    #[default]
    Div1,
    /// Count every second clock.
    Div2,
    /// Count every fourth clock.
    Div4,
    /// Count every eighth clock.
    Div8,
    /// Count every 16th clock.
    Div16,
    /// Count every 32nd clock.
    Div32,
    /// Count every 64th clock.
    Div64,
    /// Count every 128th clock.
    Div128,
}

impl Prescale {
    /// Clock divisor.
    #[must_use]
    pub const fn divisor(self) -> u32 {
        1 << self.exponent()
    }

    /// Base-2 logarithm of the divisor; this is also the timer's 3-bit `DIV` field.
    #[must_use]
    pub const fn exponent(self) -> u8 {
        match self {
            Self::Div1 => 0,
            Self::Div2 => 1,
            Self::Div4 => 2,
            Self::Div8 => 3,
            Self::Div16 => 4,
            Self::Div32 => 5,
            Self::Div64 => 6,
            Self::Div128 => 7,
        }
    }
}

// ============================================================================
// TimingProfile
// ============================================================================

/// Carrier period and duration codes for one clock setup.
///
/// Invariant, checked by every constructor: `0 < low < high < period`, and `period`
/// fits the 8-bit counter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingProfile {
    clock_hz: u32,
    prescale: Prescale,
    period: u8,
    low: u8,
    high: u8,
}

impl TimingProfile {
    /// 24 MHz clock, no prescale: 30-tick period, codes 10 and 19.
    pub const FULL_SPEED: Self = match Self::new(CLOCK_HZ_DEFAULT, Prescale::Div1, 30, 10, 19) {
        Ok(profile) => profile,
        Err(_) => panic!("full-speed profile is invalid"),
    };

    /// 24 MHz clock divided by two: 15-tick period, codes 5 and 10.
    pub const HALF_SPEED: Self = match Self::new(CLOCK_HZ_DEFAULT, Prescale::Div2, 15, 5, 10) {
        Ok(profile) => profile,
        Err(_) => panic!("half-speed profile is invalid"),
    };

    /// Builds a profile from tick counts.
    ///
    /// # Errors
    ///
    /// - [`Error::TickRateOutOfRange`] if `clock_hz` is below the prescale divisor.
    /// - [`Error::PeriodOutOfRange`] if `period < 2`.
    /// - [`Error::DurationsNotOrdered`] unless `0 < low < high`.
    /// - [`Error::DurationOutOfRange`] if `high >= period`.
    pub const fn new(
        clock_hz: u32,
        prescale: Prescale,
        period: u8,
        low: u8,
        high: u8,
    ) -> Result<Self> {
        if clock_hz / prescale.divisor() == 0 {
            return Err(Error::TickRateOutOfRange);
        }
        if period < 2 {
            return Err(Error::PeriodOutOfRange {
                period: period as u32,
            });
        }
        if low == 0 || low >= high {
            return Err(Error::DurationsNotOrdered { low, high });
        }
        if high >= period {
            return Err(Error::DurationOutOfRange { code: high, period });
        }
        Ok(Self {
            clock_hz,
            prescale,
            period,
            low,
            high,
        })
    }

    /// Builds a profile from protocol times in nanoseconds, rounding to the nearest tick.
    ///
    /// With a 24 MHz clock and no prescale, the WS2812 times round to the
    /// [`FULL_SPEED`](Self::FULL_SPEED) codes.
    ///
    /// ```
    /// use strip_carrier::timing::{Prescale, TimingProfile};
    ///
    /// let profile = TimingProfile::from_nanoseconds(24_000_000, Prescale::Div1, 1250, 400, 800)?;
    /// assert_eq!(profile, TimingProfile::FULL_SPEED);
    /// # Ok::<(), strip_carrier::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Any error of [`new`](Self::new), or [`Error::PeriodOutOfRange`] when the period
    /// does not fit in 8 bits at this tick rate.
    pub fn from_nanoseconds(
        clock_hz: u32,
        prescale: Prescale,
        period_ns: u32,
        t0h_ns: u32,
        t1h_ns: u32,
    ) -> Result<Self> {
        let tick_hz = clock_hz
            .checked_div(prescale.divisor())
            .filter(|tick_hz| *tick_hz > 0)
            .ok_or(Error::TickRateOutOfRange)?;
        let period = ns_to_ticks(period_ns, tick_hz)?;
        let period = u8::try_from(period).map_err(|_| Error::PeriodOutOfRange { period })?;
        let low = saturate_u8(ns_to_ticks(t0h_ns, tick_hz)?);
        let high = saturate_u8(ns_to_ticks(t1h_ns, tick_hz)?);
        Self::new(clock_hz, prescale, period, low, high)
    }

    /// Duration encoder: the code for one protocol bit.
    #[must_use]
    pub const fn encode(&self, bit: bool) -> u8 {
        if bit { self.high } else { self.low }
    }

    /// Inverse of [`encode`](Self::encode); `None` for any other code.
    #[must_use]
    pub const fn decode(&self, code: u8) -> Option<bool> {
        if code == self.high {
            Some(true)
        } else if code == self.low {
            Some(false)
        } else {
            None
        }
    }

    /// Carrier period in ticks.
    #[must_use]
    pub const fn period(&self) -> u8 {
        self.period
    }

    /// 0-bit code in ticks.
    #[must_use]
    pub const fn low(&self) -> u8 {
        self.low
    }

    /// 1-bit code in ticks.
    #[must_use]
    pub const fn high(&self) -> u8 {
        self.high
    }

    /// Clock divider in front of the counter.
    #[must_use]
    pub const fn prescale(&self) -> Prescale {
        self.prescale
    }

    /// Undivided timer clock in Hz.
    #[must_use]
    pub const fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    /// Counter ticks per second.
    #[must_use]
    pub const fn tick_hz(&self) -> u32 {
        self.clock_hz / self.prescale.divisor()
    }

    /// Length of `ticks` counter ticks in nanoseconds, rounded to nearest.
    #[must_use]
    pub const fn ticks_to_ns(&self, ticks: u32) -> u32 {
        let tick_hz = self.tick_hz() as u64;
        ((ticks as u64 * NANOS_PER_SECOND + tick_hz / 2) / tick_hz) as u32
    }

    /// One carrier period in nanoseconds.
    #[must_use]
    pub const fn bit_period_ns(&self) -> u32 {
        self.ticks_to_ns(self.period as u32)
    }

    /// Worst-case time for the DMA engine to stream `len` codes, one per period.
    #[must_use]
    pub fn transfer_duration(&self, len: usize) -> Duration {
        let ticks = (len as u64).saturating_mul(u64::from(self.period));
        let nanos = ticks.saturating_mul(NANOS_PER_SECOND) / u64::from(self.tick_hz());
        Duration::from_micros(nanos.div_ceil(1000))
    }
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self::FULL_SPEED
    }
}

fn ns_to_ticks(ns: u32, tick_hz: u32) -> Result<u32> {
    let ticks = (u64::from(ns) * u64::from(tick_hz) + NANOS_PER_SECOND / 2) / NANOS_PER_SECOND;
    u32::try_from(ticks).map_err(|_| Error::TickRateOutOfRange)
}

fn saturate_u8(ticks: u32) -> u8 {
    u8::try_from(ticks).unwrap_or(u8::MAX)
}
