//! The carrier timer: a fixed-period PWM whose compare register sets each bit's high time.
//!
//! [`Carrier`] wraps a [`CarrierTimer`] backend in a small state machine:
//!
//! ```text
//! Idle --configure--> Configured --start--> Running
//!   ^                     |                    |
//!   +-------- stop -------+-------- stop ------+
//! ```
//!
//! At every rollover the period channel fires the DMA trigger; the compare channel
//! sets the pin at zero and clears it on compare (or the reverse when
//! [`OutputPolarity::Inverted`]).

use crate::hal::CarrierTimer;
use crate::timing::{Prescale, TimingProfile};
use crate::{Error, Result};

/// Lifecycle of the carrier timer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CarrierState {
    /// Not configured; the pin is released low.
    #[default]
    Idle,
    /// Registers programmed, counter stopped.
    Configured,
    /// Counting; rollovers trigger DMA.
    Running,
}

/// Which level the output holds during a bit's high time.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputPolarity {
    /// High at zero, low from compare on.
    #[default]
    Normal,
    /// Low at zero, high from compare on. For an inverting level shifter such as
    /// an NMOS pull-down to 5 V.
    Inverted,
}

/// Carrier timer configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CarrierConfig {
    /// Ticks per period. The counter wraps after `period - 1`.
    pub period: u8,
    /// Clock divider.
    pub prescale: Prescale,
    /// Output polarity.
    pub polarity: OutputPolarity,
    /// Compare value loaded at configuration. Zero keeps the line low.
    pub initial_compare: u8,
}

impl CarrierConfig {
    /// Period and prescale of `profile`, normal polarity, compare zero.
    #[must_use]
    pub const fn from_profile(profile: &TimingProfile) -> Self {
        Self {
            period: profile.period(),
            prescale: profile.prescale(),
            polarity: OutputPolarity::Normal,
            initial_compare: 0,
        }
    }

    /// Same configuration with `polarity`.
    #[must_use]
    pub const fn with_polarity(mut self, polarity: OutputPolarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Value of the period register.
    #[must_use]
    pub const fn top(&self) -> u8 {
        self.period.saturating_sub(1)
    }
}

/// A [`CarrierTimer`] plus the state it is in.
#[derive(Debug)]
pub struct Carrier<T> {
    timer: T,
    state: CarrierState,
    config: Option<CarrierConfig>,
}

impl<T: CarrierTimer> Carrier<T> {
    /// Takes ownership of an unconfigured timer.
    #[must_use]
    pub const fn new(timer: T) -> Self {
        Self {
            timer,
            state: CarrierState::Idle,
            config: None,
        }
    }

    /// Programs the timer. Idle → Configured.
    ///
    /// # Errors
    ///
    /// - [`Error::CarrierState`] unless idle.
    /// - [`Error::PeriodOutOfRange`] if `config.period < 2`.
    /// - [`Error::DurationOutOfRange`] if the initial compare is not below the period.
    pub fn configure(&mut self, config: CarrierConfig) -> Result<()> {
        self.expect(CarrierState::Idle)?;
        if config.period < 2 {
            return Err(Error::PeriodOutOfRange {
                period: u32::from(config.period),
            });
        }
        check_code(config.initial_compare, config.period)?;
        self.timer.apply(&config);
        self.config = Some(config);
        self.state = CarrierState::Configured;
        debug!("carrier configured: top {}, {:?}", config.top(), config.polarity);
        Ok(())
    }

    /// Starts the counter. Configured → Running.
    ///
    /// # Errors
    ///
    /// [`Error::CarrierState`] unless configured.
    pub fn start(&mut self) -> Result<()> {
        self.expect(CarrierState::Configured)?;
        let prescale = self.config.map(|config| config.prescale).unwrap_or_default();
        self.timer.run(prescale);
        self.state = CarrierState::Running;
        Ok(())
    }

    /// Halts the counter and releases the pin low. Running or Configured → Idle.
    ///
    /// # Errors
    ///
    /// [`Error::CarrierState`] if already idle.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == CarrierState::Idle {
            return Err(Error::CarrierState {
                expected: CarrierState::Running,
                actual: CarrierState::Idle,
            });
        }
        self.timer.halt();
        self.config = None;
        self.state = CarrierState::Idle;
        debug!("carrier stopped");
        Ok(())
    }

    /// Writes one duration code to the compare register outside a DMA transfer.
    ///
    /// # Errors
    ///
    /// - [`Error::CarrierState`] while idle.
    /// - [`Error::DurationOutOfRange`] if `code` is not below the period.
    pub fn set_compare(&mut self, code: u8) -> Result<()> {
        let config = self.config.ok_or(Error::CarrierState {
            expected: CarrierState::Configured,
            actual: self.state,
        })?;
        check_code(code, config.period)?;
        self.timer.write_compare(code);
        Ok(())
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CarrierState {
        self.state
    }

    /// Configuration in effect, if not idle.
    #[must_use]
    pub const fn config(&self) -> Option<CarrierConfig> {
        self.config
    }

    /// The backend.
    #[must_use]
    pub const fn timer(&self) -> &T {
        &self.timer
    }

    /// Gives the backend back, stopping it first if needed.
    pub fn release(mut self) -> T {
        if self.state != CarrierState::Idle {
            self.timer.halt();
        }
        self.timer
    }

    fn expect(&self, expected: CarrierState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::CarrierState {
                expected,
                actual: self.state,
            })
        }
    }
}

const fn check_code(code: u8, period: u8) -> Result<()> {
    if code < period {
        Ok(())
    } else {
        Err(Error::DurationOutOfRange { code, period })
    }
}
