//! The duration buffer and the frame composer that fills it.
//!
//! A [`DurationBuffer`] holds one duration code per protocol bit, framed by two
//! sentinels:
//!
//! ```text
//! index:  0          1 ..= 24           25 ..= 48         ...   LEN-1
//!         [lead-in]  [LED 0: G8 R8 B8]  [LED 1: G8 R8 B8]  ...   [0]
//! ```
//!
//! The DMA engine streams it into the carrier's compare register one entry per
//! period, so composition must finish before a transfer is armed.
//! [`DmaStream`](crate::dma::DmaStream) enforces that.
//!
//! # Example
//!
//! ```
//! use strip_carrier::duration_buffer::{DurationBuffer, buffer_len};
//! use strip_carrier::frame::{Frame1d, Layout, colors};
//! use strip_carrier::timing::TimingProfile;
//!
//! const PROFILE: TimingProfile = TimingProfile::FULL_SPEED;
//! let mut buffer = DurationBuffer::<{ buffer_len(2) }>::new(&PROFILE);
//! buffer.compose(&Frame1d::<2>::filled(colors::RED), &PROFILE, Layout::WS2812);
//!
//! assert_eq!(buffer[0], 255);
//! assert_eq!(&buffer[1..9], &[10; 8]); // green
//! assert_eq!(&buffer[9..17], &[19; 8]); // red
//! assert_eq!(buffer[buffer.len() - 1], 0);
//! ```

use core::ops::Deref;

use crate::frame::{BITS_PER_LED, Frame1d, Layout, Rgb};
use crate::timing::TimingProfile;
use crate::{Error, Result};

/// Entries that are not protocol bits: one lead-in, one trailer.
pub const SENTINEL_COUNT: usize = 2;

/// Lead-in code that keeps the output high for a whole period.
pub const IDLE_SENTINEL: u8 = u8::MAX;

/// Trailer code: the output stays low from the end of the frame on, latching the strip.
pub const RESET_SENTINEL: u8 = 0;

/// Buffer length for `led_count` LEDs.
#[must_use]
pub const fn buffer_len(led_count: usize) -> usize {
    led_count * BITS_PER_LED + SENTINEL_COUNT
}

/// What the first buffer entry does to the line before the first data bit.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LeadIn {
    /// Maximal code ([`IDLE_SENTINEL`]): one full-period high pulse precedes the data.
    ///
    /// This is the classic layout. The pulse runs straight into the first bit's
    /// high time, so the first bit always reads as a 1.
    #[default]
    IdleHigh,
    /// Zero code: the line stays low until the first data bit.
    Low,
}

impl LeadIn {
    /// The code stored at index 0.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::IdleHigh => IDLE_SENTINEL,
            Self::Low => RESET_SENTINEL,
        }
    }
}

/// Duration codes for a strip of [`LED_COUNT`](Self::LED_COUNT) LEDs.
///
/// `LEN` must be `24 * LED_COUNT + 2`; declare it with [`buffer_len`]. Any other
/// length fails to build as soon as the buffer is used.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DurationBuffer<const LEN: usize> {
    codes: [u8; LEN],
}

impl<const LEN: usize> DurationBuffer<LEN> {
    /// LEDs covered by this buffer.
    pub const LED_COUNT: usize = {
        assert!(
            LEN >= SENTINEL_COUNT && (LEN - SENTINEL_COUNT) % BITS_PER_LED == 0,
            "duration buffer length must be 24 * LED_COUNT + 2"
        );
        (LEN - SENTINEL_COUNT) / BITS_PER_LED
    };

    /// Index of the trailing sentinel.
    pub const LAST: usize = LEN - 1;

    /// An all-off frame with the default [`LeadIn::IdleHigh`] sentinel.
    #[must_use]
    pub const fn new(profile: &TimingProfile) -> Self {
        Self::with_lead_in(profile, LeadIn::IdleHigh)
    }

    /// An all-off frame: every data entry holds the 0-bit code.
    #[must_use]
    pub const fn with_lead_in(profile: &TimingProfile, lead_in: LeadIn) -> Self {
        let _led_count = Self::LED_COUNT;
        let mut codes = [profile.low(); LEN];
        codes[0] = lead_in.code();
        codes[Self::LAST] = RESET_SENTINEL;
        Self { codes }
    }

    /// Frame composer: rewrites every data entry from `frame`, then the trailer.
    ///
    /// The lead-in sentinel is left alone.
    pub fn compose<const N: usize>(
        &mut self,
        frame: &Frame1d<N>,
        profile: &TimingProfile,
        layout: Layout,
    ) {
        const {
            assert!(
                N * BITS_PER_LED + SENTINEL_COUNT == LEN,
                "frame length does not match the duration buffer"
            );
        }
        self.write_colors(frame.iter().copied(), profile, layout);
    }

    /// Frame composer for a color iterator of unknown length.
    ///
    /// # Errors
    ///
    /// [`Error::PatternLength`] if `colors` does not yield exactly
    /// [`LED_COUNT`](Self::LED_COUNT) items. The buffer is then left untouched.
    pub fn compose_colors<I>(
        &mut self,
        colors: I,
        profile: &TimingProfile,
        layout: Layout,
    ) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Rgb>,
    {
        // Composed off to the side so a wrong count never leaves a half-written frame.
        let mut staged = self.clone();
        let mut actual = 0_usize;
        let counted = colors.into_iter().map(|color| -> Rgb {
            actual = actual.saturating_add(1);
            color.into()
        });
        staged.write_colors(counted, profile, layout);
        if actual != Self::LED_COUNT {
            return Err(Error::PatternLength {
                expected: Self::LED_COUNT,
                actual,
            });
        }
        *self = staged;
        Ok(())
    }

    fn write_colors(
        &mut self,
        colors: impl Iterator<Item = Rgb>,
        profile: &TimingProfile,
        layout: Layout,
    ) {
        let data = self.codes.get_mut(1..Self::LAST).unwrap_or_default();
        let mut slots = data.iter_mut();
        for color in colors {
            for (bit, slot) in layout.bits(color).zip(slots.by_ref()) {
                *slot = profile.encode(bit);
            }
        }
        if let Some(trailer) = self.codes.last_mut() {
            *trailer = RESET_SENTINEL;
        }
    }

    /// Replaces the lead-in sentinel.
    pub fn set_lead_in(&mut self, lead_in: LeadIn) {
        if let Some(first) = self.codes.first_mut() {
            *first = lead_in.code();
        }
    }

    /// The lead-in currently stored, or `None` if index 0 holds another code.
    #[must_use]
    pub fn lead_in(&self) -> Option<LeadIn> {
        match self.codes.first() {
            Some(&IDLE_SENTINEL) => Some(LeadIn::IdleHigh),
            Some(&RESET_SENTINEL) => Some(LeadIn::Low),
            _ => None,
        }
    }

    /// The 24 codes of LED `index`, or `None` past the end of the strip.
    #[must_use]
    pub fn led_codes(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(BITS_PER_LED)?.checked_add(1)?;
        let end = start.checked_add(BITS_PER_LED)?;
        if end > Self::LAST {
            return None;
        }
        self.codes.get(start..end)
    }

    /// All codes, sentinels included, in transmission order.
    #[must_use]
    pub const fn as_slice(&self) -> &[u8] {
        &self.codes
    }

    /// Checks the buffer invariant: data entries are all 0-bit or 1-bit codes,
    /// the lead-in is a known sentinel, and the trailer is zero.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCode`] for the first offending entry.
    pub fn validate(&self, profile: &TimingProfile) -> Result<()> {
        for (index, &code) in self.codes.iter().enumerate() {
            let valid = if index == 0 {
                self.lead_in().is_some()
            } else if index == Self::LAST {
                code == RESET_SENTINEL
            } else {
                profile.decode(code).is_some()
            };
            if !valid {
                return Err(Error::InvalidCode { index, code });
            }
        }
        Ok(())
    }

    /// Reads the colors back out of the codes.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCode`] if a data entry is neither code of `profile`.
    pub fn decode<const N: usize>(
        &self,
        profile: &TimingProfile,
        layout: Layout,
    ) -> Result<Frame1d<N>> {
        const {
            assert!(
                N * BITS_PER_LED + SENTINEL_COUNT == LEN,
                "frame length does not match the duration buffer"
            );
        }
        let mut frame = Frame1d::<N>::new();
        for (led, pixel) in frame.iter_mut().enumerate() {
            let mut bits = [false; BITS_PER_LED];
            for (offset, bit) in bits.iter_mut().enumerate() {
                let index = 1 + led * BITS_PER_LED + offset;
                let code = self.codes.get(index).copied().unwrap_or_default();
                *bit = profile.decode(code).ok_or(Error::InvalidCode { index, code })?;
            }
            *pixel = layout.color(bits);
        }
        Ok(frame)
    }
}

impl<const LEN: usize> Deref for DurationBuffer<LEN> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.codes
    }
}
