//! LED colors, frames, and the wire layout of each LED's 24 bits.
//!
//! See [`Frame1d`] for the color container and [`Layout`] for channel and bit order.

use core::ops::{Deref, DerefMut};

use smart_leds::RGB8;

use crate::{Error, Result};

/// Predefined RGB color constants from the `smart_leds` crate.
///
/// Common colors include `RED`, `GREEN`, `BLUE`, `YELLOW`, `WHITE`, `BLACK`.
#[doc(inline)]
pub use smart_leds::colors;

pub mod test_pattern;

/// RGB color representation re-exported from the `smart_leds` crate.
pub type Rgb = RGB8;

/// Color channels per LED.
pub const CHANNELS_PER_LED: usize = 3;

/// Bits per color channel.
pub const BITS_PER_CHANNEL: usize = 8;

/// Protocol bits per LED.
pub const BITS_PER_LED: usize = CHANNELS_PER_LED * BITS_PER_CHANNEL;

// ============================================================================
// Frame1d
// ============================================================================

/// [`Rgb`] pixel data for a strip of `N` LEDs, in physical chain order.
///
/// Frames deref to `[Rgb; N]`, so pixels can be mutated directly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Frame1d<const N: usize>(pub [Rgb; N]);

impl<const N: usize> Frame1d<N> {
    /// Number of LEDs in this frame.
    pub const LEN: usize = N;

    /// Create a new blank (all black) frame.
    #[must_use]
    pub const fn new() -> Self {
        Self([Rgb::new(0, 0, 0); N])
    }

    /// Create a frame filled with a single color.
    #[must_use]
    pub const fn filled(color: Rgb) -> Self {
        Self([color; N])
    }

    /// Collects exactly `N` colors into a frame.
    ///
    /// # Errors
    ///
    /// [`Error::PatternLength`] if the iterator yields fewer or more than `N` colors.
    pub fn try_from_colors<I>(colors: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Rgb>,
    {
        let mut frame = Self::new();
        let mut actual = 0_usize;
        for color in colors {
            if let Some(pixel) = frame.0.get_mut(actual) {
                *pixel = color.into();
            }
            actual = actual.saturating_add(1);
        }
        if actual == N {
            Ok(frame)
        } else {
            Err(Error::PatternLength { expected: N, actual })
        }
    }
}

impl<const N: usize> Deref for Frame1d<N> {
    type Target = [Rgb; N];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> DerefMut for Frame1d<N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<const N: usize> From<[Rgb; N]> for Frame1d<N> {
    fn from(array: [Rgb; N]) -> Self {
        Self(array)
    }
}

impl<const N: usize> From<Frame1d<N>> for [Rgb; N] {
    fn from(frame: Frame1d<N>) -> Self {
        frame.0
    }
}

impl<const N: usize> Default for Frame1d<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Layout - order of channels and bits on the wire
// ============================================================================

/// Order in which an LED's color channels go out on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelOrder {
    /// Green, red, blue. WS2812 and most clones.
    #[default]
    Grb,
    /// Red, green, blue.
    Rgb,
}

impl ChannelOrder {
    /// Channel bytes of `color` in wire order.
    #[must_use]
    pub const fn split(self, color: Rgb) -> [u8; CHANNELS_PER_LED] {
        match self {
            Self::Grb => [color.g, color.r, color.b],
            Self::Rgb => [color.r, color.g, color.b],
        }
    }

    /// Inverse of [`split`](Self::split).
    #[must_use]
    pub const fn join(self, channels: [u8; CHANNELS_PER_LED]) -> Rgb {
        let [first, second, third] = channels;
        match self {
            Self::Grb => Rgb::new(second, first, third),
            Self::Rgb => Rgb::new(first, second, third),
        }
    }
}

/// Order in which the bits of one channel byte go out on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    /// Most significant bit first, as the WS2812 datasheet specifies.
    #[default]
    MsbFirst,
    /// Least significant bit first.
    LsbFirst,
}

impl BitOrder {
    /// Bit `position` (0 = first on the wire) of `byte`.
    #[must_use]
    pub const fn bit(self, byte: u8, position: usize) -> bool {
        let shift = match self {
            Self::MsbFirst => 7 - (position % BITS_PER_CHANNEL),
            Self::LsbFirst => position % BITS_PER_CHANNEL,
        };
        (byte >> shift) & 1 == 1
    }

    /// Mask that [`bit`](Self::bit) reads for `position`.
    #[must_use]
    pub const fn mask(self, position: usize) -> u8 {
        match self {
            Self::MsbFirst => 0x80 >> (position % BITS_PER_CHANNEL),
            Self::LsbFirst => 1 << (position % BITS_PER_CHANNEL),
        }
    }
}

/// Channel order plus bit order: where each color bit lands among an LED's 24 codes.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    /// Channel order.
    pub channel_order: ChannelOrder,
    /// Bit order within each channel.
    pub bit_order: BitOrder,
}

impl Layout {
    /// GRB, MSB first.
    pub const WS2812: Self = Self {
        channel_order: ChannelOrder::Grb,
        bit_order: BitOrder::MsbFirst,
    };

    /// The 24 protocol bits of `color`, in wire order.
    pub fn bits(self, color: Rgb) -> impl Iterator<Item = bool> {
        let bit_order = self.bit_order;
        self.channel_order
            .split(color)
            .into_iter()
            .flat_map(move |byte| {
                (0..BITS_PER_CHANNEL).map(move |position| bit_order.bit(byte, position))
            })
    }

    /// Rebuilds a color from its 24 protocol bits in wire order.
    #[must_use]
    pub fn color(self, bits: [bool; BITS_PER_LED]) -> Rgb {
        let mut channels = [0_u8; CHANNELS_PER_LED];
        for (index, bit) in bits.into_iter().enumerate() {
            if bit {
                if let Some(channel) = channels.get_mut(index / BITS_PER_CHANNEL) {
                    *channel |= self.bit_order.mask(index);
                }
            }
        }
        self.channel_order.join(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::{BitOrder, ChannelOrder, Frame1d, Layout, Rgb, colors};
    use crate::Error;

    #[test]
    fn grb_msb_first_puts_green_msb_first() {
        let bits: Vec<bool> = Layout::WS2812.bits(Rgb::new(0, 0x80, 0)).collect();
        assert_eq!(bits.len(), 24);
        assert!(bits[0]);
        assert!(bits[1..].iter().all(|bit| !bit));
    }

    #[test]
    fn lsb_first_reverses_each_channel() {
        let layout = Layout {
            channel_order: ChannelOrder::Rgb,
            bit_order: BitOrder::LsbFirst,
        };
        let bits: Vec<bool> = layout.bits(Rgb::new(0x01, 0, 0x80)).collect();
        assert!(bits[0]);
        assert!(bits[23]);
        assert_eq!(bits.iter().filter(|bit| **bit).count(), 2);
    }

    #[test]
    fn color_inverts_bits_for_every_layout() {
        let color = Rgb::new(0xA5, 0x3C, 0x0F);
        for channel_order in [ChannelOrder::Grb, ChannelOrder::Rgb] {
            for bit_order in [BitOrder::MsbFirst, BitOrder::LsbFirst] {
                let layout = Layout {
                    channel_order,
                    bit_order,
                };
                let mut bits = [false; 24];
                for (slot, bit) in bits.iter_mut().zip(layout.bits(color)) {
                    *slot = bit;
                }
                assert_eq!(layout.color(bits), color);
            }
        }
    }

    #[test]
    fn try_from_colors_checks_length() {
        let frame = Frame1d::<3>::try_from_colors([colors::RED; 3]).expect("three colors");
        assert_eq!(frame, Frame1d::filled(colors::RED));
        assert_eq!(
            Frame1d::<3>::try_from_colors([colors::RED; 2]),
            Err(Error::PatternLength {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            Frame1d::<3>::try_from_colors([colors::RED; 5]),
            Err(Error::PatternLength {
                expected: 3,
                actual: 5
            })
        );
    }
}
