//! Fixed test patterns that a strip can render without any color input.
//!
//! A pattern renders one [`Frame1d`] per refresh step. Static patterns ignore the step;
//! [`TestPattern::Chase`] moves one LED per step.

use super::{Frame1d, Rgb, colors};

/// A built-in pattern, rendered one step per refresh.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestPattern {
    /// Every LED the same color.
    Solid(Rgb),
    /// Even LEDs take the first color, odd LEDs the second.
    Alternating(Rgb, Rgb),
    /// A single lit LED that advances by one position per step.
    Chase {
        /// Color of the lit LED.
        color: Rgb,
        /// Color of every other LED.
        background: Rgb,
    },
}

impl TestPattern {
    /// All LEDs green, full brightness.
    pub const ALL_GREEN: Self = Self::Solid(Rgb::new(0, 255, 0));

    /// All LEDs red, full brightness.
    pub const ALL_RED: Self = Self::Solid(Rgb::new(255, 0, 0));

    /// Every LED off.
    pub const OFF: Self = Self::Solid(colors::BLACK);

    /// Renders the frame for refresh `step`.
    #[must_use]
    pub fn render<const N: usize>(&self, step: usize) -> Frame1d<N> {
        match *self {
            Self::Solid(color) => Frame1d::filled(color),
            Self::Alternating(even, odd) => {
                let mut frame = Frame1d::new();
                for (index, pixel) in frame.iter_mut().enumerate() {
                    *pixel = if index % 2 == 0 { even } else { odd };
                }
                frame
            }
            Self::Chase { color, background } => {
                let mut frame = Frame1d::filled(background);
                if let Some(pixel) = step.checked_rem(N).and_then(|lit| frame.get_mut(lit)) {
                    *pixel = color;
                }
                frame
            }
        }
    }

    /// True when every step renders the same frame.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        !matches!(self, Self::Chase { .. })
    }
}

impl Default for TestPattern {
    fn default() -> Self {
        Self::ALL_GREEN
    }
}
