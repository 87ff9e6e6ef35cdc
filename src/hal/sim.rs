//! Host simulation of the carrier timer and DMA channel.
//!
//! [`SimBoard`] advances in whole carrier periods. In each period the line is high for
//! `min(compare, period)` ticks, then low. At the end of the period the armed DMA
//! channel, if any, copies the next source byte into the compare register; the new
//! value drives the following period. A channel goes idle after its last byte.
//!
//! The captured [`Waveform`] is the line as the strip sees it. With
//! [`OutputPolarity::Inverted`] an external inverter is assumed, so the capture looks
//! the same for both polarities.
//!
//! ```
//! use strip_carrier::hal::sim::SimBoard;
//! use strip_carrier::hal::DmaChannel;
//!
//! let board = SimBoard::new();
//! let dma = board.dma();
//! assert!(!dma.is_armed());
//! assert_eq!(board.advance(10), 0); // the counter is not running
//! ```
#![allow(unsafe_code, reason = "the simulated DMA engine reads its source through a raw pointer")]

use core::cell::RefCell;

use crate::carrier::{CarrierConfig, OutputPolarity};
use crate::dma::{Destination, DmaConfig};
use crate::frame::{BITS_PER_LED, Frame1d, Layout};
use crate::hal::regs;
use crate::hal::{CarrierTimer, DmaChannel};
use crate::timing::{Prescale, TimingProfile};
use crate::{Error, Result};

// ============================================================================
// Waveform
// ============================================================================

/// Line levels captured from the simulated pin, run-length encoded in timer ticks.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Waveform {
    runs: Vec<(bool, u32)>,
}

impl Waveform {
    fn push(&mut self, high: bool, ticks: u32) {
        if ticks == 0 {
            return;
        }
        match self.runs.last_mut() {
            Some((level, length)) if *level == high => *length = length.saturating_add(ticks),
            _ => self.runs.push((high, ticks)),
        }
    }

    /// `(high, ticks)` runs in time order. Adjacent runs always differ in level.
    #[must_use]
    pub fn runs(&self) -> &[(bool, u32)] {
        &self.runs
    }

    /// True if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Length of each high pulse, in ticks.
    pub fn pulses(&self) -> impl Iterator<Item = u32> + '_ {
        self.runs.iter().filter(|(high, _)| *high).map(|(_, ticks)| *ticks)
    }

    /// Total ticks spent high.
    #[must_use]
    pub fn high_ticks(&self) -> u32 {
        self.pulses().sum()
    }

    /// Ticks the line has stayed low since the last pulse.
    #[must_use]
    pub fn trailing_low_ticks(&self) -> u32 {
        match self.runs.last() {
            Some((false, ticks)) => *ticks,
            _ => 0,
        }
    }

    /// Low runs with a pulse on both sides, in ticks. A run of at least the reset
    /// time is where the strip latches one frame and starts the next.
    pub fn low_gaps(&self) -> impl Iterator<Item = u32> + '_ {
        self.runs.windows(3).filter_map(|window| match window {
            [(true, _), (false, ticks), (true, _)] => Some(*ticks),
            _ => None,
        })
    }

    /// Receiver model: each pulse is one bit, a 1 when it is longer than the
    /// midpoint of the two codes of `profile`.
    pub fn bits<'a>(&'a self, profile: &TimingProfile) -> impl Iterator<Item = bool> + use<'a> {
        let threshold = u32::from(profile.low()) + u32::from(profile.high());
        self.pulses().map(move |ticks| ticks.saturating_mul(2) > threshold)
    }

    /// Decodes the first `N` LEDs' worth of pulses into colors.
    ///
    /// # Errors
    ///
    /// [`Error::PatternLength`] if fewer than `N * 24` pulses were captured; `actual`
    /// counts the complete LEDs found.
    pub fn decode_frame<const N: usize>(
        &self,
        profile: &TimingProfile,
        layout: Layout,
    ) -> Result<Frame1d<N>> {
        let mut bits = self.bits(profile);
        let mut frame = Frame1d::<N>::new();
        for (led, pixel) in frame.iter_mut().enumerate() {
            let mut led_bits = [false; BITS_PER_LED];
            for slot in &mut led_bits {
                *slot = bits.next().ok_or(Error::PatternLength {
                    expected: N,
                    actual: led,
                })?;
            }
            *pixel = layout.color(led_bits);
        }
        Ok(frame)
    }
}

// ============================================================================
// SimBoard
// ============================================================================

#[derive(Debug)]
struct SimCore {
    routed: bool,
    running: bool,
    period: u8,
    prescale: Prescale,
    polarity: OutputPolarity,
    compare: u8,
    compare_target: Destination,
    transfer: Option<DmaConfig>,
    armed: bool,
    cursor: u16,
    periods: u64,
    streamed: Vec<u8>,
    waveform: Waveform,
}

impl SimCore {
    fn step(&mut self) {
        let period = u32::from(self.period);
        let high = u32::from(self.compare).min(period);
        self.waveform.push(true, high);
        self.waveform.push(false, period - high);
        self.periods = self.periods.saturating_add(1);

        // Rollover: the period channel fires the DMA trigger.
        if !self.armed {
            return;
        }
        let Some(transfer) = self.transfer else {
            self.armed = false;
            return;
        };
        // SAFETY: a configured source stays valid until its transfer completes or is
        // disarmed. `DmaStream` holds the buffer for `'static` and never writes it
        // while the channel is armed.
        let byte = unsafe { transfer.source().add(usize::from(self.cursor)).read_volatile() };
        self.compare = byte;
        self.streamed.push(byte);
        self.cursor = self.cursor.saturating_add(1);
        if self.cursor >= transfer.len() {
            self.armed = false;
        }
    }
}

/// Simulated timer and DMA channel wired together, as on the board.
///
/// Hand [`timer`](Self::timer) and [`dma`](Self::dma) to a
/// [`LedStrip`](crate::led_strip::LedStrip) and drive time with
/// [`advance`](Self::advance).
#[derive(Debug)]
pub struct SimBoard {
    core: RefCell<SimCore>,
}

impl SimBoard {
    /// Idle board. The compare register sits at the CC251x `T3CC1` address.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: RefCell::new(SimCore {
                routed: false,
                running: false,
                period: 0,
                prescale: Prescale::Div1,
                polarity: OutputPolarity::Normal,
                compare: 0,
                compare_target: Destination::new(regs::xdata_sfr_address(regs::T3CC1)),
                transfer: None,
                armed: false,
                cursor: 0,
                periods: 0,
                streamed: Vec::new(),
                waveform: Waveform::default(),
            }),
        }
    }

    /// Handle implementing [`CarrierTimer`].
    #[must_use]
    pub const fn timer(&self) -> SimTimer<'_> {
        SimTimer { board: self }
    }

    /// Handle implementing [`DmaChannel`].
    #[must_use]
    pub const fn dma(&self) -> SimDma<'_> {
        SimDma { board: self }
    }

    /// Runs `periods` carrier periods. Returns how many ran: none unless the counter is running.
    pub fn advance(&self, periods: usize) -> usize {
        let mut core = self.core.borrow_mut();
        if !core.running {
            return 0;
        }
        for _ in 0..periods {
            core.step();
        }
        periods
    }

    /// Runs until the DMA channel goes idle, at most `limit` periods. Returns the
    /// number of periods run.
    pub fn run_until_idle(&self, limit: usize) -> usize {
        let mut core = self.core.borrow_mut();
        let mut periods = 0;
        while core.running && core.armed && periods < limit {
            core.step();
            periods += 1;
        }
        periods
    }

    /// Current compare value.
    #[must_use]
    pub fn compare(&self) -> u8 {
        self.core.borrow().compare
    }

    /// True while the counter runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.borrow().running
    }

    /// True while the pin is routed to the timer.
    #[must_use]
    pub fn is_routed(&self) -> bool {
        self.core.borrow().routed
    }

    /// Output polarity of the last configuration.
    #[must_use]
    pub fn polarity(&self) -> OutputPolarity {
        self.core.borrow().polarity
    }

    /// Prescale the counter was last started with.
    #[must_use]
    pub fn prescale(&self) -> Prescale {
        self.core.borrow().prescale
    }

    /// Bytes the DMA channel has moved so far in its current transfer.
    #[must_use]
    pub fn cursor(&self) -> u16 {
        self.core.borrow().cursor
    }

    /// Carrier periods run since power-up.
    #[must_use]
    pub fn periods(&self) -> u64 {
        self.core.borrow().periods
    }

    /// Takes every byte written to the compare register by DMA since the last call.
    pub fn take_streamed(&self) -> Vec<u8> {
        core::mem::take(&mut self.core.borrow_mut().streamed)
    }

    /// Takes the waveform captured since the last call.
    pub fn take_waveform(&self) -> Waveform {
        core::mem::take(&mut self.core.borrow_mut().waveform)
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// The [`SimBoard`]'s carrier timer.
#[derive(Clone, Copy, Debug)]
pub struct SimTimer<'a> {
    board: &'a SimBoard,
}

impl CarrierTimer for SimTimer<'_> {
    fn apply(&mut self, config: &CarrierConfig) {
        let mut core = self.board.core.borrow_mut();
        core.routed = true;
        core.running = false;
        core.period = config.period;
        core.prescale = config.prescale;
        core.polarity = config.polarity;
        core.compare = config.initial_compare;
    }

    fn run(&mut self, prescale: Prescale) {
        let mut core = self.board.core.borrow_mut();
        core.prescale = prescale;
        core.running = core.routed;
    }

    fn halt(&mut self) {
        let mut core = self.board.core.borrow_mut();
        core.running = false;
        core.routed = false;
    }

    fn write_compare(&mut self, code: u8) {
        self.board.core.borrow_mut().compare = code;
    }

    fn compare_target(&self) -> Destination {
        self.board.core.borrow().compare_target
    }
}

/// The [`SimBoard`]'s DMA channel.
///
/// Every configured source must stay valid until its transfer finishes or the
/// channel is disarmed. [`DmaStream`](crate::dma::DmaStream) guarantees this.
#[derive(Clone, Copy, Debug)]
pub struct SimDma<'a> {
    board: &'a SimBoard,
}

impl DmaChannel for SimDma<'_> {
    fn configure(&mut self, config: &DmaConfig) -> Result<()> {
        let mut core = self.board.core.borrow_mut();
        if core.armed {
            return Err(Error::Busy);
        }
        if config.destination() != core.compare_target {
            return Err(Error::DestinationMismatch);
        }
        core.transfer = Some(*config);
        core.cursor = 0;
        Ok(())
    }

    fn arm(&mut self) {
        let mut core = self.board.core.borrow_mut();
        core.armed = core.transfer.is_some();
    }

    fn is_armed(&self) -> bool {
        self.board.core.borrow().armed
    }

    fn disarm(&mut self) {
        self.board.core.borrow_mut().armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::{SimBoard, Waveform};
    use crate::Error;
    use crate::carrier::CarrierConfig;
    use crate::dma::{Destination, DmaConfig, Priority};
    use crate::frame::Layout;
    use crate::hal::{CarrierTimer, DmaChannel};
    use crate::timing::{Prescale, TimingProfile};

    fn running_board(board: &SimBoard) {
        let mut timer = board.timer();
        timer.apply(&CarrierConfig::from_profile(&TimingProfile::FULL_SPEED));
        timer.run(Prescale::Div1);
    }

    #[test]
    fn idle_compare_keeps_the_line_low() {
        let board = SimBoard::new();
        running_board(&board);
        assert_eq!(board.advance(3), 3);
        assert_eq!(board.take_waveform().runs(), &[(false, 90)]);
    }

    #[test]
    fn each_rollover_moves_one_byte() {
        static SOURCE: [u8; 4] = [19, 10, 19, 0];
        let board = SimBoard::new();
        running_board(&board);
        let mut dma = board.dma();
        let target = board.timer().compare_target();
        dma.configure(&DmaConfig::new(&SOURCE, target, Priority::High).expect("length"))
            .expect("idle channel");
        dma.arm();
        assert_eq!(board.run_until_idle(100), 4);
        assert!(!dma.is_armed());
        assert_eq!(board.take_streamed(), SOURCE);
        // first period still carries the old compare value of zero
        let waveform = board.take_waveform();
        assert_eq!(
            waveform.runs(),
            &[
                (false, 30),
                (true, 19),
                (false, 11),
                (true, 10),
                (false, 20),
                (true, 19),
                (false, 11),
            ]
        );
        assert_eq!(waveform.low_gaps().collect::<Vec<_>>(), [11, 20]);
    }

    #[test]
    fn rejects_foreign_destination_and_reconfigure_while_armed() {
        static SOURCE: [u8; 2] = [0, 0];
        let board = SimBoard::new();
        let mut dma = board.dma();
        assert_eq!(
            dma.configure(
                &DmaConfig::new(&SOURCE, Destination::new(0x1234), Priority::Low)
                    .expect("length"),
            ),
            Err(Error::DestinationMismatch)
        );
        let config = DmaConfig::new(&SOURCE, board.timer().compare_target(), Priority::Low)
            .expect("length");
        dma.configure(&config).expect("idle channel");
        dma.arm();
        assert_eq!(dma.configure(&config), Err(Error::Busy));
    }

    #[test]
    fn receiver_splits_bits_at_the_midpoint() {
        let mut waveform = Waveform::default();
        for ticks in [19, 10, 15, 14] {
            waveform.push(true, ticks);
            waveform.push(false, 30 - ticks);
        }
        let bits: Vec<bool> = waveform.bits(&TimingProfile::FULL_SPEED).collect();
        assert_eq!(bits, [true, false, true, false]);
        assert_eq!(waveform.trailing_low_ticks(), 16);
        assert_eq!(
            waveform.decode_frame::<1>(&TimingProfile::FULL_SPEED, Layout::WS2812),
            Err(Error::PatternLength {
                expected: 1,
                actual: 0
            })
        );
    }
}
