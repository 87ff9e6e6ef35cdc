//! The refresh driver: a WS2812 strip on one timer and one DMA channel.
//!
//! [`LedStrip`] owns the [`Carrier`], the [`DmaStream`] and the duration buffer. The
//! host loop calls [`service`](LedStrip::service) with the current time; whenever the
//! previous transfer has finished and a refresh is due, the driver composes the
//! current frame and arms the next transfer. The CPU is free while the strip is fed.
//!
//! Between two frames the line is held low for at least
//! [`reset_time`](LedStripConfig::reset_time), streamed as zero codes on the same
//! channel, so the strip latches each frame on its own.
//!
//! # Example: refresh a green strip on the simulator
//!
//! ```
//! use embassy_time::Instant;
//! use static_cell::StaticCell;
//! use strip_carrier::dma::TransferState;
//! use strip_carrier::duration_buffer::{DurationBuffer, buffer_len};
//! use strip_carrier::frame::Layout;
//! use strip_carrier::hal::sim::SimBoard;
//! use strip_carrier::led_strip::{LedStrip, LedStripConfig};
//! use strip_carrier::timing::TimingProfile;
//!
//! const LED_COUNT: usize = 17;
//! const LEN: usize = buffer_len(LED_COUNT);
//! static BUFFER: StaticCell<DurationBuffer<LEN>> = StaticCell::new();
//! static STATE: TransferState = TransferState::new();
//!
//! let board = SimBoard::new();
//! let buffer = BUFFER.init(DurationBuffer::new(&TimingProfile::FULL_SPEED));
//! let mut strip = LedStrip::<_, _, LED_COUNT, LEN>::new(
//!     board.timer(),
//!     board.dma(),
//!     buffer,
//!     &STATE,
//!     LedStripConfig::default(),
//! )?;
//!
//! assert!(strip.service(Instant::from_millis(0))?); // the first call always refreshes
//! assert_eq!(board.run_until_idle(usize::MAX), LEN);
//! let frame = board
//!     .take_waveform()
//!     .decode_frame::<LED_COUNT>(&TimingProfile::FULL_SPEED, Layout::WS2812)?;
//! assert!(frame.iter().all(|pixel| pixel.g == 255 && pixel.r == 0 && pixel.b == 0));
//! # Ok::<(), strip_carrier::Error>(())
//! ```

use embassy_time::{Duration, Instant};
use smart_leds::SmartLedsWrite;

use crate::carrier::{Carrier, CarrierConfig, CarrierState, OutputPolarity};
use crate::dma::{DmaStream, Priority, TransferState};
use crate::duration_buffer::{DurationBuffer, LeadIn};
use crate::frame::test_pattern::TestPattern;
use crate::frame::{Frame1d, Layout, Rgb};
use crate::hal::{CarrierTimer, DmaChannel};
use crate::timing::TimingProfile;
use crate::{Error, Result};

/// What [`LedStrip::refresh`] does when the previous transfer is still running.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusyPolicy {
    /// Reject the refresh with [`Error::Busy`] and count it as dropped.
    #[default]
    Drop,
    /// Remember it; the next [`LedStrip::service`] that finds the strip ready sends it.
    Queue,
}

// ============================================================================
// LedStripConfig
// ============================================================================

/// Strip configuration. Every field has a default matching the reference board.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedStripConfig {
    /// Carrier timing and duration codes.
    pub profile: TimingProfile,
    /// Channel and bit order on the wire.
    pub layout: Layout,
    /// Output polarity of the carrier.
    pub polarity: OutputPolarity,
    /// First buffer entry.
    pub lead_in: LeadIn,
    /// DMA priority.
    pub priority: Priority,
    /// Minimum time between refreshes in [`LedStrip::service`]; `None` refreshes
    /// only when the frame changes.
    pub refresh_interval: Option<Duration>,
    /// Handling of refreshes requested mid-transfer.
    pub busy_policy: BusyPolicy,
    /// Low time held after every frame before the next one may start.
    pub reset_time: Duration,
}

impl LedStripConfig {
    /// Default refresh gate.
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(30);

    /// WS2812 reset time: 40 periods of 1.25 us.
    pub const DEFAULT_RESET_TIME: Duration = Duration::from_micros(50);

    /// Defaults around `profile`.
    #[must_use]
    pub const fn new(profile: TimingProfile) -> Self {
        Self {
            profile,
            layout: Layout::WS2812,
            polarity: OutputPolarity::Normal,
            lead_in: LeadIn::IdleHigh,
            priority: Priority::High,
            refresh_interval: Some(Self::DEFAULT_REFRESH_INTERVAL),
            busy_policy: BusyPolicy::Drop,
            reset_time: Self::DEFAULT_RESET_TIME,
        }
    }

    /// Set the wire layout.
    #[must_use]
    pub const fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the output polarity.
    #[must_use]
    pub const fn with_polarity(mut self, polarity: OutputPolarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Set the lead-in sentinel.
    #[must_use]
    pub const fn with_lead_in(mut self, lead_in: LeadIn) -> Self {
        self.lead_in = lead_in;
        self
    }

    /// Set the DMA priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set or clear the refresh gate.
    #[must_use]
    pub const fn with_refresh_interval(mut self, refresh_interval: Option<Duration>) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    /// Set the busy policy.
    #[must_use]
    pub const fn with_busy_policy(mut self, busy_policy: BusyPolicy) -> Self {
        self.busy_policy = busy_policy;
        self
    }

    /// Set the low time between frames. Zero lets frames run back to back.
    #[must_use]
    pub const fn with_reset_time(mut self, reset_time: Duration) -> Self {
        self.reset_time = reset_time;
        self
    }

    /// [`reset_time`](Self::reset_time) in whole carrier periods, rounded up.
    #[must_use]
    pub fn reset_periods(&self) -> u32 {
        let nanos = self.reset_time.as_micros().saturating_mul(1000);
        let period_ns = u64::from(self.profile.bit_period_ns()).max(1);
        u32::try_from(nanos.div_ceil(period_ns)).unwrap_or(u32::MAX)
    }
}

impl Default for LedStripConfig {
    fn default() -> Self {
        Self::new(TimingProfile::FULL_SPEED)
    }
}

/// Refresh counters since [`LedStrip::new`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RefreshStats {
    /// Transfers armed.
    pub armed: u32,
    /// Refreshes rejected under [`BusyPolicy::Drop`].
    pub dropped: u32,
    /// Refreshes deferred under [`BusyPolicy::Queue`].
    pub queued: u32,
}

#[derive(Clone, Copy, Debug)]
enum Source<const N: usize> {
    Frame(Frame1d<N>),
    Pattern { pattern: TestPattern, step: usize },
}

// ============================================================================
// LedStrip
// ============================================================================

/// `N` WS2812 LEDs fed by carrier timer `T` and DMA channel `D`.
///
/// `LEN` must equal [`buffer_len(N)`](crate::duration_buffer::buffer_len).
pub struct LedStrip<T, D, const N: usize, const LEN: usize> {
    carrier: Carrier<T>,
    stream: DmaStream<D, LEN>,
    config: LedStripConfig,
    source: Source<N>,
    pending: bool,
    queued: bool,
    reset_owed: u32,
    last_refresh: Option<Instant>,
    stats: RefreshStats,
}

impl<T, D, const N: usize, const LEN: usize> LedStrip<T, D, N, LEN>
where
    T: CarrierTimer,
    D: DmaChannel,
{
    /// Number of LEDs.
    pub const LED_COUNT: usize = N;

    /// Resets `buffer` to an all-off frame, configures and starts the carrier, and takes
    /// the DMA channel. Nothing is sent until the first refresh; the initial source is
    /// [`TestPattern::ALL_GREEN`].
    ///
    /// # Errors
    ///
    /// Any carrier or DMA configuration error; the carrier is then left stopped.
    pub fn new(
        timer: T,
        channel: D,
        buffer: &'static mut DurationBuffer<LEN>,
        state: &'static TransferState,
        config: LedStripConfig,
    ) -> Result<Self> {
        const {
            assert!(N * 24 + 2 == LEN, "LEN must be buffer_len(N)");
        }
        *buffer = DurationBuffer::with_lead_in(&config.profile, config.lead_in);
        let destination = timer.compare_target();
        let stream = DmaStream::new(channel, buffer, state, destination, config.priority)?;

        let mut carrier = Carrier::new(timer);
        carrier.configure(
            CarrierConfig::from_profile(&config.profile).with_polarity(config.polarity),
        )?;
        carrier.start()?;

        info!(
            "led strip ready: {} LEDs, period {} ticks, codes {}/{}",
            N,
            config.profile.period(),
            config.profile.low(),
            config.profile.high()
        );
        Ok(Self {
            carrier,
            stream,
            config,
            source: Source::Pattern {
                pattern: TestPattern::ALL_GREEN,
                step: 0,
            },
            pending: true,
            queued: false,
            reset_owed: 0,
            last_refresh: None,
            stats: RefreshStats::default(),
        })
    }

    /// Composes the current source and arms a transfer.
    ///
    /// Returns the transfer's generation, or `None` if the refresh was queued.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] while a transfer or its reset time is in flight under
    ///   [`BusyPolicy::Drop`].
    /// - Any error of the DMA channel's configuration.
    pub fn refresh(&mut self) -> Result<Option<u32>> {
        if !self.poll_ready()? {
            return match self.config.busy_policy {
                BusyPolicy::Drop => {
                    self.stats.dropped = self.stats.dropped.saturating_add(1);
                    warn!("refresh dropped: strip busy");
                    Err(Error::Busy)
                }
                BusyPolicy::Queue => {
                    if !self.queued {
                        self.stats.queued = self.stats.queued.saturating_add(1);
                        self.queued = true;
                    }
                    Ok(None)
                }
            };
        }
        self.send().map(Some)
    }

    /// Runs the driver once. Sends a refresh when [`poll_ready`](Self::poll_ready)
    /// holds and one is due: a queued refresh, a changed source, the first call, or
    /// `refresh_interval` elapsed since the last refresh sent from here.
    ///
    /// Returns whether a transfer was armed.
    ///
    /// # Errors
    ///
    /// Any error of the DMA channel's configuration.
    pub fn service(&mut self, now: Instant) -> Result<bool> {
        if !self.poll_ready()? {
            return Ok(false);
        }
        let interval_elapsed = match (self.last_refresh, self.config.refresh_interval) {
            (None, _) => true,
            (Some(last), Some(interval)) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed >= interval),
            (Some(_), None) => false,
        };
        if !(self.queued || self.pending || interval_elapsed) {
            return Ok(false);
        }
        self.send()?;
        self.last_refresh = Some(now);
        Ok(true)
    }

    /// Advances the strip without sending: completes a finished transfer and starts
    /// the reset time it owes. True once a new frame may be armed.
    ///
    /// # Errors
    ///
    /// Any error of the DMA channel's configuration.
    pub fn poll_ready(&mut self) -> Result<bool> {
        if self.stream.is_busy() {
            return Ok(false);
        }
        if self.reset_owed == 0 {
            return Ok(true);
        }
        let held = self.stream.hold_low(self.reset_owed)?;
        self.reset_owed = self.reset_owed.saturating_sub(held);
        Ok(false)
    }

    fn send(&mut self) -> Result<u32> {
        let frame = self.frame();
        let buffer = self.stream.buffer_mut()?;
        buffer.compose(&frame, &self.config.profile, self.config.layout);
        let generation = self.stream.arm()?;

        if let Source::Pattern { step, .. } = &mut self.source {
            *step = step.wrapping_add(1);
        }
        self.pending = false;
        self.queued = false;
        self.reset_owed = self.config.reset_periods();
        self.stats.armed = self.stats.armed.saturating_add(1);
        debug!("transfer {} armed, {} bytes", generation, LEN);
        Ok(generation)
    }

    /// Shows `frame` from the next refresh on.
    pub fn set_frame(&mut self, frame: impl Into<Frame1d<N>>) {
        self.source = Source::Frame(frame.into());
        self.pending = true;
    }

    /// Shows `pattern` from the next refresh on, starting at step 0.
    pub fn set_pattern(&mut self, pattern: TestPattern) {
        self.source = Source::Pattern { pattern, step: 0 };
        self.pending = true;
    }

    /// The frame the next refresh will send.
    #[must_use]
    pub fn frame(&self) -> Frame1d<N> {
        match self.source {
            Source::Frame(frame) => frame,
            Source::Pattern { pattern, step } => pattern.render(step),
        }
    }

    /// True while a transfer is in flight or the reset time after it is not yet over.
    pub fn is_busy(&mut self) -> bool {
        self.stream.is_busy() || self.reset_owed > 0
    }

    /// Waits for the frame in flight, if any. Returns the last completed generation.
    ///
    /// The reset time after the frame is started by the next
    /// [`poll_ready`](Self::poll_ready), [`service`](Self::service) or
    /// [`refresh`](Self::refresh).
    pub async fn wait_idle(&mut self) -> u32 {
        self.stream.wait_idle().await
    }

    /// Refresh counters.
    #[must_use]
    pub const fn stats(&self) -> RefreshStats {
        self.stats
    }

    /// The configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &LedStripConfig {
        &self.config
    }

    /// Carrier state; `Running` for the whole life of the strip.
    #[must_use]
    pub const fn carrier_state(&self) -> CarrierState {
        self.carrier.state()
    }

    /// The duration buffer as last composed.
    #[must_use]
    pub fn buffer(&self) -> &DurationBuffer<LEN> {
        self.stream.buffer()
    }

    /// Time one transfer keeps the line busy.
    #[must_use]
    pub fn transfer_duration(&self) -> Duration {
        self.config.profile.transfer_duration(LEN)
    }

    /// Aborts any transfer, stops the carrier, and returns the timer, the DMA channel,
    /// and the buffer.
    pub fn shutdown(self) -> (T, D, &'static mut DurationBuffer<LEN>) {
        let (channel, buffer) = self.stream.release();
        let timer = self.carrier.release();
        info!(
            "led strip shut down after {} refreshes ({} dropped)",
            self.stats.armed, self.stats.dropped
        );
        (timer, channel, buffer)
    }
}

impl<T, D, const N: usize, const LEN: usize> SmartLedsWrite for LedStrip<T, D, N, LEN>
where
    T: CarrierTimer,
    D: DmaChannel,
{
    type Error = Error;
    type Color = Rgb;

    /// Takes exactly `N` colors and refreshes.
    fn write<I, C>(&mut self, iterator: I) -> Result<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<Self::Color>,
    {
        let frame = Frame1d::<N>::try_from_colors(iterator)?;
        self.set_frame(frame);
        self.refresh().map(|_| ())
    }
}
