//! DMA streaming engine: moves the duration buffer into the compare register,
//! one byte per carrier rollover.
//!
//! [`DmaStream`] owns the channel and the buffer. While a transfer is in flight the
//! buffer cannot be borrowed mutably and the channel cannot be re-armed; both
//! attempts return [`Error::Busy`]. Completion is seen either by polling the channel
//! ([`DmaStream::is_busy`]) or from an interrupt handler through
//! [`TransferState::complete_from_interrupt`]. [`DmaStream::hold_low`] streams a
//! block of zero codes after a frame so the strip sees its reset time.

use embassy_futures::select::{Either, select};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicU32, Ordering};

use crate::duration_buffer::DurationBuffer;
use crate::hal::DmaChannel;
use crate::{Error, Result};

/// Fixed destination address of a transfer in the DMA engine's address space.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Destination(u16);

impl Destination {
    /// Destination at `address`.
    #[must_use]
    pub const fn new(address: u16) -> Self {
        Self(address)
    }

    /// The raw address.
    #[must_use]
    pub const fn address(self) -> u16 {
        self.0
    }
}

/// Bus priority of the channel relative to the CPU.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    /// Below the CPU.
    Low,
    /// Round-robin with the CPU.
    Normal,
    /// Ahead of the CPU. The stream must never miss a rollover.
    #[default]
    High,
}

/// Event that moves one byte.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// The carrier's period channel, once per rollover.
    #[default]
    CarrierRollover,
}

// ============================================================================
// DmaConfig
// ============================================================================

/// A single-shot byte transfer: source increments, destination fixed, no
/// completion interrupt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DmaConfig {
    source: *const u8,
    len: u16,
    destination: Destination,
    trigger: Trigger,
    priority: Priority,
}

impl DmaConfig {
    /// Largest length the 13-bit length field holds.
    pub const MAX_LEN: u16 = 0x1FFF;

    /// Describes a transfer of all of `source` to `destination`.
    ///
    /// # Errors
    ///
    /// [`Error::TransferLength`] unless `1 <= source.len() <= MAX_LEN`.
    pub fn new(source: &[u8], destination: Destination, priority: Priority) -> Result<Self> {
        let len = u16::try_from(source.len())
            .ok()
            .filter(|len| (1..=Self::MAX_LEN).contains(len))
            .ok_or(Error::TransferLength { len: source.len() })?;
        Ok(Self {
            source: source.as_ptr(),
            len,
            destination,
            trigger: Trigger::CarrierRollover,
            priority,
        })
    }

    /// First source byte.
    #[must_use]
    pub const fn source(&self) -> *const u8 {
        self.source
    }

    /// Bytes to move.
    #[must_use]
    pub const fn len(&self) -> u16 {
        self.len
    }

    /// Never true; construction rejects empty transfers.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Destination register.
    #[must_use]
    pub const fn destination(&self) -> Destination {
        self.destination
    }

    /// Trigger source.
    #[must_use]
    pub const fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Bus priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }
}

// ============================================================================
// TransferState
// ============================================================================

/// Transfer bookkeeping shared between the owner of a [`DmaStream`] and interrupt context.
///
/// Each armed transfer gets the next generation number. A transfer is in flight while
/// its generation has not been marked complete.
///
/// ```
/// use strip_carrier::dma::TransferState;
///
/// static STATE: TransferState = TransferState::new();
/// assert!(!STATE.is_in_flight());
/// ```
pub struct TransferState {
    started: AtomicU32,
    completed: AtomicU32,
    done: Signal<CriticalSectionRawMutex, u32>,
}

impl TransferState {
    /// No transfer started yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            started: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            done: Signal::new(),
        }
    }

    fn begin(&self) -> u32 {
        self.done.reset();
        self.started.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    fn complete(&self) {
        let generation = self.started.load(Ordering::Acquire);
        if self.completed.swap(generation, Ordering::AcqRel) != generation {
            self.done.signal(generation);
        }
    }

    /// Marks the current transfer complete. Call from the DMA done interrupt on
    /// targets that route it; polling with [`DmaStream::is_busy`] does the same.
    pub fn complete_from_interrupt(&self) {
        self.complete();
    }

    /// True between arming and completion.
    pub fn is_in_flight(&self) -> bool {
        self.started.load(Ordering::Acquire) != self.completed.load(Ordering::Acquire)
    }

    /// Generation of the most recently armed transfer.
    pub fn generation(&self) -> u32 {
        self.started.load(Ordering::Acquire)
    }

    /// Generation of the most recently completed transfer.
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::Acquire)
    }

    /// Waits until no transfer is in flight and returns the completed generation.
    ///
    /// Only interrupt-driven completion wakes this; see [`DmaStream::wait_idle`]
    /// for a wait that also polls the channel.
    pub async fn wait_complete(&self) -> u32 {
        while self.is_in_flight() {
            self.done.wait().await;
        }
        self.completed()
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// DmaStream
// ============================================================================

/// Most low periods one [`DmaStream::hold_low`] transfer covers.
pub const RESET_BLOCK_LEN: usize = 64;

static RESET_CODES: [u8; RESET_BLOCK_LEN] = [0; RESET_BLOCK_LEN];

/// Exclusive owner of a DMA channel and the duration buffer it streams.
pub struct DmaStream<D, const LEN: usize> {
    channel: D,
    buffer: &'static mut DurationBuffer<LEN>,
    state: &'static TransferState,
    destination: Destination,
    priority: Priority,
}

impl<D: DmaChannel, const LEN: usize> DmaStream<D, LEN> {
    /// Takes the channel and buffer. Any transfer left armed on the channel is aborted.
    ///
    /// # Errors
    ///
    /// [`Error::TransferLength`] if `LEN` does not fit the length field.
    pub fn new(
        mut channel: D,
        buffer: &'static mut DurationBuffer<LEN>,
        state: &'static TransferState,
        destination: Destination,
        priority: Priority,
    ) -> Result<Self> {
        DmaConfig::new(buffer.as_slice(), destination, priority)?;
        channel.disarm();
        state.complete();
        Ok(Self {
            channel,
            buffer,
            state,
            destination,
            priority,
        })
    }

    /// Polls the channel. A channel that has finished completes the current generation.
    ///
    /// Busy while either the generation is open or the channel is still armed.
    pub fn is_busy(&mut self) -> bool {
        let armed = self.channel.is_armed();
        if !armed && self.state.is_in_flight() {
            self.state.complete();
            trace!("transfer {} complete", self.state.completed());
        }
        armed || self.state.is_in_flight()
    }

    /// The buffer, read-only. Always available; contents may be mid-stream.
    #[must_use]
    pub fn buffer(&self) -> &DurationBuffer<LEN> {
        &*self.buffer
    }

    /// The buffer, for composing the next frame.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] while a transfer is in flight.
    pub fn buffer_mut(&mut self) -> Result<&mut DurationBuffer<LEN>> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        Ok(&mut *self.buffer)
    }

    /// Describes the buffer to the channel and arms it. Returns the new generation.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] while a transfer is in flight.
    /// - Any error of [`DmaChannel::configure`].
    pub fn arm(&mut self) -> Result<u32> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        let config = DmaConfig::new(self.buffer.as_slice(), self.destination, self.priority)?;
        self.channel.configure(&config)?;
        let generation = self.state.begin();
        self.channel.arm();
        Ok(generation)
    }

    /// Streams up to `periods` zero codes, holding the line low from the next rollover
    /// on. Returns the number of periods armed, at most [`RESET_BLOCK_LEN`]; zero arms
    /// nothing.
    ///
    /// The transfer takes no generation. [`is_busy`](Self::is_busy) reports it through
    /// the armed channel.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] while a transfer is in flight.
    /// - Any error of [`DmaChannel::configure`].
    pub fn hold_low(&mut self, periods: u32) -> Result<u32> {
        if self.is_busy() {
            return Err(Error::Busy);
        }
        let len = usize::try_from(periods).unwrap_or(usize::MAX).min(RESET_BLOCK_LEN);
        let Some(zeros) = RESET_CODES.get(..len).filter(|zeros| !zeros.is_empty()) else {
            return Ok(0);
        };
        let config = DmaConfig::new(zeros, self.destination, self.priority)?;
        self.channel.configure(&config)?;
        self.channel.arm();
        trace!("holding the line low for {} periods", config.len());
        Ok(u32::from(config.len()))
    }

    /// Disarms the channel and completes the current generation.
    pub fn abort(&mut self) {
        self.channel.disarm();
        if self.state.is_in_flight() {
            self.state.complete();
            debug!("transfer {} aborted", self.state.completed());
        }
    }

    /// Waits for the current transfer, polling the channel between wakeups.
    pub async fn wait_idle(&mut self) -> u32 {
        loop {
            if !self.is_busy() {
                return self.state.completed();
            }
            match select(self.state.wait_complete(), yield_now()).await {
                Either::First(generation) => return generation,
                Either::Second(()) => {}
            }
        }
    }

    /// Shared transfer state.
    #[must_use]
    pub const fn state(&self) -> &'static TransferState {
        self.state
    }

    /// The channel.
    #[must_use]
    pub const fn channel(&self) -> &D {
        &self.channel
    }

    /// Aborts any transfer and gives back the channel and buffer.
    pub fn release(mut self) -> (D, &'static mut DurationBuffer<LEN>) {
        self.abort();
        (self.channel, self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::{DmaConfig, Destination, Priority, TransferState};
    use crate::Error;

    #[test]
    fn config_rejects_empty_and_oversized_transfers() {
        let destination = Destination::new(0xDFCF);
        assert_eq!(
            DmaConfig::new(&[], destination, Priority::High),
            Err(Error::TransferLength { len: 0 })
        );
        let big = vec![0_u8; 8192];
        assert_eq!(
            DmaConfig::new(&big, destination, Priority::High),
            Err(Error::TransferLength { len: 8192 })
        );
        let config = DmaConfig::new(&big[..8191], destination, Priority::Low).expect("fits");
        assert_eq!(config.len(), 8191);
        assert_eq!(config.source(), big.as_ptr());
    }

    #[test]
    fn generations_advance_and_complete() {
        let state = TransferState::new();
        assert_eq!(state.begin(), 1);
        assert!(state.is_in_flight());
        state.complete_from_interrupt();
        assert!(!state.is_in_flight());
        assert_eq!(state.begin(), 2);
        assert_eq!(state.generation(), 2);
        assert_eq!(state.completed(), 1);
        state.complete();
        assert_eq!(embassy_futures::block_on(state.wait_complete()), 2);
    }
}
