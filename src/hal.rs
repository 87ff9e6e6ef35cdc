//! Hardware seams: the carrier timer and the DMA channel.
//!
//! [`Carrier`](crate::carrier::Carrier) and [`DmaStream`](crate::dma::DmaStream) only talk
//! to hardware through these two traits. Backends:
//!
//! - [`mmio`]: volatile register access on a CC251x-style part, using the encodings in [`regs`].
//! - [`sim`] (feature `host`): a cycle-level model of the timer and DMA pair.

use crate::Result;
use crate::carrier::CarrierConfig;
use crate::dma::{Destination, DmaConfig};
use crate::timing::Prescale;

pub mod mmio;
pub mod regs;
#[cfg(feature = "host")]
pub mod sim;

/// Timer with a period channel that triggers DMA at rollover and a compare
/// channel that drives the output pin.
///
/// Implementations do not track state; [`Carrier`](crate::carrier::Carrier) orders the calls.
pub trait CarrierTimer {
    /// Routes the pin to the timer and programs period, channel modes, and the
    /// initial compare value. The counter stays stopped.
    fn apply(&mut self, config: &CarrierConfig);

    /// Starts counting with `prescale`.
    fn run(&mut self, prescale: Prescale);

    /// Stops the counter and releases the pin, driven low.
    fn halt(&mut self);

    /// Writes the compare register directly.
    fn write_compare(&mut self, code: u8);

    /// Address of the compare register, as the DMA engine sees it.
    fn compare_target(&self) -> Destination;
}

/// One channel of a DMA engine.
pub trait DmaChannel {
    /// Loads a transfer descriptor. The channel must not be armed.
    ///
    /// # Errors
    ///
    /// Backend-specific: an address outside the engine's reach, or a
    /// destination the backend cannot serve.
    fn configure(&mut self, config: &DmaConfig) -> Result<()>;

    /// Arms the channel; each trigger then moves one byte.
    fn arm(&mut self);

    /// True until the last byte of the armed transfer has moved.
    fn is_armed(&self) -> bool;

    /// Stops the channel without finishing the transfer.
    fn disarm(&mut self);
}
