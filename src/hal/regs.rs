//! Register encodings for a CC251x-style Timer 3 and DMA controller.
//!
//! Values are plain bytes so the same encodings serve the [`mmio`](super::mmio)
//! backend and the tests. Field layout:
//!
//! ```text
//! T3CTL    DIV[7:5] START[4] OVFIM[3] CLR[2] MODE[1:0]
//! T3CCTLn  -[7] IM[6] CMP[5:3] MODE[2] CAP[1:0]
//! DMA DC6  WORDSIZE[7] TMODE[6:5] TRIG[4:0]
//! DMA DC7  SRCINC[7:6] DESTINC[5:4] IRQMASK[3] M8[2] PRIORITY[1:0]
//! ```

use crate::carrier::{CarrierConfig, OutputPolarity};
use crate::dma::{DmaConfig, Priority, Trigger};
use crate::timing::Prescale;
use crate::{Error, Result};

// ============================================================================
// SFR addresses
// ============================================================================

/// Base of the XDATA window onto the special function registers.
pub const XDATA_SFR_BASE: u16 = 0xDF00;

/// Timer 3 control.
pub const T3CTL: u8 = 0xCB;
/// Timer 3 channel 0 (period) control.
pub const T3CCTL0: u8 = 0xCC;
/// Timer 3 channel 0 compare value; the counter wraps after reaching it.
pub const T3CC0: u8 = 0xCD;
/// Timer 3 channel 1 (output) control.
pub const T3CCTL1: u8 = 0xCE;
/// Timer 3 channel 1 compare value, the DMA destination.
pub const T3CC1: u8 = 0xCF;
/// DMA arm register.
pub const DMAARM: u8 = 0xD6;
/// Port 1 data.
pub const P1: u8 = 0x90;
/// Port 1 direction.
pub const P1DIR: u8 = 0xFE;
/// Port 1 function select.
pub const P1SEL: u8 = 0xF4;

/// Address of SFR `sfr` as seen from XDATA, and so by the DMA engine.
#[must_use]
pub const fn xdata_sfr_address(sfr: u8) -> u16 {
    XDATA_SFR_BASE | sfr as u16
}

// ============================================================================
// Timer 3
// ============================================================================

/// `T3CTL` bit that runs the counter.
pub const T3CTL_START: u8 = 1 << 4;
const T3CTL_MODE_MODULO: u8 = 0b10;

const T3CCTL_MODE_COMPARE: u8 = 1 << 2;
const CMP_SET_ON_COMPARE: u8 = 0b000;
const CMP_SET_ON_COMPARE_CLEAR_AT_ZERO: u8 = 0b011;
const CMP_CLEAR_ON_COMPARE_SET_AT_ZERO: u8 = 0b100;

/// `T3CTL`: modulo mode with `prescale`, started or not.
#[must_use]
pub const fn t3ctl(prescale: Prescale, start: bool) -> u8 {
    let start = if start { T3CTL_START } else { 0 };
    (prescale.exponent() << 5) | start | T3CTL_MODE_MODULO
}

/// `T3CCTL0`: compare mode with the interrupt masked. The compare event is the DMA trigger.
pub const T3CCTL0_ROLLOVER: u8 = T3CCTL_MODE_COMPARE | (CMP_SET_ON_COMPARE << 3);

/// `T3CCTL1`: compare mode, interrupt masked, output action per `polarity`.
#[must_use]
pub const fn t3cctl1(polarity: OutputPolarity) -> u8 {
    let cmp = match polarity {
        OutputPolarity::Normal => CMP_CLEAR_ON_COMPARE_SET_AT_ZERO,
        OutputPolarity::Inverted => CMP_SET_ON_COMPARE_CLEAR_AT_ZERO,
    };
    T3CCTL_MODE_COMPARE | (cmp << 3)
}

/// `T3CC0`: the last count of each period.
#[must_use]
pub const fn t3cc0(config: &CarrierConfig) -> u8 {
    config.top()
}

// ============================================================================
// DMA
// ============================================================================

const DC6_WORDSIZE_BYTE: u8 = 0;
const DC6_TMODE_SINGLE: u8 = 0b00 << 5;
const DC7_SRCINC_ONE: u8 = 0b01 << 6;
const DC7_DESTINC_ZERO: u8 = 0b00 << 4;

/// `DMAARM` bit that aborts the channels selected alongside it.
pub const DMAARM_ABORT: u8 = 1 << 7;

/// Trigger number of `trigger`.
#[must_use]
pub const fn trigger_number(trigger: Trigger) -> u8 {
    match trigger {
        Trigger::CarrierRollover => 7,
    }
}

/// Two-bit `PRIORITY` field of `priority`.
#[must_use]
pub const fn priority_bits(priority: Priority) -> u8 {
    match priority {
        Priority::Low => 0b00,
        Priority::Normal => 0b01,
        Priority::High => 0b10,
    }
}

/// `DC6`: byte words, single mode, `trigger`.
#[must_use]
pub const fn dc6(trigger: Trigger) -> u8 {
    DC6_WORDSIZE_BYTE | DC6_TMODE_SINGLE | trigger_number(trigger)
}

/// `DC7`: source increments by one, destination fixed, no interrupt, `priority`.
#[must_use]
pub const fn dc7(priority: Priority) -> u8 {
    DC7_SRCINC_ONE | DC7_DESTINC_ZERO | priority_bits(priority)
}

/// `DMAARM` mask selecting `channel`.
#[must_use]
pub const fn dmaarm_mask(channel: u8) -> u8 {
    1 << (channel & 0b111)
}

/// The eight-byte DMA descriptor, in memory order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaDescriptor([u8; 8]);

impl DmaDescriptor {
    /// Descriptor for a transfer between fixed 16-bit addresses.
    #[must_use]
    pub const fn new(
        source: u16,
        destination: u16,
        len: u16,
        trigger: Trigger,
        priority: Priority,
    ) -> Self {
        let [source_high, source_low] = source.to_be_bytes();
        let [destination_high, destination_low] = destination.to_be_bytes();
        // VLEN = 000: use LEN as is
        let [len_high, len_low] = (len & DmaConfig::MAX_LEN).to_be_bytes();
        Self([
            source_high,
            source_low,
            destination_high,
            destination_low,
            len_high,
            len_low,
            dc6(trigger),
            dc7(priority),
        ])
    }

    /// Encodes `config`.
    ///
    /// # Errors
    ///
    /// [`Error::AddressOutOfRange`] if the source buffer lies above 64 KiB.
    pub fn from_config(config: &DmaConfig) -> Result<Self> {
        let source = u16::try_from(config.source().addr()).map_err(|_| Error::AddressOutOfRange)?;
        Ok(Self::new(
            source,
            config.destination().address(),
            config.len(),
            config.trigger(),
            config.priority(),
        ))
    }

    /// Raw bytes.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 8] {
        self.0
    }

    /// `DC6`.
    #[must_use]
    pub const fn dc6(&self) -> u8 {
        self.0[6]
    }

    /// `DC7`.
    #[must_use]
    pub const fn dc7(&self) -> u8 {
        self.0[7]
    }
}
