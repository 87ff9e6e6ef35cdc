//! Memory-mapped backend: volatile writes of the [`regs`](super::regs) encodings.
//!
//! Register addresses come from the board; the constructors are `unsafe` because
//! nothing here can check them.
#![allow(unsafe_code, reason = "volatile register access")]

use core::ptr;

use crate::carrier::CarrierConfig;
use crate::dma::{Destination, DmaConfig};
use crate::hal::regs::{self, DmaDescriptor};
use crate::hal::{CarrierTimer, DmaChannel};
use crate::timing::Prescale;
use crate::Result;

/// One byte-wide register.
#[derive(Clone, Copy, Debug)]
pub struct Sfr(*mut u8);

impl Sfr {
    /// Register at `address`.
    ///
    /// # Safety
    ///
    /// `address` must point at a byte register, or ordinary memory, that stays valid
    /// and is not accessed by anything else for the lifetime of the handle.
    #[must_use]
    pub const unsafe fn new(address: *mut u8) -> Self {
        Self(address)
    }

    fn read(self) -> u8 {
        // SAFETY: validity is the constructor's contract.
        unsafe { ptr::read_volatile(self.0) }
    }

    fn write(self, value: u8) {
        // SAFETY: validity is the constructor's contract.
        unsafe { ptr::write_volatile(self.0, value) }
    }

    fn modify(self, f: impl FnOnce(u8) -> u8) {
        self.write(f(self.read()));
    }
}

/// Registers behind one timer and its output pin.
#[derive(Clone, Copy, Debug)]
pub struct TimerRegisters {
    /// Timer control (`T3CTL`).
    pub control: Sfr,
    /// Period channel control (`T3CCTL0`).
    pub period_control: Sfr,
    /// Period channel compare (`T3CC0`).
    pub period: Sfr,
    /// Output channel control (`T3CCTL1`).
    pub compare_control: Sfr,
    /// Output channel compare (`T3CC1`).
    pub compare: Sfr,
    /// Port data (`P1`).
    pub port: Sfr,
    /// Port direction (`P1DIR`).
    pub port_direction: Sfr,
    /// Port function select (`P1SEL`).
    pub port_select: Sfr,
    /// Pin number within the port.
    pub pin: u8,
    /// `compare` as the DMA engine addresses it.
    pub compare_target: Destination,
}

/// [`CarrierTimer`] over memory-mapped Timer 3 registers.
#[derive(Debug)]
pub struct MmioTimer {
    regs: TimerRegisters,
}

impl MmioTimer {
    /// Timer 3 output channel 1 on P1.4, as on the reference board.
    ///
    /// # Safety
    ///
    /// Must run on a part with the CC251x SFR map, and nothing else may drive Timer 3
    /// or P1.4.
    #[must_use]
    pub unsafe fn timer3_p1_4() -> Self {
        let sfr = |address: u8| {
            // SAFETY: SFR addresses of this part, per the caller's contract.
            unsafe { Sfr::new(usize::from(regs::xdata_sfr_address(address)) as *mut u8) }
        };
        Self {
            regs: TimerRegisters {
                control: sfr(regs::T3CTL),
                period_control: sfr(regs::T3CCTL0),
                period: sfr(regs::T3CC0),
                compare_control: sfr(regs::T3CCTL1),
                compare: sfr(regs::T3CC1),
                port: sfr(regs::P1),
                port_direction: sfr(regs::P1DIR),
                port_select: sfr(regs::P1SEL),
                pin: 4,
                compare_target: Destination::new(regs::xdata_sfr_address(regs::T3CC1)),
            },
        }
    }

    /// Timer at arbitrary register addresses.
    ///
    /// # Safety
    ///
    /// Every [`Sfr`] in `regs` must satisfy [`Sfr::new`], and `regs.pin < 8`.
    #[must_use]
    pub const unsafe fn new(regs: TimerRegisters) -> Self {
        Self { regs }
    }

    fn pin_mask(&self) -> u8 {
        1 << (self.regs.pin & 0b111)
    }
}

impl CarrierTimer for MmioTimer {
    fn apply(&mut self, config: &CarrierConfig) {
        let mask = self.pin_mask();
        self.regs.port.modify(|value| value & !mask);
        self.regs.port_direction.modify(|value| value | mask);
        self.regs.port_select.modify(|value| value | mask);

        self.regs.control.write(regs::t3ctl(config.prescale, false));
        self.regs.period.write(regs::t3cc0(config));
        self.regs.compare.write(config.initial_compare);
        self.regs.period_control.write(regs::T3CCTL0_ROLLOVER);
        self.regs.compare_control.write(regs::t3cctl1(config.polarity));
    }

    fn run(&mut self, prescale: Prescale) {
        self.regs.control.write(regs::t3ctl(prescale, true));
    }

    fn halt(&mut self) {
        let mask = self.pin_mask();
        self.regs.control.modify(|value| value & !regs::T3CTL_START);
        self.regs.port_select.modify(|value| value & !mask);
        self.regs.port.modify(|value| value & !mask);
    }

    fn write_compare(&mut self, code: u8) {
        self.regs.compare.write(code);
    }

    fn compare_target(&self) -> Destination {
        self.regs.compare_target
    }
}

/// [`DmaChannel`] over a descriptor in memory and the `DMAARM` register.
///
/// Board init points the engine's configuration address at `descriptor`.
#[derive(Debug)]
pub struct MmioDma {
    descriptor: *mut [u8; 8],
    arm: Sfr,
    channel: u8,
}

impl MmioDma {
    /// Channel `channel` with its descriptor at `descriptor`.
    ///
    /// # Safety
    ///
    /// `descriptor` must be valid for writes for the lifetime of the handle, `arm`
    /// must satisfy [`Sfr::new`], and no one else may arm `channel`.
    #[must_use]
    pub const unsafe fn new(descriptor: *mut [u8; 8], arm: Sfr, channel: u8) -> Self {
        Self {
            descriptor,
            arm,
            channel,
        }
    }
}

impl DmaChannel for MmioDma {
    fn configure(&mut self, config: &DmaConfig) -> Result<()> {
        let descriptor = DmaDescriptor::from_config(config)?;
        // SAFETY: validity is the constructor's contract.
        unsafe { ptr::write_volatile(self.descriptor, descriptor.bytes()) };
        Ok(())
    }

    fn arm(&mut self) {
        let mask = regs::dmaarm_mask(self.channel);
        self.arm.modify(|value| value | mask);
    }

    fn is_armed(&self) -> bool {
        self.arm.read() & regs::dmaarm_mask(self.channel) != 0
    }

    fn disarm(&mut self) {
        self.arm.write(regs::DMAARM_ABORT | regs::dmaarm_mask(self.channel));
    }
}

#[cfg(test)]
mod tests {
    use super::{MmioDma, MmioTimer, Sfr, TimerRegisters};
    use crate::Error;
    use crate::carrier::{CarrierConfig, OutputPolarity};
    use crate::dma::{Destination, DmaConfig, Priority};
    use crate::hal::{CarrierTimer, DmaChannel};
    use crate::hal::regs::DmaDescriptor;
    use crate::timing::{Prescale, TimingProfile};

    const CONTROL: usize = 0;
    const PERIOD_CONTROL: usize = 1;
    const PERIOD: usize = 2;
    const COMPARE_CONTROL: usize = 3;
    const COMPARE: usize = 4;
    const PORT: usize = 5;
    const PORT_DIRECTION: usize = 6;
    const PORT_SELECT: usize = 7;

    fn timer_over(memory: &mut [u8; 8]) -> MmioTimer {
        let base = memory.as_mut_ptr();
        // SAFETY: `memory` outlives the timer in every test.
        unsafe {
            let sfr = |offset: usize| Sfr::new(base.add(offset));
            MmioTimer::new(TimerRegisters {
                control: sfr(CONTROL),
                period_control: sfr(PERIOD_CONTROL),
                period: sfr(PERIOD),
                compare_control: sfr(COMPARE_CONTROL),
                compare: sfr(COMPARE),
                port: sfr(PORT),
                port_direction: sfr(PORT_DIRECTION),
                port_select: sfr(PORT_SELECT),
                pin: 4,
                compare_target: Destination::new(0xDFCF),
            })
        }
    }

    #[test]
    fn apply_writes_the_firmware_register_values() {
        let mut memory = [0xFF_u8; 8];
        memory[PORT_DIRECTION] = 0;
        memory[PORT_SELECT] = 0;
        let mut timer = timer_over(&mut memory);
        timer.apply(&CarrierConfig::from_profile(&TimingProfile::FULL_SPEED));
        timer.run(Prescale::Div1);
        drop(timer);
        assert_eq!(memory[CONTROL], 0b0001_0010);
        assert_eq!(memory[PERIOD], 29);
        assert_eq!(memory[COMPARE], 0);
        assert_eq!(memory[PERIOD_CONTROL], 0b0000_0100);
        assert_eq!(memory[COMPARE_CONTROL], 0b0010_0100);
        assert_eq!(memory[PORT], 0b1110_1111);
        assert_eq!(memory[PORT_DIRECTION], 0b0001_0000);
        assert_eq!(memory[PORT_SELECT], 0b0001_0000);
    }

    #[test]
    fn halt_releases_the_pin_low() {
        let mut memory = [0_u8; 8];
        let mut timer = timer_over(&mut memory);
        timer.apply(
            &CarrierConfig::from_profile(&TimingProfile::HALF_SPEED)
                .with_polarity(OutputPolarity::Inverted),
        );
        timer.run(Prescale::Div2);
        timer.halt();
        drop(timer);
        assert_eq!(memory[CONTROL], 0b0010_0010);
        assert_eq!(memory[COMPARE_CONTROL], 0b0001_1100);
        assert_eq!(memory[PORT_SELECT], 0);
        assert_eq!(memory[PORT], 0);
    }

    #[test]
    fn dma_arms_and_aborts_its_own_bit() {
        let mut descriptor = [0_u8; 8];
        let mut arm = 0b0000_0001_u8;
        // SAFETY: both locals outlive the channel.
        let mut channel = unsafe { MmioDma::new(&raw mut descriptor, Sfr::new(&raw mut arm), 2) };
        assert!(!channel.is_armed());
        channel.arm();
        assert!(channel.is_armed());
        channel.disarm();
        drop(channel);
        assert_eq!(arm, 0b1000_0100);
    }

    #[test]
    fn host_buffers_are_out_of_dma_reach() {
        // Hosts never map the first 64 KiB, so any static lies past the 16-bit window.
        static SOURCE: [u8; 410] = [10; 410];
        let mut descriptor = [0_u8; 8];
        let mut arm = 0_u8;
        // SAFETY: both locals outlive the channel.
        let mut channel = unsafe { MmioDma::new(&raw mut descriptor, Sfr::new(&raw mut arm), 2) };
        assert!(SOURCE.as_ptr().addr() > usize::from(u16::MAX));
        let config = DmaConfig::new(&SOURCE, Destination::new(0xDFCF), Priority::High)
            .expect("valid length");
        assert_eq!(DmaDescriptor::from_config(&config), Err(Error::AddressOutOfRange));
        assert_eq!(channel.configure(&config), Err(Error::AddressOutOfRange));
        assert_eq!(descriptor, [0; 8]);
    }
}
