//! Implementations for different JTAG hardware adapters live here.  Hardware adapters should
//! implement the `Cable` trait.
//!
//! A cable is deliberately dumb: it can latch one byte onto its control lines and read one byte
//! back from its status lines, exactly like the data and status registers of a PC parallel port.
//! Which bits of those bytes carry TCK, TMS, TDI and TDO is described by a `Wiring`.
#[cfg(feature = "std")]
use core::time::Duration;

#[cfg(feature = "std")]
use embedded_hal::delay::DelayNs;
use thiserror::Error;

pub mod gpio;
#[cfg(feature = "ft232r")]
pub mod ft232r;

#[derive(Debug, Error)]
pub enum CableError {
    #[error("failed to drive the {0} line")]
    Pin(&'static str),

    #[cfg(feature = "ft232r")]
    #[error("FTDI driver error: {0:?}")]
    Ftdi(libftd2xx::FtStatus),
}

pub trait Cable {
    /// Latch `data` onto the control lines.
    fn write_control(&mut self, data: u8) -> Result<(), CableError>;
    /// Sample the status lines.
    fn read_status(&mut self) -> Result<u8, CableError>;
}

/// Signal levels carried by one control byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lines {
    pub tck: bool,
    pub tms: bool,
    pub tdi: bool,
    /// Active-low test reset.  Always released by the TAP driver.
    pub trst_n: bool,
}

/// Pin assignment of the cable on the parallel port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Wiring {
    /// Wiggler style: TDI=D3, TCK=D2, TMS=D1, nTRST=D4, TDO=BUSY (inverted by the port).
    #[default]
    Wiggler,
    /// Xilinx DLC5 style: TDI=D0, TCK=D1, TMS=D2, TDO=SELECT.
    Xilinx,
}

impl Wiring {
    const fn tdi_bit(self) -> u8 {
        match self {
            Wiring::Wiggler => 3,
            Wiring::Xilinx => 0,
        }
    }

    const fn tck_bit(self) -> u8 {
        match self {
            Wiring::Wiggler => 2,
            Wiring::Xilinx => 1,
        }
    }

    const fn tms_bit(self) -> u8 {
        match self {
            Wiring::Wiggler => 1,
            Wiring::Xilinx => 2,
        }
    }

    const fn trst_bit(self) -> Option<u8> {
        match self {
            Wiring::Wiggler => Some(4),
            Wiring::Xilinx => None,
        }
    }

    const fn tdo_bit(self) -> u8 {
        match self {
            Wiring::Wiggler => 7,
            Wiring::Xilinx => 4,
        }
    }

    const fn tdo_inverted(self) -> bool {
        matches!(self, Wiring::Wiggler)
    }

    /// Build the control byte for one half of a clock cycle.  nTRST, where wired, is held high.
    pub fn encode(self, lines: Lines) -> u8 {
        let mut data = (lines.tck as u8) << self.tck_bit()
            | (lines.tms as u8) << self.tms_bit()
            | (lines.tdi as u8) << self.tdi_bit();
        if let Some(bit) = self.trst_bit() {
            data |= (lines.trst_n as u8) << bit;
        }
        data
    }

    /// Inverse of `encode`, for cables that drive individual pins.
    pub fn decode(self, data: u8) -> Lines {
        Lines {
            tck: data & (1 << self.tck_bit()) != 0,
            tms: data & (1 << self.tms_bit()) != 0,
            tdi: data & (1 << self.tdi_bit()) != 0,
            trst_n: match self.trst_bit() {
                Some(bit) => data & (1 << bit) != 0,
                None => true,
            },
        }
    }

    /// Extract TDO from a status byte.
    pub fn tdo(self, status: u8) -> bool {
        let bit = status & (1 << self.tdo_bit()) != 0;
        bit ^ self.tdo_inverted()
    }

    /// Build the status byte a port would present for the given TDO level.
    pub fn status(self, tdo: bool) -> u8 {
        ((tdo ^ self.tdo_inverted()) as u8) << self.tdo_bit()
    }
}

impl core::fmt::Display for Wiring {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Wiring::Wiggler => f.write_str("wiggler"),
            Wiring::Xilinx => f.write_str("xilinx"),
        }
    }
}

/// `DelayNs` backed by `std::thread::sleep`.
#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug, Default)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns.into()));
    }
}
