//! Implement the `Cable` trait for FTDI FT232R-based adapters running in synchronous bit-bang
//! mode.  Each control byte becomes one bit-bang write; the chip samples its pins on every
//! write, which is how status reads are answered.
use libftd2xx::{BitMode, Ftdi, FtdiCommon, FtStatus};

use crate::cable::{Cable, CableError, Wiring};

impl From<FtStatus> for CableError {
    fn from(status: FtStatus) -> Self {
        CableError::Ftdi(status)
    }
}

pub struct Ft232r {
    ft: Ftdi,
    wiring: Wiring,
    tdi: u8,
    tdo: u8,
    tms: u8,
    clk: u8,
    output: u8,
}

impl Ft232r {
    /// Open the adapter whose USB description is `description`.  `tdi`, `tdo`, `tms` and `clk`
    /// are the bit-bang pin numbers (0..=7) of each signal; `wiring` must match the one the TAP
    /// driver encodes control bytes with.
    pub fn new(description: &str, baud: u32, wiring: Wiring, tdi: u8, tdo: u8, tms: u8, clk: u8) -> Result<Self, CableError> {
        let mut ft = Ftdi::with_description(description)?;
        ft.set_baud_rate(baud)?;
        ft.set_bit_mode(1 << tdi | 1 << tms | 1 << clk, BitMode::SyncBitbang)?;
        ft.purge_all()?;

        Ok(Self {
            ft,
            wiring,
            tdi,
            tdo,
            tms,
            clk,
            output: 0,
        })
    }

    /// Write one pin pattern and return the pins sampled alongside it.
    fn exchange(&mut self, pins: u8) -> Result<u8, CableError> {
        self.ft.write(&[pins])?;
        let mut recv = [0u8; 1];
        self.ft.read(&mut recv)?;
        Ok(recv[0])
    }
}

impl Cable for Ft232r {
    fn write_control(&mut self, data: u8) -> Result<(), CableError> {
        let lines = self.wiring.decode(data);
        self.output = (lines.tdi as u8) << self.tdi
            | (lines.tms as u8) << self.tms
            | (lines.tck as u8) << self.clk;
        let pins = self.output;
        self.exchange(pins)?;
        Ok(())
    }

    fn read_status(&mut self) -> Result<u8, CableError> {
        // Re-send the current pattern; the sample taken with it is the live pin state
        let pins = self.output;
        let sample = self.exchange(pins)?;
        Ok(self.wiring.status(sample & (1 << self.tdo) != 0))
    }
}
