//! Implement the `Cable` trait on top of `embedded-hal` pins, for probes built from a
//! microcontroller or a single-board computer's GPIO header.
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use crate::cable::{Cable, CableError, Wiring};

pub struct Gpio<Clk, Tdi, Tdo, Tms> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin {
    wiring: Wiring,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms,
}

impl<Clk, Tdi, Tdo, Tms> Gpio<Clk, Tdi, Tdo, Tms> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin {
    /// `wiring` must match the `SessionConfig` the TAP driver encodes control bytes with.
    pub fn new(wiring: Wiring, clock: Clk, tdi: Tdi, tdo: Tdo, tms: Tms) -> Gpio<Clk, Tdi, Tdo, Tms> {
        Gpio { wiring, clock, tdi, tdo, tms }
    }

    /// Give the pins back.
    pub fn release(self) -> (Clk, Tdi, Tdo, Tms) {
        (self.clock, self.tdi, self.tdo, self.tms)
    }
}

impl<Clk, Tdi, Tdo, Tms> Cable for Gpio<Clk, Tdi, Tdo, Tms> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin {
    fn write_control(&mut self, data: u8) -> Result<(), CableError> {
        let lines = self.wiring.decode(data);

        // Data lines first so they are stable before a rising clock edge
        self.tms.set_state(PinState::from(lines.tms)).map_err(|_| CableError::Pin("TMS"))?;
        self.tdi.set_state(PinState::from(lines.tdi)).map_err(|_| CableError::Pin("TDI"))?;
        self.clock.set_state(PinState::from(lines.tck)).map_err(|_| CableError::Pin("TCK"))?;
        Ok(())
    }

    fn read_status(&mut self) -> Result<u8, CableError> {
        let tdo = self.tdo.is_high().map_err(|_| CableError::Pin("TDO"))?;
        Ok(self.wiring.status(tdo))
    }
}
