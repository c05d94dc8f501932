//! This provides a higher-level interface than the `Cable` trait.  Specifically, it clocks the
//! JTAG signals one TCK period at a time, keeps track of the state of the TAP controller, and
//! shifts the instruction and 32-bit data registers of the single EJTAG TAP on the chain.
//! `Tap` moves between states by the shortest TMS path, based on the current state.
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::ops::DerefMut;

use embedded_hal::delay::DelayNs;
use log::trace;

use crate::cable::{Cable, Lines, Wiring};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

impl JtagState {
    /// The state entered on the next rising TCK edge with TMS at `tms`.
    pub fn next(self, tms: bool) -> JtagState {
        use JtagState::*;
        match (self, tms) {
            (Reset, false) => Idle,
            (Reset, true) => Reset,
            (Idle, false) => Idle,
            (Idle, true) => SelectDR,
            (SelectDR, false) => CaptureDR,
            (SelectDR, true) => SelectIR,
            (CaptureDR, false) | (ShiftDR, false) | (Exit2DR, false) => ShiftDR,
            (CaptureDR, true) | (ShiftDR, true) => Exit1DR,
            (Exit1DR, false) | (PauseDR, false) => PauseDR,
            (Exit1DR, true) | (Exit2DR, true) => UpdateDR,
            (PauseDR, true) => Exit2DR,
            (UpdateDR, false) | (UpdateIR, false) => Idle,
            (UpdateDR, true) | (UpdateIR, true) => SelectDR,
            (SelectIR, false) => CaptureIR,
            (SelectIR, true) => Reset,
            (CaptureIR, false) | (ShiftIR, false) | (Exit2IR, false) => ShiftIR,
            (CaptureIR, true) | (ShiftIR, true) => Exit1IR,
            (Exit1IR, false) | (PauseIR, false) => PauseIR,
            (Exit1IR, true) | (Exit2IR, true) => UpdateIR,
            (PauseIR, true) => Exit2IR,
        }
    }
}

/// Shortest TMS sequence leading from `from` to `to`.
fn path(from: JtagState, to: JtagState) -> Vec<bool> {
    let mut prev: [Option<(JtagState, bool)>; 16] = [None; 16];
    let mut seen = [false; 16];
    let mut queue = VecDeque::new();

    seen[from as usize] = true;
    queue.push_back(from);
    while let Some(state) = queue.pop_front() {
        if state == to {
            break;
        }
        for tms in [false, true] {
            let next = state.next(tms);
            if !seen[next as usize] {
                seen[next as usize] = true;
                prev[next as usize] = Some((state, tms));
                queue.push_back(next);
            }
        }
    }

    let mut tms_path = Vec::new();
    let mut state = to;
    while let Some((before, tms)) = prev[state as usize] {
        tms_path.push(tms);
        state = before;
    }
    tms_path.reverse();
    tms_path
}

pub struct Tap<T, D> {
    pub cable: T,
    delay: D,
    wiring: Wiring,
    tck_delay_us: u32,
    instruction_length: u32,
    instruction: Option<u32>,
    state: JtagState,
    clocks: u64,
}

impl<T, U, D> Tap<T, D>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized,
          D: DelayNs
{
    /// Create a TAP driver using an existing `Cable` and reset the TAP.  The instruction length
    /// starts out unset; call `set_instruction_length` before shifting instructions.
    pub fn new(cable: T, delay: D, wiring: Wiring) -> Result<Self> {
        let mut tap = Self {
            cable,
            delay,
            wiring,
            tck_delay_us: 0,
            instruction_length: 0,
            instruction: None,
            state: JtagState::Reset,
            clocks: 0,
        };
        tap.reset()?;
        Ok(tap)
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Number of TCK pulses issued so far.
    pub fn clocks(&self) -> u64 {
        self.clocks
    }

    pub fn instruction_length(&self) -> u32 {
        self.instruction_length
    }

    pub fn set_instruction_length(&mut self, length: u32) -> Result<()> {
        if !(1..=32).contains(&length) {
            return Err(Error::InvalidInstructionLength(length));
        }
        if length != self.instruction_length {
            self.instruction = None;
        }
        self.instruction_length = length;
        Ok(())
    }

    pub fn set_tck_delay(&mut self, us: u32) {
        self.tck_delay_us = us;
    }

    pub fn delay(&mut self) -> &mut D {
        &mut self.delay
    }

    /// Release the cable and delay provider.
    pub fn into_parts(self) -> (T, D) {
        (self.cable, self.delay)
    }

    fn tck_delay(&mut self) {
        if self.tck_delay_us != 0 {
            self.delay.delay_us(self.tck_delay_us);
        }
    }

    /// One TCK period: set TMS/TDI with the clock low, then raise the clock.
    pub fn clock(&mut self, tms: bool, tdi: bool) -> Result<()> {
        let mut lines = Lines { tck: false, tms, tdi, trst_n: true };
        self.cable.write_control(self.wiring.encode(lines))?;
        self.tck_delay();

        lines.tck = true;
        self.cable.write_control(self.wiring.encode(lines))?;
        self.tck_delay();

        self.state = self.state.next(tms);
        self.clocks += 1;
        Ok(())
    }

    /// Like `clock`, then sample TDO.
    pub fn clock_tdo(&mut self, tms: bool, tdi: bool) -> Result<bool> {
        self.clock(tms, tdi)?;
        let status = self.cable.read_status()?;
        Ok(self.wiring.tdo(status))
    }

    /// Drive TMS high for 5 clocks, then enter Run-Test/Idle.  Works from any state.
    pub fn reset(&mut self) -> Result<()> {
        for _ in 0..5 {
            self.clock(true, false)?;
        }
        self.clock(false, false)?;
        // Test-Logic-Reset loaded the IR behind our back
        self.instruction = None;
        Ok(())
    }

    /// Use TMS to get into `state` by the most efficient path
    pub fn change_mode(&mut self, state: JtagState) -> Result<()> {
        if self.state == state {
            return Ok(());
        }
        for tms in path(self.state, state) {
            self.clock(tms, false)?;
        }
        Ok(())
    }

    /// Shift `instr` into the instruction register, unless the last shift already left it there.
    pub fn set_instruction(&mut self, instr: u32) -> Result<()> {
        if self.instruction == Some(instr) {
            return Ok(());
        }
        let length = self.instruction_length;
        if !(1..=32).contains(&length) {
            return Err(Error::InvalidInstructionLength(length));
        }

        self.change_mode(JtagState::ShiftIR)?;
        for i in 0..length {
            self.clock(i == length - 1, (instr >> i) & 1 != 0)?;
        }
        self.change_mode(JtagState::Idle)?;

        self.instruction = Some(instr);
        Ok(())
    }

    /// Shift `value` through the selected 32-bit data register, LSB first, returning the bits
    /// that were captured into it.
    pub fn shift_data32(&mut self, value: u32) -> Result<u32> {
        self.change_mode(JtagState::ShiftDR)?;
        let mut captured = 0;
        for i in 0..32 {
            let bit = self.clock_tdo(i == 31, (value >> i) & 1 != 0)?;
            captured |= (bit as u32) << i;
        }
        self.change_mode(JtagState::Idle)?;

        trace!("DR {:08x} -> {:08x}", value, captured);
        Ok(captured)
    }

    pub fn read_data32(&mut self) -> Result<u32> {
        self.shift_data32(0)
    }

    /// Same as `shift_data32` without sampling TDO.
    pub fn write_data32(&mut self, value: u32) -> Result<()> {
        self.change_mode(JtagState::ShiftDR)?;
        for i in 0..32 {
            self.clock(i == 31, (value >> i) & 1 != 0)?;
        }
        self.change_mode(JtagState::Idle)?;

        trace!("DR {:08x} ->", value);
        Ok(())
    }
}
