//! A simulated EJTAG target on the far end of a Wiggler cable: TAP controller, EJTAG registers
//! with DMA, a MIPS core small enough to run the PrAcc routines, and a bus with a NOR flash
//! chip and RAM behind it.
#![allow(dead_code)]

use std::collections::HashMap;

use embedded_hal::delay::DelayNs;
use ejtag_debrick::cable::{Cable, CableError, Wiring};
use ejtag_debrick::ejtag::{control::*, instr};
use ejtag_debrick::flash::chips::FlashChip;
use ejtag_debrick::pracc::DEBUG_VECTOR;
use ejtag_debrick::statemachine::JtagState;

pub const BCM4712_IDCODE: u32 = 0x1471_217F;
/// EJTAG 2.5 with DMA
pub const IMPCODE_DMA: u32 = 0x2000_0000;
/// EJTAG 2.5 without DMA
pub const IMPCODE_NO_DMA: u32 = 0x2000_4000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

fn phys(address: u32) -> u32 {
    address & 0x1FFF_FFFF
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Amd,
    Sst,
    Intel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Read,
    Unlock1,
    Unlock2,
    Autoselect,
    Program,
    EraseSetup,
    EraseUnlock1,
    EraseUnlock2,
    Status,
    IntelProgram,
    IntelErase,
    IntelLock,
}

/// A x16 NOR flash chip.  Offsets are bytes from the start of the chip.
pub struct SimFlash {
    pub base: u32,
    pub dialect: Dialect,
    pub vendor: u16,
    pub device: u16,
    /// Reported at word 0x0F in autoselect mode
    pub extended_device: u16,
    blocks: Vec<(u32, u32)>,
    cells: Vec<u16>,
    mode: Mode,
    /// Start offset of every block erased, in order
    pub erased: Vec<u32>,
}

impl SimFlash {
    /// A chip shaped like `chip`, mapped at physical `base` and filled with `fill`.
    pub fn new(base: u32, chip: &FlashChip, dialect: Dialect, fill: u16) -> Self {
        let mut blocks = Vec::new();
        let mut offset = 0;
        for region in chip.regions {
            for _ in 0..region.count {
                blocks.push((offset, region.size));
                offset += region.size;
            }
        }

        Self {
            base,
            dialect,
            vendor: chip.vendor,
            device: chip.device,
            extended_device: 0,
            blocks,
            cells: vec![fill; (chip.size / 2) as usize],
            mode: Mode::Read,
            erased: Vec::new(),
        }
    }

    fn contains(&self, address: u32) -> bool {
        address >= self.base && ((address - self.base) as usize) < self.cells.len() * 2
    }

    pub fn half(&self, offset: u32) -> u16 {
        self.cells[(offset / 2) as usize]
    }

    pub fn word(&self, offset: u32) -> u32 {
        self.half(offset) as u32 | (self.half(offset + 2) as u32) << 16
    }

    pub fn set_word(&mut self, offset: u32, word: u32) {
        self.cells[(offset / 2) as usize] = word as u16;
        self.cells[(offset / 2 + 1) as usize] = (word >> 16) as u16;
    }

    fn unlock_words(&self) -> (u32, u32) {
        match self.dialect {
            Dialect::Sst => (0x5555, 0x2AAA),
            _ => (0x555, 0x2AA),
        }
    }

    fn erase(&mut self, offset: u32) {
        let &(start, size) = self.blocks.iter()
            .find(|&&(start, size)| offset >= start && offset < start + size)
            .expect("erase outside the chip");
        for cell in &mut self.cells[(start / 2) as usize..((start + size) / 2) as usize] {
            *cell = 0xFFFF;
        }
        self.erased.push(start);
    }

    fn program(&mut self, offset: u32, value: u16) {
        self.cells[(offset / 2) as usize] &= value;
    }

    fn read(&self, offset: u32) -> u16 {
        match self.mode {
            Mode::Autoselect => match offset / 2 {
                0 => self.vendor,
                1 => self.device,
                0x0F => self.extended_device,
                _ => 0,
            },
            Mode::Status => 0x0080,
            _ => self.half(offset),
        }
    }

    fn write(&mut self, offset: u32, value: u16) {
        let cmd = value & 0xFF;
        let word = offset / 2;
        let (u1, u2) = self.unlock_words();

        self.mode = match self.dialect {
            Dialect::Amd | Dialect::Sst => match (self.mode, cmd) {
                (Mode::Program, _) => {
                    self.program(offset, value);
                    Mode::Read
                }
                (_, 0xF0) => Mode::Read,
                (Mode::Read | Mode::Autoselect, 0xAA) if word == u1 => Mode::Unlock1,
                (Mode::Unlock1, 0x55) if word == u2 => Mode::Unlock2,
                (Mode::Unlock2, 0x90) if word == u1 => Mode::Autoselect,
                (Mode::Unlock2, 0xA0) if word == u1 => Mode::Program,
                (Mode::Unlock2, 0x80) if word == u1 => Mode::EraseSetup,
                (Mode::EraseSetup, 0xAA) if word == u1 => Mode::EraseUnlock1,
                (Mode::EraseUnlock1, 0x55) if word == u2 => Mode::EraseUnlock2,
                (Mode::EraseUnlock2, 0x30) if self.dialect == Dialect::Amd => {
                    self.erase(offset);
                    Mode::Read
                }
                (Mode::EraseUnlock2, 0x50) if self.dialect == Dialect::Sst => {
                    self.erase(offset);
                    Mode::Read
                }
                _ => Mode::Read,
            },
            Dialect::Intel => match (self.mode, cmd) {
                (Mode::IntelProgram, _) => {
                    self.program(offset, value);
                    Mode::Status
                }
                (Mode::IntelErase, 0xD0) => {
                    self.erase(offset);
                    Mode::Status
                }
                (Mode::IntelLock, 0xD0) => Mode::Status,
                (_, 0xFF) => Mode::Read,
                (_, 0x90) => Mode::Autoselect,
                (_, 0x70) => Mode::Status,
                (_, 0x60) => Mode::IntelLock,
                (_, 0x20) => Mode::IntelErase,
                (_, 0x40) => Mode::IntelProgram,
                (mode, _) => mode,
            },
        };
    }
}

/// Physical address space: one flash chip, RAM everywhere else.
pub struct Bus {
    pub flash: SimFlash,
    pub ram: HashMap<u32, u16>,
    /// Half-word stores that reached the bus
    pub writes: usize,
}

impl Bus {
    pub fn read_half(&mut self, address: u32) -> u16 {
        let address = phys(address) & !1;
        if self.flash.contains(address) {
            self.flash.read(address - self.flash.base)
        } else {
            self.ram.get(&address).copied().unwrap_or(0)
        }
    }

    pub fn write_half(&mut self, address: u32, value: u16) {
        self.writes += 1;
        let address = phys(address) & !1;
        if self.flash.contains(address) {
            let base = self.flash.base;
            self.flash.write(address - base, value);
        } else {
            self.ram.insert(address, value);
        }
    }

    pub fn read_word(&mut self, address: u32) -> u32 {
        let address = address & !3;
        self.read_half(address) as u32 | (self.read_half(address + 2) as u32) << 16
    }

    pub fn write_word(&mut self, address: u32, value: u32) {
        let address = address & !3;
        self.write_half(address, value as u16);
        self.write_half(address + 2, (value >> 16) as u16);
    }
}

/// An access the core is waiting on the probe for.
#[derive(Clone, Copy, Debug)]
enum Pending {
    Fetch(u32),
    Load { address: u32, rt: usize, half: bool },
    Store { address: u32, value: u32 },
}

#[derive(Default)]
struct Cpu {
    regs: [u32; 32],
    pc: u32,
    next_pc: u32,
    pending: Option<Pending>,
}

fn in_dmseg(address: u32) -> bool {
    (0xFF20_0000..0xFF40_0000).contains(&address)
}

pub struct SimTarget {
    pub bus: Bus,
    pub idcode: u32,
    pub impcode: u32,
    ir_length: u32,
    state: JtagState,
    tck: bool,
    tdo: bool,
    ir: u32,
    ir_shift: u32,
    dr_shift: u32,
    address: u32,
    data: u32,
    /// Every DMA transfer reports DERR
    pub fail_dma: bool,
    /// CONTROL reads that show DSTRT after each DMA start
    pub busy_polls: u32,
    busy: u32,
    derr: bool,
    pub dma_starts: usize,
    pub halted: bool,
    pub processor_resets: usize,
    cpu: Cpu,
}

impl SimTarget {
    pub fn new(flash: SimFlash, impcode: u32) -> Self {
        Self {
            bus: Bus { flash, ram: HashMap::new(), writes: 0 },
            idcode: BCM4712_IDCODE,
            impcode,
            ir_length: 8,
            state: JtagState::Reset,
            tck: false,
            tdo: false,
            ir: instr::IDCODE,
            ir_shift: 0,
            dr_shift: 0,
            address: 0,
            data: 0,
            fail_dma: false,
            busy_polls: 0,
            busy: 0,
            derr: false,
            dma_starts: 0,
            halted: false,
            processor_resets: 0,
            cpu: Cpu::default(),
        }
    }

    pub fn with_ir_length(mut self, ir_length: u32) -> Self {
        self.ir_length = ir_length;
        self
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    fn rising_edge(&mut self, tms: bool, tdi: bool) {
        match self.state {
            JtagState::Reset => self.ir = instr::IDCODE,
            JtagState::CaptureIR => self.ir_shift = 0b01,
            JtagState::ShiftIR => {
                self.tdo = self.ir_shift & 1 != 0;
                self.ir_shift = (self.ir_shift >> 1) | (tdi as u32) << (self.ir_length - 1);
            }
            JtagState::UpdateIR => self.ir = self.ir_shift,
            JtagState::CaptureDR => self.dr_shift = self.capture(),
            JtagState::ShiftDR => {
                self.tdo = self.dr_shift & 1 != 0;
                self.dr_shift = (self.dr_shift >> 1) | (tdi as u32) << 31;
            }
            JtagState::UpdateDR => self.update(self.dr_shift),
            _ => {}
        }
        self.state = self.state.next(tms);
    }

    fn capture(&mut self) -> u32 {
        match self.ir {
            instr::IDCODE => self.idcode,
            instr::IMPCODE => self.impcode,
            // While the core waits on an access, ADDRESS and DATA show it
            instr::ADDRESS => match self.cpu.pending {
                Some(Pending::Fetch(address) | Pending::Load { address, .. } | Pending::Store { address, .. }) => address,
                None => self.address,
            },
            instr::DATA => match self.cpu.pending {
                Some(Pending::Store { value, .. }) => value,
                _ => self.data,
            },
            instr::CONTROL => self.control_status(),
            _ => 0,
        }
    }

    fn update(&mut self, value: u32) {
        match self.ir {
            instr::ADDRESS => self.address = value,
            instr::DATA => self.data = value,
            instr::CONTROL => self.write_control(value),
            _ => {}
        }
    }

    fn control_status(&mut self) -> u32 {
        let mut status = 0;
        match self.cpu.pending {
            Some(Pending::Store { .. }) => status |= PRACC | PRNW,
            Some(_) => status |= PRACC,
            None => {}
        }
        if self.busy > 0 {
            self.busy -= 1;
            status |= DSTRT;
        }
        if self.derr {
            status |= DERR;
        }
        if self.halted {
            status |= BRKST;
        }
        status
    }

    fn write_control(&mut self, value: u32) {
        if value & PRRST != 0 {
            self.processor_resets += 1;
        }
        if value & DMAACC != 0 && value & DSTRT != 0 {
            self.dma(value);
        }
        if value & JTAGBRK != 0 && !self.halted {
            self.halted = true;
            self.cpu.pc = DEBUG_VECTOR;
            self.cpu.next_pc = DEBUG_VECTOR + 4;
            self.set_pending(Pending::Fetch(DEBUG_VECTOR));
        }
        // Writing PrAcc as zero completes the pending access
        if value & (PRACC | DMAACC) == 0 {
            if let Some(pending) = self.cpu.pending.take() {
                self.complete(pending);
            }
        }
    }

    fn dma(&mut self, control: u32) {
        self.dma_starts += 1;
        self.busy = self.busy_polls;
        self.derr = self.fail_dma;
        if self.fail_dma {
            return;
        }

        let halfword = control & DMA_TRIPLEBYTE == DMA_HALFWORD;
        let upper = self.address & 2 != 0;
        if control & DRWN != 0 {
            self.data = if halfword {
                // The other lane carries junk
                let half = self.bus.read_half(self.address) as u32;
                if upper { half << 16 | 0xA5A5 } else { 0xA5A5_0000 | half }
            } else {
                self.bus.read_word(self.address)
            };
        } else if halfword {
            let half = if upper { self.data >> 16 } else { self.data & 0xFFFF };
            self.bus.write_half(self.address, half as u16);
        } else {
            self.bus.write_word(self.address, self.data);
        }
    }

    fn set_pending(&mut self, pending: Pending) {
        match pending {
            Pending::Fetch(address) | Pending::Load { address, .. } => self.address = address,
            Pending::Store { address, value } => {
                self.address = address;
                self.data = value;
            }
        }
        self.cpu.pending = Some(pending);
    }

    fn complete(&mut self, pending: Pending) {
        match pending {
            Pending::Fetch(at) => {
                let instruction = self.data;
                self.execute(at, instruction);
            }
            Pending::Load { rt, half, .. } => {
                let value = if half { self.data & 0xFFFF } else { self.data };
                self.set_reg(rt, value);
                self.set_pending(Pending::Fetch(self.cpu.pc));
            }
            Pending::Store { .. } => self.set_pending(Pending::Fetch(self.cpu.pc)),
        }
    }

    fn set_reg(&mut self, reg: usize, value: u32) {
        if reg != 0 {
            self.cpu.regs[reg] = value;
        }
    }

    fn execute(&mut self, at: u32, instruction: u32) {
        let op = instruction >> 26;
        let rs = ((instruction >> 21) & 31) as usize;
        let rt = ((instruction >> 16) & 31) as usize;
        let imm = instruction & 0xFFFF;
        let offset = imm as u16 as i16 as i32 as u32;
        let base = self.cpu.regs[rs];

        self.cpu.pc = self.cpu.next_pc;
        self.cpu.next_pc = self.cpu.next_pc.wrapping_add(4);

        match op {
            0x00 if instruction == 0 => {}
            0x0F => self.set_reg(rt, imm << 16),
            0x0D => self.set_reg(rt, base | imm),
            0x04 => {
                if base == self.cpu.regs[rt] {
                    self.cpu.next_pc = at.wrapping_add(4).wrapping_add(offset << 2);
                }
            }
            0x23 | 0x25 => {
                let address = base.wrapping_add(offset);
                let half = op == 0x25;
                if in_dmseg(address) {
                    self.set_pending(Pending::Load { address, rt, half });
                    return;
                }
                let value = if half { self.bus.read_half(address) as u32 } else { self.bus.read_word(address) };
                self.set_reg(rt, value);
            }
            0x2B | 0x29 => {
                let address = base.wrapping_add(offset);
                let value = self.cpu.regs[rt];
                if in_dmseg(address) {
                    self.set_pending(Pending::Store { address, value });
                    return;
                }
                if op == 0x29 {
                    self.bus.write_half(address, value as u16);
                } else {
                    self.bus.write_word(address, value);
                }
            }
            _ => panic!("unsupported instruction {:08x} at {:08x}", instruction, at),
        }
        self.set_pending(Pending::Fetch(self.cpu.pc));
    }
}

impl Cable for SimTarget {
    fn write_control(&mut self, data: u8) -> Result<(), CableError> {
        let lines = Wiring::Wiggler.decode(data);
        if lines.tck && !self.tck {
            self.rising_edge(lines.tms, lines.tdi);
        }
        self.tck = lines.tck;
        Ok(())
    }

    fn read_status(&mut self) -> Result<u8, CableError> {
        Ok(Wiring::Wiggler.status(self.tdo))
    }
}
