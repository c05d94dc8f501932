//! Processor-access (PrAcc) execution.  On targets without DMA the probe plays memory for the
//! halted core: it serves instruction fetches from one of the small routines below and answers
//! the routine's loads and stores to two mailbox words.
use core::ops::DerefMut;

use embedded_hal::delay::DelayNs;
use log::trace;

use crate::cable::Cable;
use crate::ejtag::{control, instr, AccessKind, Width};
use crate::error::Result;
use crate::statemachine::Tap;

/// Where the core fetches from in debug mode with SETDEV set.
pub const DEBUG_VECTOR: u32 = 0xFF20_0200;
/// Mailbox word the routines load the target address from.
pub const VIRTUAL_ADDRESS: u32 = 0xFF20_0000;
/// Mailbox word the routines exchange data through.
pub const VIRTUAL_DATA: u32 = 0xFF20_0004;

const NOP: u32 = 0x0000_0000;

/// A MIPS routine served at `DEBUG_VECTOR`.  Each one loads the mailbox, performs a single
/// access and branches back to the vector.
#[derive(Debug, PartialEq, Eq)]
pub struct DebugModule {
    pub name: &'static str,
    pub code: &'static [u32],
}

pub static READ_WORD: DebugModule = DebugModule {
    name: "read word",
    code: &[
        0x3C01_FF20,  // lui  $1, 0xFF20
        0x3421_0000,  // ori  $1, 0x0000
        0x8C22_0000,  // lw   $2, 0($1)
        0x8C43_0000,  // lw   $3, 0($2)
        0xAC23_0004,  // sw   $3, 4($1)
        0x0000_0000,  // nop
        0x1000_FFF9,  // beq  $0, $0, start
        0x0000_0000,  // nop
    ],
};

pub static WRITE_WORD: DebugModule = DebugModule {
    name: "write word",
    code: &[
        0x3C01_FF20,  // lui  $1, 0xFF20
        0x3421_0000,  // ori  $1, 0x0000
        0x8C22_0000,  // lw   $2, 0($1)
        0x8C23_0004,  // lw   $3, 4($1)
        0xAC43_0000,  // sw   $3, 0($2)
        0x0000_0000,  // nop
        0x1000_FFF9,  // beq  $0, $0, start
        0x0000_0000,  // nop
    ],
};

pub static READ_HALF: DebugModule = DebugModule {
    name: "read half",
    code: &[
        0x3C01_FF20,  // lui  $1, 0xFF20
        0x3421_0000,  // ori  $1, 0x0000
        0x8C22_0000,  // lw   $2, 0($1)
        0x9443_0000,  // lhu  $3, 0($2)
        0xAC23_0004,  // sw   $3, 4($1)
        0x0000_0000,  // nop
        0x1000_FFF9,  // beq  $0, $0, start
        0x0000_0000,  // nop
    ],
};

pub static WRITE_HALF: DebugModule = DebugModule {
    name: "write half",
    code: &[
        0x3C01_FF20,  // lui  $1, 0xFF20
        0x3421_0000,  // ori  $1, 0x0000
        0x8C22_0000,  // lw   $2, 0($1)
        0x8C23_0004,  // lw   $3, 4($1)
        0xA443_0000,  // sh   $3, 0($2)
        0x0000_0000,  // nop
        0x1000_FFF9,  // beq  $0, $0, start
        0x0000_0000,  // nop
    ],
};

impl DebugModule {
    pub fn for_access(kind: AccessKind, width: Width) -> &'static DebugModule {
        match (kind, width) {
            (AccessKind::Read, Width::Word) => &READ_WORD,
            (AccessKind::Write, Width::Word) => &WRITE_WORD,
            (AccessKind::Read, Width::Halfword) => &READ_HALF,
            (AccessKind::Write, Width::Halfword) => &WRITE_HALF,
        }
    }

    /// Instruction `index` words past the vector; fetches past the end see a nop.
    pub fn fetch(&self, index: usize) -> u32 {
        self.code.get(index).copied().unwrap_or(NOP)
    }
}

/// The two words the probe pretends to hold at `VIRTUAL_ADDRESS` and `VIRTUAL_DATA`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mailbox {
    pub address: u32,
    pub data: u32,
}

impl Mailbox {
    fn load(&self, address: u32) -> u32 {
        match address {
            VIRTUAL_ADDRESS => self.address,
            VIRTUAL_DATA => self.data,
            _ => 0,
        }
    }

    fn store(&mut self, address: u32, data: u32) {
        match address {
            VIRTUAL_ADDRESS => self.address = data,
            VIRTUAL_DATA => self.data = data,
            _ => {}
        }
    }
}

/// Serve the core's accesses until it fetches from the vector a second time, which means
/// `module` ran once all the way through.  The mailbox holds whatever the routine stored.
///
/// There is no way out of the loop short of a cable error: abandoning a routine halfway would
/// leave the core waiting on a pending access.
pub fn execute<T, U, D>(tap: &mut Tap<T, D>, module: &DebugModule, mailbox: &mut Mailbox) -> Result<()>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized,
          D: DelayNs
{
    use control::*;

    let mut vector_fetches = 0;
    loop {
        let ctrl = loop {
            tap.set_instruction(instr::CONTROL)?;
            let ctrl = tap.shift_data32(PRACC | PROBEN | SETDEV)?;
            if ctrl & PRACC != 0 {
                break ctrl;
            }
        };

        tap.set_instruction(instr::ADDRESS)?;
        let address = tap.read_data32()?;

        if ctrl & PRNW != 0 {
            tap.set_instruction(instr::DATA)?;
            let data = tap.read_data32()?;
            tap.set_instruction(instr::CONTROL)?;
            tap.write_data32(PROBEN | SETDEV)?;

            trace!("{}: store {:08x} to {:08x}", module.name, data, address);
            mailbox.store(address, data);
        } else {
            if address == DEBUG_VECTOR {
                vector_fetches += 1;
                if vector_fetches > 1 {
                    trace!("{}: done", module.name);
                    return Ok(());
                }
            }

            let data = if address >= DEBUG_VECTOR {
                module.fetch(((address - DEBUG_VECTOR) / 4) as usize)
            } else {
                mailbox.load(address)
            };
            trace!("{}: load {:08x} from {:08x}", module.name, data, address);

            tap.set_instruction(instr::DATA)?;
            tap.write_data32(data)?;
            tap.set_instruction(instr::CONTROL)?;
            tap.write_data32(PROBEN | SETDEV)?;
        }
    }
}
