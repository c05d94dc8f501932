//! Known MIPS SoCs and the IDCODE probe that finds which one is on the other end of the cable.
use core::ops::DerefMut;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::cable::Cable;
use crate::config::SessionConfig;
use crate::ejtag::instr;
use crate::error::{Error, Result};
use crate::statemachine::Tap;

#[derive(Debug, PartialEq, Eq)]
pub struct ProcessorChip {
    /// Full 32-bit IDCODE
    pub id: u32,
    /// Width of the instruction register
    pub instruction_length: u32,
    pub name: &'static str,
}

macro_rules! processor {
    ($id:expr, $len:expr, $name:expr) => {
        ProcessorChip { id: $id, instruction_length: $len, name: $name }
    };
}

pub static PROCESSOR_CHIPS: &[ProcessorChip] = &[
    processor!(0x0471_017F, 5, "Broadcom BCM4702 Rev 1 CPU"),
    processor!(0x1471_217F, 8, "Broadcom BCM4712 Rev 1 CPU"),
    processor!(0x2471_217F, 8, "Broadcom BCM4712 Rev 2 CPU"),
    processor!(0x0535_017F, 8, "Broadcom BCM5350 Rev 1 CPU"),
    processor!(0x0535_217F, 8, "Broadcom BCM5352 Rev 1 CPU"),
    processor!(0x2535_417F, 8, "Broadcom BCM5354 CPU"),
    processor!(0x0536_517F, 8, "Broadcom BCM5365 Rev 1 CPU"),
    processor!(0x0634_817F, 5, "Broadcom BCM6348 Rev 1 CPU"),
    processor!(0x0634_517F, 5, "Broadcom BCM6345 Rev 1 CPU"),
    processor!(0x0000_100F, 5, "TI AR7WRD TNETD7300GDU Rev 1 CPU"),
];

pub fn find(id: u32) -> Option<&'static ProcessorChip> {
    PROCESSOR_CHIPS.iter().find(|chip| chip.id == id)
}

/// Read IDCODE with `length` bit instructions, starting from Test-Logic-Reset.
fn read_idcode<T, U, D>(tap: &mut Tap<T, D>, length: u32) -> Result<u32>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized,
          D: DelayNs
{
    tap.reset()?;
    tap.set_instruction_length(length)?;
    tap.set_instruction(instr::IDCODE)?;
    tap.read_data32()
}

/// Identify the processor.  Every table entry's instruction length is tried in turn (or the
/// configured override, if any) until the IDCODE read back matches that entry.  With
/// `skip_detect` the IDCODE is only reported and the instruction length must be configured.
/// Leaves the TAP set up with the matching instruction length.
pub fn detect<T, U, D>(tap: &mut Tap<T, D>, config: &SessionConfig) -> Result<(u32, Option<&'static ProcessorChip>)>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized,
          D: DelayNs
{
    if config.skip_detect {
        let length = config.instruction_length.ok_or(Error::InvalidInstructionLength(0))?;
        let idcode = read_idcode(tap, length)?;
        info!("CPU detection skipped, IDCODE {:08x}, instruction length {}", idcode, length);
        return Ok((idcode, find(idcode)));
    }

    let mut idcode = 0;
    for chip in PROCESSOR_CHIPS {
        let length = config.instruction_length.unwrap_or(chip.instruction_length);
        idcode = read_idcode(tap, length)?;
        debug!("IR length {}: IDCODE {:08x}", length, idcode);

        if idcode == chip.id {
            info!("Found {} (IDCODE {:08x}, manufacturer {:03x}, part {:04x}, version {:x})",
                  chip.name, idcode, (idcode >> 1) & 0x7FF, (idcode >> 12) & 0xFFFF, idcode >> 28);
            return Ok((idcode, Some(chip)));
        }
    }

    warn!("Unknown processor, last IDCODE {:08x}", idcode);
    Err(Error::ProcessorNotDetected { idcode })
}
