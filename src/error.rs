//! Error type shared by every layer of the crate.
use alloc::string::String;

use thiserror::Error;

use crate::cable::CableError;
use crate::flash::layout::Area;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cable(#[from] CableError),

    /// The EJTAG error bit was still set after every retry.
    #[error("EJTAG transaction at {address:#010x} corrupted (last data {data:#010x})")]
    TransactionCorrupted { address: u32, data: u32 },

    /// The relax hook asked for the running busy-wait to be abandoned.
    #[error("operation cancelled")]
    Cancelled,

    #[error("no known flash chip answered at window {window:#010x}")]
    ChipNotDetected { window: u32 },

    #[error("no {area} area is defined for a {size:#x} byte flash chip")]
    ChipSelectionInvalid { area: Area, size: u32 },

    #[error("unknown or missing processor (IDCODE {idcode:#010x})")]
    ProcessorNotDetected { idcode: u32 },

    #[error("instruction length {0} is outside 1..=32")]
    InvalidInstructionLength(u32),

    #[error("flash chip #{0} does not exist")]
    UnknownFlashChip(usize),

    #[error("unknown flash area \"{0}\"")]
    UnknownArea(String),

    #[error("no flash chip has been identified")]
    NoChip,
}

pub type Result<T> = core::result::Result<T, Error>;
