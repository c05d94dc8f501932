//! This crate revives bricked MIPS routers by reading, erasing and reprogramming their NOR
//! flash through the processor's EJTAG debug port.  It is built in layers.
//!
//! At the bottom is a Cable, anything that can set the TCK, TMS and TDI lines from a control
//! byte and report TDO in a status byte.  A parallel port with a Wiggler or Xilinx DLC5 style
//! adapter is the classic choice; `embedded-hal` pins and FT232R bit-bang adapters are
//! provided.
//!
//! The Tap in `statemachine` keeps track of the mode of the single TAP on the link.  You tell
//! it which mode you want and it gets there with the fewest mode changes; it also shifts the
//! instruction and 32-bit data registers.
//!
//! `Ejtag` is the session.  It identifies the processor, then turns word and half-word memory
//! accesses into EJTAG register traffic, either with DMA or, on cores without it, by feeding
//! the halted core tiny load/store routines through processor access (PrAcc).
//!
//! On top of that, `Flash` identifies the flash chip, resolves the router's flash areas and
//! erases and programs them with the chip's command set.
//!
//! # Example
//! ```no_run
//! use ejtag_debrick::cable::{Cable, CableError, StdDelay};
//! use ejtag_debrick::config::{FlashConfig, SessionConfig};
//! use ejtag_debrick::ejtag::Ejtag;
//! use ejtag_debrick::flash::{layout::Area, Flash};
//!
//! # struct Port;
//! # impl Cable for Port {
//! #     fn write_control(&mut self, _data: u8) -> Result<(), CableError> { Ok(()) }
//! #     fn read_status(&mut self) -> Result<u8, CableError> { Ok(0) }
//! # }
//! # fn main() -> Result<(), ejtag_debrick::Error> {
//! let cable: Box<dyn Cable> = Box::new(Port);
//! let mut session = Ejtag::open(cable, StdDelay, SessionConfig::default())?;
//! session.bring_up()?;
//!
//! let mut flash = Flash::new(&mut session, FlashConfig::default());
//! flash.probe()?;
//! let cfe = flash.resolve_area(Area::Cfe)?;
//! let mut backup = Vec::new();
//! flash.read_area(cfe.start, cfe.length, |_, word| backup.extend_from_slice(&word.to_le_bytes()))?;
//!
//! drop(flash);
//! let (_cable, report) = session.shutdown()?;
//! println!("{:?}", report);
//! # Ok(())
//! # }
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod cable;
pub mod config;
pub mod ejtag;
pub mod error;
pub mod flash;
pub mod pracc;
pub mod processor;
pub mod statemachine;

pub use error::{Error, Result};
