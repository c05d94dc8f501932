//! The EJTAG transaction layer.  `Ejtag` is the session object: it owns the TAP driver, knows
//! whether the target is reached through DMA or through the PrAcc debug stubs, and turns word
//! and half-word reads and writes into the register traffic each of those needs.
use alloc::boxed::Box;
use core::fmt;
use core::ops::DerefMut;

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::cable::Cable;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::flash::Memory;
use crate::pracc::{self, DebugModule, Mailbox};
use crate::processor::{self, ProcessorChip};
use crate::statemachine::Tap;

/// EJTAG TAP instructions
pub mod instr {
    pub const EXTEST: u32 = 0x00;
    pub const IDCODE: u32 = 0x01;
    pub const SAMPLE: u32 = 0x02;
    pub const IMPCODE: u32 = 0x03;
    pub const ADDRESS: u32 = 0x08;
    pub const DATA: u32 = 0x09;
    pub const CONTROL: u32 = 0x0A;
    pub const BYPASS: u32 = 0xFF;
}

/// EJTAG Control register bits
pub mod control {
    /// Reset occurred
    pub const ROCC: u32 = 1 << 31;
    /// Debug mode not entered (EJTAG 1.x)
    pub const DNM: u32 = 1 << 28;
    pub const SYNC: u32 = 1 << 23;
    /// Peripheral reset
    pub const PERRST: u32 = 1 << 20;
    /// Pending processor access is a write
    pub const PRNW: u32 = 1 << 19;
    /// Pending processor access
    pub const PRACC: u32 = 1 << 18;
    /// Probe drives DMA on the system bus
    pub const DMAACC: u32 = 1 << 17;
    /// Processor reset
    pub const PRRST: u32 = 1 << 16;
    /// Probe will service processor accesses
    pub const PROBEN: u32 = 1 << 15;
    /// Debug vector in probe memory (dmseg)
    pub const SETDEV: u32 = 1 << 14;
    /// Request a debug interrupt
    pub const JTAGBRK: u32 = 1 << 12;
    /// Start (and, while set, busy) DMA transfer
    pub const DSTRT: u32 = 1 << 11;
    /// DMA transfer failed
    pub const DERR: u32 = 1 << 10;
    /// DMA read (clear: write)
    pub const DRWN: u32 = 1 << 9;
    pub const DLOCK: u32 = 1 << 5;
    /// Processor is in debug mode
    pub const BRKST: u32 = 1 << 3;
    pub const TIF: u32 = 1 << 2;
    pub const TOF: u32 = 1 << 1;

    pub const DMA_BYTE: u32 = 0x0000_0000;
    pub const DMA_HALFWORD: u32 = 0x0000_0080;
    pub const DMA_WORD: u32 = 0x0000_0100;
    pub const DMA_TRIPLEBYTE: u32 = 0x0000_0180;
}

/// How often a failed DMA transfer is retried before it is reported as corrupted.
pub const RETRY_LIMIT: usize = 16;

/// IMPCODE bit that is set when the debug unit has no DMA.
const IMPCODE_NO_DMA: u32 = 1 << 14;
/// Debug control register and its memory-protection bit
const DCR: u32 = 0xFF30_0000;
const DCR_MP: u32 = 1 << 2;
/// Broadcom watchdog counter
const WATCHDOG: u32 = 0xB800_0080;
/// kseg1: uncached, unmapped
const KSEG1: u32 = 0xA000_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Word,
    Halfword,
}

impl Width {
    fn dma_size(self) -> u32 {
        match self {
            Width::Word => control::DMA_WORD,
            Width::Halfword => control::DMA_HALFWORD,
        }
    }
}

/// One transaction-layer request.  `data` is ignored for reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryAccess {
    pub kind: AccessKind,
    pub width: Width,
    pub address: u32,
    pub data: u32,
}

impl MemoryAccess {
    pub fn read(width: Width, address: u32) -> Self {
        Self { kind: AccessKind::Read, width, address, data: 0 }
    }

    pub fn write(width: Width, address: u32, data: u32) -> Self {
        Self { kind: AccessKind::Write, width, address, data }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Dma,
    PrAcc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EjtagVersion {
    V20,
    V25,
    V26,
    Reserved(u8),
}

impl fmt::Display for EjtagVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EjtagVersion::V20 => f.write_str("1 or 2.0"),
            EjtagVersion::V25 => f.write_str("2.5"),
            EjtagVersion::V26 => f.write_str("2.6"),
            EjtagVersion::Reserved(v) => write!(f, "unknown ({} is a reserved value)", v),
        }
    }
}

/// What the IMPCODE register says about the debug unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Features {
    pub impcode: u32,
    pub version: EjtagVersion,
    pub dma: bool,
}

impl Features {
    pub fn from_impcode(impcode: u32) -> Self {
        let version = match (impcode >> 29) & 7 {
            0 => EjtagVersion::V20,
            1 => EjtagVersion::V25,
            2 => EjtagVersion::V26,
            v => EjtagVersion::Reserved(v as u8),
        };
        Self { impcode, version, dma: impcode & IMPCODE_NO_DMA == 0 }
    }
}

/// Summary handed back by `Ejtag::shutdown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub fast_mode: bool,
    /// A careful DMA poll saw the target busy or failing at least once, so fast mode would
    /// have risked corrupt data.
    pub corruption_observed: bool,
}

/// Called once per busy-wait iteration; returning `true` cancels the operation.
pub type RelaxFn = Box<dyn FnMut() -> bool>;

pub struct Ejtag<T, D> {
    tap: Tap<T, D>,
    config: SessionConfig,
    idcode: u32,
    processor: Option<&'static ProcessorChip>,
    features: Features,
    mode: AccessMode,
    corruption_observed: bool,
    relax: Option<RelaxFn>,
}

impl<T, U, D> Ejtag<T, D>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized,
          D: DelayNs
{
    /// Take over the link: identify the processor, read the debug unit's features and pick the
    /// access mode.  The target is left untouched; see `bring_up`.
    pub fn open(cable: T, delay: D, config: SessionConfig) -> Result<Self> {
        let mut tap = Tap::new(cable, delay, config.wiring)?;
        tap.set_tck_delay(config.tck_delay_us);

        let (idcode, processor) = processor::detect(&mut tap, &config)?;

        tap.set_instruction(instr::IMPCODE)?;
        let features = Features::from_impcode(tap.read_data32()?);
        info!("EJTAG IMPCODE {:08x}, version {}, DMA {}",
              features.impcode, features.version, if features.dma { "supported" } else { "not supported" });

        let mode = match config.dma {
            Some(true) => {
                info!("DMA mode forced on");
                AccessMode::Dma
            }
            Some(false) => {
                info!("DMA mode forced off");
                AccessMode::PrAcc
            }
            None if features.dma => AccessMode::Dma,
            None => AccessMode::PrAcc,
        };

        tap.reset()?;

        Ok(Self {
            tap,
            config,
            idcode,
            processor,
            features,
            mode,
            corruption_observed: false,
            relax: None,
        })
    }

    pub fn idcode(&self) -> u32 {
        self.idcode
    }

    pub fn processor(&self) -> Option<&'static ProcessorChip> {
        self.processor
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn corruption_observed(&self) -> bool {
        self.corruption_observed
    }

    /// Raw access to the TAP, for register pokes the transaction layer doesn't cover.
    pub fn tap_mut(&mut self) -> &mut Tap<T, D> {
        &mut self.tap
    }

    /// Install the hook every busy-wait calls once per iteration.  PrAcc stubs never call it:
    /// stopping halfway through one leaves the core stranded.
    pub fn set_relax<F>(&mut self, hook: F)
        where F: FnMut() -> bool + 'static
    {
        self.relax = Some(Box::new(hook));
    }

    fn relax(&mut self) -> Result<()> {
        match self.relax.as_mut() {
            Some(hook) => if hook() { Err(Error::Cancelled) } else { Ok(()) },
            None => Ok(()),
        }
    }

    /// Run one request through DMA or PrAcc, whichever the session uses.  Returns the data read
    /// (lane-corrected for half-words), or the data written.
    pub fn access(&mut self, access: MemoryAccess) -> Result<u32> {
        match self.mode {
            AccessMode::Dma => self.dma(access),
            AccessMode::PrAcc => self.pracc(access),
        }
    }

    pub fn read_word(&mut self, address: u32) -> Result<u32> {
        self.access(MemoryAccess::read(Width::Word, address))
    }

    pub fn read_half(&mut self, address: u32) -> Result<u16> {
        self.access(MemoryAccess::read(Width::Halfword, address)).map(|data| data as u16)
    }

    pub fn write_word(&mut self, address: u32, data: u32) -> Result<()> {
        self.access(MemoryAccess::write(Width::Word, address, data))?;
        Ok(())
    }

    /// Half-word write.  Over DMA the target picks the lane from `address`, so callers usually
    /// pass the value replicated in both halves.
    pub fn write_half(&mut self, address: u32, data: u32) -> Result<()> {
        self.access(MemoryAccess::write(Width::Halfword, address, data))?;
        Ok(())
    }

    fn dma(&mut self, access: MemoryAccess) -> Result<u32> {
        let mut data = access.data;
        for attempt in 0..=RETRY_LIMIT {
            let (value, failed) = self.dma_attempt(&access)?;
            data = value;
            if !failed {
                return Ok(match (access.kind, access.width) {
                    (AccessKind::Read, Width::Halfword) => lane(access.address, data),
                    _ => data,
                });
            }
            self.corruption_observed = true;
            debug!("DMA {:?} at {:08x} flagged an error (retry {}/{})",
                   access.kind, access.address, attempt, RETRY_LIMIT);
        }

        error!("DMA {:?} at {:08x} failed, data = {:08x}", access.kind, access.address, data);
        Err(Error::TransactionCorrupted { address: access.address, data })
    }

    /// One pass of the DMA handshake.  Returns the data seen and whether DERR was set.
    fn dma_attempt(&mut self, access: &MemoryAccess) -> Result<(u32, bool)> {
        use control::*;

        let fast = self.config.fast_mode;
        let direction = match access.kind {
            AccessKind::Read => DRWN,
            AccessKind::Write => 0,
        };

        self.tap.set_instruction(instr::ADDRESS)?;
        self.tap.write_data32(access.address)?;

        if access.kind == AccessKind::Write {
            self.tap.set_instruction(instr::DATA)?;
            self.tap.write_data32(access.data)?;
        }

        self.tap.set_instruction(instr::CONTROL)?;
        self.tap.write_data32(DMAACC | direction | access.width.dma_size() | DSTRT | PROBEN | PRACC)?;

        if !fast {
            while self.tap.shift_data32(DMAACC | PROBEN | PRACC)? & DSTRT != 0 {
                self.corruption_observed = true;
                self.relax()?;
            }
        }

        let mut data = access.data;
        if access.kind == AccessKind::Read {
            self.tap.set_instruction(instr::DATA)?;
            data = self.tap.read_data32()?;
        }

        if !fast {
            self.tap.set_instruction(instr::CONTROL)?;
            if self.tap.shift_data32(PROBEN | PRACC)? & DERR != 0 {
                return Ok((data, true));
            }
        }
        Ok((data, false))
    }

    fn pracc(&mut self, access: MemoryAccess) -> Result<u32> {
        let module = DebugModule::for_access(access.kind, access.width);
        let mut mailbox = Mailbox {
            address: access.address | KSEG1,
            data: match access.kind {
                AccessKind::Read => 0,
                AccessKind::Write => access.data,
            },
        };
        pracc::execute(&mut self.tap, module, &mut mailbox)?;
        Ok(mailbox.data)
    }

    /// Pulse the processor and peripheral reset bits.
    pub fn reset_processor(&mut self) -> Result<()> {
        self.tap.set_instruction(instr::CONTROL)?;
        self.tap.write_data32(control::PRRST | control::PERRST)
    }

    /// Clear the memory protection bit of the DCR.  Always goes through DMA.
    pub fn enable_memory_writes(&mut self) -> Result<()> {
        let dcr = self.dma(MemoryAccess::read(Width::Word, DCR))?;
        self.dma(MemoryAccess::write(Width::Word, DCR, dcr & !DCR_MP))?;
        Ok(())
    }

    /// Raise a debug interrupt.  Returns whether the core reports being in debug mode.
    pub fn halt(&mut self) -> Result<bool> {
        use control::*;

        self.tap.set_instruction(instr::CONTROL)?;
        self.tap.write_data32(PRACC | PROBEN | SETDEV | JTAGBRK)?;
        Ok(self.tap.shift_data32(PRACC | PROBEN | SETDEV)? & BRKST != 0)
    }

    pub fn clear_watchdog(&mut self) -> Result<()> {
        self.write_word(WATCHDOG, 0)
    }

    /// Prepare the target for flash work, running each step the config enables.
    pub fn bring_up(&mut self) -> Result<()> {
        if self.config.reset_processor {
            self.reset_processor()?;
            info!("Issued processor / peripheral reset");
        } else {
            info!("Processor / peripheral reset skipped");
        }

        // Only EJTAG 1.x/2.0 debug units have the protection bit
        if self.config.enable_memory_writes && self.features.version == EjtagVersion::V20 {
            self.enable_memory_writes()?;
            info!("Enabled memory writes");
        } else {
            info!("Enabling memory writes skipped");
        }

        if self.config.halt {
            if self.halt()? {
                info!("Processor entered debug mode");
            } else {
                warn!("Processor did NOT enter debug mode");
            }
        } else {
            info!("Halting processor skipped");
        }

        if self.config.clear_watchdog {
            self.clear_watchdog()?;
            info!("Cleared watchdog");
        } else {
            info!("Clearing watchdog skipped");
        }
        Ok(())
    }

    /// Return the TAP to Run-Test/Idle through Test-Logic-Reset and release the cable.
    pub fn shutdown(mut self) -> Result<(T, SessionReport)> {
        self.tap.reset()?;

        let report = SessionReport {
            fast_mode: self.config.fast_mode,
            corruption_observed: self.corruption_observed,
        };
        if report.fast_mode {
            info!("Fast mode was on; DMA corruption could not be detected in this run");
        } else if report.corruption_observed {
            info!("Fast mode would have corrupted data in this run");
        } else {
            info!("Fast mode would not have corrupted data in this run, \
                   though that is no guarantee for the next one");
        }

        let (cable, _) = self.tap.into_parts();
        Ok((cable, report))
    }
}

/// Pick the half-word lane addressed by bit 1 of `address` out of a 32-bit DMA read.
fn lane(address: u32, data: u32) -> u32 {
    if address & 2 != 0 {
        (data >> 16) & 0xFFFF
    } else {
        data & 0xFFFF
    }
}

impl<T, U, D> DelayNs for Ejtag<T, D>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized,
          D: DelayNs
{
    fn delay_ns(&mut self, ns: u32) {
        self.tap.delay().delay_ns(ns);
    }
}

impl<T, U, D> Memory for Ejtag<T, D>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized,
          D: DelayNs
{
    fn read_word(&mut self, address: u32) -> Result<u32> {
        Ejtag::read_word(self, address)
    }

    fn write_word(&mut self, address: u32, data: u32) -> Result<()> {
        Ejtag::write_word(self, address, data)
    }

    fn read_half(&mut self, address: u32) -> Result<u16> {
        Ejtag::read_half(self, address)
    }

    fn write_half(&mut self, address: u32, data: u32) -> Result<()> {
        Ejtag::write_half(self, address, data)
    }

    fn byte_lanes(&self) -> bool {
        self.mode == AccessMode::Dma
    }

    fn relax(&mut self) -> Result<()> {
        Ejtag::relax(self)
    }
}
