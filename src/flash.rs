//! The flash engine: identify a parallel NOR chip through the target's bus, then erase,
//! program and read it back using that chip's command set.
use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::config::FlashConfig;
use crate::error::{Error, Result};

pub mod chips;
pub mod layout;

use chips::{CommandSet, FlashChip, FLASH_CHIPS};
use layout::{Area, BlockMap, Region};

/// Reads and writes on the target's physical bus, plus the delays flash commands need.
pub trait Memory: DelayNs {
    fn read_word(&mut self, address: u32) -> Result<u32>;
    fn write_word(&mut self, address: u32, data: u32) -> Result<()>;
    fn read_half(&mut self, address: u32) -> Result<u16>;
    /// Write the half-word at `address`.  See `byte_lanes` for which bits of `data` land.
    fn write_half(&mut self, address: u32, data: u32) -> Result<()>;

    /// True when a half-word write drives the lane picked by `address` from the full 32-bit
    /// `data` (DMA), false when the low 16 bits of `data` are stored (PrAcc).
    fn byte_lanes(&self) -> bool {
        true
    }

    /// Called once per iteration of every flash busy-wait.
    fn relax(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<M: Memory + ?Sized> Memory for &mut M {
    fn read_word(&mut self, address: u32) -> Result<u32> {
        (**self).read_word(address)
    }

    fn write_word(&mut self, address: u32, data: u32) -> Result<()> {
        (**self).write_word(address, data)
    }

    fn read_half(&mut self, address: u32) -> Result<u16> {
        (**self).read_half(address)
    }

    fn write_half(&mut self, address: u32, data: u32) -> Result<()> {
        (**self).write_half(address, data)
    }

    fn byte_lanes(&self) -> bool {
        (**self).byte_lanes()
    }

    fn relax(&mut self) -> Result<()> {
        (**self).relax()
    }
}

// Command values are replicated in both halves so they land whichever lane the bus drives
const CMD_UNLOCK1: u32 = 0x00AA_00AA;
const CMD_UNLOCK2: u32 = 0x0055_0055;
const CMD_ERASE_SETUP: u32 = 0x0080_0080;
const CMD_SECTOR_ERASE: u32 = 0x0030_0030;
const CMD_SST_BLOCK_ERASE: u32 = 0x0050_0050;
const CMD_PROGRAM: u32 = 0x00A0_00A0;
const CMD_AUTOSELECT: u32 = 0x0090_0090;
const CMD_AMD_READ_ARRAY: u32 = 0x00F0_00F0;

const CMD_CLEAR_STATUS: u32 = 0x0050_0050;
const CMD_INTEL_READ_ARRAY: u32 = 0x00FF_00FF;
const CMD_LOCK_SETUP: u32 = 0x0060_0060;
const CMD_CONFIRM: u32 = 0x00D0_00D0;
const CMD_BLOCK_ERASE: u32 = 0x0020_0020;
const CMD_INTEL_PROGRAM: u32 = 0x0040_0040;

const STATUS_READY: u16 = 0x0080;

/// Device ID shared by several AMD parts, which report the real one further in.
const AMD_AMBIGUOUS_DEVICE: u16 = 0x227E;
const AMD_EXTENDED_DEVICE: u32 = 0x1E;

const INTEL_UNLOCK_SETTLE_MS: u32 = 2000;
const INTEL_ERASE_SETTLE_MS: u32 = 5000;
const INTEL_PROGRAM_SETTLE_NS: u32 = 700;

/// Erased flash reads as all ones
pub const ERASED: u32 = 0xFFFF_FFFF;

fn home_window(config: &FlashConfig) -> u32 {
    config.custom.map_or(layout::WINDOW_SMALL, |custom| custom.window)
}

fn unlock_addresses(command_set: CommandSet) -> (u32, u32) {
    match command_set {
        CommandSet::Sst => (0x5555 << 1, 0x2AAA << 1),
        _ => (0x555 << 1, 0x2AA << 1),
    }
}

/// Reported by `Flash::erase_area_with` after each block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EraseProgress {
    /// 1-based position among the blocks being erased
    pub index: usize,
    pub total: usize,
    /// 0-based position in the chip's block map
    pub block: usize,
    pub address: u32,
}

pub struct Flash<M> {
    memory: M,
    config: FlashConfig,
    window: u32,
    command_set: CommandSet,
    chip: Option<&'static FlashChip>,
    blocks: BlockMap,
}

impl<M: Memory> Flash<M> {
    pub fn new(memory: M, config: FlashConfig) -> Self {
        let window = home_window(&config);
        Self {
            memory,
            config,
            window,
            command_set: CommandSet::Amd,
            chip: None,
            blocks: BlockMap::default(),
        }
    }

    pub fn chip(&self) -> Option<&'static FlashChip> {
        self.chip
    }

    /// Base address of the chip's window.
    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn blocks(&self) -> &BlockMap {
        &self.blocks
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn into_inner(self) -> M {
        self.memory
    }

    /// Ask the chip for its IDs with each command set in turn until one matches the table.
    pub fn probe(&mut self) -> Result<&'static FlashChip> {
        // A larger chip found earlier may have moved the window
        let window = home_window(&self.config);
        self.window = window;
        self.chip = None;
        self.blocks = BlockMap::default();
        info!("Probing for a flash chip at {:08x}", window);

        for round in 0..=self.config.probe_retries {
            for command_set in [CommandSet::Amd, CommandSet::Sst, CommandSet::Bsc] {
                let (vendor, device) = self.read_ids(command_set)?;
                debug!("{} probe round {}: vendor {:04x}, device {:04x}", command_set, round, vendor, device);

                if let Some(chip) = self.identify(vendor, device)? {
                    return Ok(chip);
                }
            }
            self.memory.relax()?;
        }

        warn!("No known flash chip found at {:08x}", window);
        Err(Error::ChipNotDetected { window })
    }

    fn read_ids(&mut self, command_set: CommandSet) -> Result<(u16, u16)> {
        self.command_set = command_set;
        self.reset()?;

        let window = self.window;
        if command_set.is_intel() {
            self.memory.write_half(window, CMD_AUTOSELECT)?;
        } else {
            self.unlock()?;
            let (first, _) = unlock_addresses(command_set);
            self.memory.write_half(window + first, CMD_AUTOSELECT)?;
        }

        let vendor = self.memory.read_half(window)?;
        let device = self.memory.read_half(window + 2)?;
        Ok((vendor, device))
    }

    /// Match autoselect IDs against the table.  Must run while the chip is in autoselect mode.
    fn identify(&mut self, vendor: u16, device: u16) -> Result<Option<&'static FlashChip>> {
        let device = if vendor & 0xFF == 0x01 && device == AMD_AMBIGUOUS_DEVICE {
            let extended = self.memory.read_half(self.window + AMD_EXTENDED_DEVICE)?;
            debug!("Ambiguous AMD device {:04x}, extended ID {:04x}", device, extended);
            extended
        } else {
            device
        };

        match chips::find(vendor, device) {
            Some(chip) => {
                self.adopt(chip)?;
                Ok(Some(chip))
            }
            None => Ok(None),
        }
    }

    /// Pick a chip from `FLASH_CHIPS` by hand, `index` counting from 1.
    pub fn select_chip(&mut self, index: usize) -> Result<&'static FlashChip> {
        let chip = index.checked_sub(1)
            .and_then(|i| FLASH_CHIPS.get(i))
            .ok_or(Error::UnknownFlashChip(index))?;
        self.adopt(chip)?;
        Ok(chip)
    }

    fn adopt(&mut self, chip: &'static FlashChip) -> Result<()> {
        self.chip = Some(chip);
        self.command_set = chip.command_set;
        self.window = match self.config.custom {
            Some(custom) => custom.window,
            None => layout::window_for_size(chip.size),
        };
        self.blocks = BlockMap::new(self.window, chip.regions);

        info!("Flash chip: {} (vendor {:04x}, device {:04x}, {} command set)",
              chip.name, chip.vendor, chip.device, chip.command_set);
        info!("Flash window {:08x}, {} erase blocks", self.window, self.blocks.len());
        self.reset()
    }

    /// Resolve a named area for the identified chip.
    pub fn resolve_area(&self, area: Area) -> Result<Region> {
        let chip = self.chip.ok_or(Error::NoChip)?;
        let region = match area {
            Area::Custom => self.config.custom.map(|custom| Region::new(custom.start, custom.length)),
            _ => layout::lookup(chip.size, area),
        };
        region.ok_or(Error::ChipSelectionInvalid { area, size: chip.size })
    }

    fn unlock(&mut self) -> Result<()> {
        let (first, second) = unlock_addresses(self.command_set);
        self.memory.write_half(self.window + first, CMD_UNLOCK1)?;
        self.memory.write_half(self.window + second, CMD_UNLOCK2)
    }

    /// Read `address` until `done` accepts the value.
    fn poll<F>(&mut self, address: u32, done: F) -> Result<u16>
        where F: Fn(u16) -> bool
    {
        loop {
            let value = self.memory.read_half(address)?;
            if done(value) {
                return Ok(value);
            }
            self.memory.relax()?;
        }
    }

    /// Put the chip back in read-array mode.
    pub fn reset(&mut self) -> Result<()> {
        let window = self.window;
        if self.command_set.is_intel() {
            self.memory.write_half(window, CMD_CLEAR_STATUS)?;
            self.memory.write_half(window, CMD_INTEL_READ_ARRAY)
        } else {
            self.memory.write_half(window, CMD_AMD_READ_ARRAY)
        }
    }

    /// Erase the block starting at `address` and wait for the chip to finish.
    pub fn erase_block(&mut self, address: u32) -> Result<()> {
        if self.chip.is_none() {
            return Err(Error::NoChip);
        }
        match self.command_set {
            CommandSet::Amd | CommandSet::Sst => {
                let (first, _) = unlock_addresses(self.command_set);
                let confirm = match self.command_set {
                    CommandSet::Sst => CMD_SST_BLOCK_ERASE,
                    _ => CMD_SECTOR_ERASE,
                };
                self.unlock()?;
                self.memory.write_half(self.window + first, CMD_ERASE_SETUP)?;
                self.unlock()?;
                self.memory.write_half(address, confirm)?;
                self.poll(address, |value| value == 0xFFFF)?;
            }
            CommandSet::Bsc | CommandSet::Scs => {
                // Clear the block lock bit first
                self.memory.write_half(address, CMD_LOCK_SETUP)?;
                self.memory.write_half(address, CMD_CONFIRM)?;
                if self.config.erase_delays {
                    self.memory.delay_ms(INTEL_UNLOCK_SETTLE_MS);
                }

                self.memory.write_half(address, CMD_BLOCK_ERASE)?;
                self.memory.write_half(address, CMD_CONFIRM)?;
                if self.config.erase_delays {
                    self.memory.delay_ms(INTEL_ERASE_SETTLE_MS);
                }

                let window = self.window;
                self.poll(window, |status| status & STATUS_READY != 0)?;
            }
        }
        self.reset()
    }

    /// Erase every block that starts inside `start..start + length`.  Returns the number of
    /// blocks erased.
    pub fn erase_area(&mut self, start: u32, length: u32) -> Result<usize> {
        self.erase_area_with(start, length, |_| {})
    }

    pub fn erase_area_with<F>(&mut self, start: u32, length: u32, mut progress: F) -> Result<usize>
        where F: FnMut(EraseProgress)
    {
        if self.chip.is_none() {
            return Err(Error::NoChip);
        }

        let region = Region::new(start, length);
        let selected: alloc::vec::Vec<(usize, u32)> = self.blocks.within(region).collect();
        let total = selected.len();
        info!("Erasing {} blocks in {:08x}..{:08x}", total, start, region.end());

        for (n, &(block, address)) in selected.iter().enumerate() {
            debug!("Erasing block {} of the map at {:08x}", block + 1, address);
            self.erase_block(address)?;
            progress(EraseProgress { index: n + 1, total, block, address });
        }
        Ok(total)
    }

    /// Program one word, as two half-words, into erased flash.
    pub fn write_word(&mut self, address: u32, data: u32) -> Result<()> {
        if self.chip.is_none() {
            return Err(Error::NoChip);
        }
        let (low, high) = if self.memory.byte_lanes() {
            (data, data)
        } else {
            (data & 0xFFFF, data >> 16)
        };

        if self.command_set.is_intel() {
            self.intel_program(address, low)?;
            self.intel_program(address + 2, high)
        } else {
            self.jedec_program(address, low, data as u16)?;
            self.jedec_program(address + 2, high, (data >> 16) as u16)
        }
    }

    fn jedec_program(&mut self, address: u32, data: u32, expected: u16) -> Result<()> {
        let (first, _) = unlock_addresses(self.command_set);
        self.unlock()?;
        self.memory.write_half(self.window + first, CMD_PROGRAM)?;
        self.memory.write_half(address, data)?;
        self.poll(address, |value| value == expected)?;
        Ok(())
    }

    fn intel_program(&mut self, address: u32, data: u32) -> Result<()> {
        self.memory.write_half(address, CMD_INTEL_PROGRAM)?;
        self.memory.write_half(address, data)?;
        self.memory.delay_ns(INTEL_PROGRAM_SETTLE_NS);
        self.poll(address, |status| status & STATUS_READY != 0)?;
        Ok(())
    }

    /// Read `start..start + length` a word at a time, handing each word and its address to
    /// `sink`.  A word whose DMA transfer never came back clean is still handed over with the
    /// last data seen.  Returns how many words that happened to.
    ///
    /// The chip must be in read-array mode, which every operation here except `write_word`
    /// leaves it in.
    pub fn read_area<F>(&mut self, start: u32, length: u32, mut sink: F) -> Result<usize>
        where F: FnMut(u32, u32)
    {
        let end = Region::new(start, length).end();
        let mut corrupted = 0;
        let mut address = start as u64;
        while address < end {
            let word = match self.memory.read_word(address as u32) {
                Ok(word) => word,
                Err(Error::TransactionCorrupted { address, data }) => {
                    warn!("Corrupted read at {:08x}, keeping {:08x}", address, data);
                    corrupted += 1;
                    data
                }
                Err(e) => return Err(e),
            };
            sink(address as u32, word);
            address += 4;
        }

        if corrupted > 0 {
            warn!("{} words of {:08x}..{:08x} may be corrupt", corrupted, start, end);
        }
        Ok(corrupted)
    }

    /// Program `words` from `start` onwards, stopping at the end of `words` or of the area.
    /// Erased words are skipped.  With `erase`, the area's blocks are erased first.  Returns
    /// the number of words programmed.
    pub fn program_area<I>(&mut self, start: u32, length: u32, words: I, erase: bool) -> Result<usize>
        where I: IntoIterator<Item=u32>
    {
        if self.chip.is_none() {
            return Err(Error::NoChip);
        }
        if erase {
            self.erase_area(start, length)?;
        }

        let end = Region::new(start, length).end();
        let mut written = 0;
        let mut address = start as u64;
        for word in words {
            if address >= end {
                break;
            }
            if word != ERASED {
                self.write_word(address as u32, word)?;
                written += 1;
            }
            address += 4;
        }
        info!("Programmed {} words at {:08x}", written, start);

        self.reset()?;
        Ok(written)
    }
}
