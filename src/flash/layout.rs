//! Where things live in a router's flash: the window the chip is mapped at, the named areas the
//! firmware uses, and the start address of every erase block.
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use crate::error::Error;
use crate::flash::chips::{BlockRegion, SIZE_16MB, SIZE_2MB, SIZE_4MB, SIZE_8MB};

/// Physical window of chips smaller than 8MB
pub const WINDOW_SMALL: u32 = 0x1FC0_0000;
/// Physical window of 8MB and larger chips
pub const WINDOW_LARGE: u32 = 0x1C00_0000;

pub fn window_for_size(size: u32) -> u32 {
    if size >= SIZE_8MB {
        WINDOW_LARGE
    } else {
        WINDOW_SMALL
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Area {
    Cfe,
    Kernel,
    Nvram,
    WholeFlash,
    Custom,
}

impl FromStr for Area {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        [Area::Cfe, Area::Kernel, Area::Nvram, Area::WholeFlash, Area::Custom]
            .into_iter()
            .find(|area| area.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownArea(s.to_string()))
    }
}

impl Area {
    pub fn name(self) -> &'static str {
        match self {
            Area::Cfe => "CFE",
            Area::Kernel => "KERNEL",
            Area::Nvram => "NVRAM",
            Area::WholeFlash => "WHOLEFLASH",
            Area::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A byte range of physical address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub start: u32,
    pub length: u32,
}

impl Region {
    pub fn new(start: u32, length: u32) -> Self {
        Self { start, length }
    }

    /// One past the last byte, which may not fit a `u32`.
    pub fn end(&self) -> u64 {
        self.start as u64 + self.length as u64
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.start && (address as u64) < self.end()
    }
}

struct AreaEntry {
    chip_size: u32,
    area: Area,
    region: Region,
}

macro_rules! area {
    ($size:expr, $area:ident, $start:expr, $length:expr) => {
        AreaEntry { chip_size: $size, area: Area::$area, region: Region { start: $start, length: $length } }
    };
}

static AREAS: &[AreaEntry] = &[
    area!(SIZE_2MB, Cfe, 0x1FC0_0000, 0x4_0000),
    area!(SIZE_4MB, Cfe, 0x1FC0_0000, 0x4_0000),
    area!(SIZE_8MB, Cfe, 0x1C00_0000, 0x4_0000),
    area!(SIZE_16MB, Cfe, 0x1C00_0000, 0x4_0000),

    area!(SIZE_2MB, Kernel, 0x1FC4_0000, 0x1B_0000),
    area!(SIZE_4MB, Kernel, 0x1FC4_0000, 0x3B_0000),
    area!(SIZE_8MB, Kernel, 0x1C04_0000, 0x7A_0000),
    area!(SIZE_16MB, Kernel, 0x1C04_0000, 0x7A_0000),

    area!(SIZE_2MB, Nvram, 0x1FDF_0000, 0x1_0000),
    area!(SIZE_4MB, Nvram, 0x1FFF_0000, 0x1_0000),
    area!(SIZE_8MB, Nvram, 0x1C7E_0000, 0x2_0000),
    area!(SIZE_16MB, Nvram, 0x1C7E_0000, 0x2_0000),

    area!(SIZE_2MB, WholeFlash, 0x1FC0_0000, 0x20_0000),
    area!(SIZE_4MB, WholeFlash, 0x1FC0_0000, 0x40_0000),
    area!(SIZE_8MB, WholeFlash, 0x1C00_0000, 0x80_0000),
    area!(SIZE_16MB, WholeFlash, 0x1C00_0000, 0x80_0000),
];

/// Built-in region of `area` on a chip of `chip_size` bytes.  `Area::Custom` never matches.
pub fn lookup(chip_size: u32, area: Area) -> Option<Region> {
    AREAS.iter()
        .find(|entry| entry.chip_size == chip_size && entry.area == area)
        .map(|entry| entry.region)
}

/// Start address of every erase block, in ascending order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockMap {
    blocks: Vec<u32>,
}

impl BlockMap {
    pub fn new(base: u32, regions: &[BlockRegion]) -> Self {
        let mut blocks = Vec::new();
        let mut address = base;
        for region in regions {
            for _ in 0..region.count {
                blocks.push(address);
                address = address.wrapping_add(region.size);
            }
        }
        Self { blocks }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.blocks
    }

    pub fn iter(&self) -> impl Iterator<Item=u32> + '_ {
        self.blocks.iter().copied()
    }

    /// Blocks starting inside `region`, with their index in the map.
    pub fn within(&self, region: Region) -> impl Iterator<Item=(usize, u32)> + '_ {
        self.iter().enumerate().filter(move |&(_, address)| region.contains(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::chips::{SIZE_64K, SIZE_8K};
    use pretty_assertions::assert_eq;

    #[test]
    fn bottom_boot_map() {
        let map = BlockMap::new(0x1FC0_0000, &[
            BlockRegion { count: 8, size: SIZE_8K },
            BlockRegion { count: 63, size: SIZE_64K },
        ]);
        assert_eq!(map.len(), 71);
        assert_eq!(&map.as_slice()[..3], &[0x1FC0_0000, 0x1FC0_2000, 0x1FC0_4000]);
        assert_eq!(map.as_slice()[8], 0x1FC1_0000);
        assert_eq!(map.as_slice()[70], 0x1FC0_0000 + 0x10000 + 62 * 0x10000);
        assert!(map.as_slice().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn blocks_within_a_region() {
        let map = BlockMap::new(0x1FC0_0000, &[
            BlockRegion { count: 63, size: SIZE_64K },
            BlockRegion { count: 8, size: SIZE_8K },
        ]);
        let cfe: Vec<_> = map.within(Region::new(0x1FC0_0000, 0x4_0000)).collect();
        assert_eq!(cfe, [(0, 0x1FC0_0000), (1, 0x1FC1_0000), (2, 0x1FC2_0000), (3, 0x1FC3_0000)]);

        let nvram: Vec<_> = map.within(Region::new(0x1FFF_0000, 0x1_0000)).map(|(_, a)| a).collect();
        assert_eq!(nvram.len(), 8);
        assert_eq!(nvram[7], 0x1FFF_E000);
    }

    #[test]
    fn areas() {
        assert_eq!(lookup(SIZE_2MB, Area::Nvram), Some(Region::new(0x1FDF_0000, 0x1_0000)));
        assert_eq!(lookup(SIZE_16MB, Area::WholeFlash), Some(Region::new(0x1C00_0000, 0x80_0000)));
        assert_eq!(lookup(SIZE_4MB, Area::Custom), None);
        assert_eq!(lookup(0x10_0000, Area::Cfe), None);
    }

    #[test]
    fn area_names() {
        assert_eq!("wholeflash".parse::<Area>().unwrap(), Area::WholeFlash);
        assert_eq!("Cfe".parse::<Area>().unwrap(), Area::Cfe);
        assert!(matches!("bootloader".parse::<Area>(), Err(Error::UnknownArea(s)) if s == "bootloader"));
        assert_eq!(Area::Nvram.to_string(), "NVRAM");
    }

    #[test]
    fn windows() {
        assert_eq!(window_for_size(SIZE_4MB), WINDOW_SMALL);
        assert_eq!(window_for_size(SIZE_8MB), WINDOW_LARGE);
        assert_eq!(window_for_size(SIZE_16MB), WINDOW_LARGE);
    }

    #[test]
    fn region_end_does_not_wrap() {
        let region = Region::new(0xFFFF_0000, 0x1_0000);
        assert!(region.contains(0xFFFF_FFFC));
        assert!(!region.contains(0xFFFE_FFFC));
    }
}
