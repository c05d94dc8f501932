//! Parallel NOR flash parts found on MIPS routers, keyed by their autoselect IDs.
use core::fmt;

pub const SIZE_8K: u32 = 0x2000;
pub const SIZE_16K: u32 = 0x4000;
pub const SIZE_32K: u32 = 0x8000;
pub const SIZE_64K: u32 = 0x10000;
pub const SIZE_128K: u32 = 0x20000;

pub const SIZE_2MB: u32 = 0x20_0000;
pub const SIZE_4MB: u32 = 0x40_0000;
pub const SIZE_8MB: u32 = 0x80_0000;
pub const SIZE_16MB: u32 = 0x100_0000;

/// The command dialect a chip speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandSet {
    /// Intel basic command set
    Bsc,
    /// Intel scalable command set
    Scs,
    /// AMD/JEDEC, unlock cycles at 0x555/0x2AA
    Amd,
    /// SST, unlock cycles at 0x5555/0x2AAA
    Sst,
}

impl CommandSet {
    pub fn is_intel(self) -> bool {
        matches!(self, CommandSet::Bsc | CommandSet::Scs)
    }
}

impl fmt::Display for CommandSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            CommandSet::Bsc => "BSC",
            CommandSet::Scs => "SCS",
            CommandSet::Amd => "AMD",
            CommandSet::Sst => "SST",
        })
    }
}

/// `count` consecutive erase blocks of `size` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRegion {
    pub count: u32,
    pub size: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct FlashChip {
    pub vendor: u16,
    pub device: u16,
    /// Total size in bytes
    pub size: u32,
    pub command_set: CommandSet,
    pub name: &'static str,
    /// Erase regions from the lowest address up
    pub regions: &'static [BlockRegion],
}

impl FlashChip {
    /// Entries with this ID are never reported by a chip and can only be picked by index.
    pub fn is_manual(&self) -> bool {
        self.vendor == 0xDEAD && self.device == 0xBEEF
    }
}

macro_rules! chip {
    ($vendor:expr, $device:expr, $size:expr, $cmd:ident, $name:expr, [$(($count:expr, $bsize:expr)),+]) => {
        FlashChip {
            vendor: $vendor,
            device: $device,
            size: $size,
            command_set: CommandSet::$cmd,
            name: $name,
            regions: &[$(BlockRegion { count: $count, size: $bsize }),+],
        }
    };
}

/// Chips are matched in order, so ambiguous IDs resolve to the first entry.  Index `n` of
/// this table is flash chip `n + 1` when selecting a chip by hand.
pub static FLASH_CHIPS: &[FlashChip] = &[
    // Select these manually
    chip!(0xDEAD, 0xBEEF, SIZE_8MB, Amd, "MX29LV640DB (8MB)", [(8, SIZE_8K), (127, SIZE_64K)]),
    chip!(0xDEAD, 0xBEEF, SIZE_8MB, Amd, "MX29LV640DT (8MB)", [(127, SIZE_64K), (8, SIZE_8K)]),

    chip!(0x0001, 0x2249, SIZE_2MB, Amd, "AMD 29lv160DB 1Mx16 BotB (2MB)", [(1, SIZE_16K), (2, SIZE_8K), (1, SIZE_32K), (31, SIZE_64K)]),
    chip!(0x0001, 0x22C4, SIZE_2MB, Amd, "AMD 29lv160DT 1Mx16 TopB (2MB)", [(31, SIZE_64K), (1, SIZE_32K), (2, SIZE_8K), (1, SIZE_16K)]),
    chip!(0x0001, 0x22F9, SIZE_4MB, Amd, "AMD 29lv320DB 2Mx16 BotB (4MB)", [(8, SIZE_8K), (63, SIZE_64K)]),
    chip!(0x0001, 0x22F6, SIZE_4MB, Amd, "AMD 29lv320DT 2Mx16 TopB (4MB)", [(63, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x0001, 0x2200, SIZE_4MB, Amd, "AMD 29lv320MB 2Mx16 BotB (4MB)", [(8, SIZE_8K), (63, SIZE_64K)]),
    chip!(0x0001, 0x227E, SIZE_4MB, Amd, "AMD 29lv320MT 2Mx16 TopB (4MB)", [(63, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x0001, 0x2201, SIZE_4MB, Amd, "AMD 29lv320MT 2Mx16 TopB (4MB)", [(63, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x0089, 0x0018, SIZE_16MB, Scs, "Intel 28F128J3 8Mx16 (16MB)", [(128, SIZE_128K)]),
    chip!(0x0089, 0x8891, SIZE_2MB, Bsc, "Intel 28F160B3 1Mx16 BotB (2MB)", [(8, SIZE_8K), (31, SIZE_64K)]),
    chip!(0x0089, 0x8890, SIZE_2MB, Bsc, "Intel 28F160B3 1Mx16 TopB (2MB)", [(31, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x0089, 0x88C3, SIZE_2MB, Bsc, "Intel 28F160C3 1Mx16 BotB (2MB)", [(8, SIZE_8K), (31, SIZE_64K)]),
    chip!(0x0089, 0x88C2, SIZE_2MB, Bsc, "Intel 28F160C3 1Mx16 TopB (2MB)", [(31, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x00B0, 0x00D0, SIZE_2MB, Scs, "Intel 28F160S3/5 1Mx16 (2MB)", [(32, SIZE_64K)]),
    chip!(0x0089, 0x8897, SIZE_4MB, Bsc, "Intel 28F320B3 2Mx16 BotB (4MB)", [(8, SIZE_8K), (63, SIZE_64K)]),
    chip!(0x0089, 0x8896, SIZE_4MB, Bsc, "Intel 28F320B3 2Mx16 TopB (4MB)", [(63, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x0089, 0x88C5, SIZE_4MB, Bsc, "Intel 28F320C3 2Mx16 BotB (4MB)", [(8, SIZE_8K), (63, SIZE_64K)]),
    chip!(0x0089, 0x88C4, SIZE_4MB, Bsc, "Intel 28F320C3 2Mx16 TopB (4MB)", [(63, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x0089, 0x0016, SIZE_4MB, Scs, "Intel 28F320J3 2Mx16 (4MB)", [(32, SIZE_128K)]),
    chip!(0x0089, 0x0014, SIZE_4MB, Scs, "Intel 28F320J5 2Mx16 (4MB)", [(32, SIZE_128K)]),
    chip!(0x00B0, 0x00D4, SIZE_4MB, Scs, "Intel 28F320S3/5 2Mx16 (4MB)", [(64, SIZE_64K)]),
    chip!(0x0089, 0x8899, SIZE_8MB, Bsc, "Intel 28F640B3 4Mx16 BotB (8MB)", [(8, SIZE_8K), (127, SIZE_64K)]),
    chip!(0x0089, 0x8898, SIZE_8MB, Bsc, "Intel 28F640B3 4Mx16 TopB (8MB)", [(127, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x0089, 0x88CD, SIZE_8MB, Bsc, "Intel 28F640C3 4Mx16 BotB (8MB)", [(8, SIZE_8K), (127, SIZE_64K)]),
    chip!(0x0089, 0x88CC, SIZE_8MB, Bsc, "Intel 28F640C3 4Mx16 TopB (8MB)", [(127, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x0089, 0x0017, SIZE_8MB, Scs, "Intel 28F640J3 4Mx16 (8MB)", [(64, SIZE_128K)]),
    chip!(0x0089, 0x0015, SIZE_8MB, Scs, "Intel 28F640J5 4Mx16 (8MB)", [(64, SIZE_128K)]),
    chip!(0x0004, 0x22F9, SIZE_4MB, Amd, "MBM29LV320BE 2Mx16 BotB (4MB)", [(1, SIZE_16K), (2, SIZE_8K), (1, SIZE_32K), (63, SIZE_64K)]),
    chip!(0x0004, 0x22F6, SIZE_4MB, Amd, "MBM29LV320TE 2Mx16 TopB (4MB)", [(63, SIZE_64K), (1, SIZE_32K), (2, SIZE_8K), (1, SIZE_16K)]),
    chip!(0x00C2, 0x22A8, SIZE_4MB, Amd, "MX29LV320B 2Mx16 BotB (4MB)", [(8, SIZE_8K), (63, SIZE_64K)]),
    chip!(0x00C2, 0x00A8, SIZE_4MB, Amd, "MX29LV320B 2Mx16 BotB (4MB)", [(8, SIZE_8K), (63, SIZE_64K)]),
    chip!(0x00C2, 0x00A7, SIZE_4MB, Amd, "MX29LV320T 2Mx16 TopB (4MB)", [(63, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x00C2, 0x22A7, SIZE_4MB, Amd, "MX29LV320T 2Mx16 TopB (4MB)", [(63, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x00BF, 0x2783, SIZE_4MB, Sst, "SST39VF320 2Mx16 (4MB)", [(64, SIZE_64K)]),
    chip!(0x0020, 0x22CB, SIZE_4MB, Amd, "ST 29w320DB 2Mx16 BotB (4MB)", [(1, SIZE_16K), (2, SIZE_8K), (1, SIZE_32K), (63, SIZE_64K)]),
    chip!(0x0020, 0x22CA, SIZE_4MB, Amd, "ST 29w320DT 2Mx16 TopB (4MB)", [(63, SIZE_64K), (1, SIZE_32K), (2, SIZE_8K), (1, SIZE_16K)]),
    chip!(0x00B0, 0x00E3, SIZE_4MB, Bsc, "Sharp 28F320BJE 2Mx16 BotB (4MB)", [(8, SIZE_8K), (63, SIZE_64K)]),
    chip!(0x0098, 0x009C, SIZE_4MB, Amd, "TC58FVB321 2Mx16 BotB (4MB)", [(1, SIZE_16K), (2, SIZE_8K), (1, SIZE_32K), (63, SIZE_64K)]),
    chip!(0x0098, 0x009A, SIZE_4MB, Amd, "TC58FVT321 2Mx16 TopB (4MB)", [(63, SIZE_64K), (1, SIZE_32K), (2, SIZE_8K), (1, SIZE_16K)]),
    chip!(0x001F, 0x00C0, SIZE_4MB, Amd, "AT49BV/LV16X 2Mx16 BotB (4MB)", [(8, SIZE_8K), (63, SIZE_64K)]),
    chip!(0x001F, 0x00C2, SIZE_4MB, Amd, "AT49BV/LV16XT 2Mx16 TopB (4MB)", [(63, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x0004, 0x2249, SIZE_2MB, Amd, "MBM29LV160B 1Mx16 BotB (2MB)", [(1, SIZE_16K), (2, SIZE_8K), (1, SIZE_32K), (31, SIZE_64K)]),
    chip!(0x0004, 0x22C4, SIZE_2MB, Amd, "MBM29LV160T 1Mx16 TopB (2MB)", [(31, SIZE_64K), (1, SIZE_32K), (2, SIZE_8K), (1, SIZE_16K)]),
    chip!(0x00C2, 0x2249, SIZE_2MB, Amd, "MX29LV161B 1Mx16 BotB (2MB)", [(1, SIZE_16K), (2, SIZE_8K), (1, SIZE_32K), (31, SIZE_64K)]),
    chip!(0x00C2, 0x22C4, SIZE_2MB, Amd, "MX29LV161T 1Mx16 TopB (2MB)", [(31, SIZE_64K), (1, SIZE_32K), (2, SIZE_8K), (1, SIZE_16K)]),
    chip!(0x0020, 0x2249, SIZE_2MB, Amd, "ST M29W160EB 1Mx16 BotB (2MB)", [(1, SIZE_16K), (2, SIZE_8K), (1, SIZE_32K), (31, SIZE_64K)]),
    chip!(0x0020, 0x22C4, SIZE_2MB, Amd, "ST M29W160ET 1Mx16 TopB (2MB)", [(31, SIZE_64K), (1, SIZE_32K), (2, SIZE_8K), (1, SIZE_16K)]),
    // Sizes below follow the layout routers ship these parts with, not the part's capacity
    chip!(0x00BF, 0x234B, SIZE_4MB, Sst, "SST39VF1601 1Mx16 BotB (2MB)", [(64, SIZE_32K)]),
    chip!(0x00BF, 0x234A, SIZE_4MB, Sst, "SST39VF1602 1Mx16 TopB (2MB)", [(64, SIZE_32K)]),
    chip!(0x00BF, 0x235B, SIZE_4MB, Sst, "SST39VF3201 2Mx16 BotB (4MB)", [(128, SIZE_32K)]),
    chip!(0x00BF, 0x235A, SIZE_4MB, Sst, "SST39VF3202 2Mx16 TopB (4MB)", [(128, SIZE_32K)]),
    chip!(0x00BF, 0x236B, SIZE_4MB, Sst, "SST39VF6401 4Mx16 BotB (8MB)", [(256, SIZE_32K)]),
    chip!(0x00BF, 0x236A, SIZE_4MB, Sst, "SST39VF6402 4Mx16 TopB (8MB)", [(256, SIZE_32K)]),
    chip!(0x00EC, 0x2275, SIZE_2MB, Amd, "K8D1716UTC 1Mx16 TopB (2MB)", [(31, SIZE_64K), (8, SIZE_8K)]),
    chip!(0x00EC, 0x2277, SIZE_2MB, Amd, "K8D1716UBC 1Mx16 BotB (2MB)", [(8, SIZE_8K), (31, SIZE_64K)]),
];

/// First auto-probeable chip with these IDs.
pub fn find(vendor: u16, device: u16) -> Option<&'static FlashChip> {
    FLASH_CHIPS.iter()
        .filter(|chip| !chip.is_manual())
        .find(|chip| chip.vendor == vendor && chip.device == device)
}
