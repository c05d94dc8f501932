//! Options for a debrick session and for the flash engine.
use crate::cable::Wiring;

/// How to talk to the target.  `Default` matches a Wiggler cable on a cooperative target with
/// every bring-up step enabled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Override the instruction register length instead of taking it from the processor table.
    pub instruction_length: Option<u32>,
    /// Don't look the IDCODE up in the processor table.  Requires `instruction_length`.
    pub skip_detect: bool,
    /// Extra delay after each half clock, in microseconds.
    pub tck_delay_us: u32,
    pub wiring: Wiring,
    /// Skip the DMA busy and error polling.  Much faster, but a slow target can silently
    /// corrupt data.
    pub fast_mode: bool,
    /// Force DMA (`Some(true)`) or PrAcc (`Some(false)`) instead of trusting IMPCODE.
    pub dma: Option<bool>,
    /// Pulse the processor and peripheral reset bits.
    pub reset_processor: bool,
    /// Clear the memory protection bit in the DCR (EJTAG 1.x/2.0 targets only).
    pub enable_memory_writes: bool,
    /// Request a debug exception so the core halts in debug mode.
    pub halt: bool,
    /// Stop the Broadcom watchdog.
    pub clear_watchdog: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            instruction_length: None,
            skip_detect: false,
            tck_delay_us: 0,
            wiring: Wiring::Wiggler,
            fast_mode: false,
            dma: None,
            reset_processor: true,
            enable_memory_writes: true,
            halt: true,
            clear_watchdog: true,
        }
    }
}

/// A caller-defined flash window and area, used instead of the built-in layout table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CustomArea {
    pub window: u32,
    pub start: u32,
    pub length: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashConfig {
    /// When set, probing happens at `custom.window` and `Area::Custom` resolves to it.
    pub custom: Option<CustomArea>,
    /// Wait out the fixed unlock/erase settle times of Intel-style chips.
    pub erase_delays: bool,
    /// How many full AMD/SST/Intel probe rounds to try before giving up.
    pub probe_retries: usize,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            custom: None,
            erase_delays: true,
            probe_retries: 300,
        }
    }
}
