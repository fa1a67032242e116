use anyhow::Result;

use crate::cpu::{Bus, Cpu};
use crate::CYCLES_PER_FRAME;

use super::cartridge::CartridgeHeader;
use super::video::{Shade, SpriteAttr, Tile};
use super::{DmgBus, InterruptKind};

/// The owning context for one emulated machine: the CPU core plus the
/// bus that holds every peripheral. All mutable state lives here, so a
/// reset is a plain re-initialization and nothing is global.
pub struct GameBoy {
    pub cpu: Cpu,
    pub(crate) bus: DmgBus,
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}

impl GameBoy {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: DmgBus::default(),
        }
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus = DmgBus::default();
    }

    /// Load a cartridge image. Header parsing and mapper selection can
    /// fail; a failure leaves the machine without a cartridge and must
    /// be reported before any step is attempted.
    pub fn load_cartridge(&mut self, rom: &[u8]) -> Result<()> {
        self.bus.load_cartridge(rom)
    }

    /// Install a boot ROM overlay and start execution from $0000 with
    /// cleared registers, as the real hardware does. Without a boot ROM
    /// the machine starts from the simulated post-boot state instead.
    pub fn load_boot_rom(&mut self, image: &[u8]) {
        self.bus.load_boot_rom(image);
        self.cpu.start_at_boot_rom();
    }

    /// Execute a single instruction (or interrupt entry, or one parked
    /// Halted/Stopped step) and advance the timer with exactly the
    /// cycle count that step produced.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.bus);
        self.bus.advance_timer(cycles);
        cycles
    }

    /// Step the machine for one frame's worth of time (70224 T-cycles).
    pub fn run_frame(&mut self) {
        let mut elapsed = 0u32;
        while elapsed < CYCLES_PER_FRAME {
            elapsed += self.step();
        }
    }

    /// Raise an interrupt request on behalf of an external collaborator
    /// (the video pipeline's VBlank/LCD-status sources, for instance).
    pub fn request_interrupt(&mut self, kind: InterruptKind) {
        self.bus.interrupts.request(kind);
    }

    /// Read through the memory bus. This is the entire interface the
    /// external video pipeline consumes.
    pub fn read(&mut self, addr: u16) -> u8 {
        self.bus.read8(addr)
    }

    /// Write through the memory bus, with all region side effects.
    pub fn write(&mut self, addr: u16, value: u8) {
        self.bus.write8(addr, value);
    }

    /// Update a face/system button line (0=A, 1=B, 2=Select, 3=Start).
    /// A new press raises the joypad interrupt.
    pub fn set_button(&mut self, bit: u8, pressed: bool) {
        self.bus.set_button(bit, pressed);
    }

    /// Update a d-pad line (0=Right, 1=Left, 2=Up, 3=Down).
    pub fn set_dpad(&mut self, bit: u8, pressed: bool) {
        self.bus.set_dpad(bit, pressed);
    }

    /// Everything the ROM has written to the serial debug sink so far.
    pub fn serial_output(&self) -> &[u8] {
        &self.bus.serial.output
    }

    pub fn header(&self) -> Option<&CartridgeHeader> {
        self.bus.cartridge().map(|cart| cart.header())
    }

    pub fn is_halted(&self) -> bool {
        self.cpu.halted
    }

    pub fn is_stopped(&self) -> bool {
        self.cpu.is_stopped()
    }

    pub fn boot_overlay_active(&self) -> bool {
        self.bus.boot_overlay_active()
    }

    /// Decoded 8x8 pixel cache for one of the 384 tiles.
    pub fn tile(&self, index: usize) -> &Tile {
        self.bus.video.tile(index)
    }

    /// Decoded record for one of the 40 OAM sprites.
    pub fn sprite(&self, index: usize) -> &SpriteAttr {
        self.bus.video.sprite(index)
    }

    pub fn bg_palette(&self) -> &[Shade; 4] {
        self.bus.video.bg_palette()
    }

    pub fn obj_palette(&self, palette1: bool) -> &[Shade; 4] {
        self.bus.video.obj_palette(palette1)
    }
}
