mod bus;
mod cartridge;
mod gameboy;
mod interrupts;
mod joypad;
mod serial;
mod timer;
mod video;

pub(crate) use bus::DmgBus;
pub use cartridge::{Cartridge, CartridgeHeader, MbcKind};
pub use gameboy::GameBoy;
pub use interrupts::InterruptKind;
pub use video::{Shade, SpriteAttr, Tile};

/// Total addressable memory for the Game Boy (64 KiB).
///
/// Cartridge ROM/RAM windows are delegated to the mapper; everything
/// else (VRAM, WRAM, OAM, IO registers, HRAM) is backed by a flat
/// array that the bus routes into.
const MEMORY_SIZE: usize = 0x10000;
