use anyhow::Result;

use crate::cpu::Bus;

use super::cartridge::Cartridge;
use super::interrupts::{InterruptKind, Interrupts};
use super::joypad::Joypad;
use super::serial::Serial;
use super::timer::Timer;
use super::video::VideoCaches;
use super::MEMORY_SIZE;

/// The single 16-bit address space. Every read/write is routed to the
/// correct backing region here: cartridge windows, VRAM, WRAM and its
/// echo, OAM, IO registers, HRAM, IE. Region-specific side effects
/// (DMA, timer register semantics, palette/tile cache recompute, boot
/// overlay disable) happen synchronously inside the triggering access.
pub(crate) struct DmgBus {
    pub(crate) memory: [u8; MEMORY_SIZE],
    pub(crate) interrupts: Interrupts,
    pub(crate) timer: Timer,
    pub(crate) serial: Serial,
    pub(crate) joypad: Joypad,
    pub(crate) video: VideoCaches,
    cartridge: Option<Cartridge>,
    boot_rom: Option<Vec<u8>>,
    boot_active: bool,
}

impl Default for DmgBus {
    fn default() -> Self {
        let mut bus = Self {
            memory: [0; MEMORY_SIZE],
            interrupts: Interrupts::default(),
            timer: Timer::new(),
            serial: Serial::default(),
            joypad: Joypad::default(),
            video: VideoCaches::default(),
            cartridge: None,
            boot_rom: None,
            boot_active: false,
        };
        bus.apply_dmg_initial_io_state();
        bus
    }
}

impl DmgBus {
    /// IO register values after the DMG boot ROM hands control to the
    /// cartridge at $0100, so that ROMs see sane defaults when no boot
    /// overlay is installed.
    fn apply_dmg_initial_io_state(&mut self) {
        self.memory[0xFF40] = 0x91; // LCDC
        self.memory[0xFF42] = 0x00; // SCY
        self.memory[0xFF43] = 0x00; // SCX
        self.memory[0xFF44] = 0x00; // LY
        self.memory[0xFF45] = 0x00; // LYC
        self.memory[0xFF47] = 0xFC; // BGP
        self.memory[0xFF48] = 0xFF; // OBP0
        self.memory[0xFF49] = 0xFF; // OBP1
        self.memory[0xFF4A] = 0x00; // WY
        self.memory[0xFF4B] = 0x00; // WX

        // Keep the derived shade tables consistent with the raw bytes.
        for addr in [0xFF47u16, 0xFF48, 0xFF49] {
            self.video.update_palette(addr, self.memory[addr as usize]);
        }
    }

    pub(super) fn load_cartridge(&mut self, rom: &[u8]) -> Result<()> {
        self.cartridge = Some(Cartridge::load(rom)?);
        Ok(())
    }

    pub(super) fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    /// Install a boot ROM image over $0000-$00FF. The overlay stays
    /// active until a nonzero write to $FF50 disables it for the rest
    /// of the session.
    pub(super) fn load_boot_rom(&mut self, image: &[u8]) {
        self.boot_rom = Some(image.to_vec());
        self.boot_active = true;
    }

    pub(super) fn boot_overlay_active(&self) -> bool {
        self.boot_active
    }

    /// Advance the timer with the cycle count of the step that just ran.
    pub(super) fn advance_timer(&mut self, cycles: u32) {
        self.timer.update(cycles, &mut self.interrupts);
    }

    pub(super) fn set_button(&mut self, bit: u8, pressed: bool) {
        if self.joypad.set_button(bit, pressed) {
            self.interrupts.request(InterruptKind::Joypad);
        }
    }

    pub(super) fn set_dpad(&mut self, bit: u8, pressed: bool) {
        if self.joypad.set_dpad(bit, pressed) {
            self.interrupts.request(InterruptKind::Joypad);
        }
    }

    /// OAM DMA: copy 160 bytes from `value * 0x100` into $FE00-$FE9F.
    ///
    /// Source bytes are fetched through `read8` so the copy re-enters
    /// region routing (cartridge banking, echo RAM and friends behave
    /// as they would for CPU reads).
    fn do_oam_dma(&mut self, value: u8) {
        let base = (value as u16) << 8;
        for i in 0u16..0xA0 {
            let byte = self.read8(base.wrapping_add(i));
            let dst = 0xFE00 + i;
            self.memory[dst as usize] = byte;
            self.video.update_sprite(dst, &self.memory);
        }
        self.memory[0xFF46] = value;
    }
}

impl Bus for DmgBus {
    fn read8(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x00FF if self.boot_active => match &self.boot_rom {
                Some(boot) => boot.get(addr as usize).copied().unwrap_or(0xFF),
                None => 0xFF,
            },
            0x0000..=0x7FFF => match &self.cartridge {
                Some(cart) => cart.rom_read(addr),
                None => 0xFF,
            },
            0xA000..=0xBFFF => match &self.cartridge {
                Some(cart) => cart.ram_read(addr),
                None => 0xFF,
            },
            // Echo RAM mirrors WRAM.
            0xE000..=0xFDFF => self.memory[(addr - 0x2000) as usize],
            // Unusable gap.
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.joypad.read(),
            0xFF01 => self.serial.sb,
            0xFF02 => self.serial.sc | 0x7E,
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.interrupts.read_flags(),
            0xFFFF => self.interrupts.read_enable(),
            _ => self.memory[addr as usize],
        }
    }

    fn write8(&mut self, addr: u16, value: u8) {
        match addr {
            // ROM window: interpreted by the cartridge's bank-switch logic.
            0x0000..=0x7FFF => {
                if let Some(cart) = self.cartridge.as_mut() {
                    cart.rom_write(addr, value);
                }
            }
            // VRAM; tile-data writes refresh the decoded pixel cache.
            0x8000..=0x9FFF => {
                self.memory[addr as usize] = value;
                self.video.update_tile(addr, &self.memory);
            }
            0xA000..=0xBFFF => {
                if let Some(cart) = self.cartridge.as_mut() {
                    cart.ram_write(addr, value);
                }
            }
            0xC000..=0xDFFF => self.memory[addr as usize] = value,
            // Echo RAM: keep both views coherent.
            0xE000..=0xFDFF => {
                self.memory[addr as usize] = value;
                self.memory[(addr - 0x2000) as usize] = value;
            }
            0xFE00..=0xFE9F => {
                self.memory[addr as usize] = value;
                self.video.update_sprite(addr, &self.memory);
            }
            // Writes into the unusable gap are discarded.
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.joypad.write(value),
            0xFF01 => self.serial.write_sb(value),
            0xFF02 => self.serial.write_sc(value),
            0xFF04..=0xFF07 => self.timer.write(addr, value),
            0xFF0F => self.interrupts.write_flags(value),
            // LY: writing resets the current line to zero.
            0xFF44 => self.memory[0xFF44] = 0,
            // LYC stores the compare value verbatim.
            0xFF45 => self.memory[0xFF45] = value,
            0xFF46 => self.do_oam_dma(value),
            // Palette registers recompute their shade tables.
            0xFF47..=0xFF49 => {
                self.memory[addr as usize] = value;
                self.video.update_palette(addr, value);
            }
            0xFF50 => {
                if value != 0 && self.boot_active {
                    log::debug!("boot ROM overlay disabled");
                    self.boot_active = false;
                }
                self.memory[0xFF50] = value;
            }
            0xFFFF => self.interrupts.write_enable(value),
            _ => self.memory[addr as usize] = value,
        }
    }
}
