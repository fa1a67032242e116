use super::{banked_rom_read, CartridgeHeader};

/// Built-in MBC2 RAM: 512 entries of 4 bits each.
const MBC2_RAM_SIZE: usize = 512;

/// MBC2: 4-bit ROM bank register plus a built-in 512x4-bit RAM. The
/// register windows mirror MBC1's gating, except that writes with
/// address bit 8 set never reach the RAM-enable latch.
pub(in super::super) struct Mbc2Cartridge {
    rom: Vec<u8>,
    ram: [u8; MBC2_RAM_SIZE],
    rom_banks: usize,
    ram_enable: bool,
    rom_bank: u8,
}

impl Mbc2Cartridge {
    pub(super) fn new(rom: &[u8], header: &CartridgeHeader) -> Self {
        Self {
            rom: rom.to_vec(),
            ram: [0x0F; MBC2_RAM_SIZE],
            rom_banks: header.rom_banks,
            ram_enable: false,
            rom_bank: 1,
        }
    }

    pub(super) fn rom_read(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            self.rom_bank as usize
        };
        banked_rom_read(&self.rom, bank, self.rom_banks, addr)
    }

    pub(super) fn rom_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => {
                // Address bit 8 set routes the write away from the enable latch.
                if addr & 0x0100 != 0 {
                    return;
                }
                match value & 0x0F {
                    0x0A => self.ram_enable = true,
                    0x00 => self.ram_enable = false,
                    _ => {}
                }
            }
            0x2000..=0x3FFF => {
                self.rom_bank = value & 0x0F;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
            }
            _ => {}
        }
    }

    pub(super) fn ram_read(&self, addr: u16) -> u8 {
        if !self.ram_enable {
            return 0xFF;
        }
        let offset = (addr as usize) & 0x1FF;
        // Only the low nibble is backed by storage.
        0xF0 | (self.ram[offset] & 0x0F)
    }

    pub(super) fn ram_write(&mut self, addr: u16, value: u8) {
        if !self.ram_enable {
            return;
        }
        let offset = (addr as usize) & 0x1FF;
        self.ram[offset] = value & 0x0F;
    }
}
