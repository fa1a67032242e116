use super::{banked_rom_read, CartridgeHeader, RAM_BANK_SIZE};

/// MBC5: 9-bit ROM bank number split across two write windows, 4-bit
/// RAM bank register. Unlike the earlier controllers, ROM bank zero is
/// a valid selection for the switchable window.
pub(in super::super) struct Mbc5Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rom_banks: usize,
    ram_banks: usize,
    ram_enable: bool,
    /// Low 8 bits of the ROM bank number.
    rom_bank_low8: u8,
    /// Bit 8 of the ROM bank number.
    rom_bank_bit9: u8,
    ram_bank: u8,
}

impl Mbc5Cartridge {
    pub(super) fn new(rom: &[u8], header: &CartridgeHeader) -> Self {
        Self {
            rom: rom.to_vec(),
            ram: vec![0xFF; header.ram_banks * RAM_BANK_SIZE],
            rom_banks: header.rom_banks,
            ram_banks: header.ram_banks,
            ram_enable: false,
            rom_bank_low8: 1,
            rom_bank_bit9: 0,
            ram_bank: 0,
        }
    }

    pub(super) fn rom_read(&self, addr: u16) -> u8 {
        let bank = if addr < 0x4000 {
            0
        } else {
            (self.rom_bank_low8 as usize) | ((self.rom_bank_bit9 as usize) << 8)
        };
        banked_rom_read(&self.rom, bank, self.rom_banks, addr)
    }

    pub(super) fn rom_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => match value & 0x0F {
                0x0A => self.ram_enable = true,
                0x00 => self.ram_enable = false,
                _ => {}
            },
            0x2000..=0x2FFF => self.rom_bank_low8 = value,
            0x3000..=0x3FFF => self.rom_bank_bit9 = value & 0x01,
            0x4000..=0x5FFF => self.ram_bank = value & 0x0F,
            _ => {}
        }
    }

    fn ram_offset(&self, addr: u16) -> Option<usize> {
        if !self.ram_enable || self.ram_banks == 0 {
            return None;
        }
        let bank = (self.ram_bank as usize) % self.ram_banks;
        Some(bank * RAM_BANK_SIZE + (addr as usize & 0x1FFF))
    }

    pub(super) fn ram_read(&self, addr: u16) -> u8 {
        match self.ram_offset(addr) {
            Some(offset) => self.ram.get(offset).copied().unwrap_or(0xFF),
            None => 0xFF,
        }
    }

    pub(super) fn ram_write(&mut self, addr: u16, value: u8) {
        if let Some(offset) = self.ram_offset(addr) {
            if let Some(slot) = self.ram.get_mut(offset) {
                *slot = value;
            }
        }
    }
}
