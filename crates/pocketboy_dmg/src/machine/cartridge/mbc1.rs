use super::{banked_rom_read, CartridgeHeader, RAM_BANK_SIZE};

/// MBC1: 5-bit ROM bank register, a shared 2-bit secondary register,
/// and a banking-mode flip that decides whether the secondary register
/// supplies high ROM-bank bits (mode 0) or the RAM bank (mode 1).
pub(in super::super) struct Mbc1Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rom_banks: usize,
    ram_banks: usize,
    ram_enable: bool,
    /// Low 5 bits of the ROM bank number; zero is coerced to one.
    rom_bank_low5: u8,
    /// High 2 ROM-bank bits, written through the secondary register in mode 0.
    rom_bank_high2: u8,
    /// Selected RAM bank, written through the secondary register in mode 1.
    ram_bank: u8,
    banking_mode: u8,
}

impl Mbc1Cartridge {
    pub(super) fn new(rom: &[u8], header: &CartridgeHeader) -> Self {
        Self {
            rom: rom.to_vec(),
            ram: vec![0xFF; header.ram_banks * RAM_BANK_SIZE],
            rom_banks: header.rom_banks,
            ram_banks: header.ram_banks,
            ram_enable: false,
            rom_bank_low5: 1,
            rom_bank_high2: 0,
            ram_bank: 0,
            banking_mode: 0,
        }
    }

    fn effective_rom_bank(&self, addr: u16) -> usize {
        if addr < 0x4000 {
            return 0;
        }
        (self.rom_bank_low5 as usize) | ((self.rom_bank_high2 as usize) << 5)
    }

    pub(super) fn rom_read(&self, addr: u16) -> u8 {
        banked_rom_read(&self.rom, self.effective_rom_bank(addr), self.rom_banks, addr)
    }

    pub(super) fn rom_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => match value & 0x0F {
                0x0A => self.ram_enable = true,
                0x00 => self.ram_enable = false,
                _ => {}
            },
            0x2000..=0x3FFF => {
                self.rom_bank_low5 = value & 0x1F;
                if self.rom_bank_low5 == 0 {
                    self.rom_bank_low5 = 1;
                }
            }
            0x4000..=0x5FFF => {
                let bits = value & 0x03;
                if self.banking_mode == 0 {
                    self.rom_bank_high2 = bits;
                } else {
                    self.ram_bank = bits;
                }
            }
            0x6000..=0x7FFF => {
                let mode = value & 0x01;
                if mode != self.banking_mode {
                    self.banking_mode = mode;
                    // Flipping the mode drops the RAM bank selection.
                    self.ram_bank = 0;
                }
            }
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
