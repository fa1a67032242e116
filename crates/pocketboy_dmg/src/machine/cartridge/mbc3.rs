use super::{banked_rom_read, CartridgeHeader, RAM_BANK_SIZE};

/// MBC3, RAM path only: full-byte ROM bank register (zero coerced to
/// one) and a direct RAM bank select for up to four banks. The
/// real-time-clock register file is not modelled; selecting an RTC
/// register through the secondary window simply reads as open bus.
pub(in super::super) struct Mbc3Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rom_banks: usize,
    ram_banks: usize,
    ram_enable: bool,
    rom_bank: u8,
    ram_bank: u8,
}

impl Mbc3Cartridge {
    pub(super) fn new(rom: &[u8], header: &CartridgeHeader) -> Self {
        Self {
            rom: rom.to_vec(),
            ram: vec![0xFF; header.ram_banks * RAM_BANK_SIZE],
            rom_banks: header.rom_banks,
            ram_banks: header.ram_banks,
            ram_enable: false,
            rom_bank: 1,
            ram_bank: 0,
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
            0x0000..=0x1FFF => match value & 0x0F {
                0x0A => self.ram_enable = true,
                0x00 => self.ram_enable = false,
                _ => {}
            },
            0x2000..=0x3FFF => {
                self.rom_bank = value;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
            }
            0x4000..=0x5FFF => {
                // 0x00-0x03 select a RAM bank; 0x08-0x0C would select an
                // RTC register, which this core does not model.
                self.ram_bank = value & 0x03;
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
