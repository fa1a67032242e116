use super::{banked_rom_read, CartridgeHeader, RAM_BANK_SIZE};

/// Cartridge without a bank controller: up to 32 KiB of ROM mapped
/// straight into the window, writes into the ROM area ignored, and an
/// optional single RAM bank.
pub(in super::super) struct PlainCartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
}

impl PlainCartridge {
    pub(super) fn new(rom: &[u8], header: &CartridgeHeader) -> Self {
        Self {
            rom: rom.to_vec(),
            ram: vec![0xFF; header.ram_banks.min(1) * RAM_BANK_SIZE],
        }
    }

    pub(super) fn rom_read(&self, addr: u16) -> u8 {
        let bank = (addr >= 0x4000) as usize;
        banked_rom_read(&self.rom, bank, 2, addr)
    }

    pub(super) fn rom_write(&mut self, _addr: u16, _value: u8) {
        // No bank-switch logic to interpret the write.
    }

    pub(super) fn ram_read(&self, addr: u16) -> u8 {
        let offset = (addr as usize) & 0x1FFF;
        self.ram.get(offset).copied().unwrap_or(0xFF)
    }

    pub(super) fn ram_write(&mut self, addr: u16, value: u8) {
        let offset = (addr as usize) & 0x1FFF;
        if let Some(slot) = self.ram.get_mut(offset) {
            *slot = value;
        }
    }
}
