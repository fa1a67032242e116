mod header;
mod mbc1;
mod mbc2;
mod mbc3;
mod mbc5;
mod no_mbc;

use anyhow::{bail, Result};

pub use header::CartridgeHeader;
pub(super) use mbc1::Mbc1Cartridge;
pub(super) use mbc2::Mbc2Cartridge;
pub(super) use mbc3::Mbc3Cartridge;
pub(super) use mbc5::Mbc5Cartridge;
pub(super) use no_mbc::PlainCartridge;

/// ROM bank size in bytes (16 KiB).
pub(crate) const ROM_BANK_SIZE: usize = 0x4000;
/// External RAM bank size in bytes (8 KiB).
pub(crate) const RAM_BANK_SIZE: usize = 0x2000;

/// The closed set of supported bank-controller variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

impl MbcKind {
    /// Map the header's cartridge-type byte onto a mapper variant.
    ///
    /// Unrecognized type bytes are a load-time fatal error; the machine
    /// cannot run without knowing how the cartridge banks its windows.
    fn from_type_byte(cart_type: u8) -> Result<MbcKind> {
        match cart_type {
            0x00 | 0x08 | 0x09 => Ok(MbcKind::None),
            0x01..=0x03 => Ok(MbcKind::Mbc1),
            0x05 | 0x06 => Ok(MbcKind::Mbc2),
            0x0F..=0x13 => Ok(MbcKind::Mbc3),
            0x19..=0x1E => Ok(MbcKind::Mbc5),
            other => bail!("unsupported cartridge type byte 0x{other:02X}"),
        }
    }
}

enum Mbc {
    None(PlainCartridge),
    Mbc1(Mbc1Cartridge),
    Mbc2(Mbc2Cartridge),
    Mbc3(Mbc3Cartridge),
    Mbc5(Mbc5Cartridge),
}

/// A loaded cartridge: the parsed header plus the mapper that owns the
/// raw ROM and external-RAM images.
pub struct Cartridge {
    header: CartridgeHeader,
    mbc: Mbc,
}

impl Cartridge {
    /// Parse the header, select the mapper variant from the type byte,
    /// and allocate RAM banks per the RAM-size byte.
    pub fn load(rom: &[u8]) -> Result<Cartridge> {
        let header = CartridgeHeader::parse(rom)?;
        let kind = MbcKind::from_type_byte(header.cartridge_type)?;

        log::debug!(
            "cartridge {:?}: mapper {:?}, {} ROM bank(s), {} RAM bank(s)",
            header.title,
            kind,
            header.rom_banks,
            header.ram_banks
        );

        let mbc = match kind {
            MbcKind::None => Mbc::None(PlainCartridge::new(rom, &header)),
            MbcKind::Mbc1 => Mbc::Mbc1(Mbc1Cartridge::new(rom, &header)),
            MbcKind::Mbc2 => Mbc::Mbc2(Mbc2Cartridge::new(rom, &header)),
            MbcKind::Mbc3 => Mbc::Mbc3(Mbc3Cartridge::new(rom, &header)),
            MbcKind::Mbc5 => Mbc::Mbc5(Mbc5Cartridge::new(rom, &header)),
        };

        Ok(Cartridge { header, mbc })
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn kind(&self) -> MbcKind {
        match self.mbc {
            Mbc::None(_) => MbcKind::None,
            Mbc::Mbc1(_) => MbcKind::Mbc1,
            Mbc::Mbc2(_) => MbcKind::Mbc2,
            Mbc::Mbc3(_) => MbcKind::Mbc3,
            Mbc::Mbc5(_) => MbcKind::Mbc5,
        }
    }

    /// Read from the ROM window ($0000-$7FFF).
    pub(super) fn rom_read(&self, addr: u16) -> u8 {
        match &self.mbc {
            Mbc::None(m) => m.rom_read(addr),
            Mbc::Mbc1(m) => m.rom_read(addr),
            Mbc::Mbc2(m) => m.rom_read(addr),
            Mbc::Mbc3(m) => m.rom_read(addr),
            Mbc::Mbc5(m) => m.rom_read(addr),
        }
    }

    /// Write into the ROM window: interpreted by the bank-switch logic.
    pub(super) fn rom_write(&mut self, addr: u16, value: u8) {
        match &mut self.mbc {
            Mbc::None(m) => m.rom_write(addr, value),
            Mbc::Mbc1(m) => m.rom_write(addr, value),
            Mbc::Mbc2(m) => m.rom_write(addr, value),
            Mbc::Mbc3(m) => m.rom_write(addr, value),
            Mbc::Mbc5(m) => m.rom_write(addr, value),
        }
    }

    /// Read from the external-RAM window ($A000-$BFFF).
    pub(super) fn ram_read(&self, addr: u16) -> u8 {
        match &self.mbc {
            Mbc::None(m) => m.ram_read(addr),
            Mbc::Mbc1(m) => m.ram_read(addr),
            Mbc::Mbc2(m) => m.ram_read(addr),
            Mbc::Mbc3(m) => m.ram_read(addr),
            Mbc::Mbc5(m) => m.ram_read(addr),
        }
    }

    /// Write into the external-RAM window.
    pub(super) fn ram_write(&mut self, addr: u16, value: u8) {
        match &mut self.mbc {
            Mbc::None(m) => m.ram_write(addr, value),
            Mbc::Mbc1(m) => m.ram_write(addr, value),
            Mbc::Mbc2(m) => m.ram_write(addr, value),
            Mbc::Mbc3(m) => m.ram_write(addr, value),
            Mbc::Mbc5(m) => m.ram_write(addr, value),
        }
    }
}

/// Shared helper: read a byte from `rom` inside `bank`, with the bank
/// index reduced modulo the bank count so out-of-range selections stay
/// well-defined.
fn banked_rom_read(rom: &[u8], bank: usize, bank_count: usize, addr: u16) -> u8 {
    let bank = bank % bank_count.max(1);
    let offset = (addr as usize & 0x3FFF) + bank * ROM_BANK_SIZE;
    rom.get(offset).copied().unwrap_or(0xFF)
}
