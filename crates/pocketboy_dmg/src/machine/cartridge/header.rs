use anyhow::{bail, Result};

/// Parsed cartridge header, read once at load time from the fixed
/// offsets $0134-$014C.
#[derive(Clone, Debug)]
pub struct CartridgeHeader {
    /// Title, upper-case ASCII, NUL-padded in the image.
    pub title: String,
    /// Manufacturer code ($013F-$0142), present on newer cartridges.
    pub manufacturer_code: String,
    /// Color-console support flag ($0143): 0x80/0xC0 mean supported.
    pub color_support: bool,
    /// Licensee code: the new two-character code at $0144-$0145 when the
    /// old code byte is 0x33, otherwise the old code byte itself.
    pub licensee_code: LicenseeCode,
    /// Cartridge/bank-controller type byte ($0147).
    pub cartridge_type: u8,
    /// Declared ROM bank count, derived from the size code at $0148.
    pub rom_banks: usize,
    /// Declared external-RAM bank count, derived from the code at $0149.
    pub ram_banks: usize,
    /// Destination/region flag ($014A): 0 = Japan.
    pub region: u8,
    /// Mask-ROM version number ($014C).
    pub mask_rom_version: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LicenseeCode {
    Old(u8),
    New(String),
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<CartridgeHeader> {
        if rom.len() < 0x150 {
            bail!("cartridge image too small ({} bytes) to hold a header", rom.len());
        }

        let title: String = rom[0x134..0x144]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();

        let manufacturer_code: String = rom[0x13F..0x143]
            .iter()
            .filter(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            .map(|&b| b as char)
            .collect();

        let color_support = matches!(rom[0x143], 0x80 | 0xC0);

        let licensee_code = if rom[0x14B] == 0x33 {
            LicenseeCode::New(rom[0x144..0x146].iter().map(|&b| b as char).collect())
        } else {
            LicenseeCode::Old(rom[0x14B])
        };

        let rom_banks = match rom[0x148] {
            code @ 0x00..=0x08 => 2usize << code,
            code => bail!("unsupported ROM size code 0x{code:02X}"),
        };

        let ram_banks = match rom[0x149] {
            0x00 => 0,
            // 2 KiB: rounded up to one full 8 KiB bank for addressing.
            0x01 => 1,
            0x02 => 1,
            0x03 => 4,
            0x04 => 16,
            0x05 => 8,
            code => bail!("unsupported RAM size code 0x{code:02X}"),
        };

        Ok(CartridgeHeader {
            title,
            manufacturer_code,
            color_support,
            licensee_code,
            cartridge_type: rom[0x147],
            rom_banks,
            ram_banks,
            region: rom[0x14A],
            mask_rom_version: rom[0x14C],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(patch: &[(usize, u8)]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        for &(offset, value) in patch {
            rom[offset] = value;
        }
        rom
    }

    #[test]
    fn parses_title_and_sizes() {
        let mut rom = image(&[(0x147, 0x01), (0x148, 0x02), (0x149, 0x03)]);
        rom[0x134..0x134 + 5].copy_from_slice(b"TETRA");

        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.title, "TETRA");
        assert_eq!(header.rom_banks, 8);
        assert_eq!(header.ram_banks, 4);
        assert_eq!(header.cartridge_type, 0x01);
        assert!(!header.color_support);
    }

    #[test]
    fn color_flag_values() {
        for (flag, expected) in [(0x80u8, true), (0xC0, true), (0x00, false), (0x40, false)] {
            let rom = image(&[(0x143, flag)]);
            assert_eq!(CartridgeHeader::parse(&rom).unwrap().color_support, expected);
        }
    }

    #[test]
    fn new_licensee_code_requires_old_code_0x33() {
        let mut rom = image(&[(0x14B, 0x33)]);
        rom[0x144] = b'0';
        rom[0x145] = b'1';
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.licensee_code, LicenseeCode::New("01".into()));

        let rom = image(&[(0x14B, 0x54)]);
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.licensee_code, LicenseeCode::Old(0x54));
    }

    #[test]
    fn rejects_unknown_ram_size_code() {
        let rom = image(&[(0x149, 0x07)]);
        assert!(CartridgeHeader::parse(&rom).is_err());
    }

    #[test]
    fn rejects_unknown_rom_size_code() {
        let rom = image(&[(0x148, 0x52)]);
        assert!(CartridgeHeader::parse(&rom).is_err());
    }

    #[test]
    fn rejects_truncated_image() {
        assert!(CartridgeHeader::parse(&[0u8; 0x100]).is_err());
    }
}
