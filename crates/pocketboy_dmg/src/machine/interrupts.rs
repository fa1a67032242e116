use bitflags::bitflags;

bitflags! {
    /// Interrupt request/enable bits as they appear in IF ($FF0F) and
    /// IE ($FFFF). Only the low five bits exist in hardware.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InterruptFlags: u8 {
        const VBLANK   = 1 << 0;
        const LCD_STAT = 1 << 1;
        const TIMER    = 1 << 2;
        const SERIAL   = 1 << 3;
        const JOYPAD   = 1 << 4;
    }
}

/// The five interrupt sources in priority order (lowest index wins).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptKind {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl InterruptKind {
    pub(crate) fn flag(self) -> InterruptFlags {
        match self {
            InterruptKind::VBlank => InterruptFlags::VBLANK,
            InterruptKind::LcdStat => InterruptFlags::LCD_STAT,
            InterruptKind::Timer => InterruptFlags::TIMER,
            InterruptKind::Serial => InterruptFlags::SERIAL,
            InterruptKind::Joypad => InterruptFlags::JOYPAD,
        }
    }

    /// Fixed service address for this source.
    pub fn vector(self) -> u16 {
        match self {
            InterruptKind::VBlank => 0x0040,
            InterruptKind::LcdStat => 0x0048,
            InterruptKind::Timer => 0x0050,
            InterruptKind::Serial => 0x0058,
            InterruptKind::Joypad => 0x0060,
        }
    }

}

/// Interrupt-flag and interrupt-enable state shared by the peripherals
/// and the CPU's service pass.
#[derive(Default)]
pub(crate) struct Interrupts {
    pub(crate) requested: InterruptFlags,
    pub(crate) enabled: InterruptFlags,
}

impl Interrupts {
    /// Raise a request bit. Peripherals (timer, joypad, the external
    /// video pipeline) use this; the bit stays set until serviced or
    /// overwritten through IF.
    pub(crate) fn request(&mut self, kind: InterruptKind) {
        self.requested |= kind.flag();
    }

    /// IF read: unused high bits always read back as 1.
    pub(crate) fn read_flags(&self) -> u8 {
        0xE0 | self.requested.bits()
    }

    /// IF write: only the low five bits are writable.
    pub(crate) fn write_flags(&mut self, value: u8) {
        self.requested = InterruptFlags::from_bits_truncate(value);
    }

    pub(crate) fn read_enable(&self) -> u8 {
        self.enabled.bits()
    }

    pub(crate) fn write_enable(&mut self, value: u8) {
        self.enabled = InterruptFlags::from_bits_truncate(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_match_hardware() {
        assert_eq!(InterruptKind::VBlank.vector(), 0x40);
        assert_eq!(InterruptKind::LcdStat.vector(), 0x48);
        assert_eq!(InterruptKind::Timer.vector(), 0x50);
        assert_eq!(InterruptKind::Serial.vector(), 0x58);
        assert_eq!(InterruptKind::Joypad.vector(), 0x60);
    }

    #[test]
    fn if_masks_writes_and_pads_reads() {
        let mut ints = Interrupts::default();
        ints.write_flags(0xFF);
        assert_eq!(ints.requested.bits(), 0x1F);
        assert_eq!(ints.read_flags(), 0xFF);

        ints.write_flags(0x04);
        assert_eq!(ints.read_flags(), 0xE4);
    }

    #[test]
    fn request_sets_single_bit() {
        let mut ints = Interrupts::default();
        ints.request(InterruptKind::Timer);
        assert_eq!(ints.requested, InterruptFlags::TIMER);
        ints.request(InterruptKind::VBlank);
        assert_eq!(
            ints.requested,
            InterruptFlags::TIMER | InterruptFlags::VBLANK
        );
    }
}
