/// Joypad state behind the P1 register ($FF00).
///
/// Selection bits correspond to P1 bits 5 (buttons) and 4 (d-pad); a
/// selected group reads back its lines in the low nibble, active-low.
/// The press masks use bit=1 to mean "pressed" for:
/// - `buttons`: bit0=A, bit1=B, bit2=Select, bit3=Start
/// - `dpad`:    bit0=Right, bit1=Left, bit2=Up, bit3=Down
pub(crate) struct Joypad {
    select: u8,
    buttons: u8,
    dpad: u8,
}

impl Default for Joypad {
    fn default() -> Self {
        Self {
            select: 0x30, // no group selected
            buttons: 0x00,
            dpad: 0x00,
        }
    }
}

impl Joypad {
    /// Compose the P1 value: bits 7-6 unused (read as 1), bits 5-4 the
    /// selection latch, low nibble the active-low lines of whichever
    /// group(s) are selected.
    pub(crate) fn read(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & 0x20 == 0 {
            low &= !self.buttons & 0x0F;
        }
        if self.select & 0x10 == 0 {
            low &= !self.dpad & 0x0F;
        }
        0xC0 | self.select | low
    }

    /// Only the selection bits are writable.
    pub(crate) fn write(&mut self, value: u8) {
        self.select = value & 0x30;
    }

    /// Update a face/system button line. Returns true on a new press so
    /// the caller can raise the joypad interrupt.
    pub(crate) fn set_button(&mut self, bit: u8, pressed: bool) -> bool {
        let mask = 1u8 << (bit & 0x03);
        let newly = pressed && (self.buttons & mask) == 0;
        if pressed {
            self.buttons |= mask;
        } else {
            self.buttons &= !mask;
        }
        newly
    }

    /// Update a d-pad line. Returns true on a new press.
    pub(crate) fn set_dpad(&mut self, bit: u8, pressed: bool) -> bool {
        let mask = 1u8 << (bit & 0x03);
        let newly = pressed && (self.dpad & mask) == 0;
        if pressed {
            self.dpad |= mask;
        } else {
            self.dpad &= !mask;
        }
        newly
    }
}
