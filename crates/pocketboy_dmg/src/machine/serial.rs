/// Serial port modelled as a write-only debug sink via SB/SC.
///
/// When a transfer is started on SC (bit 7 set with the internal clock
/// selected), the current SB value is appended to `output` and the
/// transfer-start bit clears immediately. This is the convention CPU
/// test ROMs use to report results.
#[derive(Default)]
pub(crate) struct Serial {
    pub(crate) sb: u8,
    pub(crate) sc: u8,
    pub(crate) output: Vec<u8>,
}

impl Serial {
    pub(crate) fn write_sb(&mut self, value: u8) {
        self.sb = value;
    }

    pub(crate) fn write_sc(&mut self, value: u8) {
        self.sc = value;
        // Internal clock & start bit set?
        if (self.sc & 0x81) == 0x81 {
            log::debug!("serial out: {:02X} ({:?})", self.sb, self.sb as char);
            self.output.push(self.sb);
            // Clear transfer start bit.
            self.sc &= !0x80;
        }
    }
}
