use super::interrupts::{InterruptKind, Interrupts};

/// T-cycles between DIV increments (16384 Hz at the 4 MiHz master clock).
const DIV_PERIOD: u32 = 256;

/// TIMA periods in T-cycles, indexed by TAC bits 1-0.
///
/// 00 = 4096 Hz, 01 = 262144 Hz, 10 = 65536 Hz, 11 = 16384 Hz.
const TIMA_PERIODS: [u32; 4] = [1024, 16, 64, 256];

/// Timer / divider unit.
///
/// Four memory-mapped registers (DIV/TIMA/TMA/TAC at $FF04-$FF07) plus
/// two internal sub-cycle counters that are not separately addressable.
/// Time advances through `update`, which the machine calls with exactly
/// the cycle count of the immediately preceding CPU step.
pub(crate) struct Timer {
    /// DIV ($FF04). Any write resets it to zero.
    pub(crate) div: u8,
    /// TIMA ($FF05). Overflow reloads from TMA and requests INT $50.
    pub(crate) tima: u8,
    /// TMA ($FF06).
    pub(crate) tma: u8,
    /// TAC ($FF07), lower 3 bits meaningful.
    pub(crate) tac: u8,
    /// Elapsed cycles not yet converted into a DIV increment.
    div_sub: u32,
    /// Elapsed cycles not yet converted into a TIMA increment.
    tima_sub: u32,
}

impl Timer {
    pub(crate) fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            div_sub: 0,
            tima_sub: 0,
        }
    }

    #[inline]
    fn enabled(&self) -> bool {
        (self.tac & 0x04) != 0
    }

    #[inline]
    fn period(&self) -> u32 {
        TIMA_PERIODS[(self.tac & 0x03) as usize]
    }

    /// Advance the timer by the given number of elapsed T-cycles.
    ///
    /// The sub-counters subtract whole periods and carry the remainder,
    /// so no cycles are lost when a step overshoots a threshold.
    pub(crate) fn update(&mut self, cycles: u32, interrupts: &mut Interrupts) {
        self.div_sub += cycles;
        while self.div_sub >= DIV_PERIOD {
            self.div_sub -= DIV_PERIOD;
            self.div = self.div.wrapping_add(1);
        }

        if !self.enabled() {
            return;
        }

        self.tima_sub += cycles;
        let period = self.period();
        while self.tima_sub >= period {
            self.tima_sub -= period;
            let (next, overflowed) = self.tima.overflowing_add(1);
            if overflowed {
                self.tima = self.tma;
                interrupts.request(InterruptKind::Timer);
            } else {
                self.tima = next;
            }
        }
    }

    pub(crate) fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => self.div,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => 0xF8 | self.tac,
            _ => 0xFF,
        }
    }

    pub(crate) fn write(&mut self, addr: u16, value: u8) {
        match addr {
            // DIV resets on any write, regardless of the value.
            0xFF04 => {
                self.div = 0;
                self.div_sub = 0;
            }
            0xFF05 => self.tima = value,
            0xFF06 => self.tma = value,
            0xFF07 => {
                let old_period = self.period();
                self.tac = value & 0x07;
                if self.period() != old_period {
                    // Rate reselected: restart the counter's sub-cycle count.
                    self.tima_sub = 0;
                }
            }
            _ => {}
        }
    }
}
