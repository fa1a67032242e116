//! SM83 CPU core: register file, flag rules, the full primary and
//! CB-prefixed opcode pages, interrupt servicing, and the
//! Running/Halted/Stopped power states.

/// Registers for the Game Boy CPU.
///
/// Six 8-bit general registers paired into three 16-bit pairs, the
/// accumulator/flag pair, and the 16-bit PC and SP.
#[derive(Clone, Copy, Debug, Default)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    #[inline]
    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f & 0xF0])
    }

    #[inline]
    pub fn set_af(&mut self, value: u16) {
        let [a, f] = value.to_be_bytes();
        self.a = a;
        // Lower 4 bits of F do not exist in hardware.
        self.f = f & 0xF0;
    }

    #[inline]
    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    #[inline]
    pub fn set_bc(&mut self, value: u16) {
        let [b, c] = value.to_be_bytes();
        self.b = b;
        self.c = c;
    }

    #[inline]
    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    #[inline]
    pub fn set_de(&mut self, value: u16) {
        let [d, e] = value.to_be_bytes();
        self.d = d;
        self.e = e;
    }

    #[inline]
    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    #[inline]
    pub fn set_hl(&mut self, value: u16) {
        let [h, l] = value.to_be_bytes();
        self.h = h;
        self.l = l;
    }
}

/// Flag bits in the F register.
///
/// - bit 7: Z (zero)
/// - bit 6: N (subtract)
/// - bit 5: H (half carry, out of bit 3 for 8-bit ops)
/// - bit 4: C (carry)
#[derive(Clone, Copy, Debug)]
pub enum Flag {
    Z = 7,
    N = 6,
    H = 5,
    C = 4,
}

/// Abstraction over the memory bus.
///
/// The CPU performs every memory access through this seam, which keeps
/// the core testable against a flat-array bus and lets the system bus
/// apply its region routing and write side effects.
pub trait Bus {
    fn read8(&mut self, addr: u16) -> u8;
    fn write8(&mut self, addr: u16, value: u8);
}

/// Base cycle cost (in T-cycles) per primary-page opcode.
///
/// Conditional jumps/calls/returns list their not-taken cost here; the
/// handler adds the taken surcharge. Keeping the costs in one table,
/// separate from the dispatch match, is what stops the two from
/// drifting apart. Entries for the 11 nonexistent opcodes are zero and
/// never read (those opcodes panic), and the 0xCB entry is unused
/// because the CB page computes its own totals.
#[rustfmt::skip]
const OPCODE_CYCLES: [u32; 256] = [
    //  0   1   2   3   4   5   6   7   8   9   A   B   C   D   E   F
        4, 12,  8,  8,  4,  4,  8,  4, 20,  8,  8,  8,  4,  4,  8,  4, // 0x00
        4, 12,  8,  8,  4,  4,  8,  4, 12,  8,  8,  8,  4,  4,  8,  4, // 0x10
        8, 12,  8,  8,  4,  4,  8,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 0x20
        8, 12,  8,  8, 12, 12, 12,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 0x30
        4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 0x40
        4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 0x50
        4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 0x60
        8,  8,  8,  8,  8,  8,  4,  8,  4,  4,  4,  4,  4,  4,  8,  4, // 0x70
        4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 0x80
        4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 0x90
        4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 0xA0
        4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 0xB0
        8, 12, 12, 16, 12, 16,  8, 16,  8, 16, 12,  4, 12, 24,  8, 16, // 0xC0
        8, 12, 12,  0, 12, 16,  8, 16,  8, 16, 12,  0, 12,  0,  8, 16, // 0xD0
       12, 12,  8,  0,  0, 16,  8, 16, 16,  4, 16,  0,  0,  0,  8, 16, // 0xE0
       12, 12,  8,  4,  0, 16,  8, 16, 12,  8, 16,  4,  0,  0,  8, 16, // 0xF0
];

/// Game Boy CPU core.
#[derive(Clone, Debug)]
pub struct Cpu {
    pub regs: Registers,
    /// Interrupt master enable.
    pub ime: bool,
    pub halted: bool,
    /// STOP low-power state: 4 cycles per step, no fetch, until released.
    stopped: bool,
    /// One-shot HALT-bug latch: the next opcode fetch does not advance PC.
    halt_bug: bool,
    ime_enable_pending: bool,
    ime_enable_delay: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            ime: false,
            halted: false,
            stopped: false,
            halt_bug: false,
            ime_enable_pending: false,
            ime_enable_delay: false,
        };
        cpu.apply_dmg_boot_state();
        cpu
    }

    /// Reset the CPU to the simulated post-boot state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Register values after the DMG boot ROM hands control to the
    /// cartridge at $0100 (per Pan Docs hardware tests).
    fn apply_dmg_boot_state(&mut self) {
        self.regs.a = 0x01;
        self.regs.f = 0xB0;
        self.regs.b = 0x00;
        self.regs.c = 0x13;
        self.regs.d = 0x00;
        self.regs.e = 0xD8;
        self.regs.h = 0x01;
        self.regs.l = 0x4D;
        self.regs.sp = 0xFFFE;
        self.regs.pc = 0x0100;
        self.ime = false;
    }

    /// Begin execution at $0000 with cleared registers, for use when a
    /// boot ROM overlay is installed.
    pub fn start_at_boot_rom(&mut self) {
        self.regs = Registers::default();
        self.ime = false;
        self.halted = false;
        self.stopped = false;
        self.halt_bug = false;
        self.ime_enable_pending = false;
        self.ime_enable_delay = false;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Release the STOP power state. The source hardware wakes on a
    /// joypad line going low; this core leaves that to the driver.
    pub fn leave_stop(&mut self) {
        self.stopped = false;
    }

    #[inline]
    pub fn get_flag(&self, flag: Flag) -> bool {
        (self.regs.f & (1 << flag as u8)) != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        if value {
            self.regs.f |= 1 << flag as u8;
        } else {
            self.regs.f &= !(1 << flag as u8);
        }
    }

    #[inline]
    pub fn clear_flags(&mut self) {
        self.regs.f = 0;
    }

    // ---- ALU helpers -----------------------------------------------------
    //
    // Each carry/half-carry rule is implemented exactly once here and
    // reused by every instruction that needs it.

    /// 8-bit ADD/ADC on A. `use_carry` selects ADC.
    fn alu_add(&mut self, value: u8, use_carry: bool) {
        let a = self.regs.a;
        let carry_in = (use_carry && self.get_flag(Flag::C)) as u8;

        let half = (a & 0x0F) + (value & 0x0F) + carry_in;
        let full = a as u16 + value as u16 + carry_in as u16;
        let result = full as u8;

        self.regs.a = result;

        self.clear_flags();
        self.set_flag(Flag::Z, result == 0);
        self.set_flag(Flag::H, (half & 0x10) != 0);
        self.set_flag(Flag::C, full > 0xFF);
    }

    /// 8-bit SUB/SBC on A. `use_carry` selects SBC.
    fn alu_sub(&mut self, value: u8, use_carry: bool) {
        let a = self.regs.a;
        let carry_in = (use_carry && self.get_flag(Flag::C)) as i16;

        let half = (a & 0x0F) as i16 - (value & 0x0F) as i16 - carry_in;
        let full = a as i16 - value as i16 - carry_in;
        let result = full as u8;

        self.regs.a = result;

        self.clear_flags();
        self.set_flag(Flag::Z, result == 0);
        self.set_flag(Flag::N, true);
        self.set_flag(Flag::H, half < 0);
        self.set_flag(Flag::C, full < 0);
    }

    #[inline]
    fn alu_and(&mut self, value: u8) {
        let result = self.regs.a & value;
        self.regs.a = result;

        self.clear_flags();
        self.set_flag(Flag::Z, result == 0);
        self.set_flag(Flag::H, true);
    }

    #[inline]
    fn alu_xor(&mut self, value: u8) {
        let result = self.regs.a ^ value;
        self.regs.a = result;

        self.clear_flags();
        self.set_flag(Flag::Z, result == 0);
    }

    #[inline]
    fn alu_or(&mut self, value: u8) {
        let result = self.regs.a | value;
        self.regs.a = result;

        self.clear_flags();
        self.set_flag(Flag::Z, result == 0);
    }

    /// Compare A with `value`: the flags of SUB without the result.
    #[inline]
    fn alu_cp(&mut self, value: u8) {
        let a = self.regs.a;
        let half = (a & 0x0F) as i16 - (value & 0x0F) as i16;
        let full = a as i16 - value as i16;

        self.clear_flags();
        self.set_flag(Flag::Z, full as u8 == 0);
        self.set_flag(Flag::N, true);
        self.set_flag(Flag::H, half < 0);
        self.set_flag(Flag::C, full < 0);
    }

    /// 8-bit increment: updates Z, N, H; C is untouched.
    #[inline]
    fn alu_inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.set_flag(Flag::Z, result == 0);
        self.set_flag(Flag::N, false);
        self.set_flag(Flag::H, (value & 0x0F) + 1 > 0x0F);
        result
    }

    /// 8-bit decrement: updates Z, N, H; C is untouched.
    #[inline]
    fn alu_dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.set_flag(Flag::Z, result == 0);
        self.set_flag(Flag::N, true);
        self.set_flag(Flag::H, (value & 0x0F) == 0);
        result
    }

    /// ADD HL,rr: Z untouched; H at bit 11, C at bit 15.
    #[inline]
    fn alu_add16_hl(&mut self, value: u16) {
        let hl = self.regs.hl();

        self.set_flag(Flag::N, false);
        self.set_flag(Flag::H, (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF);
        self.set_flag(Flag::C, hl as u32 + value as u32 > 0xFFFF);

        self.regs.set_hl(hl.wrapping_add(value));
    }

    /// Signed-displacement add used by ADD SP,r8 and LD HL,SP+r8.
    /// Z and N clear; H and C come from the low byte of the addition.
    #[inline]
    fn alu_add16_signed(&mut self, base: u16, imm8: u8) -> u16 {
        let offset = imm8 as i8 as i16 as u16;
        self.set_flag(Flag::Z, false);
        self.set_flag(Flag::N, false);
        self.set_flag(Flag::H, (base & 0x000F) + (offset & 0x000F) > 0x000F);
        self.set_flag(Flag::C, (base & 0x00FF) + (offset & 0x00FF) > 0x00FF);
        base.wrapping_add(offset)
    }

    /// Decimal adjust A after BCD addition/subtraction.
    fn alu_daa(&mut self) {
        let mut a = self.regs.a;
        let mut adjust: u8 = if self.get_flag(Flag::C) { 0x60 } else { 0x00 };
        if self.get_flag(Flag::H) {
            adjust |= 0x06;
        }

        if !self.get_flag(Flag::N) {
            if (a & 0x0F) > 0x09 {
                adjust |= 0x06;
            }
            if a > 0x99 {
                adjust |= 0x60;
            }
            a = a.wrapping_add(adjust);
        } else {
            a = a.wrapping_sub(adjust);
        }

        self.set_flag(Flag::C, adjust >= 0x60);
        self.set_flag(Flag::H, false);
        self.set_flag(Flag::Z, a == 0);
        self.regs.a = a;
    }

    // ---- operand plumbing ------------------------------------------------

    /// Read an 8-bit register or (HL) by opcode-table index:
    /// 0=B, 1=C, 2=D, 3=E, 4=H, 5=L, 6=(HL), 7=A.
    #[inline]
    fn read_reg8<B: Bus>(&mut self, bus: &mut B, index: u8) -> u8 {
        match index & 0x07 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => bus.read8(self.regs.hl()),
            _ => self.regs.a,
        }
    }

    /// Write an 8-bit register or (HL) by the same index encoding.
    #[inline]
    fn write_reg8<B: Bus>(&mut self, bus: &mut B, index: u8, value: u8) {
        match index & 0x07 {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            6 => bus.write8(self.regs.hl(), value),
            _ => self.regs.a = value,
        }
    }

    #[inline]
    fn fetch8<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.read8(self.regs.pc);
        if self.halt_bug {
            // HALT bug: this fetch does not advance PC, so the byte is
            // seen again by the following fetch.
            self.halt_bug = false;
        } else {
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        value
    }

    #[inline]
    fn fetch16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn push_u16<B: Bus>(&mut self, bus: &mut B, value: u16) {
        // memory[SP] = low byte, memory[SP+1] = high byte.
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write8(self.regs.sp, (value >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write8(self.regs.sp, value as u8);
    }

    #[inline]
    fn pop_u16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read8(self.regs.sp) as u16;
        let hi = bus.read8(self.regs.sp.wrapping_add(1)) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(2);
        (hi << 8) | lo
    }

    // ---- control-flow helpers --------------------------------------------
    //
    // Each returns the taken-branch surcharge on top of the opcode's
    // base cost from `OPCODE_CYCLES`.

    fn jr_cond<B: Bus>(&mut self, bus: &mut B, cond: bool) -> u32 {
        let offset = self.fetch8(bus) as i8;
        if cond {
            self.regs.pc = (self.regs.pc as i16).wrapping_add(offset as i16) as u16;
            4
        } else {
            0
        }
    }

    fn jp_cond<B: Bus>(&mut self, bus: &mut B, cond: bool) -> u32 {
        let addr = self.fetch16(bus);
        if cond {
            self.regs.pc = addr;
            4
        } else {
            0
        }
    }

    fn call_cond<B: Bus>(&mut self, bus: &mut B, cond: bool) -> u32 {
        let addr = self.fetch16(bus);
        if cond {
            let ret = self.regs.pc;
            self.push_u16(bus, ret);
            self.regs.pc = addr;
            12
        } else {
            0
        }
    }

    fn ret_cond<B: Bus>(&mut self, bus: &mut B, cond: bool) -> u32 {
        if cond {
            self.regs.pc = self.pop_u16(bus);
            12
        } else {
            0
        }
    }

    // ---- interrupts ------------------------------------------------------

    /// Service at most one pending interrupt, in fixed priority order
    /// (lowest bit index first).
    ///
    /// Does nothing unless the master enable is set. For the winning
    /// source: its request bit is cleared, IME is cleared, PC is pushed,
    /// a Halted CPU wakes, and PC jumps to the source's vector.
    fn service_interrupt<B: Bus>(&mut self, bus: &mut B) -> Option<u32> {
        if !self.ime {
            return None;
        }

        let iflags = bus.read8(0xFF0F);
        let pending = bus.read8(0xFFFF) & iflags & 0x1F;
        if pending == 0 {
            return None;
        }

        let index = pending.trailing_zeros() as u8;
        bus.write8(0xFF0F, iflags & !(1 << index));
        self.ime = false;
        self.halted = false;

        let pc = self.regs.pc;
        self.push_u16(bus, pc);
        self.regs.pc = 0x0040 + (index as u16) * 8;

        Some(20)
    }

    /// Apply the delayed IME enable requested by EI: the flag becomes
    /// effective after the instruction following EI has executed.
    #[inline]
    fn apply_ime_delay(&mut self) {
        if self.ime_enable_delay {
            self.ime = true;
            self.ime_enable_delay = false;
        } else if self.ime_enable_pending {
            self.ime_enable_pending = false;
            self.ime_enable_delay = true;
        }
    }

    // ---- stepping --------------------------------------------------------

    /// Execute one step: service at most one interrupt, then fetch,
    /// decode and execute a single instruction. Returns the T-cycle
    /// cost, which the caller must feed to the timer before the next
    /// step.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> u32 {
        if self.stopped {
            // Parked: no fetch until the driver releases the STOP state.
            return 4;
        }

        self.apply_ime_delay();

        if let Some(cycles) = self.service_interrupt(bus) {
            return cycles;
        }

        if self.halted {
            // Wake without servicing when a request arrives while IME
            // is off; the fetch resumes on the next step.
            let pending = bus.read8(0xFFFF) & bus.read8(0xFF0F) & 0x1F;
            if pending != 0 {
                self.halted = false;
            }
            return 4;
        }

        let opcode = self.fetch8(bus);
        if opcode == 0xCB {
            self.step_cb(bus)
        } else {
            OPCODE_CYCLES[opcode as usize] + self.exec_opcode(bus, opcode)
        }
    }

    /// Decode and execute one primary-page opcode. Returns the
    /// taken-branch surcharge (zero for everything unconditional).
    fn exec_opcode<B: Bus>(&mut self, bus: &mut B, opcode: u8) -> u32 {
        match opcode {
            // NOP
            0x00 => 0,

            // LD rr, d16
            0x01 => {
                let value = self.fetch16(bus);
                self.regs.set_bc(value);
                0
            }
            0x11 => {
                let value = self.fetch16(bus);
                self.regs.set_de(value);
                0
            }
            0x21 => {
                let value = self.fetch16(bus);
                self.regs.set_hl(value);
                0
            }
            0x31 => {
                self.regs.sp = self.fetch16(bus);
                0
            }

            // LD (BC)/(DE), A and LD A, (BC)/(DE)
            0x02 => {
                bus.write8(self.regs.bc(), self.regs.a);
                0
            }
            0x12 => {
                bus.write8(self.regs.de(), self.regs.a);
                0
            }
            0x0A => {
                self.regs.a = bus.read8(self.regs.bc());
                0
            }
            0x1A => {
                self.regs.a = bus.read8(self.regs.de());
                0
            }

            // Auto-increment/decrement addressing through HL.
            0x22 => {
                let addr = self.regs.hl();
                bus.write8(addr, self.regs.a);
                self.regs.set_hl(addr.wrapping_add(1));
                0
            }
            0x32 => {
                let addr = self.regs.hl();
                bus.write8(addr, self.regs.a);
                self.regs.set_hl(addr.wrapping_sub(1));
                0
            }
            0x2A => {
                let addr = self.regs.hl();
                self.regs.a = bus.read8(addr);
                self.regs.set_hl(addr.wrapping_add(1));
                0
            }
            0x3A => {
                let addr = self.regs.hl();
                self.regs.a = bus.read8(addr);
                self.regs.set_hl(addr.wrapping_sub(1));
                0
            }

            // 16-bit INC/DEC: no flags.
            0x03 => {
                let value = self.regs.bc().wrapping_add(1);
                self.regs.set_bc(value);
                0
            }
            0x13 => {
                let value = self.regs.de().wrapping_add(1);
                self.regs.set_de(value);
                0
            }
            0x23 => {
                let value = self.regs.hl().wrapping_add(1);
                self.regs.set_hl(value);
                0
            }
            0x33 => {
                self.regs.sp = self.regs.sp.wrapping_add(1);
                0
            }
            0x0B => {
                let value = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(value);
                0
            }
            0x1B => {
                let value = self.regs.de().wrapping_sub(1);
                self.regs.set_de(value);
                0
            }
            0x2B => {
                let value = self.regs.hl().wrapping_sub(1);
                self.regs.set_hl(value);
                0
            }
            0x3B => {
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                0
            }

            // INC r / INC (HL)
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let index = (opcode >> 3) & 0x07;
                let value = self.read_reg8(bus, index);
                let result = self.alu_inc8(value);
                self.write_reg8(bus, index, result);
                0
            }

            // DEC r / DEC (HL)
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let index = (opcode >> 3) & 0x07;
                let value = self.read_reg8(bus, index);
                let result = self.alu_dec8(value);
                self.write_reg8(bus, index, result);
                0
            }

            // LD r, d8 / LD (HL), d8
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let value = self.fetch8(bus);
                self.write_reg8(bus, (opcode >> 3) & 0x07, value);
                0
            }

            // Accumulator rotates. Unlike their CB-page counterparts
            // these always clear Z, per hardware.
            0x07 => {
                // RLCA
                let a = self.regs.a;
                self.regs.a = a.rotate_left(1);
                self.clear_flags();
                self.set_flag(Flag::C, (a & 0x80) != 0);
                0
            }
            0x0F => {
                // RRCA
                let a = self.regs.a;
                self.regs.a = a.rotate_right(1);
                self.clear_flags();
                self.set_flag(Flag::C, (a & 0x01) != 0);
                0
            }
            0x17 => {
                // RLA
                let a = self.regs.a;
                let carry_in = self.get_flag(Flag::C) as u8;
                self.regs.a = (a << 1) | carry_in;
                self.clear_flags();
                self.set_flag(Flag::C, (a & 0x80) != 0);
                0
            }
            0x1F => {
                // RRA
                let a = self.regs.a;
                let carry_in = (self.get_flag(Flag::C) as u8) << 7;
                self.regs.a = (a >> 1) | carry_in;
                self.clear_flags();
                self.set_flag(Flag::C, (a & 0x01) != 0);
                0
            }

            // LD (a16), SP
            0x08 => {
                let addr = self.fetch16(bus);
                bus.write8(addr, self.regs.sp as u8);
                bus.write8(addr.wrapping_add(1), (self.regs.sp >> 8) as u8);
                0
            }

            // ADD HL, rr
            0x09 => {
                let value = self.regs.bc();
                self.alu_add16_hl(value);
                0
            }
            0x19 => {
                let value = self.regs.de();
                self.alu_add16_hl(value);
                0
            }
            0x29 => {
                let value = self.regs.hl();
                self.alu_add16_hl(value);
                0
            }
            0x39 => {
                let value = self.regs.sp;
                self.alu_add16_hl(value);
                0
            }

            // STOP
            0x10 => {
                // Officially two bytes; consume the padding byte.
                let _padding = self.fetch8(bus);
                self.stopped = true;
                self.halted = false;
                // Entering STOP resets the divider.
                bus.write8(0xFF04, 0);
                0
            }

            // JR r8 and JR cc, r8
            0x18 => {
                let offset = self.fetch8(bus) as i8;
                self.regs.pc = (self.regs.pc as i16).wrapping_add(offset as i16) as u16;
                0
            }
            0x20 => {
                let cond = !self.get_flag(Flag::Z);
                self.jr_cond(bus, cond)
            }
            0x28 => {
                let cond = self.get_flag(Flag::Z);
                self.jr_cond(bus, cond)
            }
            0x30 => {
                let cond = !self.get_flag(Flag::C);
                self.jr_cond(bus, cond)
            }
            0x38 => {
                let cond = self.get_flag(Flag::C);
                self.jr_cond(bus, cond)
            }

            // DAA / CPL / SCF / CCF
            0x27 => {
                self.alu_daa();
                0
            }
            0x2F => {
                self.regs.a = !self.regs.a;
                self.set_flag(Flag::N, true);
                self.set_flag(Flag::H, true);
                0
            }
            0x37 => {
                self.set_flag(Flag::N, false);
                self.set_flag(Flag::H, false);
                self.set_flag(Flag::C, true);
                0
            }
            0x3F => {
                let carry = self.get_flag(Flag::C);
                self.set_flag(Flag::N, false);
                self.set_flag(Flag::H, false);
                self.set_flag(Flag::C, !carry);
                0
            }

            // LD r1, r2 block (0x40-0x7F), with HALT in the hole at 0x76.
            0x40..=0x7F => {
                if opcode == 0x76 {
                    if !self.ime {
                        // HALT with interrupts pending while IME is off
                        // triggers the halt bug instead of halting.
                        let pending = bus.read8(0xFFFF) & bus.read8(0xFF0F) & 0x1F;
                        if pending != 0 {
                            self.halt_bug = true;
                            return 0;
                        }
                    }
                    self.halted = true;
                } else {
                    let value = self.read_reg8(bus, opcode & 0x07);
                    self.write_reg8(bus, (opcode >> 3) & 0x07, value);
                }
                0
            }

            // ALU A, r block: ADD/ADC/SUB/SBC/AND/XOR/OR/CP.
            0x80..=0xBF => {
                let value = self.read_reg8(bus, opcode & 0x07);
                match (opcode >> 3) & 0x07 {
                    0 => self.alu_add(value, false),
                    1 => self.alu_add(value, true),
                    2 => self.alu_sub(value, false),
                    3 => self.alu_sub(value, true),
                    4 => self.alu_and(value),
                    5 => self.alu_xor(value),
                    6 => self.alu_or(value),
                    _ => self.alu_cp(value),
                }
                0
            }

            // ALU A, d8
            0xC6 => {
                let value = self.fetch8(bus);
                self.alu_add(value, false);
                0
            }
            0xCE => {
                let value = self.fetch8(bus);
                self.alu_add(value, true);
                0
            }
            0xD6 => {
                let value = self.fetch8(bus);
                self.alu_sub(value, false);
                0
            }
            0xDE => {
                let value = self.fetch8(bus);
                self.alu_sub(value, true);
                0
            }
            0xE6 => {
                let value = self.fetch8(bus);
                self.alu_and(value);
                0
            }
            0xEE => {
                let value = self.fetch8(bus);
                self.alu_xor(value);
                0
            }
            0xF6 => {
                let value = self.fetch8(bus);
                self.alu_or(value);
                0
            }
            0xFE => {
                let value = self.fetch8(bus);
                self.alu_cp(value);
                0
            }

            // RET cc / RET / RETI
            0xC0 => {
                let cond = !self.get_flag(Flag::Z);
                self.ret_cond(bus, cond)
            }
            0xC8 => {
                let cond = self.get_flag(Flag::Z);
                self.ret_cond(bus, cond)
            }
            0xD0 => {
                let cond = !self.get_flag(Flag::C);
                self.ret_cond(bus, cond)
            }
            0xD8 => {
                let cond = self.get_flag(Flag::C);
                self.ret_cond(bus, cond)
            }
            0xC9 => {
                self.regs.pc = self.pop_u16(bus);
                0
            }
            0xD9 => {
                // RETI: return and re-enable interrupts immediately.
                self.regs.pc = self.pop_u16(bus);
                self.ime = true;
                0
            }

            // POP rr
            0xC1 => {
                let value = self.pop_u16(bus);
                self.regs.set_bc(value);
                0
            }
            0xD1 => {
                let value = self.pop_u16(bus);
                self.regs.set_de(value);
                0
            }
            0xE1 => {
                let value = self.pop_u16(bus);
                self.regs.set_hl(value);
                0
            }
            0xF1 => {
                // POP AF: the flag half masks its low nibble to zero.
                let value = self.pop_u16(bus);
                self.regs.set_af(value);
                0
            }

            // PUSH rr
            0xC5 => {
                let value = self.regs.bc();
                self.push_u16(bus, value);
                0
            }
            0xD5 => {
                let value = self.regs.de();
                self.push_u16(bus, value);
                0
            }
            0xE5 => {
                let value = self.regs.hl();
                self.push_u16(bus, value);
                0
            }
            0xF5 => {
                let value = self.regs.af();
                self.push_u16(bus, value);
                0
            }

            // JP cc, a16 / JP a16 / JP HL
            0xC2 => {
                let cond = !self.get_flag(Flag::Z);
                self.jp_cond(bus, cond)
            }
            0xCA => {
                let cond = self.get_flag(Flag::Z);
                self.jp_cond(bus, cond)
            }
            0xD2 => {
                let cond = !self.get_flag(Flag::C);
                self.jp_cond(bus, cond)
            }
            0xDA => {
                let cond = self.get_flag(Flag::C);
                self.jp_cond(bus, cond)
            }
            0xC3 => {
                self.regs.pc = self.fetch16(bus);
                0
            }
            0xE9 => {
                self.regs.pc = self.regs.hl();
                0
            }

            // CALL cc, a16 / CALL a16
            0xC4 => {
                let cond = !self.get_flag(Flag::Z);
                self.call_cond(bus, cond)
            }
            0xCC => {
                let cond = self.get_flag(Flag::Z);
                self.call_cond(bus, cond)
            }
            0xD4 => {
                let cond = !self.get_flag(Flag::C);
                self.call_cond(bus, cond)
            }
            0xDC => {
                let cond = self.get_flag(Flag::C);
                self.call_cond(bus, cond)
            }
            0xCD => {
                let addr = self.fetch16(bus);
                let ret = self.regs.pc;
                self.push_u16(bus, ret);
                self.regs.pc = addr;
                0
            }

            // RST: push PC and load one of eight fixed vectors.
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let ret = self.regs.pc;
                self.push_u16(bus, ret);
                self.regs.pc = (opcode & 0x38) as u16;
                0
            }

            // High-page loads ($FF00-relative).
            0xE0 => {
                let offset = self.fetch8(bus) as u16;
                bus.write8(0xFF00 | offset, self.regs.a);
                0
            }
            0xF0 => {
                let offset = self.fetch8(bus) as u16;
                self.regs.a = bus.read8(0xFF00 | offset);
                0
            }
            0xE2 => {
                bus.write8(0xFF00 | self.regs.c as u16, self.regs.a);
                0
            }
            0xF2 => {
                self.regs.a = bus.read8(0xFF00 | self.regs.c as u16);
                0
            }

            // LD (a16), A / LD A, (a16)
            0xEA => {
                let addr = self.fetch16(bus);
                bus.write8(addr, self.regs.a);
                0
            }
            0xFA => {
                let addr = self.fetch16(bus);
                self.regs.a = bus.read8(addr);
                0
            }

            // Stack-pointer arithmetic with a signed displacement.
            0xE8 => {
                let imm = self.fetch8(bus);
                self.regs.sp = self.alu_add16_signed(self.regs.sp, imm);
                0
            }
            0xF8 => {
                let imm = self.fetch8(bus);
                let result = self.alu_add16_signed(self.regs.sp, imm);
                self.regs.set_hl(result);
                0
            }
            0xF9 => {
                self.regs.sp = self.regs.hl();
                0
            }

            // DI / EI
            0xF3 => {
                self.ime = false;
                self.ime_enable_pending = false;
                self.ime_enable_delay = false;
                0
            }
            0xFB => {
                self.ime_enable_pending = true;
                0
            }

            // The CB prefix is dispatched before exec_opcode runs.
            0xCB => unreachable!("CB prefix is handled by step"),

            // Holes in the primary page: executing one is an emulation
            // defect upstream of the CPU, not a recoverable condition.
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                panic!(
                    "opcode 0x{:02X} at PC 0x{:04X} does not exist on the SM83",
                    opcode,
                    self.regs.pc.wrapping_sub(1)
                );
            }
        }
    }

    /// Execute a CB-prefixed instruction (rotates, shifts, SWAP, and
    /// the bit test/set/reset family). Returns the total cost of the
    /// two-byte instruction, prefix included.
    fn step_cb<B: Bus>(&mut self, bus: &mut B) -> u32 {
        let cb = self.fetch8(bus);
        let x = cb >> 6;
        let y = (cb >> 3) & 0x07;
        let z = cb & 0x07;

        match x {
            0 => {
                // Rotates and shifts. These all set Z from the result,
                // unlike the accumulator-only forms.
                let mut value = self.read_reg8(bus, z);

                match y {
                    // RLC
                    0 => {
                        let carry = (value & 0x80) != 0;
                        value = value.rotate_left(1);
                        self.clear_flags();
                        self.set_flag(Flag::Z, value == 0);
                        self.set_flag(Flag::C, carry);
                    }
                    // RRC
                    1 => {
                        let carry = (value & 0x01) != 0;
                        value = value.rotate_right(1);
                        self.clear_flags();
                        self.set_flag(Flag::Z, value == 0);
                        self.set_flag(Flag::C, carry);
                    }
                    // RL
                    2 => {
                        let carry_out = (value & 0x80) != 0;
                        let carry_in = self.get_flag(Flag::C) as u8;
                        value = (value << 1) | carry_in;
                        self.clear_flags();
                        self.set_flag(Flag::Z, value == 0);
                        self.set_flag(Flag::C, carry_out);
                    }
                    // RR
                    3 => {
                        let carry_out = (value & 0x01) != 0;
                        let carry_in = (self.get_flag(Flag::C) as u8) << 7;
                        value = (value >> 1) | carry_in;
                        self.clear_flags();
                        self.set_flag(Flag::Z, value == 0);
                        self.set_flag(Flag::C, carry_out);
                    }
                    // SLA: zero fills bit 0.
                    4 => {
                        let carry = (value & 0x80) != 0;
                        value <<= 1;
                        self.clear_flags();
                        self.set_flag(Flag::Z, value == 0);
                        self.set_flag(Flag::C, carry);
                    }
                    // SRA: bit 7 is sign-extended.
                    5 => {
                        let carry = (value & 0x01) != 0;
                        value = (value >> 1) | (value & 0x80);
                        self.clear_flags();
                        self.set_flag(Flag::Z, value == 0);
                        self.set_flag(Flag::C, carry);
                    }
                    // SWAP
                    6 => {
                        value = (value << 4) | (value >> 4);
                        self.clear_flags();
                        self.set_flag(Flag::Z, value == 0);
                    }
                    // SRL: zero fills bit 7.
                    _ => {
                        let carry = (value & 0x01) != 0;
                        value >>= 1;
                        self.clear_flags();
                        self.set_flag(Flag::Z, value == 0);
                        self.set_flag(Flag::C, carry);
                    }
                }

                self.write_reg8(bus, z, value);
                if z == 6 {
                    16
                } else {
                    8
                }
            }
            1 => {
                // BIT y, r: Z is the inverse of the tested bit; C untouched.
                let value = self.read_reg8(bus, z);
                self.set_flag(Flag::Z, value & (1 << y) == 0);
                self.set_flag(Flag::N, false);
                self.set_flag(Flag::H, true);
                if z == 6 {
                    12
                } else {
                    8
                }
            }
            2 => {
                // RES y, r: no flags.
                let value = self.read_reg8(bus, z) & !(1 << y);
                self.write_reg8(bus, z, value);
                if z == 6 {
                    16
                } else {
                    8
                }
            }
            _ => {
                // SET y, r: no flags.
                let value = self.read_reg8(bus, z) | (1 << y);
                self.write_reg8(bus, z, value);
                if z == 6 {
                    16
                } else {
                    8
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestBus {
        memory: [u8; 0x10000],
    }

    impl Default for TestBus {
        fn default() -> Self {
            Self {
                memory: [0; 0x10000],
            }
        }
    }

    impl Bus for TestBus {
        fn read8(&mut self, addr: u16) -> u8 {
            self.memory[addr as usize]
        }

        fn write8(&mut self, addr: u16, value: u8) {
            self.memory[addr as usize] = value;
        }
    }

    /// CPU with a neutral register state and a program loaded at 0x0100.
    fn cpu_with_program(program: &[u8]) -> (Cpu, TestBus) {
        let mut cpu = Cpu::new();
        cpu.regs = Registers {
            sp: 0xFFFE,
            pc: 0x0100,
            ..Registers::default()
        };
        let mut bus = TestBus::default();
        bus.memory[0x0100..0x0100 + program.len()].copy_from_slice(program);
        (cpu, bus)
    }

    #[test]
    fn register_pairs_roundtrip() {
        let mut regs = Registers::default();
        for value in [0x0000u16, 0x1234, 0xFFFF, 0xA55A] {
            regs.set_bc(value);
            assert_eq!(regs.bc(), value);
            regs.set_de(value);
            assert_eq!(regs.de(), value);
            regs.set_hl(value);
            assert_eq!(regs.hl(), value);
        }
    }

    #[test]
    fn af_masks_low_flag_nibble() {
        let mut regs = Registers::default();
        regs.set_af(0x12FF);
        assert_eq!(regs.af(), 0x12F0);
        assert_eq!(regs.f, 0xF0);
    }

    #[test]
    fn pop_af_masks_low_flag_nibble() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xF1]); // POP AF
        cpu.regs.sp = 0xC000;
        bus.memory[0xC000] = 0x5F; // would set nonexistent flag bits
        bus.memory[0xC001] = 0x12;

        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 12);
        assert_eq!(cpu.regs.a, 0x12);
        assert_eq!(cpu.regs.f, 0x50);
    }

    #[test]
    fn add_then_sub_restores_accumulator() {
        for a in 0..=255u8 {
            for value in [0x00u8, 0x01, 0x0F, 0x7F, 0x80, 0xFF] {
                let mut cpu = Cpu::new();
                cpu.regs.a = a;
                cpu.alu_add(value, false);
                cpu.alu_sub(value, false);
                assert_eq!(cpu.regs.a, a, "A=0x{a:02X} value=0x{value:02X}");
                assert!(cpu.get_flag(Flag::N));
                // The subtraction borrows exactly when the addition carried.
                let carried = a as u16 + value as u16 > 0xFF;
                assert_eq!(cpu.get_flag(Flag::C), carried);
            }
        }
    }

    #[test]
    fn add_flag_boundaries() {
        let mut cpu = Cpu::new();
        cpu.regs.a = 0x0F;
        cpu.alu_add(0x01, false);
        assert_eq!(cpu.regs.a, 0x10);
        assert!(cpu.get_flag(Flag::H));
        assert!(!cpu.get_flag(Flag::C));
        assert!(!cpu.get_flag(Flag::Z));

        cpu.regs.a = 0xFF;
        cpu.alu_add(0x01, false);
        assert_eq!(cpu.regs.a, 0x00);
        assert!(cpu.get_flag(Flag::Z));
        assert!(cpu.get_flag(Flag::H));
        assert!(cpu.get_flag(Flag::C));
    }

    #[test]
    fn adc_includes_carry_in_both_carries() {
        let mut cpu = Cpu::new();
        cpu.regs.a = 0x0F;
        cpu.set_flag(Flag::C, true);
        cpu.alu_add(0x00, true);
        assert_eq!(cpu.regs.a, 0x10);
        assert!(cpu.get_flag(Flag::H));
        assert!(!cpu.get_flag(Flag::C));
    }

    #[test]
    fn sub_borrow_flags() {
        let mut cpu = Cpu::new();
        cpu.regs.a = 0x10;
        cpu.alu_sub(0x01, false);
        assert_eq!(cpu.regs.a, 0x0F);
        assert!(cpu.get_flag(Flag::N));
        assert!(cpu.get_flag(Flag::H));
        assert!(!cpu.get_flag(Flag::C));

        cpu.regs.a = 0x00;
        cpu.alu_sub(0x01, false);
        assert_eq!(cpu.regs.a, 0xFF);
        assert!(cpu.get_flag(Flag::H));
        assert!(cpu.get_flag(Flag::C));
    }

    #[test]
    fn cp_sets_flags_without_touching_a() {
        let mut cpu = Cpu::new();
        cpu.regs.a = 0x42;
        cpu.alu_cp(0x42);
        assert_eq!(cpu.regs.a, 0x42);
        assert!(cpu.get_flag(Flag::Z));
        assert!(cpu.get_flag(Flag::N));
    }

    #[test]
    fn logic_op_flags() {
        let mut cpu = Cpu::new();
        cpu.regs.a = 0xF0;
        cpu.set_flag(Flag::C, true);
        cpu.alu_and(0x0F);
        assert_eq!(cpu.regs.a, 0x00);
        assert!(cpu.get_flag(Flag::Z));
        assert!(cpu.get_flag(Flag::H));
        assert!(!cpu.get_flag(Flag::C));

        cpu.regs.a = 0xF0;
        cpu.set_flag(Flag::C, true);
        cpu.alu_or(0x0F);
        assert_eq!(cpu.regs.a, 0xFF);
        assert!(!cpu.get_flag(Flag::H));
        assert!(!cpu.get_flag(Flag::C));

        cpu.regs.a = 0xFF;
        cpu.alu_xor(0xFF);
        assert!(cpu.get_flag(Flag::Z));
        assert!(!cpu.get_flag(Flag::H));
        assert!(!cpu.get_flag(Flag::C));
    }

    #[test]
    fn inc_dec_preserve_carry() {
        let mut cpu = Cpu::new();
        cpu.set_flag(Flag::C, true);
        let result = cpu.alu_inc8(0xFF);
        assert_eq!(result, 0x00);
        assert!(cpu.get_flag(Flag::Z));
        assert!(cpu.get_flag(Flag::H));
        assert!(!cpu.get_flag(Flag::N));
        assert!(cpu.get_flag(Flag::C), "INC must not touch C");

        let result = cpu.alu_dec8(0x10);
        assert_eq!(result, 0x0F);
        assert!(cpu.get_flag(Flag::N));
        assert!(cpu.get_flag(Flag::H));
        assert!(cpu.get_flag(Flag::C), "DEC must not touch C");
    }

    #[test]
    fn add16_hl_boundaries_and_z_untouched() {
        let mut cpu = Cpu::new();
        cpu.set_flag(Flag::Z, true);
        cpu.regs.set_hl(0x0FFF);
        cpu.alu_add16_hl(0x0001);
        assert_eq!(cpu.regs.hl(), 0x1000);
        assert!(cpu.get_flag(Flag::H), "half carry out of bit 11");
        assert!(!cpu.get_flag(Flag::C));
        assert!(cpu.get_flag(Flag::Z), "16-bit add must not touch Z");

        cpu.regs.set_hl(0xFFFF);
        cpu.alu_add16_hl(0x0001);
        assert_eq!(cpu.regs.hl(), 0x0000);
        assert!(cpu.get_flag(Flag::C), "carry out of bit 15");
    }

    #[test]
    fn sp_signed_displacement_flags_from_low_byte() {
        let mut cpu = Cpu::new();
        let result = cpu.alu_add16_signed(0x00FF, 0x01);
        assert_eq!(result, 0x0100);
        assert!(cpu.get_flag(Flag::H));
        assert!(cpu.get_flag(Flag::C));
        assert!(!cpu.get_flag(Flag::Z));

        // Negative displacement.
        let result = cpu.alu_add16_signed(0x0100, 0xFF); // -1
        assert_eq!(result, 0x00FF);
    }

    #[test]
    fn accumulator_rotates_always_clear_z() {
        // RLCA with A=0 would be "zero result"; hardware still clears Z.
        let (mut cpu, mut bus) = cpu_with_program(&[0x07]); // RLCA
        cpu.regs.a = 0x00;
        cpu.set_flag(Flag::Z, true);
        cpu.step(&mut bus);
        assert!(!cpu.get_flag(Flag::Z));

        let (mut cpu, mut bus) = cpu_with_program(&[0x1F]); // RRA
        cpu.regs.a = 0x01;
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.a, 0x00);
        assert!(cpu.get_flag(Flag::C));
        assert!(!cpu.get_flag(Flag::Z));
    }

    #[test]
    fn cb_rlc_sets_z_on_zero_result() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xCB, 0x00]); // RLC B
        cpu.regs.b = 0x00;
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 8);
        assert!(cpu.get_flag(Flag::Z));
    }

    #[test]
    fn swap_twice_is_identity() {
        for value in 0..=255u8 {
            let (mut cpu, mut bus) = cpu_with_program(&[0xCB, 0x37, 0xCB, 0x37]); // SWAP A x2
            cpu.regs.a = value;
            cpu.step(&mut bus);
            assert_eq!(cpu.regs.a, value.rotate_left(4));
            cpu.step(&mut bus);
            assert_eq!(cpu.regs.a, value);
        }
    }

    #[test]
    fn bit_test_flags() {
        // BIT 7 on A=0x80 clears Z; BIT 0 sets Z. C stays untouched.
        let (mut cpu, mut bus) = cpu_with_program(&[0xCB, 0x7F, 0xCB, 0x47]); // BIT 7,A; BIT 0,A
        cpu.regs.a = 0x80;
        cpu.set_flag(Flag::C, true);

        cpu.step(&mut bus);
        assert!(!cpu.get_flag(Flag::Z));
        assert!(cpu.get_flag(Flag::H));
        assert!(!cpu.get_flag(Flag::N));
        assert!(cpu.get_flag(Flag::C));

        cpu.step(&mut bus);
        assert!(cpu.get_flag(Flag::Z));
        assert!(cpu.get_flag(Flag::C));
    }

    #[test]
    fn set_res_touch_no_flags() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xCB, 0xC0, 0xCB, 0x80]); // SET 0,B; RES 0,B
        cpu.regs.f = 0xF0;
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.b, 0x01);
        assert_eq!(cpu.regs.f, 0xF0);
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.b, 0x00);
        assert_eq!(cpu.regs.f, 0xF0);
    }

    #[test]
    fn cb_hl_forms_cost_more() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xCB, 0x46, 0xCB, 0x06]); // BIT 0,(HL); RLC (HL)
        cpu.regs.set_hl(0xC000);
        assert_eq!(cpu.step(&mut bus), 12);
        assert_eq!(cpu.step(&mut bus), 16);
    }

    #[test]
    fn sra_sign_extends_and_srl_does_not() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xCB, 0x28, 0xCB, 0x38]); // SRA B; SRL B
        cpu.regs.b = 0x81;
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.b, 0xC0);
        assert!(cpu.get_flag(Flag::C));
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.b, 0x60);
        assert!(!cpu.get_flag(Flag::C));
    }

    #[test]
    fn relative_jump_cycles_and_target() {
        // JR NZ,+2 taken, then not taken.
        let (mut cpu, mut bus) = cpu_with_program(&[0x20, 0x02]);
        cpu.set_flag(Flag::Z, false);
        assert_eq!(cpu.step(&mut bus), 12);
        assert_eq!(cpu.regs.pc, 0x0104);

        let (mut cpu, mut bus) = cpu_with_program(&[0x20, 0x02]);
        cpu.set_flag(Flag::Z, true);
        assert_eq!(cpu.step(&mut bus), 8);
        assert_eq!(cpu.regs.pc, 0x0102);
    }

    #[test]
    fn backward_relative_jump() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x18, 0xFE]); // JR -2: spin in place
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.pc, 0x0100);
    }

    #[test]
    fn call_then_ret_restores_pc_and_sp() {
        // CALL 0x0105 at 0x0100; RET at 0x0105.
        let (mut cpu, mut bus) = cpu_with_program(&[0xCD, 0x05, 0x01, 0x00, 0x00, 0xC9]);
        let sp_before = cpu.regs.sp;

        assert_eq!(cpu.step(&mut bus), 24);
        assert_eq!(cpu.regs.pc, 0x0105);
        // Return address 0x0103 pushed little-endian below the old SP.
        assert_eq!(cpu.regs.sp, sp_before - 2);
        assert_eq!(bus.memory[cpu.regs.sp as usize], 0x03);
        assert_eq!(bus.memory[cpu.regs.sp as usize + 1], 0x01);

        assert_eq!(cpu.step(&mut bus), 16);
        assert_eq!(cpu.regs.pc, 0x0103);
        assert_eq!(cpu.regs.sp, sp_before);
    }

    #[test]
    fn conditional_call_and_ret_costs() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xC4, 0x00, 0x02]); // CALL NZ,a16
        cpu.set_flag(Flag::Z, true);
        assert_eq!(cpu.step(&mut bus), 12);
        assert_eq!(cpu.regs.pc, 0x0103);

        let (mut cpu, mut bus) = cpu_with_program(&[0xC0]); // RET NZ
        cpu.set_flag(Flag::Z, true);
        assert_eq!(cpu.step(&mut bus), 8);
        cpu.regs.pc = 0x0100;
        bus.memory[0x0100] = 0xC0;
        cpu.set_flag(Flag::Z, false);
        assert_eq!(cpu.step(&mut bus), 20);
    }

    #[test]
    fn rst_pushes_and_jumps_to_vector() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xEF]); // RST 28h
        assert_eq!(cpu.step(&mut bus), 16);
        assert_eq!(cpu.regs.pc, 0x0028);
        assert_eq!(bus.memory[cpu.regs.sp as usize], 0x01);
    }

    #[test]
    fn ld_add_halt_scenario() {
        // LD A,5 ; ADD A,3 ; HALT
        let (mut cpu, mut bus) = cpu_with_program(&[0x3E, 0x05, 0xC6, 0x03, 0x76]);

        cpu.step(&mut bus);
        cpu.step(&mut bus);
        cpu.step(&mut bus);

        assert_eq!(cpu.regs.a, 8);
        assert!(!cpu.get_flag(Flag::Z));
        assert!(!cpu.get_flag(Flag::N));
        assert!(!cpu.get_flag(Flag::H));
        assert!(!cpu.get_flag(Flag::C));
        assert!(cpu.halted);
    }

    #[test]
    fn halted_cpu_idles_then_wakes_on_pending_request() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x76, 0x3C]); // HALT; INC A
        cpu.step(&mut bus);
        assert!(cpu.halted);

        // No pending interrupt: stays halted at 4 cycles per step.
        assert_eq!(cpu.step(&mut bus), 4);
        assert!(cpu.halted);

        // Request + enable with IME off: wake without servicing.
        bus.memory[0xFFFF] = 0x04;
        bus.memory[0xFF0F] = 0x04;
        assert_eq!(cpu.step(&mut bus), 4);
        assert!(!cpu.halted);

        cpu.step(&mut bus);
        assert_eq!(cpu.regs.a, 1);
        assert_eq!(bus.memory[0xFF0F], 0x04, "request bit must survive");
    }

    #[test]
    fn halt_bug_executes_next_byte_twice() {
        // HALT with IME=0 and a pending enabled interrupt, then INC A.
        let (mut cpu, mut bus) = cpu_with_program(&[0x76, 0x3C, 0x00]);
        bus.memory[0xFFFF] = 0x01;
        bus.memory[0xFF0F] = 0x01;

        cpu.step(&mut bus);
        assert!(!cpu.halted, "halt bug path must not halt");

        // First execution of INC A: PC does not move past it.
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.a, 1);
        assert_eq!(cpu.regs.pc, 0x0101);

        // Second execution of the same byte.
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.a, 2);
        assert_eq!(cpu.regs.pc, 0x0102);
    }

    #[test]
    fn interrupt_service_sequence() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x00]);
        cpu.ime = true;
        bus.memory[0xFFFF] = 0x04;
        bus.memory[0xFF0F] = 0x04;

        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 20);
        assert_eq!(cpu.regs.pc, 0x0050, "timer vector");
        assert!(!cpu.ime);
        assert_eq!(bus.memory[0xFF0F] & 0x04, 0);
        // Old PC pushed little-endian.
        assert_eq!(bus.memory[cpu.regs.sp as usize], 0x00);
        assert_eq!(bus.memory[cpu.regs.sp as usize + 1], 0x01);
    }

    #[test]
    fn interrupt_priority_lowest_index_first() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x00]);
        cpu.ime = true;
        // VBlank and Timer simultaneously requested and enabled.
        bus.memory[0xFFFF] = 0x05;
        bus.memory[0xFF0F] = 0x05;

        cpu.step(&mut bus);
        assert_eq!(cpu.regs.pc, 0x0040, "VBlank wins");
        assert_eq!(bus.memory[0xFF0F], 0x04, "only VBlank's bit cleared");
    }

    #[test]
    fn interrupt_wakes_and_services_when_ime_set() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x76]); // HALT
        cpu.ime = true;
        cpu.step(&mut bus);
        assert!(cpu.halted);

        bus.memory[0xFFFF] = 0x01;
        bus.memory[0xFF0F] = 0x01;
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 20);
        assert!(!cpu.halted);
        assert_eq!(cpu.regs.pc, 0x0040);
    }

    #[test]
    fn ei_enables_after_following_instruction() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xFB, 0x00, 0x00]); // EI; NOP; NOP
        bus.memory[0xFFFF] = 0x01;
        bus.memory[0xFF0F] = 0x01;

        cpu.step(&mut bus); // EI
        assert!(!cpu.ime);
        cpu.step(&mut bus); // NOP: IME still off, no service
        assert!(!cpu.ime);
        assert_eq!(cpu.regs.pc, 0x0102);

        // Third step: IME goes live and the interrupt is serviced.
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 20);
        assert_eq!(cpu.regs.pc, 0x0040);
    }

    #[test]
    fn di_cancels_pending_ei() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xFB, 0xF3, 0x00, 0x00]); // EI; DI; NOP; NOP
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert!(!cpu.ime);
    }

    #[test]
    fn stop_parks_cpu_and_resets_divider() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x10, 0x00, 0x3C]); // STOP; INC A
        bus.memory[0xFF04] = 0x55;

        cpu.step(&mut bus);
        assert!(cpu.is_stopped());
        assert_eq!(bus.memory[0xFF04], 0, "STOP resets DIV");

        // Parked: 4 cycles per step, no fetch.
        let pc = cpu.regs.pc;
        assert_eq!(cpu.step(&mut bus), 4);
        assert_eq!(cpu.regs.pc, pc);

        cpu.leave_stop();
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.a, 1);
    }

    #[test]
    fn ld_hl_sp_r8_and_ld_sp_hl() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xF8, 0xFE, 0xF9]); // LD HL,SP-2; LD SP,HL
        cpu.regs.sp = 0xFFFE;
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.hl(), 0xFFFC);
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.sp, 0xFFFC);
    }

    #[test]
    fn ld_a16_sp_writes_little_endian() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x08, 0x00, 0xC0]); // LD (0xC000),SP
        cpu.regs.sp = 0xBEEF;
        assert_eq!(cpu.step(&mut bus), 20);
        assert_eq!(bus.memory[0xC000], 0xEF);
        assert_eq!(bus.memory[0xC001], 0xBE);
    }

    #[test]
    fn hli_hld_addressing() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x22, 0x3A]); // LD (HL+),A; LD A,(HL-)
        cpu.regs.a = 0x77;
        cpu.regs.set_hl(0xC000);
        cpu.step(&mut bus);
        assert_eq!(bus.memory[0xC000], 0x77);
        assert_eq!(cpu.regs.hl(), 0xC001);

        bus.memory[0xC001] = 0x99;
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.a, 0x99);
        assert_eq!(cpu.regs.hl(), 0xC000);
    }

    #[test]
    fn daa_after_addition() {
        // 0x15 + 0x27 = 0x3C, DAA corrects to 0x42 (BCD 15 + 27).
        let (mut cpu, mut bus) = cpu_with_program(&[0x27]);
        cpu.regs.a = 0x15;
        cpu.alu_add(0x27, false);
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.a, 0x42);
    }

    #[test]
    fn jp_hl_costs_four_cycles() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xE9]);
        cpu.regs.set_hl(0x1234);
        assert_eq!(cpu.step(&mut bus), 4);
        assert_eq!(cpu.regs.pc, 0x1234);
    }

    #[test]
    fn high_page_loads() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xE0, 0x80, 0xF0, 0x80]); // LDH (80),A; LDH A,(80)
        cpu.regs.a = 0x42;
        assert_eq!(cpu.step(&mut bus), 12);
        assert_eq!(bus.memory[0xFF80], 0x42);

        cpu.regs.a = 0;
        cpu.step(&mut bus);
        assert_eq!(cpu.regs.a, 0x42);
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn nonexistent_opcode_panics() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xD3]);
        cpu.step(&mut bus);
    }
}
