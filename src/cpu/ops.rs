//! Main, CB-prefixed, and ED-prefixed opcode groups.
//!
//! Each instruction debits exactly its documented T-state count: four per
//! opcode fetch, three per memory byte, four per IO byte, plus the internal
//! cycles added explicitly per instruction.

use super::alu::{C_FLAG, H_FLAG, N_FLAG, P_FLAG, S_FLAG, Z_FLAG, ZSP};
use super::{Bus, Prefix, Z80};

impl Z80 {
    /// Extra internal cycles only present under an index prefix (the
    /// address adder works while the displacement settles).
    #[inline]
    fn idx_extra(&mut self, n: u32) {
        if self.prefix != Prefix::None {
            self.tick(n);
        }
    }

    pub(crate) fn dispatch_main(&mut self, bus: &mut impl Bus, opcode: u8) {
        match opcode {
            // ── Prefixes ──────────────────────────────────────
            0xDD => {
                self.prefix = Prefix::Dd;
                let next = self.read_inst(bus);
                self.dispatch_main(bus, next);
            }
            0xFD => {
                self.prefix = Prefix::Fd;
                let next = self.read_inst(bus);
                self.dispatch_main(bus, next);
            }
            0xCB => {
                if self.prefix == Prefix::None {
                    let inner = self.read_inst(bus);
                    self.dispatch_cb(bus, inner);
                } else {
                    self.dispatch_index_cb(bus);
                }
            }
            0xED => {
                // The index prefix does not survive into the ED group.
                self.prefix = Prefix::None;
                let inner = self.read_inst(bus);
                self.dispatch_ed(bus, inner);
            }

            // ── 8-bit loads ───────────────────────────────────
            0x40..=0x7F => {
                if opcode == 0x76 {
                    self.halted = true;
                    return;
                }
                let dst = (opcode >> 3) & 0x07;
                let src = opcode & 0x07;
                match (dst, src) {
                    (6, s) => {
                        let val = self.core_reg8(s);
                        let addr = self.indirect_addr(bus);
                        self.idx_extra(5);
                        self.write_mem(bus, addr, val);
                    }
                    (d, 6) => {
                        let addr = self.indirect_addr(bus);
                        self.idx_extra(5);
                        let val = self.read_mem(bus, addr);
                        self.set_core_reg8(d, val);
                    }
                    (d, s) => {
                        let val = self.reg8(s);
                        self.set_reg8(d, val);
                    }
                }
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                let val = self.read_n(bus);
                self.set_reg8((opcode >> 3) & 0x07, val);
            }
            0x36 => {
                let addr = self.indirect_addr(bus);
                let val = self.read_n(bus);
                self.idx_extra(2);
                self.write_mem(bus, addr, val);
            }
            0x0A => {
                let addr = self.bc();
                self.a = self.read_mem(bus, addr);
            }
            0x1A => {
                let addr = self.de();
                self.a = self.read_mem(bus, addr);
            }
            0x3A => {
                let addr = self.read_nn(bus);
                self.a = self.read_mem(bus, addr);
            }
            0x02 => {
                let addr = self.bc();
                let val = self.a;
                self.write_mem(bus, addr, val);
            }
            0x12 => {
                let addr = self.de();
                let val = self.a;
                self.write_mem(bus, addr, val);
            }
            0x32 => {
                let addr = self.read_nn(bus);
                let val = self.a;
                self.write_mem(bus, addr, val);
            }

            // ── 16-bit loads ──────────────────────────────────
            0x01 | 0x11 | 0x21 | 0x31 => {
                let val = self.read_nn(bus);
                self.set_pair_sp((opcode >> 4) & 0x03, val);
            }
            0x2A => {
                let addr = self.read_nn(bus);
                let val = self.read_word(bus, addr);
                self.set_hl_like(val);
            }
            0x22 => {
                let addr = self.read_nn(bus);
                let val = self.hl_like();
                self.write_word(bus, addr, val);
            }
            0xF9 => {
                self.sp = self.hl_like();
                self.tick(2);
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let val = self.pair_af((opcode >> 4) & 0x03);
                self.tick(1);
                self.push(bus, val);
            }
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let val = self.pop(bus);
                self.set_pair_af((opcode >> 4) & 0x03, val);
            }

            // ── Exchanges ─────────────────────────────────────
            0xEB => {
                let de = self.de();
                let hl = self.hl();
                self.set_de(hl);
                self.set_hl(de);
            }
            0x08 => {
                let af = self.af();
                self.set_af(self.af_alt);
                self.af_alt = af;
            }
            0xD9 => {
                let (bc, de, hl) = (self.bc(), self.de(), self.hl());
                self.set_bc(self.bc_alt);
                self.set_de(self.de_alt);
                self.set_hl(self.hl_alt);
                self.bc_alt = bc;
                self.de_alt = de;
                self.hl_alt = hl;
            }
            0xE3 => {
                let sp = self.sp;
                let mem = self.read_word(bus, sp);
                let reg = self.hl_like();
                self.write_word(bus, sp, reg);
                self.set_hl_like(mem);
                self.tick(3);
            }

            // ── 8-bit arithmetic and logic ────────────────────
            0x80..=0xBF => {
                let src = opcode & 0x07;
                let val = if src == 6 {
                    let addr = self.indirect_addr(bus);
                    self.idx_extra(5);
                    self.read_mem(bus, addr)
                } else {
                    self.reg8(src)
                };
                self.alu_op((opcode >> 3) & 0x07, val);
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let val = self.read_n(bus);
                self.alu_op((opcode >> 3) & 0x07, val);
            }
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x3C => {
                let code = (opcode >> 3) & 0x07;
                let val = self.reg8(code);
                let result = self.op_inc8(val);
                self.set_reg8(code, result);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x3D => {
                let code = (opcode >> 3) & 0x07;
                let val = self.reg8(code);
                let result = self.op_dec8(val);
                self.set_reg8(code, result);
            }
            0x34 => {
                let addr = self.indirect_addr(bus);
                self.idx_extra(5);
                let val = self.read_mem(bus, addr);
                let result = self.op_inc8(val);
                self.tick(1);
                self.write_mem(bus, addr, result);
            }
            0x35 => {
                let addr = self.indirect_addr(bus);
                self.idx_extra(5);
                let val = self.read_mem(bus, addr);
                let result = self.op_dec8(val);
                self.tick(1);
                self.write_mem(bus, addr, result);
            }

            // ── 16-bit arithmetic ─────────────────────────────
            0x09 | 0x19 | 0x29 | 0x39 => {
                let lhs = self.hl_like();
                let rhs = self.pair_sp((opcode >> 4) & 0x03);
                let result = self.op_add16(lhs, rhs);
                self.set_hl_like(result);
                self.tick(7);
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let code = (opcode >> 4) & 0x03;
                let val = self.pair_sp(code).wrapping_add(1);
                self.set_pair_sp(code, val);
                self.tick(2);
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let code = (opcode >> 4) & 0x03;
                let val = self.pair_sp(code).wrapping_sub(1);
                self.set_pair_sp(code, val);
                self.tick(2);
            }

            // ── Accumulator rotates and flag ops ──────────────
            0x07 => {
                let carry = self.a & 0x80 != 0;
                self.a = self.a.rotate_left(1);
                self.f &= !(H_FLAG | N_FLAG | C_FLAG);
                self.set_flag(C_FLAG, carry);
            }
            0x0F => {
                let carry = self.a & 0x01 != 0;
                self.a = self.a.rotate_right(1);
                self.f &= !(H_FLAG | N_FLAG | C_FLAG);
                self.set_flag(C_FLAG, carry);
            }
            0x17 => {
                let carry = self.a & 0x80 != 0;
                self.a = (self.a << 1) | self.flag(C_FLAG) as u8;
                self.f &= !(H_FLAG | N_FLAG | C_FLAG);
                self.set_flag(C_FLAG, carry);
            }
            0x1F => {
                let carry = self.a & 0x01 != 0;
                self.a = (self.a >> 1) | ((self.flag(C_FLAG) as u8) << 7);
                self.f &= !(H_FLAG | N_FLAG | C_FLAG);
                self.set_flag(C_FLAG, carry);
            }
            0x27 => self.op_daa(),
            0x2F => {
                self.a = !self.a;
                self.f |= H_FLAG | N_FLAG;
            }
            0x37 => {
                self.f = (self.f & (S_FLAG | Z_FLAG | P_FLAG)) | C_FLAG;
            }
            0x3F => {
                let carry = self.flag(C_FLAG);
                self.f &= !(N_FLAG | C_FLAG | H_FLAG);
                self.set_flag(H_FLAG, carry);
                self.set_flag(C_FLAG, !carry);
            }

            // ── Jumps, calls, returns ─────────────────────────
            0xC3 => {
                self.pc = self.read_nn(bus);
            }
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let target = self.read_nn(bus);
                if self.condition((opcode >> 3) & 0x07) {
                    self.pc = target;
                }
            }
            0xE9 => {
                self.pc = self.hl_like();
            }
            0x18 => {
                let d = self.read_n(bus) as i8;
                self.pc = self.pc.wrapping_add(d as u16);
                self.tick(5);
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let d = self.read_n(bus) as i8;
                if self.condition((opcode >> 3) & 0x03) {
                    self.pc = self.pc.wrapping_add(d as u16);
                    self.tick(5);
                }
            }
            0x10 => {
                let d = self.read_n(bus) as i8;
                self.tick(1);
                self.b = self.b.wrapping_sub(1);
                if self.b != 0 {
                    self.pc = self.pc.wrapping_add(d as u16);
                    self.tick(5);
                }
            }
            0xCD => {
                let target = self.read_nn(bus);
                self.tick(1);
                let pc = self.pc;
                self.push(bus, pc);
                self.pc = target;
            }
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let target = self.read_nn(bus);
                if self.condition((opcode >> 3) & 0x07) {
                    self.tick(1);
                    let pc = self.pc;
                    self.push(bus, pc);
                    self.pc = target;
                }
            }
            0xC9 => {
                self.pc = self.pop(bus);
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                self.tick(1);
                if self.condition((opcode >> 3) & 0x07) {
                    self.pc = self.pop(bus);
                }
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.tick(1);
                let pc = self.pc;
                self.push(bus, pc);
                self.pc = (opcode & 0x38) as u16;
            }

            // ── IO ────────────────────────────────────────────
            0xDB => {
                let port = self.read_n(bus);
                self.a = self.port_read(bus, port);
            }
            0xD3 => {
                let port = self.read_n(bus);
                let val = self.a;
                self.port_write(bus, port, val);
            }

            // ── CPU control ───────────────────────────────────
            0x00 => {}
            0xF3 => {
                self.iff0 = false;
                self.iff1 = false;
                self.iff2 = false;
            }
            0xFB => {
                // IFF1 follows one instruction later, through IFF0.
                self.iff0 = true;
                self.iff2 = true;
            }
        }
    }

    fn alu_op(&mut self, op: u8, val: u8) {
        match op {
            0 => self.op_add(val),
            1 => self.op_adc(val),
            2 => self.op_sub(val),
            3 => self.op_sbc(val),
            4 => self.op_and(val),
            5 => self.op_xor(val),
            6 => self.op_or(val),
            _ => self.op_cp(val),
        }
    }

    // ── CB group ──────────────────────────────────────────────

    fn dispatch_cb(&mut self, bus: &mut impl Bus, opcode: u8) {
        let z = opcode & 0x07;
        let y = (opcode >> 3) & 0x07;

        match opcode >> 6 {
            0 => {
                // Rotates and shifts.
                if z == 6 {
                    let addr = self.hl();
                    let val = self.read_mem(bus, addr);
                    let result = self.rot_op(y, val);
                    self.tick(1);
                    self.write_mem(bus, addr, result);
                } else {
                    let val = self.core_reg8(z);
                    let result = self.rot_op(y, val);
                    self.set_core_reg8(z, result);
                }
            }
            1 => {
                // BIT y,r / BIT y,(HL)
                let val = if z == 6 {
                    let addr = self.hl();
                    self.tick(1);
                    self.read_mem(bus, addr)
                } else {
                    self.core_reg8(z)
                };
                self.bit_test(y, val);
            }
            2 => {
                // RES y,r / RES y,(HL)
                if z == 6 {
                    let addr = self.hl();
                    let val = self.read_mem(bus, addr) & !(1 << y);
                    self.tick(1);
                    self.write_mem(bus, addr, val);
                } else {
                    let val = self.core_reg8(z) & !(1 << y);
                    self.set_core_reg8(z, val);
                }
            }
            _ => {
                // SET y,r / SET y,(HL)
                if z == 6 {
                    let addr = self.hl();
                    let val = self.read_mem(bus, addr) | (1 << y);
                    self.tick(1);
                    self.write_mem(bus, addr, val);
                } else {
                    let val = self.core_reg8(z) | (1 << y);
                    self.set_core_reg8(z, val);
                }
            }
        }
    }

    pub(crate) fn rot_op(&mut self, op: u8, val: u8) -> u8 {
        match op {
            0 => self.op_rlc(val),
            1 => self.op_rrc(val),
            2 => self.op_rl(val),
            3 => self.op_rr(val),
            4 => self.op_sla(val),
            5 => self.op_sra(val),
            6 => self.op_sll(val),
            _ => self.op_srl(val),
        }
    }

    pub(crate) fn bit_test(&mut self, bit: u8, val: u8) {
        let result = val & (1 << bit);
        self.f = (self.f & C_FLAG) | H_FLAG;
        self.set_flag(Z_FLAG, result == 0);
        self.set_flag(P_FLAG, result == 0);
        self.set_flag(S_FLAG, bit == 7 && result != 0);
    }

    // ── ED group ──────────────────────────────────────────────

    fn dispatch_ed(&mut self, bus: &mut impl Bus, opcode: u8) {
        match opcode {
            // IN r,(C) / IN F,(C)
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let port = self.c;
                let val = self.port_read(bus, port);
                self.f = (self.f & C_FLAG) | ZSP[val as usize];
                let y = (opcode >> 3) & 0x07;
                if y != 6 {
                    self.set_core_reg8(y, val);
                }
            }
            // OUT (C),r / OUT (C),0
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let y = (opcode >> 3) & 0x07;
                let val = if y == 6 { 0 } else { self.core_reg8(y) };
                let port = self.c;
                self.port_write(bus, port, val);
            }

            // 16-bit carry arithmetic on HL.
            0x42 | 0x52 | 0x62 | 0x72 => {
                let lhs = self.hl();
                let rhs = self.pair_sp((opcode >> 4) & 0x03);
                let result = self.op_sbc16(lhs, rhs);
                self.set_hl(result);
                self.tick(7);
            }
            0x4A | 0x5A | 0x6A | 0x7A => {
                let lhs = self.hl();
                let rhs = self.pair_sp((opcode >> 4) & 0x03);
                let result = self.op_adc16(lhs, rhs);
                self.set_hl(result);
                self.tick(7);
            }

            // LD (nn),dd / LD dd,(nn)
            0x43 | 0x53 | 0x63 | 0x73 => {
                let addr = self.read_nn(bus);
                let val = self.pair_sp((opcode >> 4) & 0x03);
                self.write_word(bus, addr, val);
            }
            0x4B | 0x5B | 0x6B | 0x7B => {
                let addr = self.read_nn(bus);
                let val = self.read_word(bus, addr);
                self.set_pair_sp((opcode >> 4) & 0x03, val);
            }

            // NEG and its mirrors.
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let val = self.a;
                self.a = 0;
                self.op_sub(val);
            }

            // RETN / RETI (mirrors behave like RETN).
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.iff1 = self.iff2;
                self.iff0 = self.iff2;
                self.pc = self.pop(bus);
            }

            // Interrupt modes.
            0x46 | 0x4E | 0x66 | 0x6E => self.im = 0,
            0x56 | 0x76 => self.im = 1,
            0x5E | 0x7E => self.im = 2,

            // Interrupt/refresh register transfers.
            0x47 => {
                self.i = self.a;
                self.tick(1);
            }
            0x4F => {
                self.r = self.a;
                self.tick(1);
            }
            0x57 => {
                self.a = self.i;
                self.f = (self.f & C_FLAG) | (ZSP[self.a as usize] & !P_FLAG);
                let iff2 = self.iff2;
                self.set_flag(P_FLAG, iff2);
                self.tick(1);
            }
            0x5F => {
                self.a = self.r;
                self.f = (self.f & C_FLAG) | (ZSP[self.a as usize] & !P_FLAG);
                let iff2 = self.iff2;
                self.set_flag(P_FLAG, iff2);
                self.tick(1);
            }

            // Nibble rotates through (HL).
            0x67 => {
                // RRD: low nibble of (HL) → low nibble of A, shuffling right
                let addr = self.hl();
                let mem = self.read_mem(bus, addr);
                let a = self.a;
                self.a = (a & 0xF0) | (mem & 0x0F);
                let new_mem = (mem >> 4) | (a << 4);
                self.tick(4);
                self.write_mem(bus, addr, new_mem);
                self.f = (self.f & C_FLAG) | ZSP[self.a as usize];
            }
            0x6F => {
                // RLD
                let addr = self.hl();
                let mem = self.read_mem(bus, addr);
                let a = self.a;
                self.a = (a & 0xF0) | (mem >> 4);
                let new_mem = (mem << 4) | (a & 0x0F);
                self.tick(4);
                self.write_mem(bus, addr, new_mem);
                self.f = (self.f & C_FLAG) | ZSP[self.a as usize];
            }

            // Block transfers.
            0xA0 => self.block_ld(bus, 1, false),
            0xA8 => self.block_ld(bus, -1, false),
            0xB0 => self.block_ld(bus, 1, true),
            0xB8 => self.block_ld(bus, -1, true),

            // Block compares.
            0xA1 => self.block_cp(bus, 1, false),
            0xA9 => self.block_cp(bus, -1, false),
            0xB1 => self.block_cp(bus, 1, true),
            0xB9 => self.block_cp(bus, -1, true),

            // Block IO.
            0xA2 => self.block_in(bus, 1, false),
            0xAA => self.block_in(bus, -1, false),
            0xB2 => self.block_in(bus, 1, true),
            0xBA => self.block_in(bus, -1, true),
            0xA3 => self.block_out(bus, 1, false),
            0xAB => self.block_out(bus, -1, false),
            0xB3 => self.block_out(bus, 1, true),
            0xBB => self.block_out(bus, -1, true),

            // Everything else in the ED space is a two-byte NOP.
            _ => {}
        }
    }

    fn block_ld(&mut self, bus: &mut impl Bus, dir: i16, repeat: bool) {
        let hl = self.hl();
        let de = self.de();
        let val = self.read_mem(bus, hl);
        self.write_mem(bus, de, val);
        self.set_hl(hl.wrapping_add(dir as u16));
        self.set_de(de.wrapping_add(dir as u16));
        let bc = self.bc().wrapping_sub(1);
        self.set_bc(bc);
        self.tick(2);

        self.f &= !(H_FLAG | N_FLAG | P_FLAG);
        self.set_flag(P_FLAG, bc != 0);

        if repeat && bc != 0 {
            self.pc = self.pc.wrapping_sub(2);
            self.tick(5);
        }
    }

    fn block_cp(&mut self, bus: &mut impl Bus, dir: i16, repeat: bool) {
        let hl = self.hl();
        let val = self.read_mem(bus, hl);
        let a = self.a;
        let result = a.wrapping_sub(val);
        self.set_hl(hl.wrapping_add(dir as u16));
        let bc = self.bc().wrapping_sub(1);
        self.set_bc(bc);
        self.tick(5);

        self.f = (self.f & C_FLAG) | N_FLAG;
        self.set_flag(S_FLAG, result & 0x80 != 0);
        self.set_flag(Z_FLAG, result == 0);
        self.set_flag(H_FLAG, (a & 0x0F) < (val & 0x0F));
        self.set_flag(P_FLAG, bc != 0);

        if repeat && bc != 0 && result != 0 {
            self.pc = self.pc.wrapping_sub(2);
            self.tick(5);
        }
    }

    fn block_in(&mut self, bus: &mut impl Bus, dir: i16, repeat: bool) {
        let port = self.c;
        let val = self.port_read(bus, port);
        let hl = self.hl();
        self.write_mem(bus, hl, val);
        self.set_hl(hl.wrapping_add(dir as u16));
        self.b = self.b.wrapping_sub(1);
        self.tick(1);

        self.f = (self.f & C_FLAG) | N_FLAG;
        let b = self.b;
        self.set_flag(Z_FLAG, b == 0);
        self.set_flag(S_FLAG, b & 0x80 != 0);

        if repeat && self.b != 0 {
            self.pc = self.pc.wrapping_sub(2);
            self.tick(5);
        }
    }

    fn block_out(&mut self, bus: &mut impl Bus, dir: i16, repeat: bool) {
        let hl = self.hl();
        let val = self.read_mem(bus, hl);
        self.b = self.b.wrapping_sub(1);
        let port = self.c;
        self.port_write(bus, port, val);
        self.set_hl(hl.wrapping_add(dir as u16));
        self.tick(1);

        self.f = (self.f & C_FLAG) | N_FLAG;
        let b = self.b;
        self.set_flag(Z_FLAG, b == 0);
        self.set_flag(S_FLAG, b & 0x80 != 0);

        if repeat && self.b != 0 {
            self.pc = self.pc.wrapping_sub(2);
            self.tick(5);
        }
    }
}
