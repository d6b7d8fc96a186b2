//! DDCB/FDCB group: bit operations on (IX+d)/(IY+d).
//!
//! The displacement byte comes before the inner opcode, and the inner
//! opcode is fetched as an operand.  Decode is by the top bits: rotates,
//! BIT, RES, SET.  Except for BIT, the computed byte is also stored back
//! into the register selected by the low three bits, an undocumented but
//! software-visible quirk of the silicon.

use super::{Bus, Z80};

impl Z80 {
    /// Called from the main dispatcher after `DD CB` / `FD CB`.
    pub(crate) fn dispatch_index_cb(&mut self, bus: &mut impl Bus) {
        let d = self.read_n(bus) as i8;
        self.idx_addr = self.hl_like().wrapping_add(d as u16);
        let opcode = self.read_n(bus);

        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let addr = self.idx_addr;

        match opcode >> 6 {
            0 => {
                let val = self.read_mem(bus, addr);
                let result = self.rot_op(y, val);
                self.tick(3);
                self.write_mem(bus, addr, result);
                if z != 6 {
                    self.set_core_reg8(z, result);
                }
            }
            1 => {
                let val = self.read_mem(bus, addr);
                self.tick(3);
                self.bit_test(y, val);
            }
            2 => {
                let val = self.read_mem(bus, addr) & !(1 << y);
                self.tick(3);
                self.write_mem(bus, addr, val);
                if z != 6 {
                    self.set_core_reg8(z, val);
                }
            }
            _ => {
                let val = self.read_mem(bus, addr) | (1 << y);
                self.tick(3);
                self.write_mem(bus, addr, val);
                if z != 6 {
                    self.set_core_reg8(z, val);
                }
            }
        }
    }
}
