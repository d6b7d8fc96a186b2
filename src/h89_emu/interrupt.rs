//! Interrupt logic.
//!
//! The H89 has no interrupt chip; discrete logic latches eight levels and
//! jams an `RST n` opcode onto the data bus during the acknowledge cycle.
//! The soft-sectored disk cards splice into that logic: the H-37 variant
//! answers a pending DRQ with an `EI` opcode, the MMS77316 variant answers
//! its level with `EI` for DRQ or `RST 30H` for INTRQ.

use log::{debug, warn};

/// Interrupt level of the 2 ms timer.
pub const TIMER_INT_LEVEL: u8 = 1;
/// Level the H-37 card's INTRQ is wired to.
pub const H37_INT_LEVEL: u8 = 4;
/// Level the MMS77316 card's INTRQ/DRQ are wired to.
pub const MMS77316_INT_LEVEL: u8 = 5;

const EI_OPCODE: u8 = 0xFB;
const RST30_OPCODE: u8 = 0xF7;

/// Card-specific modification of the acknowledge logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiskChain {
    Stock,
    H37 { drq: bool },
    Mms316 { drq: bool, intrq: bool },
}

pub struct InterruptBus {
    /// One bit per level 0-7.
    levels: u8,
    chain: DiskChain,
    /// While set (H-37 DRQ bursts), only the disk level reaches the CPU.
    blocked: bool,
}

impl InterruptBus {
    pub fn new() -> Self {
        Self {
            levels: 0,
            chain: DiskChain::Stock,
            blocked: false,
        }
    }

    /// Install the H-37 acknowledge logic.
    pub fn chain_h37(&mut self) {
        self.chain = DiskChain::H37 { drq: false };
    }

    /// Install the MMS77316 acknowledge logic.
    pub fn chain_mms316(&mut self) {
        self.chain = DiskChain::Mms316 {
            drq: false,
            intrq: false,
        };
    }

    pub fn reset(&mut self) {
        self.levels = 0;
        self.blocked = false;
        self.chain = match self.chain {
            DiskChain::Stock => DiskChain::Stock,
            DiskChain::H37 { .. } => DiskChain::H37 { drq: false },
            DiskChain::Mms316 { .. } => DiskChain::Mms316 {
                drq: false,
                intrq: false,
            },
        };
    }

    // ── Level latch ───────────────────────────────────────────

    pub fn raise_interrupt(&mut self, level: u8) {
        if level > 7 {
            warn!("invalid interrupt level {}", level);
            return;
        }
        self.levels |= 1 << level;
    }

    pub fn lower_interrupt(&mut self, level: u8) {
        if level > 7 {
            warn!("invalid interrupt level {}", level);
            return;
        }
        self.levels &= !(1 << level);
    }

    // ── Disk-card lines ───────────────────────────────────────

    pub fn set_disk_intrq(&mut self, raise: bool) {
        match &mut self.chain {
            DiskChain::Stock => {}
            DiskChain::H37 { .. } => {
                if raise {
                    self.raise_interrupt(H37_INT_LEVEL);
                } else {
                    self.lower_interrupt(H37_INT_LEVEL);
                }
            }
            DiskChain::Mms316 { drq, intrq } => {
                *intrq = raise;
                let any = *intrq || *drq;
                if any {
                    self.raise_interrupt(MMS77316_INT_LEVEL);
                } else {
                    self.lower_interrupt(MMS77316_INT_LEVEL);
                }
            }
        }
    }

    pub fn set_disk_drq(&mut self, raise: bool) {
        match &mut self.chain {
            DiskChain::Stock => {}
            DiskChain::H37 { drq } => *drq = raise,
            DiskChain::Mms316 { drq, intrq } => {
                *drq = raise;
                let any = *intrq || *drq;
                if any {
                    self.raise_interrupt(MMS77316_INT_LEVEL);
                } else {
                    self.lower_interrupt(MMS77316_INT_LEVEL);
                }
            }
        }
    }

    /// H-37 DRQ-interrupt mode masks every other level while active.
    pub fn block_interrupts(&mut self, block: bool) {
        self.blocked = block;
    }

    // ── CPU side ──────────────────────────────────────────────

    fn effective_levels(&self) -> u8 {
        if self.blocked {
            self.levels & (1 << H37_INT_LEVEL)
        } else {
            self.levels
        }
    }

    /// State of the INT line into the CPU.
    pub fn int_line(&self) -> bool {
        let chained = match self.chain {
            DiskChain::H37 { drq } => drq,
            _ => false,
        };
        self.effective_levels() != 0 || chained
    }

    /// The opcode byte the acknowledge cycle reads.  Cards get first
    /// refusal; the fallback is `RST n` for the highest pending level.
    pub fn read_data_bus(&mut self) -> u8 {
        match &mut self.chain {
            DiskChain::H37 { drq } if *drq => return EI_OPCODE,
            DiskChain::Mms316 { drq, intrq } => {
                let highest = highest_level(self.levels);
                if highest == Some(MMS77316_INT_LEVEL) && (*drq || *intrq) {
                    let op = if *intrq { RST30_OPCODE } else { EI_OPCODE };
                    // The acknowledge consumes a pending INTRQ.
                    *intrq = false;
                    debug!("MMS77316 interrupt acknowledge {:#04x}", op);
                    return op;
                }
            }
            _ => {}
        }

        match highest_level(self.effective_levels()) {
            Some(level) => 0xC7 | (level << 3),
            None => {
                warn!("interrupt acknowledge with empty latch");
                0xC7
            }
        }
    }

    pub fn dump_debug(&self) -> String {
        format!("INT-LEVELS={:08b} LINE={}\n", self.levels, self.int_line() as u8)
    }
}

impl Default for InterruptBus {
    fn default() -> Self {
        Self::new()
    }
}

fn highest_level(levels: u8) -> Option<u8> {
    if levels == 0 {
        None
    } else {
        Some(7 - levels.leading_zeros() as u8)
    }
}
