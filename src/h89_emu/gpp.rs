//! General-purpose port (octal 362): SW501 dip switches on reads, the
//! motherboard mode latch on writes.

use log::debug;

pub const GPP_BASE: u8 = 0xF2;
pub const GPP_NUM_PORTS: u8 = 1;

// Output-latch bits.
pub const GPP_SINGLE_STEP_INT: u8 = 0x01;
pub const GPP_ENABLE_TIMER: u8 = 0x02;
pub const GPP_SPEED_SELECT: u8 = 0x10;
pub const GPP_DISABLE_ROM: u8 = 0x20;
pub const GPP_H17_SIDE_SELECT: u8 = 0x40;

/// Side effects of a latch write, applied by the machine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GppEffects {
    pub timer_int_enabled: bool,
    pub rom_disabled: Option<bool>,
    pub h17_side: u8,
    pub fast_speed: Option<bool>,
}

pub struct GeneralPurposePort {
    dip_switches: u8,
    port_bits: u8,
}

impl GeneralPurposePort {
    /// `dip_switches` is SW501; configuration gives it as a binary literal.
    pub fn new(dip_switches: u8) -> Self {
        Self {
            dip_switches,
            port_bits: 0,
        }
    }

    pub fn reset(&mut self) -> GppEffects {
        // The switches survive reset; the latch does not.
        self.write(0)
    }

    pub fn read(&self) -> u8 {
        self.dip_switches
    }

    pub fn write(&mut self, val: u8) -> GppEffects {
        let diffs = self.port_bits ^ val;
        self.port_bits = val;

        if val & GPP_SINGLE_STEP_INT != 0 {
            debug!("single-step interrupt requested (not implemented)");
        }

        GppEffects {
            timer_int_enabled: val & GPP_ENABLE_TIMER != 0,
            rom_disabled: if diffs & GPP_DISABLE_ROM != 0 {
                Some(val & GPP_DISABLE_ROM != 0)
            } else {
                None
            },
            h17_side: ((val & GPP_H17_SIDE_SELECT) != 0) as u8,
            fast_speed: if diffs & GPP_SPEED_SELECT != 0 {
                Some(val & GPP_SPEED_SELECT != 0)
            } else {
                None
            },
        }
    }

    pub fn port_bits(&self) -> u8 {
        self.port_bits
    }

    pub fn dump_debug(&self) -> String {
        format!(
            "GPP-SW501={:08b} GPP-OUT={:08b}\n",
            self.dip_switches, self.port_bits
        )
    }
}
