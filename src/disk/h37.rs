//! Z-89-37 soft-sectored disk controller card.
//!
//! Four ports: control, interface control, and two register ports that mux
//! between the WD1797's command/status+data pair and its sector+track pair
//! depending on the interface-control latch.

use log::{debug, warn};

use crate::h89_emu::interrupt::InterruptBus;

use super::drive::FloppyDrive;
use super::wd1797::{self, FdcBus, LineOp, Wd1797};

pub const H37_NUM_PORTS: u8 = 4;
pub const H37_NUM_DRIVES: usize = 4;

// Port offsets.
const CONTROL: u8 = 0;
const INTERFACE_CONTROL: u8 = 1;
const STATUS_OR_SECTOR: u8 = 2;
const DATA_OR_TRACK: u8 = 3;

// Control-register bits.
const CTRL_DRIVE_0: u8 = 0x01;
const CTRL_DRIVE_1: u8 = 0x02;
const CTRL_DRIVE_2: u8 = 0x04;
const CTRL_DRIVE_3: u8 = 0x08;
const CTRL_ENABLE_INT_REQ: u8 = 0x10;
const CTRL_ENABLE_DRQ_INT: u8 = 0x20;
const CTRL_SET_MFM: u8 = 0x40;
const CTRL_MOTORS_ON: u8 = 0x80;

// Interface-control bits.
const IF_SELECT_SECTOR_TRACK: u8 = 0x01;

pub struct H37 {
    fdc: Wd1797,
    drives: [Option<FloppyDrive>; H37_NUM_DRIVES],

    interface_reg: u8,
    control_reg: u8,
    sector_track_access: bool,
    intrq_allowed: bool,
    drq_allowed: bool,
    motor_on: bool,
    mfm: bool,
    cur_drive: Option<usize>,
}

impl H37 {
    pub fn new() -> Self {
        Self {
            fdc: Wd1797::new(),
            drives: [None, None, None, None],
            interface_reg: 0,
            control_reg: 0,
            sector_track_access: false,
            intrq_allowed: false,
            drq_allowed: false,
            motor_on: false,
            mfm: false,
            cur_drive: None,
        }
    }

    pub fn reset(&mut self, ic: &mut InterruptBus) {
        self.interface_reg = 0;
        self.control_reg = 0;
        self.sector_track_access = false;
        self.intrq_allowed = false;
        self.drq_allowed = false;
        self.motor_on = false;
        self.mfm = false;
        self.fdc.reset();
        ic.set_disk_intrq(false);
        ic.set_disk_drq(false);
        ic.block_interrupts(false);
    }

    // ── Drive bay ─────────────────────────────────────────────

    pub fn connect_drive(&mut self, unit: usize, drive: FloppyDrive) -> bool {
        match self.drives.get_mut(unit) {
            Some(slot @ None) => {
                *slot = Some(drive);
                true
            }
            Some(_) => {
                warn!("H37 unit {} already has a drive", unit);
                false
            }
            None => {
                warn!("invalid H37 unit {}", unit);
                false
            }
        }
    }

    pub fn drive_mut(&mut self, unit: usize) -> Option<&mut FloppyDrive> {
        self.drives.get_mut(unit).and_then(|d| d.as_mut())
    }

    pub fn num_drives(&self) -> usize {
        H37_NUM_DRIVES
    }

    pub fn drive_media(&self, unit: usize) -> Option<String> {
        self.drives
            .get(unit)
            .and_then(|d| d.as_ref())
            .map(|d| d.media_name())
    }

    fn fdc_reg(&self, offset: u8) -> u8 {
        match (offset, self.sector_track_access) {
            (STATUS_OR_SECTOR, false) => wd1797::STATUS_REG,
            (STATUS_OR_SECTOR, true) => wd1797::SECTOR_REG,
            (DATA_OR_TRACK, false) => wd1797::DATA_REG,
            (_, true) => wd1797::TRACK_REG,
            _ => wd1797::DATA_REG,
        }
    }

    // ── Port interface ────────────────────────────────────────

    pub fn port_in(&mut self, offset: u8, ic: &mut InterruptBus) -> u8 {
        match offset {
            CONTROL => self.control_reg,
            INTERFACE_CONTROL => {
                if self.sector_track_access {
                    self.interface_reg
                } else {
                    0
                }
            }
            STATUS_OR_SECTOR | DATA_OR_TRACK => {
                let reg = self.fdc_reg(offset);
                let (val, sigs) = self.fdc.read(reg);
                self.apply(&sigs, ic);
                val
            }
            _ => {
                warn!("H37 read of unknown port offset {}", offset);
                0
            }
        }
    }

    pub fn port_out(&mut self, offset: u8, val: u8, ic: &mut InterruptBus) {
        match offset {
            CONTROL => {
                debug!("H37 control {:#04x}", val);
                self.control_reg = val;
                self.intrq_allowed = val & CTRL_ENABLE_INT_REQ != 0;
                self.drq_allowed = val & CTRL_ENABLE_DRQ_INT != 0;
                self.mfm = val & CTRL_SET_MFM != 0;
                self.set_motors(val & CTRL_MOTORS_ON != 0);

                if val & CTRL_DRIVE_0 != 0 {
                    self.cur_drive = Some(0);
                }
                if val & CTRL_DRIVE_1 != 0 {
                    self.cur_drive = Some(1);
                }
                if val & CTRL_DRIVE_2 != 0 {
                    self.cur_drive = Some(2);
                }
                if val & CTRL_DRIVE_3 != 0 {
                    self.cur_drive = Some(3);
                }

                // DRQ-interrupt mode steals the whole interrupt system.
                ic.block_interrupts(self.drq_allowed);
            }
            INTERFACE_CONTROL => {
                self.interface_reg = val;
                self.sector_track_access = val & IF_SELECT_SECTOR_TRACK != 0;
            }
            STATUS_OR_SECTOR | DATA_OR_TRACK => {
                let reg = if offset == STATUS_OR_SECTOR {
                    if self.sector_track_access {
                        wd1797::SECTOR_REG
                    } else {
                        wd1797::COMMAND_REG
                    }
                } else {
                    self.fdc_reg(offset)
                };
                let (fdc, mut bus) = self.split_fdc();
                let sigs = fdc.write(reg, val, &mut bus);
                self.apply(&sigs, ic);
            }
            _ => warn!("H37 write of unknown port offset {}", offset),
        }
    }

    pub fn tick(&mut self, ticks: u32, ic: &mut InterruptBus) {
        let (fdc, mut bus) = self.split_fdc();
        let sigs = fdc.notification(ticks, &mut bus);
        self.apply(&sigs, ic);
    }

    fn split_fdc(&mut self) -> (&mut Wd1797, FdcBus<'_>) {
        let drive = match self.cur_drive {
            Some(n) => self.drives[n].as_mut(),
            None => None,
        };
        let bus = FdcBus {
            drive,
            double_density: self.mfm,
            clock_period_ns: 1000,
            ready_tied_high: true,
        };
        (&mut self.fdc, bus)
    }

    fn set_motors(&mut self, on: bool) {
        if on == self.motor_on {
            return;
        }
        self.motor_on = on;
        for drive in self.drives.iter_mut().flatten() {
            drive.motor(on);
        }
    }

    fn apply(&mut self, sigs: &[LineOp], ic: &mut InterruptBus) {
        for op in sigs {
            match op {
                LineOp::RaiseIntrq => {
                    if self.intrq_allowed {
                        ic.set_disk_intrq(true);
                    }
                }
                LineOp::LowerIntrq => ic.set_disk_intrq(false),
                LineOp::RaiseDrq => {
                    if self.drq_allowed {
                        ic.set_disk_drq(true);
                    }
                }
                LineOp::LowerDrq => ic.set_disk_drq(false),
            }
        }
    }

    pub fn dump_debug(&self) -> String {
        format!(
            "CTRL={:02x} IFC={:02x}\n{}",
            self.control_reg,
            self.interface_reg,
            self.fdc.dump_debug()
        )
    }
}

impl Default for H37 {
    fn default() -> Self {
        Self::new()
    }
}
