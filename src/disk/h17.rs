//! H-88-1 hard-sectored disk controller card, carried at its port and
//! mounting surface: control/status registers, drive select and stepping,
//! and the write-protect latch for its on-board RAM page.  The serial
//! hard-sectored data path itself is not emulated; the data port reads
//! back zero.

use log::{debug, warn};

use super::drive::FloppyDrive;

pub const H17_NUM_PORTS: u8 = 4;
pub const H17_NUM_DRIVES: usize = 3;

// Port offsets.
const DATA: u8 = 0;
const STATUS_OR_FILL: u8 = 1;
const SYNC: u8 = 2;
const CONTROL: u8 = 3;

// Status-register flags.  The receive-side bits never assert without the
// serial data path.
const STAT_TX_BUFFER_EMPTY: u8 = 0x01;
const STAT_FILL_CHAR_SENT: u8 = 0x08;

// Control-register read flags.
const CTRL_HOLE_DETECT: u8 = 0x01;
const CTRL_TRACK_ZERO: u8 = 0x02;
const CTRL_WRITE_PROTECT: u8 = 0x04;
const CTRL_SYNC_DETECT: u8 = 0x08;

// Control-register write bits.
const CTRL_WRITE_GATE: u8 = 0x01;
const CTRL_DRIVE_SELECT_0: u8 = 0x02;
const CTRL_DRIVE_SELECT_1: u8 = 0x04;
const CTRL_DRIVE_SELECT_2: u8 = 0x08;
const CTRL_DIRECTION: u8 = 0x10;
const CTRL_STEP: u8 = 0x20;
const CTRL_MOTOR_ON: u8 = 0x40;
const CTRL_WRITE_ENABLE_RAM: u8 = 0x80;

pub struct H17 {
    drives: [Option<FloppyDrive>; H17_NUM_DRIVES],
    control_reg: u8,
    sync_char: u8,
    cur_drive: Option<usize>,
    direction_in: bool,
    last_step: bool,
    ram_write_enabled: bool,
    side: u8,
}

impl H17 {
    pub fn new() -> Self {
        Self {
            drives: Default::default(),
            control_reg: 0,
            sync_char: 0xFD,
            cur_drive: None,
            direction_in: false,
            last_step: false,
            ram_write_enabled: false,
            side: 0,
        }
    }

    pub fn reset(&mut self) {
        self.control_reg = 0;
        self.sync_char = 0xFD;
        self.cur_drive = None;
        self.direction_in = false;
        self.last_step = false;
        self.ram_write_enabled = false;
    }

    // ── Drive bay ─────────────────────────────────────────────

    pub fn connect_drive(&mut self, unit: usize, drive: FloppyDrive) -> bool {
        match self.drives.get_mut(unit) {
            Some(slot @ None) => {
                *slot = Some(drive);
                true
            }
            Some(_) => {
                warn!("H17 unit {} already has a drive", unit);
                false
            }
            None => {
                warn!("invalid H17 unit {}", unit);
                false
            }
        }
    }

    pub fn drive_mut(&mut self, unit: usize) -> Option<&mut FloppyDrive> {
        self.drives.get_mut(unit).and_then(|d| d.as_mut())
    }

    pub fn num_drives(&self) -> usize {
        H17_NUM_DRIVES
    }

    pub fn drive_media(&self, unit: usize) -> Option<String> {
        self.drives
            .get(unit)
            .and_then(|d| d.as_ref())
            .map(|d| d.media_name())
    }

    /// Side-select arrives from the general-purpose port, not from this
    /// card's own registers.
    pub fn select_side(&mut self, side: u8) {
        self.side = side;
        for drive in self.drives.iter_mut().flatten() {
            drive.select_side(side);
        }
    }

    /// The memory decoder consults this for the card's RAM page.
    pub fn ram_write_enabled(&self) -> bool {
        self.ram_write_enabled
    }

    // ── Port interface ────────────────────────────────────────

    pub fn port_in(&mut self, offset: u8) -> u8 {
        match offset {
            DATA => 0,
            STATUS_OR_FILL => {
                // The serial data path is not emulated; the transmitter is
                // forever ready and nothing ever arrives.
                STAT_TX_BUFFER_EMPTY | STAT_FILL_CHAR_SENT
            }
            SYNC => self.sync_char,
            CONTROL => {
                let mut val = 0;
                if let Some(drive) = self.cur_drive.and_then(|n| self.drives[n].as_ref()) {
                    if drive.index_pulse() {
                        val |= CTRL_HOLE_DETECT;
                    }
                    if drive.track_zero() {
                        val |= CTRL_TRACK_ZERO;
                    }
                    if drive.is_write_protect() {
                        val |= CTRL_WRITE_PROTECT;
                    }
                }
                val | CTRL_SYNC_DETECT
            }
            _ => {
                warn!("H17 read of unknown port offset {}", offset);
                0
            }
        }
    }

    pub fn port_out(&mut self, offset: u8, val: u8) {
        match offset {
            DATA | STATUS_OR_FILL => {
                // Write data / fill character: swallowed with the data path.
            }
            SYNC => self.sync_char = val,
            CONTROL => {
                debug!("H17 control {:#04x}", val);
                self.control_reg = val;

                if val & CTRL_WRITE_GATE != 0 {
                    debug!("H17 write gate");
                }

                self.cur_drive = if val & CTRL_DRIVE_SELECT_0 != 0 {
                    Some(0)
                } else if val & CTRL_DRIVE_SELECT_1 != 0 {
                    Some(1)
                } else if val & CTRL_DRIVE_SELECT_2 != 0 {
                    Some(2)
                } else {
                    None
                };

                self.direction_in = val & CTRL_DIRECTION != 0;

                let motor = val & CTRL_MOTOR_ON != 0;
                for drive in self.drives.iter_mut().flatten() {
                    drive.motor(motor);
                }

                self.ram_write_enabled = val & CTRL_WRITE_ENABLE_RAM != 0;

                // Step on the rising edge of the step bit.
                let step = val & CTRL_STEP != 0;
                if step && !self.last_step {
                    let inward = self.direction_in;
                    if let Some(drive) = self.cur_drive.and_then(|n| self.drives[n].as_mut()) {
                        drive.step(inward);
                    }
                }
                self.last_step = step;
            }
            _ => warn!("H17 write of unknown port offset {}", offset),
        }
    }

    pub fn tick(&mut self, ticks: u32) {
        for drive in self.drives.iter_mut().flatten() {
            drive.notification(ticks);
        }
    }

    pub fn dump_debug(&self) -> String {
        format!(
            "CTRL={:02x} SYNC={:02x} DRIVE={:?} SIDE={} RAM-WE={}\n",
            self.control_reg,
            self.sync_char,
            self.cur_drive,
            self.side,
            self.ram_write_enabled as u8
        )
    }
}

impl Default for H17 {
    fn default() -> Self {
        Self::new()
    }
}
