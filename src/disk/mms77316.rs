//! Magnolia Microsystems 77316 soft-sectored disk controller card.
//!
//! Control port at the base address, WD1797 registers four ports up.  The
//! card supports eight drives and a "burst" transfer mode that holds the
//! CPU in bounded wait states on the data port instead of interrupting for
//! every byte; only the first DRQ of a command raises the interrupt line
//! when bursting.

use log::{debug, warn};

use crate::h89_emu::interrupt::InterruptBus;

use super::drive::FloppyDrive;
use super::wd1797::{FdcBus, LineOp, Wd1797};

pub const MMS77316_NUM_PORTS: u8 = 8;
pub const MMS77316_NUM_DRIVES: usize = 8;

const CONTROL: u8 = 0;
const WD1797_OFFSET: u8 = 4;
const DATA_PORT: u8 = WD1797_OFFSET + 3;

// Control-register bits.
const CTRL_DRIVE_SEL: u8 = 0x07;
/// Bit 2 of the drive select doubles as the 5.25" (1 MHz clock) select.
const CTRL_525_DRIVE_SEL: u8 = 0x04;
const CTRL_ENABLE_INT_REQ: u8 = 0x08;
/// Active low: burst mode is on while this bit is clear.
const CTRL_ENABLE_BURST_N: u8 = 0x20;
/// Active low: MFM recording while this bit is clear.
const CTRL_SET_MFM_N: u8 = 0x40;

pub struct Mms77316 {
    fdc: Wd1797,
    drives: [Option<FloppyDrive>; MMS77316_NUM_DRIVES],
    control_reg: u8,
    drq_count: u32,
}

impl Mms77316 {
    pub fn new() -> Self {
        Self {
            fdc: Wd1797::new(),
            drives: Default::default(),
            control_reg: 0,
            drq_count: 0,
        }
    }

    pub fn reset(&mut self, ic: &mut InterruptBus) {
        self.control_reg = 0;
        self.drq_count = 0;
        self.fdc.reset();
        ic.set_disk_intrq(false);
        ic.set_disk_drq(false);
    }

    // ── Drive bay ─────────────────────────────────────────────

    pub fn connect_drive(&mut self, unit: usize, drive: FloppyDrive) -> bool {
        match self.drives.get_mut(unit) {
            Some(slot @ None) => {
                *slot = Some(drive);
                true
            }
            Some(_) => {
                warn!("MMS77316 unit {} already has a drive", unit);
                false
            }
            None => {
                warn!("invalid MMS77316 unit {}", unit);
                false
            }
        }
    }

    pub fn drive_mut(&mut self, unit: usize) -> Option<&mut FloppyDrive> {
        self.drives.get_mut(unit).and_then(|d| d.as_mut())
    }

    pub fn num_drives(&self) -> usize {
        MMS77316_NUM_DRIVES
    }

    pub fn drive_media(&self, unit: usize) -> Option<String> {
        self.drives
            .get(unit)
            .and_then(|d| d.as_ref())
            .map(|d| d.media_name())
    }

    // ── Control-register policy ───────────────────────────────

    fn burst_mode(&self) -> bool {
        self.control_reg & CTRL_ENABLE_BURST_N == 0
    }

    fn intrq_allowed(&self) -> bool {
        self.control_reg & CTRL_ENABLE_INT_REQ != 0
    }

    fn drq_allowed(&self) -> bool {
        self.control_reg & CTRL_ENABLE_INT_REQ != 0
            && (self.control_reg & CTRL_ENABLE_BURST_N != 0 || self.drq_count < 1)
    }

    fn double_density(&self) -> bool {
        self.control_reg & CTRL_SET_MFM_N == 0
    }

    fn clock_period_ns(&self) -> u32 {
        if self.control_reg & CTRL_525_DRIVE_SEL != 0 {
            1000
        } else {
            500
        }
    }

    /// True while a data-port access should burn a wait state: burst mode
    /// with neither DRQ nor INTRQ pending yet.  The machine advances the
    /// clock one cycle per poll, bounded by the hardware's 16-cycle WAIT
    /// timeout.
    pub fn burst_wait(&self, offset: u8) -> bool {
        offset == DATA_PORT
            && self.burst_mode()
            && !self.fdc.drq_raised()
            && !self.fdc.intrq_raised()
    }

    // ── Port interface ────────────────────────────────────────

    pub fn port_in(&mut self, offset: u8, ic: &mut InterruptBus) -> u8 {
        if offset >= WD1797_OFFSET && offset < MMS77316_NUM_PORTS {
            let (val, sigs) = self.fdc.read(offset - WD1797_OFFSET);
            self.apply(&sigs, ic);
            val
        } else {
            // The control port is write-only.
            warn!("MMS77316 read of unknown port offset {}", offset);
            0
        }
    }

    pub fn port_out(&mut self, offset: u8, val: u8, ic: &mut InterruptBus) {
        if offset >= WD1797_OFFSET && offset < MMS77316_NUM_PORTS {
            let (fdc, mut bus) = self.split_fdc();
            let sigs = fdc.write(offset - WD1797_OFFSET, val, &mut bus);
            self.apply(&sigs, ic);
        } else if offset == CONTROL {
            debug!("MMS77316 control {:#04x}", val);
            self.control_reg = val;
            self.drq_count = 0;

            if val & CTRL_525_DRIVE_SEL != 0 {
                let unit = (val & CTRL_DRIVE_SEL) as usize;
                if let Some(drive) = self.drives[unit].as_mut() {
                    drive.motor(true);
                }
            }

            // Pending but masked requests surface once re-enabled.
            if self.intrq_allowed() && (self.fdc.intrq_raised() || self.fdc.drq_raised()) {
                ic.set_disk_intrq(self.fdc.intrq_raised());
                ic.set_disk_drq(self.fdc.drq_raised());
            }
        } else {
            warn!("MMS77316 write of unknown port offset {}", offset);
        }
    }

    pub fn tick(&mut self, ticks: u32, ic: &mut InterruptBus) {
        let (fdc, mut bus) = self.split_fdc();
        let sigs = fdc.notification(ticks, &mut bus);
        self.apply(&sigs, ic);
    }

    fn split_fdc(&mut self) -> (&mut Wd1797, FdcBus<'_>) {
        let unit = (self.control_reg & CTRL_DRIVE_SEL) as usize;
        let bus = FdcBus {
            drive: self.drives[unit].as_mut(),
            double_density: self.control_reg & CTRL_SET_MFM_N == 0,
            clock_period_ns: if self.control_reg & CTRL_525_DRIVE_SEL != 0 {
                1000
            } else {
                500
            },
            ready_tied_high: false,
        };
        (&mut self.fdc, bus)
    }

    fn apply(&mut self, sigs: &[LineOp], ic: &mut InterruptBus) {
        for op in sigs {
            match op {
                LineOp::RaiseIntrq => {
                    self.drq_count = 0;
                    if self.intrq_allowed() {
                        ic.set_disk_intrq(true);
                    }
                }
                LineOp::LowerIntrq => ic.set_disk_intrq(false),
                LineOp::RaiseDrq => {
                    if self.drq_allowed() {
                        self.drq_count += 1;
                        ic.set_disk_drq(true);
                    }
                }
                LineOp::LowerDrq => ic.set_disk_drq(false),
            }
        }
    }

    pub fn dump_debug(&self) -> String {
        format!(
            "CTRL={:02x} CLK={}ns DD={}\n{}",
            self.control_reg,
            self.clock_period_ns(),
            self.double_density() as u8,
            self.fdc.dump_debug()
        )
    }
}

impl Default for Mms77316 {
    fn default() -> Self {
        Self::new()
    }
}
