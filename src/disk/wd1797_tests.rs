//! Whole-controller tests: command sequences against a drive with mounted
//! media, paced through the clock exactly as the machine paces them.

use super::drive::{DriveType, FloppyDrive};
use super::sector::Sector;
use super::store::SectorStore;
use super::track::{Density, Track};
use super::wd1797::*;

const TPS: u64 = 2_048_000;
/// Small enough to catch every index edge and byte time.
const SLICE: u32 = 64;

/// A controller wired to one drive, the way a card wires it.
struct Rig {
    fdc: Wd1797,
    drive: FloppyDrive,
    intrq_raises: u32,
    drq_line: bool,
    intrq_line: bool,
}

/// Linear image contents: the byte at (track, sector, offset).
fn image_byte(track: u8, sector: u8, offset: usize) -> u8 {
    let pos = track as usize * 10 * 256 + (sector as usize - 1) * 256 + offset;
    (pos % 251) as u8
}

fn image_store(write_protect: bool) -> SectorStore {
    let mut store = SectorStore::new(write_protect);
    for t in 0..40u8 {
        let mut trk = Track::new(0, t);
        trk.set_density(Density::Single);
        for n in 1..=10u8 {
            let data: Vec<u8> = (0..256).map(|i| image_byte(t, n, i)).collect();
            trk.add_sector(Sector::new(0, t, n, data));
        }
        store.add_track(trk);
    }
    store
}

impl Rig {
    fn new() -> Self {
        let mut drive = FloppyDrive::new(DriveType::Fdd525SsSt, TPS);
        drive.insert_disk(Box::new(image_store(false)));
        drive.motor(true);
        Self {
            fdc: Wd1797::new(),
            drive,
            intrq_raises: 0,
            drq_line: false,
            intrq_line: false,
        }
    }

    fn bus(drive: &mut FloppyDrive) -> FdcBus<'_> {
        FdcBus {
            drive: Some(drive),
            double_density: false,
            clock_period_ns: 1000,
            ready_tied_high: true,
        }
    }

    fn apply(&mut self, sigs: &[LineOp]) {
        for op in sigs {
            match op {
                LineOp::RaiseIntrq => {
                    self.intrq_raises += 1;
                    self.intrq_line = true;
                }
                LineOp::LowerIntrq => self.intrq_line = false,
                LineOp::RaiseDrq => self.drq_line = true,
                LineOp::LowerDrq => self.drq_line = false,
            }
        }
    }

    fn command(&mut self, cmd: u8) {
        let mut bus = Self::bus(&mut self.drive);
        let sigs = self.fdc.write(COMMAND_REG, cmd, &mut bus);
        self.apply(&sigs);
    }

    fn write_reg(&mut self, reg: u8, val: u8) {
        let mut bus = Self::bus(&mut self.drive);
        let sigs = self.fdc.write(reg, val, &mut bus);
        self.apply(&sigs);
    }

    fn read_reg(&mut self, reg: u8) -> u8 {
        let (val, sigs) = self.fdc.read(reg);
        self.apply(&sigs);
        val
    }

    fn tick(&mut self, ticks: u32) {
        let mut bus = Self::bus(&mut self.drive);
        let sigs = self.fdc.notification(ticks, &mut bus);
        self.apply(&sigs);
    }

    /// Run the clock, collecting a data byte whenever DRQ rises.  Stops
    /// when the controller goes idle.
    fn run_collecting(&mut self, max_ticks: u64) -> Vec<u8> {
        let mut out = Vec::new();
        let mut elapsed = 0;
        while elapsed < max_ticks {
            self.tick(SLICE);
            elapsed += SLICE as u64;
            if self.drq_line {
                out.push(self.read_reg(DATA_REG));
            }
            if !self.fdc.busy() {
                break;
            }
        }
        out
    }

    /// Run the clock without touching the data register.
    fn run_ignoring(&mut self, max_ticks: u64) {
        let mut elapsed = 0;
        while elapsed < max_ticks && self.fdc.busy() {
            self.tick(SLICE);
            elapsed += SLICE as u64;
        }
    }

    fn seek_drive_to(&mut self, track: u8) {
        for _ in 0..track {
            self.drive.step(true);
        }
    }
}

#[test]
fn restore_steps_home_and_interrupts_once() {
    let mut rig = Rig::new();
    rig.seek_drive_to(39);
    assert!(!rig.drive.track_zero());

    rig.command(0x00);
    rig.run_ignoring(5_000_000);

    let status = rig.fdc_status();
    assert_eq!(status & STAT_BUSY, 0);
    assert_ne!(status & STAT_TRACK_ZERO, 0);
    assert_eq!(rig.read_reg(TRACK_REG), 0);
    assert!(rig.drive.track_zero());
    assert_eq!(rig.intrq_raises, 1);
}

impl Rig {
    /// Status without the INTRQ-lowering side effect of a real read.
    fn fdc_status(&mut self) -> u8 {
        let line = self.intrq_line;
        let raises = self.intrq_raises;
        let val = self.read_reg(STATUS_REG);
        self.intrq_line = line;
        self.intrq_raises = raises;
        val
    }
}

#[test]
fn read_sector_returns_the_image_bytes() {
    let mut rig = Rig::new();
    rig.write_reg(SECTOR_REG, 5);
    rig.command(0x80);

    let data = rig.run_collecting(4_000_000);

    assert_eq!(data.len(), 256);
    for (i, b) in data.iter().enumerate() {
        assert_eq!(*b, image_byte(0, 5, i), "byte {}", i);
    }
    let status = rig.fdc_status();
    assert_eq!(status & STAT_BUSY, 0);
    assert!(rig.intrq_raises >= 1);
    assert!(!rig.drq_line);
}

#[test]
fn seek_moves_head_and_updates_track_register() {
    let mut rig = Rig::new();
    rig.write_reg(DATA_REG, 12);
    rig.command(0x10);
    rig.run_ignoring(5_000_000);

    assert_eq!(rig.read_reg(TRACK_REG), 12);
    assert_eq!(rig.fdc_status() & STAT_BUSY, 0);
    assert!(!rig.drive.track_zero());
}

#[test]
fn write_then_read_round_trips() {
    let mut rig = Rig::new();
    let payload: Vec<u8> = (0..256u32).map(|i| (i * 3 % 256) as u8).collect();

    rig.write_reg(SECTOR_REG, 7);
    rig.command(0xA0);

    // Feed a byte whenever the controller asks for one.
    let mut fed = 0;
    let mut elapsed: u64 = 0;
    while rig.fdc.busy() && elapsed < 4_000_000 {
        rig.tick(SLICE);
        elapsed += SLICE as u64;
        if rig.drq_line && fed < payload.len() {
            rig.write_reg(DATA_REG, payload[fed]);
            fed += 1;
        }
    }
    assert_eq!(rig.fdc_status() & STAT_BUSY, 0);
    assert_eq!(rig.fdc_status() & STAT_WRITE_FAULT, 0);
    assert_eq!(fed, 256);

    rig.write_reg(SECTOR_REG, 7);
    rig.command(0x80);
    let data = rig.run_collecting(4_000_000);
    assert_eq!(data, payload);
}

#[test]
fn no_data_moves_before_settle_expires() {
    let mut rig = Rig::new();
    rig.write_reg(SECTOR_REG, 1);
    rig.command(0x80);

    // The controller holds off for its settle time after the command.
    let mut elapsed = 0u64;
    while elapsed < 999 {
        rig.tick(SLICE.min(999 - elapsed as u32));
        elapsed += SLICE as u64;
        assert!(!rig.drq_line, "DRQ before settle expired");
    }
}

#[test]
fn slow_host_sets_lost_data_but_completes() {
    let mut rig = Rig::new();
    rig.write_reg(SECTOR_REG, 2);
    rig.command(0x80);
    rig.run_ignoring(6_000_000);

    let status = rig.fdc_status();
    assert_eq!(status & STAT_BUSY, 0, "command hung on a slow host");
    assert_ne!(status & STAT_LOST_DATA, 0);

    // The same sector still reads cleanly on the next command.
    rig.write_reg(SECTOR_REG, 2);
    rig.command(0x80);
    let data = rig.run_collecting(4_000_000);
    assert_eq!(data.len(), 256);
    assert_eq!(rig.fdc_status() & STAT_LOST_DATA, 0);
}

#[test]
fn missing_sector_reports_record_not_found() {
    let mut rig = Rig::new();
    rig.write_reg(SECTOR_REG, 11); // the track only has 10
    rig.command(0x80);
    rig.run_ignoring(20_000_000);

    let status = rig.fdc_status();
    assert_eq!(status & STAT_BUSY, 0);
    assert_ne!(status & STAT_RECORD_NOT_FOUND, 0);
}

#[test]
fn write_protect_faults_the_write() {
    let mut rig = Rig::new();
    let mut drive = FloppyDrive::new(DriveType::Fdd525SsSt, TPS);
    drive.insert_disk(Box::new(image_store(true)));
    drive.motor(true);
    rig.drive = drive;

    rig.write_reg(SECTOR_REG, 1);
    rig.command(0xA0);
    rig.run_ignoring(4_000_000);

    let status = rig.fdc_status();
    assert_eq!(status & STAT_BUSY, 0);
    assert_ne!(status & STAT_WRITE_FAULT, 0);
    assert_ne!(status & STAT_WRITE_PROTECT, 0);
}

#[test]
fn read_address_streams_id_and_loads_sector_register() {
    let mut rig = Rig::new();
    rig.command(0xC0);
    let data = rig.run_collecting(4_000_000);

    assert_eq!(data.len(), 6);
    assert_eq!(data[0], 0); // track
    assert_eq!(data[1], 0); // side
    // chip quirk: the ID track number lands in the sector register
    assert_eq!(rig.read_reg(SECTOR_REG), 0);
    assert_eq!(rig.fdc_status() & STAT_BUSY, 0);
}

#[test]
fn force_interrupt_aborts_and_optionally_interrupts() {
    let mut rig = Rig::new();
    rig.write_reg(SECTOR_REG, 3);
    rig.command(0x80);
    assert!(rig.fdc.busy());

    rig.command(0xD0); // no trigger bits: just abort
    assert!(!rig.fdc.busy());
    assert_eq!(rig.intrq_raises, 0);

    rig.command(0xD8); // immediate interrupt
    assert!(!rig.fdc.busy());
    assert_eq!(rig.intrq_raises, 1);
}

#[test]
fn multiple_record_read_walks_the_track() {
    let mut rig = Rig::new();
    rig.write_reg(SECTOR_REG, 9);
    rig.command(0x90); // read with the multiple-record flag

    let data = rig.run_collecting(20_000_000);

    // Sectors 9 and 10, then completion at the track's end.
    assert_eq!(data.len(), 512);
    for (i, b) in data[..256].iter().enumerate() {
        assert_eq!(*b, image_byte(0, 9, i));
    }
    for (i, b) in data[256..].iter().enumerate() {
        assert_eq!(*b, image_byte(0, 10, i));
    }
    assert_eq!(rig.fdc_status() & STAT_BUSY, 0);
}
