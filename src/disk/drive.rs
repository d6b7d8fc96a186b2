//! A floppy drive: head position, side select, motor, index pulse, and the
//! byte position passing under the head.  The media decides density and
//! geometry; the drive only spins it.

use log::{debug, warn};

use super::disk::FloppyDisk;
use super::format;

/// Width of the index pulse in clock ticks (≈1 ms at 2.048 MHz).
const INDEX_PULSE_TICKS: u64 = 2000;

/// Supported drive mechanics.  5.25" drives come in 48 tpi (40 track) and
/// 96 tpi (80 track) variants; 8" drives are always 77 track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    Fdd525SsSt,
    Fdd525SsDt,
    Fdd525DsSt,
    Fdd525DsDt,
    Fdd8Ss,
    Fdd8Ds,
}

impl DriveType {
    /// Parse a configuration drive string such as `FDD_5_25_DS_DT`.
    pub fn from_config(s: &str) -> Option<Self> {
        match s {
            "FDD_5_25_SS_ST" => Some(Self::Fdd525SsSt),
            "FDD_5_25_SS_DT" => Some(Self::Fdd525SsDt),
            "FDD_5_25_DS_ST" => Some(Self::Fdd525DsSt),
            "FDD_5_25_DS_DT" => Some(Self::Fdd525DsDt),
            "FDD_8_SS" => Some(Self::Fdd8Ss),
            "FDD_8_DS" => Some(Self::Fdd8Ds),
            _ => None,
        }
    }

    fn heads(self) -> u8 {
        match self {
            Self::Fdd525SsSt | Self::Fdd525SsDt | Self::Fdd8Ss => 1,
            Self::Fdd525DsSt | Self::Fdd525DsDt | Self::Fdd8Ds => 2,
        }
    }

    fn tracks(self) -> u8 {
        match self {
            Self::Fdd525SsSt | Self::Fdd525DsSt => 40,
            Self::Fdd525SsDt | Self::Fdd525DsDt => 80,
            Self::Fdd8Ss | Self::Fdd8Ds => 77,
        }
    }

    fn media_size(self) -> u8 {
        match self {
            Self::Fdd8Ss | Self::Fdd8Ds => 8,
            _ => 5,
        }
    }
}

pub struct FloppyDrive {
    num_heads: u8,
    num_tracks: u8,
    media_size: u8,
    raw_sd_bytes_per_track: u32,
    ticks_per_rev: u64,

    track: u8,
    head_sel: u8,
    motor: bool,
    head_loaded: bool,
    index_pulse: bool,
    rotation: u64,

    disk: Option<Box<dyn FloppyDisk + Send>>,
}

impl FloppyDrive {
    pub fn new(kind: DriveType, ticks_per_second: u64) -> Self {
        let media_size = kind.media_size();
        // 8" media spins at 360 rpm with twice the raw capacity.
        let (rpm, raw_bytes) = if media_size == 8 {
            (360, 6400)
        } else {
            (300, 3200)
        };
        Self {
            num_heads: kind.heads(),
            num_tracks: kind.tracks(),
            media_size,
            raw_sd_bytes_per_track: raw_bytes,
            ticks_per_rev: ticks_per_second * 60 / rpm as u64,
            track: 0,
            head_sel: 0,
            motor: media_size == 8, // 8" spindles never stop
            head_loaded: media_size == 5,
            index_pulse: false,
            rotation: 0,
            disk: None,
        }
    }

    // ── Media ─────────────────────────────────────────────────

    pub fn insert_disk(&mut self, mut disk: Box<dyn FloppyDisk + Send>) {
        disk.set_drive_tracks(self.num_tracks);
        self.disk = Some(disk);
    }

    pub fn eject_disk(&mut self) {
        self.disk = None;
    }

    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    pub fn media_name(&self) -> String {
        self.disk.as_ref().map(|d| d.media_name()).unwrap_or_default()
    }

    pub fn is_ready(&self) -> bool {
        self.disk.as_ref().map(|d| d.is_ready()).unwrap_or(false)
    }

    pub fn is_write_protect(&self) -> bool {
        self.disk.as_ref().map(|d| d.write_protect()).unwrap_or(false)
    }

    // ── Mechanics ─────────────────────────────────────────────

    pub fn track_zero(&self) -> bool {
        self.track == 0
    }

    pub fn num_tracks(&self) -> u8 {
        self.num_tracks
    }

    pub fn step(&mut self, inward: bool) {
        if inward {
            if self.track < self.num_tracks - 1 {
                self.track += 1;
            }
        } else if self.track > 0 {
            self.track -= 1;
        }
        debug!("step {} -> track {}", if inward { "in" } else { "out" }, self.track);
    }

    pub fn select_side(&mut self, side: u8) {
        self.head_sel = side % self.num_heads;
    }

    /// No-op on 8" drives; their spindles run continuously.
    pub fn motor(&mut self, on: bool) {
        if self.media_size == 5 {
            self.motor = on;
        }
    }

    /// No-op on 5.25" drives; their heads ride the media whenever the
    /// motor runs.
    pub fn head_load(&mut self, load: bool) {
        if self.media_size == 8 {
            self.head_loaded = load;
        }
    }

    pub fn head_loaded(&self) -> bool {
        self.head_loaded
    }

    pub fn index_pulse(&self) -> bool {
        self.index_pulse
    }

    /// Clock callback: advance the platter.
    pub fn notification(&mut self, ticks: u32) {
        if self.disk.is_none() || !self.motor {
            return;
        }
        self.rotation = (self.rotation + ticks as u64) % self.ticks_per_rev;
        self.index_pulse = self.rotation < INDEX_PULSE_TICKS;
    }

    /// Byte position currently under the head.  The only clock-sensitive
    /// value the controller reads.
    pub fn char_pos(&self, double_density: bool) -> u64 {
        let mut bytes = self.raw_sd_bytes_per_track as u64;
        if double_density {
            bytes *= 2;
        }
        let ticks_per_byte = self.ticks_per_rev / bytes;
        self.rotation / ticks_per_byte
    }

    // ── Data channel ──────────────────────────────────────────

    /// Stream one byte from the media.  The drive substitutes its own head
    /// position for the controller's registers; the media is authoritative.
    pub fn read_data(&mut self, dd: bool, track: u8, side: u8, sector: u8, in_sector: i32) -> i32 {
        let (own_track, own_side) = (self.track, self.head_sel);
        let Some(disk) = self.disk.as_mut() else {
            return format::ERROR;
        };
        if dd != disk.double_density() {
            debug!("density mismatch (controller dd={})", dd);
            return format::ERROR;
        }
        if own_track != track || own_side != side {
            warn!(
                "controller/drive mismatch trk {}:{} side {}:{}",
                track, own_track, side, own_side
            );
        }
        disk.read_data(own_track, own_side, sector, in_sector)
    }

    pub fn write_data(
        &mut self,
        dd: bool,
        track: u8,
        side: u8,
        mut sector: u8,
        in_sector: i32,
        data: u8,
        data_ready: bool,
    ) -> i32 {
        let (own_track, own_side) = (self.track, self.head_sel);
        let Some(disk) = self.disk.as_mut() else {
            return format::ERROR;
        };
        if sector == 0xFF {
            // Track write: FM halves the byte budget, encoded in bit 0.
            if !dd {
                sector &= !1;
            }
        } else if dd != disk.double_density() {
            return format::ERROR;
        }
        if own_track != track || own_side != side {
            warn!(
                "controller/drive mismatch trk {}:{} side {}:{}",
                track, own_track, side, own_side
            );
        }
        disk.write_data(own_track, own_side, sector, in_sector, data, data_ready)
    }

    /// Current ID field as the verify pass sees it: media track number,
    /// synthesised sector, selected side.
    pub fn read_address(&self) -> Option<(u8, u8, u8)> {
        if !self.motor {
            return None;
        }
        let disk = self.disk.as_ref()?;
        Some((disk.real_track(self.track), 0, self.head_sel))
    }

    /// Quick directory check for the controller's verify pass.
    pub fn verify_track_sector(&self, track: u8, sector: u8) -> bool {
        let Some(disk) = self.disk.as_ref() else {
            return false;
        };
        if !self.motor {
            return false;
        }
        if disk.real_track(self.track) != track {
            return false;
        }
        disk.has_sector(self.head_sel, self.track, sector)
    }

    pub fn max_sectors(&self, side: u8, track: u8) -> u8 {
        self.disk
            .as_ref()
            .map(|d| d.max_sectors(side, track))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::sector::Sector;
    use crate::disk::store::SectorStore;
    use crate::disk::track::{Density, Track};

    const TPS: u64 = 2_048_000;

    fn drive_with_disk() -> FloppyDrive {
        let mut store = SectorStore::new(false);
        for t in 0..40u8 {
            let mut trk = Track::new(0, t);
            trk.set_density(Density::Single);
            for n in 1..=10u8 {
                trk.add_sector(Sector::filled(0, t, n, 256, t ^ n));
            }
            store.add_track(trk);
        }
        let mut drive = FloppyDrive::new(DriveType::Fdd525SsSt, TPS);
        drive.insert_disk(Box::new(store));
        drive.motor(true);
        drive
    }

    #[test]
    fn step_clamps_at_both_ends() {
        let mut d = FloppyDrive::new(DriveType::Fdd525SsSt, TPS);
        assert!(d.track_zero());
        d.step(false);
        assert!(d.track_zero());
        for _ in 0..100 {
            d.step(true);
        }
        assert_eq!(d.num_tracks() - 1, 39);
        d.step(true);
        assert!(!d.track_zero());
    }

    #[test]
    fn index_pulse_once_per_revolution() {
        let mut d = drive_with_disk();
        let ticks_per_rev = TPS * 60 / 300;
        let mut edges = 0;
        let mut last = false;
        // stop just short of the wrap; the wrap is the next revolution's edge
        for _ in 0..ticks_per_rev / 100 - 1 {
            d.notification(100);
            if d.index_pulse() && !last {
                edges += 1;
            }
            last = d.index_pulse();
        }
        assert_eq!(edges, 1);
    }

    #[test]
    fn char_pos_advances_with_rotation() {
        let mut d = drive_with_disk();
        assert_eq!(d.char_pos(false), 0);
        d.notification(1280); // exactly 10 bytes at 128 ticks/byte
        assert_eq!(d.char_pos(false), 10);
        assert_eq!(d.char_pos(true), 20);
    }

    #[test]
    fn motor_off_freezes_rotation() {
        let mut d = drive_with_disk();
        d.motor(false);
        d.notification(5000);
        assert_eq!(d.char_pos(false), 0);
    }

    #[test]
    fn density_mismatch_is_error() {
        let mut d = drive_with_disk();
        assert_eq!(d.read_data(true, 0, 0, 1, -1), format::ERROR);
        assert_eq!(d.read_data(false, 0, 0, 1, -1), format::DATA_AM);
    }

    #[test]
    fn drive_position_overrides_registers() {
        let mut d = drive_with_disk();
        d.step(true); // physically on track 1
        // controller believes track 0; media returns what is under the head
        assert_eq!(d.read_data(false, 0, 0, 3, -1), format::DATA_AM);
        assert_eq!(d.read_data(false, 0, 0, 3, 0), (1 ^ 3) as i32);
    }

    #[test]
    fn verify_checks_media_directory() {
        let d = drive_with_disk();
        assert!(d.verify_track_sector(0, 5));
        assert!(!d.verify_track_sector(1, 5));
        assert!(!d.verify_track_sector(0, 11));
    }

    #[test]
    fn head_load_only_matters_on_eight_inch() {
        let mut five = FloppyDrive::new(DriveType::Fdd525SsSt, TPS);
        assert!(five.head_loaded());
        five.head_load(false);
        assert!(five.head_loaded()); // 5.25" heads ride the media

        let mut eight = FloppyDrive::new(DriveType::Fdd8Ss, TPS);
        assert!(!eight.head_loaded());
        eight.head_load(true);
        assert!(eight.head_loaded());
        // and the 8" spindle never stops
        eight.motor(false);
        eight.insert_disk(Box::new(SectorStore::new(false)));
        eight.notification(100);
        assert_eq!(eight.char_pos(false), 1); // 53 ticks per byte at 360 rpm
    }

    #[test]
    fn eject_leaves_the_drive_not_ready() {
        let mut d = drive_with_disk();
        assert!(d.has_disk());
        assert!(d.is_ready());
        d.eject_disk();
        assert!(!d.has_disk());
        assert!(!d.is_ready());
        assert_eq!(d.read_data(false, 0, 0, 1, -1), format::ERROR);
    }
}
