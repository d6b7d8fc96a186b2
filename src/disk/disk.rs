//! The media side of the drive ↔ controller channel.
//!
//! A mounted image exposes sector payloads one byte at a time, framed by the
//! pseudo-values of [`super::format`]: `in_sector == -1` probes for the next
//! address mark, `0..len` streams the payload, past the end returns `CRC`.

use log::{info, warn};

use super::format;
use super::imd::ImdDisk;
use super::sector_image::SectorImageDisk;
use super::td0::Td0Disk;

/// Everything the drive needs from mounted media.
pub trait FloppyDisk {
    /// Stream one byte (or pseudo-value) from the given sector position.
    /// `sector` 0xFD probes/streams the ID field, 0xFF the whole track.
    fn read_data(&mut self, track: u8, side: u8, sector: u8, in_sector: i32) -> i32;

    /// Symmetric write path.  `data_ready` is the host-side data latch; a
    /// stale latch surfaces as `NO_DATA` so the controller can count misses.
    fn write_data(
        &mut self,
        track: u8,
        side: u8,
        sector: u8,
        in_sector: i32,
        data: u8,
        data_ready: bool,
    ) -> i32;

    fn is_ready(&self) -> bool;
    fn write_protect(&self) -> bool;
    fn double_density(&self) -> bool;
    fn num_tracks(&self) -> u8;
    fn max_sectors(&self, side: u8, track: u8) -> u8;

    /// Tell the media how many tracks the drive it sits in can address, so
    /// hypo/hyper-track stepping corrections can be applied.
    fn set_drive_tracks(&mut self, drive_tracks: u8);

    /// Drive-relative track → the track number recorded on the media.
    fn real_track(&self, track: u8) -> u8;

    /// Directory check used by the controller's verify pass.
    fn has_sector(&self, side: u8, track: u8, sector: u8) -> bool;

    fn media_name(&self) -> String;
}

// ── Geometry shared by every image flavour ────────────────────

/// Track-count relationship between media and drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackMapping {
    /// Media and drive agree.
    #[default]
    Direct,
    /// 40-track media in an 80-track drive: drive steps twice per track.
    Hypo,
    /// 80-track media in a 40-track drive: drive track counts double.
    Hyper,
}

impl TrackMapping {
    pub fn for_counts(drive_tracks: u8, media_tracks: u8) -> Self {
        if drive_tracks == media_tracks {
            TrackMapping::Direct
        } else if drive_tracks == 80 && media_tracks == 40 {
            TrackMapping::Hypo
        } else if drive_tracks == 40 && media_tracks == 80 {
            TrackMapping::Hyper
        } else {
            warn!(
                "unsupported drive/media track mix: {}/{}",
                drive_tracks, media_tracks
            );
            TrackMapping::Direct
        }
    }

    /// Drive-relative track number → media track number.
    pub fn to_media(self, track: u8) -> u8 {
        match self {
            TrackMapping::Direct => track,
            TrackMapping::Hypo => track / 2,
            TrackMapping::Hyper => track.saturating_mul(2),
        }
    }
}

// ── Mounting ──────────────────────────────────────────────────

/// An image spec is the whitespace-split mount argument list: path first,
/// then options.  The only option is `rw`, which clears write-protect.
pub fn load_disk_image(args: &[String]) -> Result<Box<dyn FloppyDisk + Send>, String> {
    let path = args.first().ok_or_else(|| "no file specified".to_string())?;
    let write_protect = !args[1..].iter().any(|a| a == "rw");

    let lower = path.to_lowercase();
    let disk: Box<dyn FloppyDisk + Send> = if lower.ends_with(".imd") {
        Box::new(ImdDisk::open(path, write_protect)?)
    } else if lower.ends_with(".td0") {
        Box::new(Td0Disk::open(path, write_protect)?)
    } else {
        Box::new(SectorImageDisk::open(path, write_protect)?)
    };

    info!(
        "mounted {}: tracks={} DD={} R{}",
        path,
        disk.num_tracks(),
        disk.double_density(),
        if disk.write_protect() { "O" } else { "W" }
    );
    Ok(disk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_mapping_corrections() {
        assert_eq!(TrackMapping::for_counts(40, 40), TrackMapping::Direct);
        assert_eq!(TrackMapping::for_counts(80, 40), TrackMapping::Hypo);
        assert_eq!(TrackMapping::for_counts(40, 80), TrackMapping::Hyper);
        assert_eq!(TrackMapping::Hypo.to_media(10), 5);
        assert_eq!(TrackMapping::Hyper.to_media(10), 20);
        assert_eq!(TrackMapping::Direct.to_media(10), 10);
    }
}
