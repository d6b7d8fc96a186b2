//! ImageDisk (IMD) image support.
//!
//! An IMD file is an ASCII comment terminated by 0x1A, followed by track
//! records: mode, cylinder, head (with map-presence flags in bits 7/6),
//! sector count, size code, the sector numbering map, optional cylinder and
//! head maps, then one type-tagged data block per sector.

use std::fs;

use log::{debug, warn};

use super::disk::FloppyDisk;
use super::sector::Sector;
use super::store::SectorStore;
use super::track::{DataRate, Density, Track};

pub struct ImdDisk {
    store: SectorStore,
    name: String,
}

impl ImdDisk {
    pub fn open(path: &str, write_protect: bool) -> Result<Self, String> {
        let buf = fs::read(path).map_err(|e| format!("{}: {}", path, e))?;
        let mut store = SectorStore::new(write_protect);
        parse_imd(&buf, &mut store)?;
        Ok(Self {
            store,
            name: path.to_string(),
        })
    }
}

fn mode_params(mode: u8) -> (Density, DataRate) {
    match mode {
        0 => (Density::Single, DataRate::Rate500Kbps),
        1 => (Density::Single, DataRate::Rate300Kbps),
        2 => (Density::Single, DataRate::Rate250Kbps),
        3 => (Density::Double, DataRate::Rate500Kbps),
        4 => (Density::Double, DataRate::Rate300Kbps),
        5 => (Density::Double, DataRate::Rate250Kbps),
        _ => {
            warn!("unknown IMD mode {}", mode);
            (Density::Unknown, DataRate::Unknown)
        }
    }
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], String> {
    if *pos + n > buf.len() {
        return Err("truncated IMD file".to_string());
    }
    let s = &buf[*pos..*pos + n];
    *pos += n;
    Ok(s)
}

fn parse_imd(buf: &[u8], store: &mut SectorStore) -> Result<(), String> {
    let mut pos = buf
        .iter()
        .position(|&b| b == 0x1A)
        .ok_or_else(|| "missing IMD comment terminator".to_string())?
        + 1;

    while pos < buf.len() {
        let hdr = take(buf, &mut pos, 5)?;
        let (density, data_rate) = mode_params(hdr[0]);
        let cyl = hdr[1];
        let head_raw = hdr[2];
        let num_sec = hdr[3] as usize;
        let size_key = hdr[4];

        let has_cyl_map = head_raw & 0x80 != 0;
        let has_head_map = head_raw & 0x40 != 0;
        let head = head_raw & 1;

        if size_key >= 7 {
            return Err(format!("unknown IMD sector size key {}", size_key));
        }
        let sector_size = 1usize << (size_key + 7);

        let mut track = Track::new(head, cyl);
        track.set_density(density);
        track.set_data_rate(data_rate);

        let order = take(buf, &mut pos, num_sec)?.to_vec();
        let cyl_map = if has_cyl_map {
            Some(take(buf, &mut pos, num_sec)?.to_vec())
        } else {
            None
        };
        let head_map = if has_head_map {
            Some(take(buf, &mut pos, num_sec)?.to_vec())
        } else {
            None
        };

        for i in 0..num_sec {
            let sector_type = take(buf, &mut pos, 1)?[0];
            match sector_type {
                0 => {
                    // Data unavailable; leave a hole in the track.
                    debug!("IMD cyl {} sector {} unavailable", cyl, order[i]);
                }
                1..=8 => {
                    let tag = sector_type - 1;
                    let compressed = tag & 0x01 != 0;
                    let deleted = tag & 0x02 != 0;
                    let read_error = tag & 0x04 != 0;

                    let data = if compressed {
                        let fill = take(buf, &mut pos, 1)?[0];
                        vec![fill; sector_size]
                    } else {
                        take(buf, &mut pos, sector_size)?.to_vec()
                    };

                    let id_cyl = cyl_map.as_ref().map_or(cyl, |m| m[i]);
                    let id_head = head_map.as_ref().map_or(head, |m| m[i] & 1);
                    let mut sect = Sector::new(id_head, id_cyl, order[i], data);
                    sect.set_deleted_dam(deleted);
                    sect.set_read_error(read_error);
                    track.add_sector(sect);
                }
                _ => return Err(format!("IMD sector type {} out of range", sector_type)),
            }
        }

        store.add_track(track);
    }

    Ok(())
}

impl FloppyDisk for ImdDisk {
    fn read_data(&mut self, track: u8, side: u8, sector: u8, in_sector: i32) -> i32 {
        self.store.read_data(track, side, sector, in_sector)
    }

    fn write_data(
        &mut self,
        track: u8,
        side: u8,
        sector: u8,
        in_sector: i32,
        data: u8,
        data_ready: bool,
    ) -> i32 {
        self.store
            .write_data(track, side, sector, in_sector, data, data_ready)
    }

    fn is_ready(&self) -> bool {
        self.store.media_tracks() > 0
    }

    fn write_protect(&self) -> bool {
        self.store.write_protect()
    }

    fn double_density(&self) -> bool {
        self.store.double_density()
    }

    fn num_tracks(&self) -> u8 {
        self.store.media_tracks()
    }

    fn max_sectors(&self, side: u8, track: u8) -> u8 {
        self.store.max_sectors(side, track)
    }

    fn set_drive_tracks(&mut self, drive_tracks: u8) {
        self.store.set_drive_tracks(drive_tracks);
    }

    fn real_track(&self, track: u8) -> u8 {
        self.store.real_track(track)
    }

    fn has_sector(&self, side: u8, track: u8, sector: u8) -> bool {
        self.store.has_sector(side, track, sector)
    }

    fn media_name(&self) -> String {
        self.name.clone()
    }
}
