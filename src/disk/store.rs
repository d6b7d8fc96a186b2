//! In-memory sector store backing the track-structured image formats
//! (IMD, TD0).  Holds parsed tracks per side and implements the byte-wise
//! streaming state machine of the drive data channel.

use log::{debug, warn};

use super::disk::TrackMapping;
use super::format;
use super::track::{Density, Track};

/// Sector probe values with special meaning on the data channel.
const SECTOR_ID_FIELD: u8 = 0xFD;
const SECTOR_WHOLE_TRACK: u8 = 0xFF;
const SECTOR_WHOLE_TRACK_ALT: u8 = 0xFE;

pub struct SectorStore {
    tracks: [Vec<Track>; 2],
    mapping: TrackMapping,
    media_tracks: u8,
    write_protect: bool,
    double_density: bool,

    // Streaming cursor, valid after a successful address-mark probe.
    cur_side: usize,
    cur_track: usize,
    cur_sector: u8,
    data_pos: usize,
    cur_len: usize,
    cur_size_code: u8,
}

impl SectorStore {
    pub fn new(write_protect: bool) -> Self {
        Self {
            tracks: [Vec::new(), Vec::new()],
            mapping: TrackMapping::Direct,
            media_tracks: 0,
            write_protect,
            double_density: false,
            cur_side: 0,
            cur_track: 0,
            cur_sector: 0,
            data_pos: 0,
            cur_len: 0,
            cur_size_code: 0,
        }
    }

    pub fn add_track(&mut self, track: Track) {
        let side = (track.side() & 1) as usize;
        if track.number() >= self.media_tracks {
            self.media_tracks = track.number() + 1;
        }
        if track.density() == Density::Double {
            self.double_density = true;
        }
        debug!(
            "track {}:{} sectors {} rate {:?}",
            side,
            track.number(),
            track.max_sectors(),
            track.data_rate()
        );
        self.tracks[side].push(track);
    }

    pub fn media_tracks(&self) -> u8 {
        self.media_tracks
    }

    pub fn write_protect(&self) -> bool {
        self.write_protect
    }

    pub fn double_density(&self) -> bool {
        self.double_density
    }

    pub fn set_drive_tracks(&mut self, drive_tracks: u8) {
        self.mapping = TrackMapping::for_counts(drive_tracks, self.media_tracks);
    }

    pub fn real_track(&self, track: u8) -> u8 {
        self.mapping.to_media(track)
    }

    pub fn max_sectors(&self, side: u8, track: u8) -> u8 {
        self.track_ref(side, self.mapping.to_media(track))
            .map(|t| t.max_sectors())
            .unwrap_or(0)
    }

    fn track_ref(&self, side: u8, media_track: u8) -> Option<&Track> {
        self.tracks[(side & 1) as usize]
            .iter()
            .find(|t| t.number() == media_track)
    }

    fn track_pos(&self, side: u8, media_track: u8) -> Option<usize> {
        self.tracks[(side & 1) as usize]
            .iter()
            .position(|t| t.number() == media_track)
    }

    /// Park the streaming cursor on a sector.  Fails when the track or
    /// sector does not exist on the media.
    pub fn seek_sector(&mut self, side: u8, track: u8, sector: u8) -> bool {
        let media_track = self.mapping.to_media(track);
        let Some(pos) = self.track_pos(side, media_track) else {
            return false;
        };
        let trk = &self.tracks[(side & 1) as usize][pos];
        let Some(sect) = trk.find_sector(sector) else {
            return false;
        };
        if sect.head() != (side & 1) || sect.track() != media_track {
            warn!(
                "sector ID mismatch: media {}:{} vs ID {}:{}",
                side,
                media_track,
                sect.head(),
                sect.track()
            );
            return false;
        }
        let len = sect.len();
        let Some(code) = format::size_code(len as u16) else {
            warn!("unsupported sector size {}", len);
            return false;
        };
        if sect.deleted_dam() {
            debug!("sector {}:{}:{} carries a deleted data mark", side, track, sector);
        }
        self.cur_side = (side & 1) as usize;
        self.cur_track = pos;
        self.cur_sector = sector;
        self.cur_len = len;
        self.cur_size_code = code;
        self.data_pos = 0;
        true
    }

    pub fn has_sector(&self, side: u8, track: u8, sector: u8) -> bool {
        let media_track = self.mapping.to_media(track);
        self.track_ref(side, media_track)
            .and_then(|t| t.find_sector(sector))
            .is_some()
    }

    // ── Data channel ──────────────────────────────────────────

    pub fn read_data(&mut self, track: u8, side: u8, sector: u8, in_sector: i32) -> i32 {
        if in_sector < 0 {
            return match sector {
                SECTOR_ID_FIELD => format::ID_AM,
                SECTOR_WHOLE_TRACK => format::INDEX_AM,
                _ if self.seek_sector(side, track, sector) => format::DATA_AM,
                _ => format::NO_DATA,
            };
        }

        match sector {
            SECTOR_ID_FIELD => self.read_id_field(track, side, in_sector),
            SECTOR_WHOLE_TRACK => {
                // Gap/mark reconstruction is not stored for these formats;
                // the raw track reads back as filler until the CRC point.
                let track_len = self.nominal_track_len();
                if (in_sector as usize) < track_len {
                    0
                } else {
                    format::CRC
                }
            }
            _ => {
                let trk = &self.tracks[self.cur_side][self.cur_track];
                let cur = trk.find_sector(self.cur_sector);
                if self.data_pos < self.cur_len {
                    match cur.and_then(|s| s.read(self.data_pos)) {
                        Some(b) => {
                            self.data_pos += 1;
                            b as i32
                        }
                        None => format::ERROR,
                    }
                } else if cur.map(|s| s.read_error()).unwrap_or(false) {
                    // The recorded data CRC was bad when the image was made.
                    debug!("sector done with read error {} {} {}", track, side, sector);
                    format::ERROR
                } else {
                    debug!("sector done {} {} {}", track, side, sector);
                    format::CRC
                }
            }
        }
    }

    /// The six ID-field bytes: track, side, sector, size code, CRC, CRC.
    fn read_id_field(&self, track: u8, side: u8, in_sector: i32) -> i32 {
        match in_sector {
            0 => self.real_track(track) as i32,
            1 => (side & 1) as i32,
            2 => 1, // synthesised; the probe did not pick a real sector
            3 => self.cur_size_code as i32,
            4 | 5 => 0, // CRC bytes not modelled
            _ => format::CRC,
        }
    }

    pub fn write_data(
        &mut self,
        track: u8,
        side: u8,
        sector: u8,
        in_sector: i32,
        data: u8,
        data_ready: bool,
    ) -> i32 {
        if self.write_protect {
            return format::ERROR;
        }

        if in_sector < 0 {
            return match sector {
                SECTOR_WHOLE_TRACK | SECTOR_WHOLE_TRACK_ALT => format::ERROR,
                _ if self.seek_sector(side, track, sector) => format::DATA_AM,
                _ => format::NO_DATA,
            };
        }

        if self.data_pos < self.cur_len {
            if !data_ready {
                return format::NO_DATA;
            }
            let trk = &mut self.tracks[self.cur_side][self.cur_track];
            let pos = self.data_pos;
            match trk.find_sector_mut(self.cur_sector) {
                Some(s) => {
                    if s.write(pos, data) {
                        self.data_pos += 1;
                        data as i32
                    } else {
                        format::ERROR
                    }
                }
                _ => format::ERROR,
            }
        } else {
            debug!("write done pos={} track {} sector {}", in_sector, track, sector);
            format::CRC
        }
    }

    fn nominal_track_len(&self) -> usize {
        // Raw single-density 5.25" capacity, doubled for MFM.
        if self.double_density {
            6400
        } else {
            3200
        }
    }
}

/// A bare store is itself usable as mounted media (scratch diskettes).
impl super::disk::FloppyDisk for SectorStore {
    fn read_data(&mut self, track: u8, side: u8, sector: u8, in_sector: i32) -> i32 {
        SectorStore::read_data(self, track, side, sector, in_sector)
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
        SectorStore::write_data(self, track, side, sector, in_sector, data, data_ready)
    }

    fn is_ready(&self) -> bool {
        self.media_tracks > 0
    }

    fn write_protect(&self) -> bool {
        self.write_protect
    }

    fn double_density(&self) -> bool {
        self.double_density
    }

    fn num_tracks(&self) -> u8 {
        self.media_tracks
    }

    fn max_sectors(&self, side: u8, track: u8) -> u8 {
        SectorStore::max_sectors(self, side, track)
    }

    fn set_drive_tracks(&mut self, drive_tracks: u8) {
        SectorStore::set_drive_tracks(self, drive_tracks);
    }

    fn real_track(&self, track: u8) -> u8 {
        SectorStore::real_track(self, track)
    }

    fn has_sector(&self, side: u8, track: u8, sector: u8) -> bool {
        SectorStore::has_sector(self, side, track, sector)
    }

    fn media_name(&self) -> String {
        "scratch".to_string()
    }
}
