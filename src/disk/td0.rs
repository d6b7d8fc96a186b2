//! Teledisk (TD0) image support.
//!
//! Both variants are handled: "TD" (plain) and "td" (advanced compression).
//! Advanced compression is LZSS over a 4 KiB ring buffer with a 60-byte
//! look-ahead, entropy-coded by an adaptive Huffman tree of 314 codes; the
//! tree is rebuilt when the cumulative frequency saturates.  The decoder
//! runs as a pull state machine so the image decompresses on the fly.

use std::fs;

use log::{debug, warn};

use super::disk::FloppyDisk;
use super::sector::Sector;
use super::store::SectorStore;
use super::track::{DataRate, Density, Track};

// ── LZSS / adaptive Huffman parameters ────────────────────────

const SB_SIZE: usize = 4096; // ring buffer
const LA_SIZE: usize = 60; // look-ahead
const THRESHOLD: usize = 2; // minimum match length
const N_CHAR: usize = 256 - THRESHOLD + LA_SIZE; // 314 codes
const T_SIZE: usize = N_CHAR * 2 - 1;
const ROOT: usize = T_SIZE - 1;
const MAX_FREQ: u32 = 0x8000;

/// Upper six bits of a match position, indexed by the first input byte.
#[rustfmt::skip]
const D_CODE: [u8; 256] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
    0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03,
    0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x05, 0x05, 0x05, 0x05, 0x05, 0x05, 0x05, 0x05,
    0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07,
    0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x09, 0x09, 0x09, 0x09, 0x09, 0x09, 0x09, 0x09,
    0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x0A, 0x0B, 0x0B, 0x0B, 0x0B, 0x0B, 0x0B, 0x0B, 0x0B,
    0x0C, 0x0C, 0x0C, 0x0C, 0x0D, 0x0D, 0x0D, 0x0D, 0x0E, 0x0E, 0x0E, 0x0E, 0x0F, 0x0F, 0x0F, 0x0F,
    0x10, 0x10, 0x10, 0x10, 0x11, 0x11, 0x11, 0x11, 0x12, 0x12, 0x12, 0x12, 0x13, 0x13, 0x13, 0x13,
    0x14, 0x14, 0x14, 0x14, 0x15, 0x15, 0x15, 0x15, 0x16, 0x16, 0x16, 0x16, 0x17, 0x17, 0x17, 0x17,
    0x18, 0x18, 0x19, 0x19, 0x1A, 0x1A, 0x1B, 0x1B, 0x1C, 0x1C, 0x1D, 0x1D, 0x1E, 0x1E, 0x1F, 0x1F,
    0x20, 0x20, 0x21, 0x21, 0x22, 0x22, 0x23, 0x23, 0x24, 0x24, 0x25, 0x25, 0x26, 0x26, 0x27, 0x27,
    0x28, 0x28, 0x29, 0x29, 0x2A, 0x2A, 0x2B, 0x2B, 0x2C, 0x2C, 0x2D, 0x2D, 0x2E, 0x2E, 0x2F, 0x2F,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F,
];

/// Total encoded length of a position, indexed by the top nibble.
const D_LEN: [u8; 16] = [2, 2, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 6, 6, 6, 7];

// ── Pull decompressor ─────────────────────────────────────────

struct Td0Reader {
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
    advanced: bool,

    bit_buf: u32,
    bits: u32,

    freq: Vec<u32>,   // T_SIZE + 1, cumulative frequencies
    son: Vec<usize>,  // T_SIZE
    parent: Vec<usize>, // T_SIZE + N_CHAR

    ring: [u8; SB_SIZE],
    ring_pos: usize,

    // Mid-match state: copying `match_len` bytes starting at `match_pos`.
    in_match: bool,
    match_pos: usize,
    match_len: usize,
    match_done: usize,
}

impl Td0Reader {
    fn new(buf: Vec<u8>, start: usize, advanced: bool) -> Self {
        let mut r = Self {
            buf,
            pos: start,
            eof: false,
            advanced,
            bit_buf: 0,
            bits: 0,
            freq: vec![0; T_SIZE + 1],
            son: vec![0; T_SIZE],
            parent: vec![0; T_SIZE + N_CHAR],
            ring: [b' '; SB_SIZE],
            ring_pos: SB_SIZE - LA_SIZE,
            in_match: false,
            match_pos: 0,
            match_len: 0,
            match_done: 0,
        };
        if advanced {
            r.init_tree();
        }
        r
    }

    fn init_tree(&mut self) {
        for i in 0..N_CHAR {
            self.freq[i] = 1;
            self.son[i] = i + T_SIZE;
            self.parent[i + T_SIZE] = i;
        }
        let mut i = N_CHAR;
        let mut j = 0;
        while i <= ROOT {
            self.freq[i] = self.freq[j] + self.freq[j + 1];
            self.son[i] = j;
            self.parent[j] = i;
            self.parent[j + 1] = i;
            i += 1;
            j += 2;
        }
        self.freq[T_SIZE] = 0xFFFF;
        self.parent[ROOT] = 0;
    }

    fn raw_byte(&mut self) -> u32 {
        if self.pos < self.buf.len() {
            let c = self.buf[self.pos];
            self.pos += 1;
            c as u32
        } else {
            self.eof = true;
            0
        }
    }

    fn get_bit(&mut self) -> u32 {
        if self.bits == 0 {
            let c = self.raw_byte();
            self.bit_buf |= c << 8;
            self.bits = 7;
        } else {
            self.bits -= 1;
        }
        let t = (self.bit_buf >> 15) & 1;
        self.bit_buf = (self.bit_buf << 1) & 0xFFFF;
        t
    }

    fn get_aligned_byte(&mut self) -> u32 {
        if self.bits < 8 {
            let c = self.raw_byte();
            self.bit_buf |= c << (8 - self.bits);
        } else {
            self.bits -= 8;
        }
        let t = (self.bit_buf >> 8) & 0xFF;
        self.bit_buf = (self.bit_buf << 8) & 0xFFFF;
        t
    }

    /// Walk the tree from the root to a leaf, one input bit per branch.
    fn decode_char(&mut self) -> usize {
        let mut c = self.son[ROOT];
        while c < T_SIZE {
            let bit = self.get_bit() as usize;
            c = self.son[c + bit];
        }
        let code = c - T_SIZE;
        self.update(code);
        code
    }

    /// Decode a match position: upper six bits from the table, the rest of
    /// the bits read directly.
    fn decode_position(&mut self) -> usize {
        let mut i = self.get_aligned_byte() as usize;
        let c = (D_CODE[i] as usize) << 6;
        let mut j = D_LEN[i >> 4];
        while j > 1 {
            i = (i << 1) | self.get_bit() as usize;
            j -= 1;
        }
        (i & 0x3F) | c
    }

    /// Bump the frequency of a decoded code, keeping the tree ordered.
    fn update(&mut self, code: usize) {
        if self.freq[ROOT] == MAX_FREQ {
            self.rebuild_tree();
        }

        let mut c = self.parent[code + T_SIZE];
        loop {
            self.freq[c] += 1;
            let k = self.freq[c];

            // Swap with the first node to the right with a lower frequency.
            let mut l = c + 1;
            if k > self.freq[l] {
                while k > self.freq[l + 1] {
                    l += 1;
                }
                self.freq[c] = self.freq[l];
                self.freq[l] = k;

                let i = self.son[c];
                self.parent[i] = l;
                if i < T_SIZE {
                    self.parent[i + 1] = l;
                }
                let j = self.son[l];
                self.parent[j] = c;
                if j < T_SIZE {
                    self.parent[j + 1] = c;
                }
                self.son[l] = i;
                self.son[c] = j;
                c = l;
            }

            c = self.parent[c];
            if c == 0 {
                break;
            }
        }
    }

    /// Halve all leaf frequencies and reconstruct the tree bottom-up.
    fn rebuild_tree(&mut self) {
        let mut j = 0;
        for i in 0..T_SIZE {
            if self.son[i] >= T_SIZE {
                self.freq[j] = (self.freq[i] + 1) / 2;
                self.son[j] = self.son[i];
                j += 1;
            }
        }

        let mut i = 0;
        for j in N_CHAR..T_SIZE {
            let k = i + 1;
            let f = self.freq[i] + self.freq[k];
            self.freq[j] = f;

            let mut k = j - 1;
            while f < self.freq[k] {
                k -= 1;
            }
            k += 1;
            self.freq.copy_within(k..j, k + 1);
            self.freq[k] = f;
            self.son.copy_within(k..j, k + 1);
            self.son[k] = i;
            i += 2;
        }

        for i in 0..T_SIZE {
            let k = self.son[i];
            self.parent[k] = i;
            if k < T_SIZE {
                self.parent[k + 1] = i;
            }
        }
    }

    /// Next decompressed byte, or None at end of input.
    fn get_byte(&mut self) -> Option<u8> {
        if !self.advanced {
            if self.pos < self.buf.len() {
                let c = self.buf[self.pos];
                self.pos += 1;
                return Some(c);
            }
            return None;
        }

        loop {
            if self.eof {
                return None;
            }
            if !self.in_match {
                let c = self.decode_char();
                if c < 256 {
                    self.ring[self.ring_pos] = c as u8;
                    self.ring_pos = (self.ring_pos + 1) & (SB_SIZE - 1);
                    return Some(c as u8);
                }
                self.in_match = true;
                self.match_pos =
                    (self.ring_pos.wrapping_sub(self.decode_position() + 1)) & (SB_SIZE - 1);
                self.match_len = c - 255 + THRESHOLD;
                self.match_done = 0;
            }
            if self.match_done < self.match_len {
                let c = self.ring[(self.match_pos + self.match_done) & (SB_SIZE - 1)];
                self.match_done += 1;
                self.ring[self.ring_pos] = c;
                self.ring_pos = (self.ring_pos + 1) & (SB_SIZE - 1);
                return Some(c);
            }
            self.in_match = false;
        }
    }

    fn get_word(&mut self) -> Option<u16> {
        let lo = self.get_byte()? as u16;
        let hi = self.get_byte()? as u16;
        Some(lo | (hi << 8))
    }
}

// ── Image parsing ─────────────────────────────────────────────

pub struct Td0Disk {
    store: SectorStore,
    double_density: bool,
    name: String,
}

impl Td0Disk {
    pub fn open(path: &str, write_protect: bool) -> Result<Self, String> {
        let buf = fs::read(path).map_err(|e| format!("{}: {}", path, e))?;
        Self::from_bytes(buf, write_protect, path.to_string())
    }

    fn from_bytes(buf: Vec<u8>, write_protect: bool, name: String) -> Result<Self, String> {
        if buf.len() < 12 {
            return Err("file too short for a TD0 header".to_string());
        }

        let advanced = match (buf[0], buf[1]) {
            (b'T', b'D') => false,
            (b't', b'd') => true,
            _ => return Err("not a TD0 file".to_string()),
        };

        let data_rate = match buf[5] & 0x03 {
            0 => DataRate::Rate250Kbps,
            1 => DataRate::Rate300Kbps,
            2 => DataRate::Rate500Kbps,
            _ => {
                warn!("unknown TD0 data rate {}", buf[5]);
                DataRate::Unknown
            }
        };
        let double_density = buf[5] & 0x80 == 0;
        let has_comment = buf[7] & 0x80 != 0;
        debug!(
            "TD0 version {}.{} sides {} advanced {}",
            (buf[4] & 0xF0) >> 4,
            buf[4] & 0x0F,
            buf[9],
            advanced
        );

        let mut rd = Td0Reader::new(buf, 12, advanced);
        let mut store = SectorStore::new(write_protect);

        if has_comment {
            // CRC, length, six date bytes, then the comment text itself.
            rd.get_word().ok_or("truncated comment block")?;
            let comment_len = rd.get_word().ok_or("truncated comment block")?;
            for _ in 0..6 {
                rd.get_byte().ok_or("truncated comment block")?;
            }
            for _ in 0..comment_len {
                rd.get_byte().ok_or("truncated comment block")?;
            }
        }

        loop {
            let sectors = rd.get_byte().ok_or("truncated track header")?;
            if sectors == 255 {
                break;
            }
            let cylinder = rd.get_byte().ok_or("truncated track header")?;
            let side_raw = rd.get_byte().ok_or("truncated track header")?;
            let _crc = rd.get_byte().ok_or("truncated track header")?;

            let density = if side_raw & 0x80 != 0 {
                Density::Single
            } else {
                Density::Double
            };
            let side = side_raw & 1;

            let mut track = Track::new(side, cylinder);
            track.set_density(density);
            track.set_data_rate(data_rate);

            for _ in 0..sectors {
                let sec_cyl = rd.get_byte().ok_or("truncated sector header")?;
                let sec_head = rd.get_byte().ok_or("truncated sector header")?;
                let sec_num = rd.get_byte().ok_or("truncated sector header")?;
                let size_key = rd.get_byte().ok_or("truncated sector header")?;
                let flags = rd.get_byte().ok_or("truncated sector header")?;
                let _sec_crc = rd.get_byte().ok_or("truncated sector header")?;

                if size_key >= 7 {
                    return Err(format!("unknown TD0 sector size key {}", size_key));
                }
                let sec_size = 128usize << size_key;

                // Bits 4/5 flag headers with no data block following.
                if flags & 0x30 != 0 {
                    continue;
                }

                let block = read_sector_block(&mut rd, sec_size)?;
                let mut sect = Sector::new(sec_head & 1, sec_cyl, sec_num, block);
                sect.set_read_error(flags & 0x02 != 0);
                sect.set_deleted_dam(flags & 0x04 != 0);
                track.add_sector(sect);
            }

            store.add_track(track);
        }

        Ok(Self {
            store,
            double_density,
            name,
        })
    }
}

/// One sector data block: length word, encoding byte, then the payload in
/// raw, two-byte-repeat, or run-length form.
fn read_sector_block(rd: &mut Td0Reader, sec_size: usize) -> Result<Vec<u8>, String> {
    let block_size = rd.get_word().ok_or("truncated sector block")? as usize;
    // The length word counts the encoding byte.
    let block_size = block_size.saturating_sub(1);
    let encoding = rd.get_byte().ok_or("truncated sector block")?;

    let mut block = Vec::with_capacity(sec_size);
    match encoding {
        0 => {
            for _ in 0..block_size {
                block.push(rd.get_byte().ok_or("truncated raw block")?);
            }
        }
        1 => {
            while block.len() < sec_size {
                let run = rd.get_word().ok_or("truncated repeat block")? as usize;
                let a = rd.get_byte().ok_or("truncated repeat block")?;
                let b = rd.get_byte().ok_or("truncated repeat block")?;
                for _ in 0..run {
                    block.push(a);
                    block.push(b);
                }
            }
        }
        2 => {
            while block.len() < sec_size {
                let code = rd.get_byte().ok_or("truncated RLE block")?;
                if code == 0 {
                    let len = rd.get_byte().ok_or("truncated RLE block")? as usize;
                    for _ in 0..len {
                        block.push(rd.get_byte().ok_or("truncated RLE block")?);
                    }
                } else {
                    let chunk = code as usize * 2;
                    let repeat = rd.get_byte().ok_or("truncated RLE block")? as usize;
                    let start = block.len();
                    for _ in 0..chunk {
                        block.push(rd.get_byte().ok_or("truncated RLE block")?);
                    }
                    for r in 1..repeat {
                        for k in 0..chunk {
                            let b = block[start + (r - 1) * chunk + k];
                            block.push(b);
                        }
                    }
                }
            }
        }
        _ => return Err(format!("unknown TD0 sector encoding {}", encoding)),
    }

    block.resize(sec_size, 0);
    Ok(block)
}

impl FloppyDisk for Td0Disk {
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
        self.double_density
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
