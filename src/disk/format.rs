//! Conventions of the drive ↔ controller data channel.
//!
//! The FDC reads the media one byte at a time through the drive.  Real data
//! bytes are 0..=255; everything else on the channel is a negative
//! pseudo-value: address marks, end-of-sector CRC, "nothing under the head".

/// Index address mark byte as written on the medium (FM clock 0xD7).
pub const INDEX_AM_BYTE: u8 = 0xFC;
/// ID address mark byte.
pub const ID_AM_BYTE: u8 = 0xFE;
/// Data address mark byte.
pub const DATA_AM_BYTE: u8 = 0xFB;

/// Generic failure on the data channel (no disk, density mismatch, ...).
pub const ERROR: i32 = -1;
/// End of sector / end of ID field: the CRC bytes passed under the head.
pub const CRC: i32 = -2;
/// No address mark found at the current position; keep the disk spinning.
pub const NO_DATA: i32 = -3;

/// Address-mark pseudo-values are the negated mark bytes.
pub const DATA_AM: i32 = -(DATA_AM_BYTE as i32);
pub const INDEX_AM: i32 = -(INDEX_AM_BYTE as i32);
pub const ID_AM: i32 = -(ID_AM_BYTE as i32);

/// Sector-length table indexed by [command L flag][ID-field size code].
pub const SECTOR_LENGTHS: [[u16; 4]; 2] = [
    [256, 512, 1024, 128], // L = 0
    [128, 256, 512, 1024], // L = 1
];

/// Size code (0..=3) for a sector length, as stored in an ID field.
pub fn size_code(len: u16) -> Option<u8> {
    match len {
        128 => Some(0),
        256 => Some(1),
        512 => Some(2),
        1024 => Some(3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_values_are_negative_and_distinct() {
        let all = [ERROR, CRC, NO_DATA, DATA_AM, INDEX_AM, ID_AM];
        for (i, v) in all.iter().enumerate() {
            assert!(*v < 0);
            for w in &all[i + 1..] {
                assert_ne!(v, w);
            }
        }
    }

    #[test]
    fn size_codes_round_trip() {
        for code in 0..4u8 {
            let len = SECTOR_LENGTHS[1][code as usize];
            assert_eq!(size_code(len), Some(code));
        }
        assert_eq!(size_code(300), None);
    }
}
