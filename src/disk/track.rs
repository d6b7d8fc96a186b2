//! One track: an ordered collection of sectors plus recording parameters.

use super::sector::Sector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Unknown,
    Rate250Kbps,
    Rate300Kbps,
    Rate500Kbps,
}

/// FM (single) or MFM (double) recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Density {
    Unknown,
    Single,
    Double,
}

pub struct Track {
    side: u8,
    number: u8,
    sectors: Vec<Sector>,
    density: Density,
    data_rate: DataRate,
}

impl Track {
    pub fn new(side: u8, number: u8) -> Self {
        Self {
            side,
            number,
            sectors: Vec::new(),
            density: Density::Unknown,
            data_rate: DataRate::Unknown,
        }
    }

    pub fn add_sector(&mut self, sector: Sector) {
        self.sectors.push(sector);
    }

    pub fn set_density(&mut self, density: Density) {
        self.density = density;
    }

    pub fn set_data_rate(&mut self, rate: DataRate) {
        self.data_rate = rate;
    }

    pub fn side(&self) -> u8 {
        self.side
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn density(&self) -> Density {
        self.density
    }

    pub fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    pub fn find_sector(&self, number: u8) -> Option<&Sector> {
        self.sectors.iter().find(|s| s.number() == number)
    }

    pub fn find_sector_mut(&mut self, number: u8) -> Option<&mut Sector> {
        self.sectors.iter_mut().find(|s| s.number() == number)
    }

    /// Highest sector count the FDC can expect on this track.
    pub fn max_sectors(&self) -> u8 {
        self.sectors.len() as u8
    }
}
