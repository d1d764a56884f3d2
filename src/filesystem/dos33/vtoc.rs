/// DOS 3.3 Volume Table of Contents
///
/// Track 17 sector 0. Holds the catalog head, the disk geometry and a
/// free-sector bitmap of four bytes per track: the first byte covers sectors
/// 15-8, the second sectors 7-0, bit set = free.

use crate::error::{DiskError, Result};
use crate::format::constants::*;
use crate::image::DiskImage;
use log::{debug, trace};

/// A track/sector address
pub type TrackSector = (u8, u8);

/// Parsed VTOC, keeping the raw sector for fields we do not model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vtoc {
    raw: Vec<u8>,
}

impl Vtoc {
    /// Parse and validate a VTOC sector
    ///
    /// Geometry that no DOS 3.3 disk could have is `FormatNotRecognized`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < SECTOR_SIZE {
            return Err(DiskError::FormatNotRecognized(
                "VTOC sector is short".into(),
            ));
        }
        let vtoc = Self {
            raw: data[..SECTOR_SIZE].to_vec(),
        };

        let tracks = vtoc.tracks() as usize;
        if vtoc.sectors_per_track() as usize != SECTORS_PER_TRACK {
            return Err(DiskError::FormatNotRecognized(format!(
                "VTOC claims {} sectors per track",
                vtoc.sectors_per_track()
            )));
        }
        if tracks <= VTOC_TRACK as usize || tracks > MAX_FLOPPY_TRACKS {
            return Err(DiskError::FormatNotRecognized(format!(
                "VTOC claims {} tracks",
                tracks
            )));
        }
        if vtoc.bytes_per_sector() as usize != SECTOR_SIZE {
            return Err(DiskError::FormatNotRecognized(format!(
                "VTOC claims {} bytes per sector",
                vtoc.bytes_per_sector()
            )));
        }
        if vtoc.max_pairs() as usize != TS_PAIRS_PER_SECTOR {
            return Err(DiskError::FormatNotRecognized(format!(
                "VTOC claims {} pairs per T/S list",
                vtoc.max_pairs()
            )));
        }
        let (track, sector) = vtoc.catalog_start();
        if track as usize >= tracks || sector as usize >= SECTORS_PER_TRACK {
            return Err(DiskError::FormatNotRecognized(format!(
                "Catalog pointer {}/{} outside the disk",
                track, sector
            )));
        }
        Ok(vtoc)
    }

    /// Fresh VTOC for a formatted disk: tracks 0 and 17 in use
    pub fn new(tracks: usize, volume_number: u8) -> Self {
        let mut raw = vec![0u8; SECTOR_SIZE];
        raw[0] = 0x04;
        raw[VTOC_CATALOG_TRACK_OFFSET] = VTOC_TRACK;
        raw[VTOC_CATALOG_TRACK_OFFSET + 1] = (SECTORS_PER_TRACK - 1) as u8;
        raw[VTOC_DOS_VERSION_OFFSET] = 3;
        raw[VTOC_VOLUME_OFFSET] = volume_number;
        raw[VTOC_MAX_PAIRS_OFFSET] = TS_PAIRS_PER_SECTOR as u8;
        raw[VTOC_LAST_TRACK_OFFSET] = VTOC_TRACK;
        raw[VTOC_DIRECTION_OFFSET] = 1;
        raw[VTOC_TRACKS_OFFSET] = tracks as u8;
        raw[VTOC_SECTORS_OFFSET] = SECTORS_PER_TRACK as u8;
        raw[VTOC_BYTES_PER_SECTOR_OFFSET..VTOC_BYTES_PER_SECTOR_OFFSET + 2]
            .copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());

        let mut vtoc = Self { raw };
        for track in 0..tracks as u8 {
            if track != 0 && track != VTOC_TRACK {
                for sector in 0..SECTORS_PER_TRACK as u8 {
                    vtoc.mark_free((track, sector));
                }
            }
        }
        vtoc
    }

    /// Read the VTOC from an image
    pub fn load(image: &DiskImage) -> Result<Self> {
        Self::parse(&image.read_sector(VTOC_TRACK as usize, VTOC_SECTOR as usize)?)
    }

    /// Write the VTOC back to an image
    pub fn store(&self, image: &mut DiskImage) -> Result<()> {
        image.write_sector(VTOC_TRACK as usize, VTOC_SECTOR as usize, &self.raw)
    }

    /// First catalog sector
    pub fn catalog_start(&self) -> TrackSector {
        (
            self.raw[VTOC_CATALOG_TRACK_OFFSET],
            self.raw[VTOC_CATALOG_TRACK_OFFSET + 1],
        )
    }

    /// DOS release that formatted the disk
    pub fn dos_version(&self) -> u8 {
        self.raw[VTOC_DOS_VERSION_OFFSET]
    }

    /// Disk volume number
    pub fn volume_number(&self) -> u8 {
        self.raw[VTOC_VOLUME_OFFSET]
    }

    /// T/S pairs per list sector
    pub fn max_pairs(&self) -> u8 {
        self.raw[VTOC_MAX_PAIRS_OFFSET]
    }

    /// Track of the most recent allocation
    pub fn last_track(&self) -> u8 {
        self.raw[VTOC_LAST_TRACK_OFFSET]
    }

    /// Whether allocation scans from the last track downward
    pub fn allocates_backward(&self) -> bool {
        (self.raw[VTOC_DIRECTION_OFFSET] as i8) < 0
    }

    /// Tracks per disk
    pub fn tracks(&self) -> u8 {
        self.raw[VTOC_TRACKS_OFFSET]
    }

    /// Sectors per track
    pub fn sectors_per_track(&self) -> u8 {
        self.raw[VTOC_SECTORS_OFFSET]
    }

    /// Bytes per sector
    pub fn bytes_per_sector(&self) -> u16 {
        u16::from_le_bytes([
            self.raw[VTOC_BYTES_PER_SECTOR_OFFSET],
            self.raw[VTOC_BYTES_PER_SECTOR_OFFSET + 1],
        ])
    }

    /// Sectors on the disk
    pub fn total_sectors(&self) -> usize {
        self.tracks() as usize * SECTORS_PER_TRACK
    }

    fn bit(&self, (track, sector): TrackSector) -> Option<(usize, u8)> {
        if track >= self.tracks() || sector as usize >= SECTORS_PER_TRACK {
            return None;
        }
        let base = VTOC_BITMAP_OFFSET + track as usize * VTOC_BITMAP_BYTES_PER_TRACK;
        if sector >= 8 {
            Some((base, 1 << (sector - 8)))
        } else {
            Some((base + 1, 1 << sector))
        }
    }

    /// Whether a sector is marked free
    pub fn is_free(&self, ts: TrackSector) -> bool {
        self.bit(ts)
            .map(|(byte, mask)| self.raw[byte] & mask != 0)
            .unwrap_or(false)
    }

    /// Mark a sector free
    pub fn mark_free(&mut self, ts: TrackSector) {
        if let Some((byte, mask)) = self.bit(ts) {
            self.raw[byte] |= mask;
        }
    }

    /// Mark a sector used
    pub fn mark_used(&mut self, ts: TrackSector) {
        if let Some((byte, mask)) = self.bit(ts) {
            self.raw[byte] &= !mask;
        }
    }

    /// Number of free sectors
    pub fn free_count(&self) -> usize {
        (0..self.tracks())
            .flat_map(|t| (0..SECTORS_PER_TRACK as u8).map(move |s| (t, s)))
            .filter(|&ts| self.is_free(ts))
            .count()
    }

    /// Allocate `n` sectors
    ///
    /// Tracks are scanned forward from 0 or backward from the last track,
    /// per the VTOC direction byte; sectors run 15 down to 0; track 17 is
    /// never handed out. Nothing is marked unless all `n` were found.
    pub fn allocate(&mut self, n: usize) -> Result<Vec<TrackSector>> {
        let tracks: Vec<u8> = if self.allocates_backward() {
            (0..self.tracks()).rev().collect()
        } else {
            (0..self.tracks()).collect()
        };

        let found: Vec<TrackSector> = tracks
            .into_iter()
            .filter(|&t| t != VTOC_TRACK)
            .flat_map(|t| (0..SECTORS_PER_TRACK as u8).rev().map(move |s| (t, s)))
            .filter(|&ts| self.is_free(ts))
            .take(n)
            .collect();

        if found.len() < n {
            trace!("VTOC has {} free sectors, {} requested", found.len(), n);
            return Err(DiskError::InsufficientSpace {
                unit: "sectors",
                needed: n,
                available: self.free_count(),
            });
        }

        for &ts in &found {
            self.mark_used(ts);
        }
        if let Some(&(track, _)) = found.last() {
            self.raw[VTOC_LAST_TRACK_OFFSET] = track;
        }
        debug!("Allocated {} sectors: {:?}", n, found);
        Ok(found)
    }

    /// Return sectors to the free pool
    pub fn free(&mut self, sectors: &[TrackSector]) {
        for &ts in sectors {
            self.mark_free(ts);
        }
        debug!("Freed {} sectors", sectors.len());
    }
}
