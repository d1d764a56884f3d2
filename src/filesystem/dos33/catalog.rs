/// DOS 3.3 catalog sectors and entries

use super::vtoc::{TrackSector, Vtoc};
use crate::error::{DiskError, Result};
use crate::filetype::Dos33FileType;
use crate::format::constants::*;
use crate::image::DiskImage;
use log::warn;
use std::collections::HashSet;

const TYPE_OFFSET: usize = 0x02;
const NAME_OFFSET: usize = 0x03;
const SECTOR_COUNT_OFFSET: usize = 0x21;
const LOCK_BIT: u8 = 0x80;

/// Position of an entry in the catalog chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogSlot {
    /// Catalog sector
    pub sector: TrackSector,
    /// Entry index within the sector (0-6)
    pub index: usize,
}

impl CatalogSlot {
    /// Byte offset of the entry within its sector
    pub fn offset(&self) -> usize {
        CATALOG_ENTRIES_OFFSET + self.index * CATALOG_ENTRY_LENGTH
    }
}

/// A catalog entry in use, deleted or live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dos33Entry {
    /// First T/S list sector (original track restored for deleted entries)
    pub ts_list: TrackSector,
    /// File type code, lock bit stripped
    pub file_type: u8,
    /// Lock bit
    pub locked: bool,
    /// Filename with padding removed
    pub name: String,
    /// Sector count recorded in the entry
    pub sector_count: u16,
    /// Entry was deleted; `ts_list.0` came from the preserved name byte
    pub deleted: bool,
}

fn decode_name(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| (b & 0x7F) as char)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Clean up a DOS 3.3 filename
///
/// Uppercases, drops control characters, commas and anything outside ASCII,
/// and truncates to 30 characters.
pub fn sanitize_name(name: &str) -> Result<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control() && *c != ',')
        .map(|c| c.to_ascii_uppercase())
        .take(DOS33_NAME_MAX)
        .collect();
    let cleaned = cleaned.trim_end().to_string();
    if cleaned.is_empty() {
        return Err(DiskError::InvalidFilename(name.to_string()));
    }
    Ok(cleaned)
}

impl Dos33Entry {
    /// Parse a 35-byte entry; `None` for a never-used slot
    pub fn parse(data: &[u8]) -> Option<Self> {
        let track = data[0];
        if track == 0 {
            return None;
        }
        let deleted = track == DOS33_DELETED_MARKER;
        let type_byte = data[TYPE_OFFSET];
        let (ts_track, name) = if deleted {
            (
                data[DOS33_DELETED_TRACK_OFFSET],
                decode_name(&data[NAME_OFFSET..DOS33_DELETED_TRACK_OFFSET]),
            )
        } else {
            (
                track,
                decode_name(&data[NAME_OFFSET..NAME_OFFSET + DOS33_NAME_MAX]),
            )
        };

        Some(Self {
            ts_list: (ts_track, data[1]),
            file_type: type_byte & 0x7F,
            locked: type_byte & LOCK_BIT != 0,
            name,
            sector_count: u16::from_le_bytes([
                data[SECTOR_COUNT_OFFSET],
                data[SECTOR_COUNT_OFFSET + 1],
            ]),
            deleted,
        })
    }

    /// Encode as 35 bytes, marking deleted entries the way DOS does
    pub fn to_bytes(&self) -> [u8; CATALOG_ENTRY_LENGTH] {
        let mut data = [0u8; CATALOG_ENTRY_LENGTH];
        data[0] = self.ts_list.0;
        data[1] = self.ts_list.1;
        data[TYPE_OFFSET] = self.file_type & 0x7F | if self.locked { LOCK_BIT } else { 0 };

        let name = self.name.as_bytes();
        for i in 0..DOS33_NAME_MAX {
            data[NAME_OFFSET + i] = name.get(i).copied().unwrap_or(b' ') | 0x80;
        }
        if self.deleted {
            data[0] = DOS33_DELETED_MARKER;
            data[DOS33_DELETED_TRACK_OFFSET] = self.ts_list.0;
        }
        data[SECTOR_COUNT_OFFSET..SECTOR_COUNT_OFFSET + 2]
            .copy_from_slice(&self.sector_count.to_le_bytes());
        data
    }

    /// File type as a DOS 3.3 type
    pub fn dos_type(&self) -> Dos33FileType {
        Dos33FileType::from_code(self.file_type)
    }
}

/// Whether stored name bytes are high-bit printable ASCII
pub fn is_plausible_name(raw: &[u8]) -> bool {
    raw.iter()
        .all(|&b| b & 0x80 != 0 && (0x20..0x7F).contains(&(b & 0x7F)))
}

/// Whether the name stored in a slot is high-bit printable ASCII
pub fn has_plausible_name(image: &DiskImage, slot: CatalogSlot) -> Result<bool> {
    let data = image.read_sector(slot.sector.0 as usize, slot.sector.1 as usize)?;
    let start = slot.offset() + NAME_OFFSET;
    Ok(is_plausible_name(&data[start..start + DOS33_NAME_MAX]))
}

/// Catalog sectors in chain order
///
/// A sector reached twice, or a pointer off the disk, is corruption.
pub fn read_chain(image: &DiskImage, vtoc: &Vtoc) -> Result<Vec<TrackSector>> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = vtoc.catalog_start();

    while current.0 != 0 {
        if current.0 >= vtoc.tracks() || current.1 as usize >= SECTORS_PER_TRACK {
            return Err(DiskError::corrupt(format!(
                "Catalog pointer {}/{} outside the disk",
                current.0, current.1
            )));
        }
        if !visited.insert(current) {
            return Err(DiskError::corrupt(format!(
                "Catalog sector {}/{} reached twice",
                current.0, current.1
            )));
        }
        chain.push(current);
        let data = image.read_sector(current.0 as usize, current.1 as usize)?;
        current = (data[1], data[2]);
    }
    Ok(chain)
}

/// Every used slot, live and deleted
pub fn list_entries(image: &DiskImage, vtoc: &Vtoc) -> Result<Vec<(CatalogSlot, Dos33Entry)>> {
    let mut out = Vec::new();
    for sector in read_chain(image, vtoc)? {
        let data = image.read_sector(sector.0 as usize, sector.1 as usize)?;
        for index in 0..CATALOG_ENTRIES_PER_SECTOR {
            let slot = CatalogSlot { sector, index };
            let offset = slot.offset();
            if let Some(entry) = Dos33Entry::parse(&data[offset..offset + CATALOG_ENTRY_LENGTH]) {
                out.push((slot, entry));
            }
        }
    }
    Ok(out)
}

/// Live entry with a name, compared case-insensitively
pub fn find_entry(
    image: &DiskImage,
    vtoc: &Vtoc,
    name: &str,
) -> Result<Option<(CatalogSlot, Dos33Entry)>> {
    Ok(list_entries(image, vtoc)?
        .into_iter()
        .find(|(_, e)| !e.deleted && e.name.eq_ignore_ascii_case(name.trim_end())))
}

/// Slot for a new entry: never-used slots first, then deleted ones
pub fn find_free_slot(image: &DiskImage, vtoc: &Vtoc) -> Result<Option<CatalogSlot>> {
    let mut first_deleted = None;
    for sector in read_chain(image, vtoc)? {
        let data = image.read_sector(sector.0 as usize, sector.1 as usize)?;
        for index in 0..CATALOG_ENTRIES_PER_SECTOR {
            let slot = CatalogSlot { sector, index };
            match data[slot.offset()] {
                0 => return Ok(Some(slot)),
                DOS33_DELETED_MARKER if first_deleted.is_none() => first_deleted = Some(slot),
                _ => {}
            }
        }
    }
    if first_deleted.is_some() {
        warn!("Catalog full of live entries; reusing a deleted slot");
    }
    Ok(first_deleted)
}

/// Write an entry into its slot
pub fn write_entry(image: &mut DiskImage, slot: CatalogSlot, entry: &Dos33Entry) -> Result<()> {
    let (track, sector) = slot.sector;
    let mut data = image.read_sector(track as usize, sector as usize)?;
    let offset = slot.offset();
    data[offset..offset + CATALOG_ENTRY_LENGTH].copy_from_slice(&entry.to_bytes());
    image.write_sector(track as usize, sector as usize, &data)
}

/// Lay down an empty catalog chain on track 17, sector 15 down to sector 1
pub fn format_catalog(image: &mut DiskImage) -> Result<()> {
    for sector in (1..SECTORS_PER_TRACK as u8).rev() {
        let mut data = vec![0u8; SECTOR_SIZE];
        if sector > 1 {
            data[1] = VTOC_TRACK;
            data[2] = sector - 1;
        }
        image.write_sector(VTOC_TRACK as usize, sector as usize, &data)?;
    }
    Ok(())
}
