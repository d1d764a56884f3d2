/// DOS 3.3 filesystem implementation
///
/// Disk layout:
/// - Track 0: boot loader
/// - Track 17 sector 0: VTOC
/// - Track 17 sectors 15-1: catalog chain
/// - Remaining sectors: T/S lists and file data

/// Catalog sectors and entries
pub mod catalog;
/// Track/sector lists
pub mod tslist;
/// Volume Table of Contents and sector allocator
pub mod vtoc;

pub use catalog::{CatalogSlot, Dos33Entry};
pub use tslist::SectorList;
pub use vtoc::{TrackSector, Vtoc};

use crate::error::{DiskError, Result};
use crate::filesystem::{
    split_path, unique_name, AllocationMap, CatalogEntry, CheckReport, DirEntry, EntryKind,
    FileAttributes, FileSystem, FileSystemInfo, FileSystemType, FileType,
};
use crate::filetype::{prodos_to_dos33, Dos33FileType};
use crate::format::constants::*;
use crate::image::DiskImage;
use log::{debug, info, trace, warn};
use std::collections::HashMap;

/// Tracks holding the boot image, never reported as orphans
const BOOT_TRACKS: u8 = 3;

/// Validate the VTOC and catalog chain
///
/// Any mismatch is reported as `FormatNotRecognized` so probing can move on.
pub fn probe(image: &DiskImage) -> Result<Vtoc> {
    let reject = |why: String| {
        trace!("DOS 3.3 probe ({}) rejected: {}", image.order(), why);
        DiskError::FormatNotRecognized(why)
    };

    let vtoc = Vtoc::load(image).map_err(|e| match e {
        DiskError::FormatNotRecognized(why) => reject(why),
        other => other,
    })?;
    if vtoc.tracks() as usize > image.num_tracks() {
        return Err(reject(format!(
            "VTOC claims {} tracks, image has {}",
            vtoc.tracks(),
            image.num_tracks()
        )));
    }
    let entries = catalog::list_entries(image, &vtoc).map_err(|e| reject(e.to_string()))?;

    // Under the wrong ordering, names and T/S list heads land on unrelated bytes
    let live: Vec<&(CatalogSlot, Dos33Entry)> = entries.iter().filter(|(_, e)| !e.deleted).collect();
    let implausible = live
        .iter()
        .filter(|(slot, e)| {
            !catalog::has_plausible_name(image, *slot).unwrap_or(false)
                || !plausible_list_head(image, &vtoc, e.ts_list)
        })
        .count();
    if implausible * 2 > live.len() {
        return Err(reject(format!(
            "{} of {} catalog entries are implausible",
            implausible,
            live.len()
        )));
    }

    debug!(
        "DOS 3.3 volume {} ({} tracks, {})",
        vtoc.volume_number(),
        vtoc.tracks(),
        image.order()
    );
    Ok(vtoc)
}

fn plausible_list_head(image: &DiskImage, vtoc: &Vtoc, head: TrackSector) -> bool {
    if head.0 >= vtoc.tracks() || head.1 as usize >= SECTORS_PER_TRACK {
        return false;
    }
    let Ok(list) = image.read_sector(head.0 as usize, head.1 as usize) else {
        return false;
    };
    let first_offset = u16::from_le_bytes([list[TS_LIST_SECTOR_OFFSET], list[TS_LIST_SECTOR_OFFSET + 1]]);
    first_offset == 0
        && list[TS_LIST_PAIRS_OFFSET..]
            .chunks_exact(2)
            .all(|pair| pair[0] < vtoc.tracks() && (pair[1] as usize) < SECTORS_PER_TRACK)
}

/// Lay down an empty DOS 3.3 volume over the whole image
pub fn format_volume(image: &mut DiskImage, volume_number: u8) -> Result<()> {
    let tracks = image.num_tracks();
    if image.data_len() != tracks * TRACK_SIZE || tracks <= VTOC_TRACK as usize || tracks > MAX_FLOPPY_TRACKS {
        return Err(DiskError::invalid_format(format!(
            "DOS 3.3 needs 18 to {} whole tracks, image has {} bytes",
            MAX_FLOPPY_TRACKS,
            image.data_len()
        )));
    }

    for track in 0..tracks {
        for sector in 0..SECTORS_PER_TRACK {
            image.write_sector(track, sector, &[])?;
        }
    }
    Vtoc::new(tracks, volume_number).store(image)?;
    catalog::format_catalog(image)?;

    info!("Formatted DOS 3.3 volume {} ({} tracks)", volume_number, tracks);
    Ok(())
}

/// Bytes of header a file type stores ahead of its contents
fn header_len(file_type: u8) -> usize {
    match Dos33FileType::from_code(file_type) {
        Dos33FileType::Binary => 4,
        Dos33FileType::Applesoft | Dos33FileType::IntegerBasic => 2,
        _ => 0,
    }
}

/// Prefix contents with the header their file type records
///
/// Binary files get the load address and length, BASIC programs the length.
/// Other types are stored as given.
pub fn encode_contents(file_type: u8, load_address: u16, data: &[u8]) -> Result<Vec<u8>> {
    let header = header_len(file_type);
    if header == 0 {
        return Ok(data.to_vec());
    }
    let length = u16::try_from(data.len()).map_err(|_| DiskError::FileTooLarge {
        size: data.len(),
        max: u16::MAX as usize,
    })?;

    let mut out = Vec::with_capacity(header + data.len());
    if header == 4 {
        out.extend_from_slice(&load_address.to_le_bytes());
    }
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

/// File contents from raw sector data
///
/// Strips the binary or BASIC header and trims to the length it records.
/// Text ends at the first zero byte; other types return every byte.
pub fn decode_contents(file_type: u8, raw: &[u8]) -> &[u8] {
    let header = header_len(file_type);
    if header == 0 {
        let end = match Dos33FileType::from_code(file_type) {
            Dos33FileType::Text => raw.iter().position(|&b| b == 0).unwrap_or(raw.len()),
            _ => raw.len(),
        };
        return &raw[..end];
    }
    if raw.len() < header {
        return &[];
    }
    let declared = u16::from_le_bytes([raw[header - 2], raw[header - 1]]) as usize;
    &raw[header..(header + declared).min(raw.len())]
}

/// Load address from a binary file's header
pub fn load_address(file_type: u8, raw: &[u8]) -> Option<u16> {
    match Dos33FileType::from_code(file_type) {
        Dos33FileType::Binary if raw.len() >= 2 => Some(u16::from_le_bytes([raw[0], raw[1]])),
        _ => None,
    }
}

/// DOS 3.3 filesystem over an owned image
#[derive(Debug, Clone)]
pub struct Dos33FileSystem {
    image: DiskImage,
    vtoc: Vtoc,
}

impl Dos33FileSystem {
    /// Mount a DOS 3.3 volume, validating its VTOC
    pub fn new(image: DiskImage) -> Result<Self> {
        let vtoc = probe(&image)?;
        Ok(Self { image, vtoc })
    }

    pub(crate) fn image_mut(&mut self) -> &mut DiskImage {
        &mut self.image
    }

    /// Give back the image
    pub fn into_image(self) -> DiskImage {
        self.image
    }

    /// The volume's VTOC
    pub fn vtoc(&self) -> &Vtoc {
        &self.vtoc
    }

    /// Disk volume number
    pub fn volume_number(&self) -> u8 {
        self.vtoc.volume_number()
    }

    /// Run a mutation against a scratch copy of the image
    ///
    /// The copy and its VTOC replace the live ones only when `f` succeeds.
    fn transact<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut DiskImage, &mut Vtoc) -> Result<T>,
    {
        let mut scratch = self.image.clone();
        let mut vtoc = self.vtoc.clone();
        let result = f(&mut scratch, &mut vtoc)?;
        vtoc.store(&mut scratch)?;
        self.image = scratch;
        self.vtoc = vtoc;
        Ok(result)
    }

    /// Find a live entry by path; the catalog is flat
    pub fn lookup(&self, path: &str) -> Result<(CatalogSlot, Dos33Entry)> {
        let (parents, name) = split_path(path);
        if !parents.is_empty() || name.is_empty() {
            return Err(DiskError::not_found(path));
        }
        catalog::find_entry(&self.image, &self.vtoc, name)?.ok_or_else(|| DiskError::not_found(path))
    }

    fn live_names(&self) -> Result<Vec<String>> {
        Ok(catalog::list_entries(&self.image, &self.vtoc)?
            .into_iter()
            .filter(|(_, e)| !e.deleted)
            .map(|(_, e)| e.name)
            .collect())
    }

    /// Add a file, returning the name it was stored under
    ///
    /// Binary and BASIC files get their length header here; `data` is the
    /// bare contents. The sector count written to the entry counts data
    /// sectors only.
    pub fn add_file(&mut self, name: &str, data: &[u8], file_type: FileType) -> Result<String> {
        let sanitized = catalog::sanitize_name(name)?;
        let taken = self.live_names()?;
        let final_name = unique_name(&sanitized, DOS33_NAME_MAX, |candidate| {
            taken.iter().any(|t| t.eq_ignore_ascii_case(candidate))
        })?;
        let type_code = prodos_to_dos33(file_type.file_type, file_type.aux_type);
        if Dos33FileType::from_code(type_code) == Dos33FileType::Text && data.contains(&0) {
            warn!("{} contains a zero byte; text reads stop there", final_name);
        }
        let contents = encode_contents(type_code, file_type.aux_type, data)?;

        let data_sectors = contents.len().div_ceil(SECTOR_SIZE);
        let list_sectors = tslist::lists_needed(data_sectors);
        let stored = final_name.clone();

        self.transact(move |image, vtoc| {
            let slot = catalog::find_free_slot(image, vtoc)?.ok_or(DiskError::InsufficientSpace {
                unit: "catalog entries",
                needed: 1,
                available: 0,
            })?;
            let sectors = vtoc.allocate(list_sectors + data_sectors)?;
            let (lists, data_at) = sectors.split_at(list_sectors);
            tslist::write_file(image, lists, data_at, &contents)?;

            let entry = Dos33Entry {
                ts_list: lists[0],
                file_type: type_code,
                locked: false,
                name: stored,
                sector_count: data_sectors as u16,
                deleted: false,
            };
            catalog::write_entry(image, slot, &entry)
        })?;

        info!(
            "Added {} ({} bytes, {} + {} sectors)",
            final_name,
            data.len(),
            data_sectors,
            list_sectors
        );
        Ok(final_name)
    }

    /// Delete a file, freeing its sectors and marking the entry deleted
    pub fn delete(&mut self, path: &str) -> Result<()> {
        let (slot, entry) = self.lookup(path)?;
        if entry.locked {
            return Err(DiskError::FileLocked(entry.name));
        }
        let list = tslist::read_list(&self.image, entry.ts_list, self.vtoc.tracks())?;

        self.transact(|image, vtoc| {
            vtoc.free(&list.owned());
            let mut deleted = entry.clone();
            deleted.deleted = true;
            catalog::write_entry(image, slot, &deleted)
        })?;

        info!("Deleted {} ({} sectors)", entry.name, list.owned().len());
        Ok(())
    }

    /// Rename a file
    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<String> {
        let (slot, entry) = self.lookup(path)?;
        if entry.locked {
            return Err(DiskError::FileLocked(entry.name));
        }
        let name = catalog::sanitize_name(new_name)?;
        let clash = self
            .live_names()?
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&name) && !n.eq_ignore_ascii_case(&entry.name));
        if clash {
            return Err(DiskError::NameCollision(name));
        }

        let mut renamed = entry;
        renamed.name = name.clone();
        self.transact(|image, _| catalog::write_entry(image, slot, &renamed))?;
        debug!("Renamed {} to {}", path, name);
        Ok(name)
    }

    /// Change a file's type, keeping its lock bit
    pub fn set_type(&mut self, path: &str, file_type: FileType) -> Result<()> {
        let (slot, mut entry) = self.lookup(path)?;
        entry.file_type = prodos_to_dos33(file_type.file_type, file_type.aux_type);
        self.transact(|image, _| catalog::write_entry(image, slot, &entry))
    }

    /// Set or clear the lock bit
    pub fn lock(&mut self, path: &str, locked: bool) -> Result<()> {
        let (slot, mut entry) = self.lookup(path)?;
        entry.locked = locked;
        self.transact(|image, _| catalog::write_entry(image, slot, &entry))
    }

    /// Every data sector of a file, headers included and untrimmed
    pub fn read_file_raw(&self, path: &str) -> Result<Vec<u8>> {
        let (_, entry) = self.lookup(path)?;
        self.read_entry_raw(&entry)
    }

    fn read_entry_raw(&self, entry: &Dos33Entry) -> Result<Vec<u8>> {
        let list = tslist::read_list(&self.image, entry.ts_list, self.vtoc.tracks())?;
        tslist::read_data(&self.image, &list)
    }

    /// Deleted entries still present in the catalog, with their original T/S list track
    pub fn deleted_entries(&self) -> Result<Vec<Dos33Entry>> {
        Ok(catalog::list_entries(&self.image, &self.vtoc)?
            .into_iter()
            .map(|(_, e)| e)
            .filter(|e| e.deleted)
            .collect())
    }

    fn to_dir_entry(entry: &Dos33Entry) -> DirEntry {
        DirEntry {
            name: entry.name.clone(),
            kind: EntryKind::File,
            file_type: entry.file_type,
            aux_type: 0,
            type_name: entry.dos_type().to_string(),
            size: entry.sector_count as usize * SECTOR_SIZE,
            units_used: entry.sector_count as usize,
            created: None,
            modified: None,
            attributes: FileAttributes {
                locked: entry.locked,
                deleted: entry.deleted,
            },
        }
    }

    /// Cross-check reachable sectors against the VTOC bitmap
    pub fn check_volume(&self) -> Result<CheckReport> {
        let mut owners: HashMap<TrackSector, String> = HashMap::new();
        let mut report = CheckReport::default();
        let mut claim = |ts: TrackSector, owner: &str, report: &mut CheckReport| {
            if let Some(previous) = owners.insert(ts, owner.to_string()) {
                report.problems.push(format!(
                    "Sector {}/{} shared by {} and {}",
                    ts.0, ts.1, previous, owner
                ));
            }
        };

        claim((VTOC_TRACK, VTOC_SECTOR), "VTOC", &mut report);
        for ts in catalog::read_chain(&self.image, &self.vtoc)? {
            claim(ts, "catalog", &mut report);
        }
        for (_, entry) in catalog::list_entries(&self.image, &self.vtoc)? {
            if entry.deleted {
                continue;
            }
            match tslist::read_list(&self.image, entry.ts_list, self.vtoc.tracks()) {
                Ok(list) => {
                    if list.data.len() > entry.sector_count as usize {
                        report.problems.push(format!(
                            "{} records {} sectors, lists {}",
                            entry.name,
                            entry.sector_count,
                            list.data.len()
                        ));
                    }
                    for ts in list.owned() {
                        claim(ts, &entry.name, &mut report);
                    }
                }
                Err(e) => report.problems.push(format!("{}: {}", entry.name, e)),
            }
        }

        let unit = |(t, s): TrackSector| t as usize * SECTORS_PER_TRACK + s as usize;
        report.reachable = owners.len();
        let mut used_but_free: Vec<usize> = owners
            .keys()
            .filter(|&&ts| self.vtoc.is_free(ts))
            .map(|&ts| unit(ts))
            .collect();
        used_but_free.sort_unstable();
        report.used_but_free = used_but_free;
        report.orphans = (BOOT_TRACKS..self.vtoc.tracks())
            .filter(|&t| t != VTOC_TRACK)
            .flat_map(|t| (0..SECTORS_PER_TRACK as u8).map(move |s| (t, s)))
            .filter(|ts| !self.vtoc.is_free(*ts) && !owners.contains_key(ts))
            .map(unit)
            .collect();

        if !report.is_clean() {
            warn!(
                "Volume check: {} used-but-free, {} orphans, {} problems",
                report.used_but_free.len(),
                report.orphans.len(),
                report.problems.len()
            );
        }
        Ok(report)
    }
}

impl FileSystem for Dos33FileSystem {
    fn fs_type(&self) -> FileSystemType {
        FileSystemType::Dos33
    }

    fn image(&self) -> &DiskImage {
        &self.image
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        if !path.trim_matches('/').is_empty() {
            return Err(DiskError::not_found(path));
        }
        Ok(catalog::list_entries(&self.image, &self.vtoc)?
            .iter()
            .filter(|(_, e)| !e.deleted)
            .map(|(_, e)| Self::to_dir_entry(e))
            .collect())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let (_, entry) = self.lookup(path)?;
        let raw = self.read_entry_raw(&entry)?;
        Ok(decode_contents(entry.file_type, &raw).to_vec())
    }

    fn write_file(&mut self, path: &str, data: &[u8], file_type: FileType) -> Result<String> {
        let (parents, name) = split_path(path);
        if !parents.is_empty() {
            return Err(DiskError::unsupported("DOS 3.3 has no directories"));
        }
        self.add_file(name, data, file_type)
    }

    fn delete_file(&mut self, path: &str) -> Result<()> {
        self.delete(path)
    }

    fn rename_file(&mut self, path: &str, new_name: &str) -> Result<String> {
        self.rename(path, new_name)
    }

    fn set_file_type(&mut self, path: &str, file_type: FileType) -> Result<()> {
        self.set_type(path, file_type)
    }

    fn set_locked(&mut self, path: &str, locked: bool) -> Result<()> {
        self.lock(path, locked)
    }

    fn create_directory(&mut self, _path: &str) -> Result<String> {
        Err(DiskError::unsupported("DOS 3.3 has no directories"))
    }

    fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        let mut out = Vec::new();
        for (_, entry) in catalog::list_entries(&self.image, &self.vtoc)? {
            if entry.deleted {
                continue;
            }
            let mut dir_entry = Self::to_dir_entry(&entry);
            let data = match self.read_entry_raw(&entry) {
                Ok(raw) => {
                    dir_entry.aux_type = load_address(entry.file_type, &raw).unwrap_or(0);
                    decode_contents(entry.file_type, &raw).to_vec()
                }
                Err(e) => {
                    warn!("Cannot read {}: {}", entry.name, e);
                    Vec::new()
                }
            };
            dir_entry.size = data.len();
            out.push(CatalogEntry {
                entry: dir_entry,
                path: entry.name.clone(),
                data,
                children: Vec::new(),
            });
        }
        Ok(out)
    }

    fn info(&self) -> Result<FileSystemInfo> {
        Ok(FileSystemInfo {
            fs_type: FileSystemType::Dos33,
            volume_name: format!("DISK VOLUME {}", self.vtoc.volume_number()),
            order: self.image.order(),
            total_units: self.vtoc.total_sectors(),
            free_units: self.vtoc.free_count(),
            unit_size: SECTOR_SIZE,
            file_count: self.live_names()?.len(),
        })
    }

    fn allocation(&self) -> Result<AllocationMap> {
        let used = (0..self.vtoc.tracks())
            .flat_map(|t| (0..SECTORS_PER_TRACK as u8).map(move |s| (t, s)))
            .map(|ts| !self.vtoc.is_free(ts))
            .collect();
        Ok(AllocationMap {
            units_per_column: SECTORS_PER_TRACK,
            used,
        })
    }

    fn check(&self) -> Result<CheckReport> {
        self.check_volume()
    }
}
