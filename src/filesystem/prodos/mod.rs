/// ProDOS filesystem implementation
///
/// Volume layout:
/// - Blocks 0-1: boot loader
/// - Blocks 2-5: volume directory (key block 2, header in slot 0)
/// - Block 6 onward: volume bitmap
/// - Remaining blocks: files and subdirectories

/// Volume bitmap allocator
pub mod bitmap;
/// Directory chains and entry slots
pub mod directory;
/// Entry and header encoding
pub mod entry;
/// Seedling, sapling and tree extents
pub mod extent;

pub use bitmap::VolumeBitmap;
pub use directory::{EntryLocation, FoundEntry};
pub use entry::{DirectoryHeader, FileEntry, HeaderKind, StorageType, Timestamp};

use crate::error::{DiskError, Result};
use crate::filesystem::{
    split_path, unique_name, AllocationMap, CatalogEntry, CheckReport, DirEntry, EntryKind,
    FileAttributes, FileSystem, FileSystemInfo, FileSystemType, FileType,
};
use crate::filetype::{prodos_type_name, PRODOS_DIR};
use crate::format::constants::*;
use crate::image::DiskImage;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};

/// Validate the volume directory header at block 2
///
/// Any mismatch is reported as `FormatNotRecognized` so probing can move on.
pub fn probe(image: &DiskImage) -> Result<DirectoryHeader> {
    let reject = |why: String| {
        trace!("ProDOS probe ({}) rejected: {}", image.order(), why);
        DiskError::FormatNotRecognized(why)
    };

    let block = image.read_block(VOLUME_DIRECTORY_BLOCK as usize)?;
    if entry::le16(&block, 0) != 0 {
        return Err(reject("volume directory has a previous block".into()));
    }
    let header = DirectoryHeader::parse(
        &block[DIRECTORY_ENTRIES_OFFSET..DIRECTORY_ENTRIES_OFFSET + ENTRY_LENGTH],
    )
    .map_err(|e| reject(e.to_string()))?;

    let HeaderKind::Volume {
        bitmap_pointer,
        total_blocks,
    } = header.kind
    else {
        return Err(reject("block 2 does not hold a volume header".into()));
    };
    if !entry::is_valid_name(&header.name) {
        return Err(reject(format!("invalid volume name {:?}", header.name)));
    }
    if !header.has_standard_geometry() {
        return Err(reject(format!(
            "entry length {} / entries per block {}",
            header.entry_length, header.entries_per_block
        )));
    }
    let total = total_blocks as usize;
    if total <= BITMAP_START_BLOCK as usize || total > image.total_blocks() {
        return Err(reject(format!(
            "volume claims {} blocks, image has {}",
            total,
            image.total_blocks()
        )));
    }
    let bitmap_end = bitmap_pointer as usize + VolumeBitmap::blocks_needed(total);
    if (bitmap_pointer as usize) <= VOLUME_DIRECTORY_BLOCK as usize || bitmap_end > total {
        return Err(reject(format!("bitmap pointer {} out of range", bitmap_pointer)));
    }

    debug!(
        "ProDOS volume /{} ({} blocks, {})",
        header.name,
        total,
        image.order()
    );
    Ok(header)
}

/// Lay down an empty ProDOS volume over the whole image
pub fn format_volume(image: &mut DiskImage, volume_name: &str) -> Result<()> {
    let total = image.total_blocks();
    if !(PRODOS_MIN_BLOCKS..=PRODOS_MAX_BLOCKS).contains(&total) {
        return Err(DiskError::invalid_format(format!(
            "ProDOS volumes need {} to {} blocks, image has {}",
            PRODOS_MIN_BLOCKS, PRODOS_MAX_BLOCKS, total
        )));
    }
    let name = entry::sanitize_name(volume_name)?;

    for block in 0..VOLUME_DIRECTORY_BLOCK as usize {
        image.write_block(block, &[])?;
    }
    for block in VOLUME_DIRECTORY_BLOCK..=VOLUME_DIRECTORY_LAST_BLOCK {
        let mut data = vec![0u8; BLOCK_SIZE];
        let prev = if block == VOLUME_DIRECTORY_BLOCK { 0 } else { block - 1 };
        let next = if block == VOLUME_DIRECTORY_LAST_BLOCK { 0 } else { block + 1 };
        data[0..2].copy_from_slice(&prev.to_le_bytes());
        data[2..4].copy_from_slice(&next.to_le_bytes());
        image.write_block(block as usize, &data)?;
    }

    let header = DirectoryHeader {
        name: name.clone(),
        created: Timestamp::now(),
        version: 0,
        min_version: 0,
        access: 0xC3,
        entry_length: ENTRY_LENGTH as u8,
        entries_per_block: ENTRIES_PER_BLOCK as u8,
        file_count: 0,
        kind: HeaderKind::Volume {
            bitmap_pointer: BITMAP_START_BLOCK,
            total_blocks: total as u16,
        },
    };
    directory::write_header(image, VOLUME_DIRECTORY_BLOCK, &header)?;

    let mut bitmap = VolumeBitmap::new_all_free(BITMAP_START_BLOCK, total);
    for block in 0..bitmap.first_allocatable() {
        bitmap.mark_used(block);
    }
    bitmap.store(image)?;

    info!("Formatted ProDOS volume /{} ({} blocks)", name, total);
    Ok(())
}

/// ProDOS filesystem over an owned image
#[derive(Debug, Clone)]
pub struct ProdosFileSystem {
    image: DiskImage,
    volume: DirectoryHeader,
    max_depth: usize,
}

impl ProdosFileSystem {
    /// Mount a ProDOS volume, validating its header
    pub fn new(image: DiskImage) -> Result<Self> {
        let volume = probe(&image)?;
        Ok(Self {
            image,
            volume,
            max_depth: MAX_DIRECTORY_DEPTH,
        })
    }

    /// Limit how deep catalog walks descend
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub(crate) fn image_mut(&mut self) -> &mut DiskImage {
        &mut self.image
    }

    /// Give back the image
    pub fn into_image(self) -> DiskImage {
        self.image
    }

    /// Volume name
    pub fn volume_name(&self) -> &str {
        &self.volume.name
    }

    /// Volume header
    pub fn volume_header(&self) -> &DirectoryHeader {
        &self.volume
    }

    /// Blocks on the volume
    pub fn total_blocks(&self) -> usize {
        match self.volume.kind {
            HeaderKind::Volume { total_blocks, .. } => total_blocks as usize,
            HeaderKind::Subdirectory { .. } => self.image.total_blocks(),
        }
    }

    fn bitmap_pointer(&self) -> u16 {
        match self.volume.kind {
            HeaderKind::Volume { bitmap_pointer, .. } => bitmap_pointer,
            HeaderKind::Subdirectory { .. } => BITMAP_START_BLOCK,
        }
    }

    /// Load the volume bitmap
    pub fn bitmap(&self) -> Result<VolumeBitmap> {
        VolumeBitmap::load(&self.image, self.bitmap_pointer(), self.total_blocks())
    }

    /// Key block of the directory named by a path ("" for the volume directory)
    pub fn resolve_directory(&self, path: &str) -> Result<u16> {
        let components: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        directory::resolve_path(
            &self.image,
            VOLUME_DIRECTORY_BLOCK,
            &components,
            self.total_blocks(),
        )
    }

    /// Find the entry a path names
    pub fn lookup(&self, path: &str) -> Result<FoundEntry> {
        let (parents, name) = split_path(path);
        if name.is_empty() {
            return Err(DiskError::not_found(path));
        }
        let dir = directory::resolve_path(
            &self.image,
            VOLUME_DIRECTORY_BLOCK,
            &parents,
            self.total_blocks(),
        )?;
        directory::find_entry(&self.image, dir, name, false, self.total_blocks(), 0)?
            .ok_or_else(|| DiskError::not_found(path))
    }

    /// Find an entry by name anywhere on the volume
    pub fn find_anywhere(&self, name: &str) -> Result<Option<FoundEntry>> {
        directory::find_entry(
            &self.image,
            VOLUME_DIRECTORY_BLOCK,
            name,
            true,
            self.total_blocks(),
            self.max_depth,
        )
    }

    /// Run a mutation against a scratch copy of the image
    ///
    /// The copy and its bitmap replace the live image only when `f` succeeds.
    fn transact<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut DiskImage, &mut VolumeBitmap) -> Result<T>,
    {
        let mut scratch = self.image.clone();
        let mut bitmap = self.bitmap()?;
        let result = f(&mut scratch, &mut bitmap)?;
        bitmap.store(&mut scratch)?;
        self.volume = directory::read_header(&scratch, VOLUME_DIRECTORY_BLOCK)?;
        self.image = scratch;
        Ok(result)
    }

    fn names_in(&self, dir: u16) -> Result<Vec<String>> {
        Ok(directory::list_entries(&self.image, dir, self.total_blocks())?
            .into_iter()
            .map(|(_, e)| e.name)
            .collect())
    }

    /// Add a file in a directory, returning the name it was stored under
    ///
    /// The name is sanitized, and a taken name gets a `.N` suffix.
    pub fn add_file(
        &mut self,
        dir_path: &str,
        name: &str,
        data: &[u8],
        file_type: FileType,
    ) -> Result<String> {
        let dir = self.resolve_directory(dir_path)?;
        let sanitized = entry::sanitize_name(name)?;
        let taken = self.names_in(dir)?;
        let final_name = unique_name(&sanitized, PRODOS_NAME_MAX, |candidate| {
            taken.iter().any(|t| t.eq_ignore_ascii_case(candidate))
        })?;

        let stored = final_name.clone();
        self.transact(move |image, bitmap| {
            let extent = extent::write_file_data(image, bitmap, data)?;
            let now = Timestamp::now();
            let new_entry = FileEntry {
                storage_type: extent.storage_type,
                name: stored,
                file_type: file_type.file_type,
                key_pointer: extent.key_block,
                blocks_used: extent.blocks_used,
                eof: extent.eof,
                created: now,
                version: 0,
                min_version: 0,
                access: ACCESS_DEFAULT,
                aux_type: file_type.aux_type,
                modified: now,
                header_pointer: dir,
            };
            directory::create_entry(image, bitmap, dir, new_entry)?;
            Ok(())
        })?;

        info!("Added {} ({} bytes)", final_name, data.len());
        Ok(final_name)
    }

    /// Delete a file or an empty directory
    pub fn delete(&mut self, path: &str) -> Result<()> {
        let found = self.lookup(path)?;
        if !found.entry.can_destroy() {
            return Err(DiskError::FileLocked(found.entry.name));
        }
        let total = self.total_blocks();

        self.transact(|image, bitmap| {
            if found.entry.is_directory() {
                let key = found.entry.key_pointer;
                if !directory::list_entries(image, key, total)?.is_empty() {
                    return Err(DiskError::DirectoryNotEmpty(found.entry.name.clone()));
                }
                let chain = directory::read_chain(image, key, total)?;
                bitmap.free(&chain);
            } else {
                extent::free_file_data(
                    image,
                    bitmap,
                    found.entry.storage_type,
                    found.entry.key_pointer,
                )?;
            }
            directory::delete_entry(image, found.directory, found.location)
        })?;

        info!("Deleted {}", path);
        Ok(())
    }

    /// Rename an entry in place
    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<String> {
        let found = self.lookup(path)?;
        if !found.entry.can_rename() {
            return Err(DiskError::FileLocked(found.entry.name));
        }
        let name = entry::sanitize_name(new_name)?;
        let clash = self
            .names_in(found.directory)?
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&name) && !n.eq_ignore_ascii_case(&found.entry.name));
        if clash {
            return Err(DiskError::NameCollision(name));
        }

        let stored = name.clone();
        self.transact(move |image, _| {
            let mut renamed = found.entry.clone();
            renamed.name = stored.clone();
            directory::write_entry(image, found.location, &renamed)?;
            if renamed.is_directory() {
                let mut header = directory::read_header(image, renamed.key_pointer)?;
                header.name = stored;
                directory::write_header(image, renamed.key_pointer, &header)?;
            }
            Ok(())
        })?;

        debug!("Renamed {} to {}", path, name);
        Ok(name)
    }

    /// Change a file's type and aux type
    pub fn set_type(&mut self, path: &str, file_type: FileType) -> Result<()> {
        let found = self.lookup(path)?;
        if found.entry.is_directory() {
            return Err(DiskError::unsupported("Cannot change the type of a directory"));
        }
        self.transact(|image, _| {
            let mut changed = found.entry.clone();
            changed.file_type = file_type.file_type;
            changed.aux_type = file_type.aux_type;
            directory::write_entry(image, found.location, &changed)
        })
    }

    /// Set or clear the destroy, rename and write access bits
    pub fn lock(&mut self, path: &str, locked: bool) -> Result<()> {
        let found = self.lookup(path)?;
        self.transact(|image, _| {
            let mut changed = found.entry.clone();
            if locked {
                changed.access &= !ACCESS_LOCK_MASK;
            } else {
                changed.access |= ACCESS_LOCK_MASK;
            }
            directory::write_entry(image, found.location, &changed)
        })
    }

    /// Create a subdirectory, returning its name
    pub fn mkdir(&mut self, path: &str) -> Result<String> {
        let (parents, raw_name) = split_path(path);
        let parent = directory::resolve_path(
            &self.image,
            VOLUME_DIRECTORY_BLOCK,
            &parents,
            self.total_blocks(),
        )?;
        let name = entry::sanitize_name(raw_name)?;
        if self
            .names_in(parent)?
            .iter()
            .any(|n| n.eq_ignore_ascii_case(&name))
        {
            return Err(DiskError::NameCollision(name));
        }

        let stored = name.clone();
        self.transact(move |image, bitmap| {
            let key = bitmap.allocate(1)?[0];
            let now = Timestamp::now();
            let dir_entry = FileEntry {
                storage_type: StorageType::Subdirectory,
                name: stored.clone(),
                file_type: PRODOS_DIR,
                key_pointer: key,
                blocks_used: 1,
                eof: BLOCK_SIZE as u32,
                created: now,
                version: 0,
                min_version: 0,
                access: ACCESS_DEFAULT,
                aux_type: 0,
                modified: now,
                header_pointer: parent,
            };
            let location = directory::create_entry(image, bitmap, parent, dir_entry)?;

            let header = DirectoryHeader {
                name: stored,
                created: now,
                version: 0,
                min_version: 0,
                access: ACCESS_DEFAULT,
                entry_length: ENTRY_LENGTH as u8,
                entries_per_block: ENTRIES_PER_BLOCK as u8,
                file_count: 0,
                kind: HeaderKind::Subdirectory {
                    parent_pointer: location.block,
                    parent_entry_number: location.entry_number(),
                    parent_entry_length: ENTRY_LENGTH as u8,
                },
            };
            image.write_block(key as usize, &directory::new_subdirectory_block(&header))
        })?;

        info!("Created directory {}", name);
        Ok(name)
    }

    fn to_dir_entry(entry: &FileEntry) -> DirEntry {
        let kind = if entry.is_directory() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        DirEntry {
            name: entry.name.clone(),
            kind,
            file_type: entry.file_type,
            aux_type: entry.aux_type,
            type_name: prodos_type_name(entry.file_type).to_string(),
            size: entry.eof as usize,
            units_used: entry.blocks_used as usize,
            created: entry.created.to_datetime(),
            modified: entry.modified.to_datetime(),
            attributes: FileAttributes {
                locked: entry.is_locked(),
                deleted: false,
            },
        }
    }

    fn read_entry_data(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        extent::read_file_data(
            &self.image,
            entry.storage_type,
            entry.key_pointer,
            entry.eof as usize,
            self.total_blocks(),
        )
    }

    fn catalog_dir(
        &self,
        key: u16,
        prefix: &str,
        depth: usize,
        visited: &mut HashSet<u16>,
    ) -> Result<Vec<CatalogEntry>> {
        if depth > self.max_depth {
            return Err(DiskError::corrupt(format!(
                "Directories nested deeper than {}",
                self.max_depth
            )));
        }
        if !visited.insert(key) {
            return Err(DiskError::corrupt(format!(
                "Directory at block {} reached twice",
                key
            )));
        }

        let mut out = Vec::new();
        for (_, entry) in directory::list_entries(&self.image, key, self.total_blocks())? {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", prefix, entry.name)
            };
            let (data, children) = if entry.is_directory() {
                (
                    Vec::new(),
                    self.catalog_dir(entry.key_pointer, &path, depth + 1, visited)?,
                )
            } else {
                let data = self.read_entry_data(&entry).unwrap_or_else(|e| {
                    warn!("Cannot read {}: {}", path, e);
                    Vec::new()
                });
                (data, Vec::new())
            };
            out.push(CatalogEntry {
                entry: Self::to_dir_entry(&entry),
                path,
                data,
                children,
            });
        }
        Ok(out)
    }

    /// Cross-check reachable blocks against the bitmap
    pub fn check_volume(&self) -> Result<CheckReport> {
        let bitmap = self.bitmap()?;
        let total = self.total_blocks();
        let mut owners: HashMap<u16, String> = HashMap::new();
        let mut report = CheckReport::default();

        let mut claim = |block: u16, owner: &str, report: &mut CheckReport| {
            if let Some(previous) = owners.insert(block, owner.to_string()) {
                report
                    .problems
                    .push(format!("Block {} shared by {} and {}", block, previous, owner));
            }
        };

        for block in 0..bitmap.first_allocatable() as u16 {
            if block < VOLUME_DIRECTORY_BLOCK || block > VOLUME_DIRECTORY_LAST_BLOCK {
                claim(block, "system area", &mut report);
            }
        }

        let mut worklist = vec![(VOLUME_DIRECTORY_BLOCK, String::from("/"), 0usize)];
        let mut visited = HashSet::new();
        while let Some((key, path, depth)) = worklist.pop() {
            if depth > self.max_depth || !visited.insert(key) {
                report
                    .problems
                    .push(format!("Directory {} revisited or nested too deep", path));
                continue;
            }
            let chain = match directory::read_chain(&self.image, key, total) {
                Ok(chain) => chain,
                Err(e) => {
                    report.problems.push(format!("{}: {}", path, e));
                    continue;
                }
            };
            for block in &chain {
                claim(*block, &path, &mut report);
            }

            for (_, entry) in directory::list_entries(&self.image, key, total)? {
                let entry_path = format!("{}{}", path, entry.name);
                if entry.is_directory() {
                    worklist.push((entry.key_pointer, format!("{}/", entry_path), depth + 1));
                    continue;
                }
                match extent::collect_blocks(&self.image, entry.storage_type, entry.key_pointer, total) {
                    Ok(blocks) => {
                        if blocks.len() != entry.blocks_used as usize {
                            report.problems.push(format!(
                                "{} records {} blocks, owns {}",
                                entry_path,
                                entry.blocks_used,
                                blocks.len()
                            ));
                        }
                        for block in blocks {
                            claim(block, &entry_path, &mut report);
                        }
                    }
                    Err(e) => report.problems.push(format!("{}: {}", entry_path, e)),
                }
            }
        }

        report.reachable = owners.len();
        let mut used_but_free: Vec<usize> = owners
            .keys()
            .map(|&b| b as usize)
            .filter(|&b| bitmap.is_free(b))
            .collect();
        used_but_free.sort_unstable();
        report.used_but_free = used_but_free;
        report.orphans = (0..total)
            .filter(|&b| !bitmap.is_free(b) && !owners.contains_key(&(b as u16)))
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

impl FileSystem for ProdosFileSystem {
    fn fs_type(&self) -> FileSystemType {
        FileSystemType::Prodos
    }

    fn image(&self) -> &DiskImage {
        &self.image
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let dir = self.resolve_directory(path)?;
        Ok(directory::list_entries(&self.image, dir, self.total_blocks())?
            .iter()
            .map(|(_, e)| Self::to_dir_entry(e))
            .collect())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let found = self.lookup(path)?;
        if found.entry.is_directory() {
            return Err(DiskError::unsupported(format!("{} is a directory", path)));
        }
        self.read_entry_data(&found.entry)
    }

    fn write_file(&mut self, path: &str, data: &[u8], file_type: FileType) -> Result<String> {
        let (parents, name) = split_path(path);
        self.add_file(&parents.join("/"), name, data, file_type)
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

    fn create_directory(&mut self, path: &str) -> Result<String> {
        self.mkdir(path)
    }

    fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        let mut visited = HashSet::new();
        self.catalog_dir(VOLUME_DIRECTORY_BLOCK, "", 0, &mut visited)
    }

    fn info(&self) -> Result<FileSystemInfo> {
        Ok(FileSystemInfo {
            fs_type: FileSystemType::Prodos,
            volume_name: format!("/{}", self.volume.name),
            order: self.image.order(),
            total_units: self.total_blocks(),
            free_units: self.bitmap()?.free_count(),
            unit_size: BLOCK_SIZE,
            file_count: self.volume.file_count as usize,
        })
    }

    fn allocation(&self) -> Result<AllocationMap> {
        let bitmap = self.bitmap()?;
        Ok(AllocationMap {
            units_per_column: BLOCKS_PER_TRACK,
            used: (0..self.total_blocks()).map(|b| !bitmap.is_free(b)).collect(),
        })
    }

    fn check(&self) -> Result<CheckReport> {
        self.check_volume()
    }
}
