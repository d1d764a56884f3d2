/// ProDOS directory chains
///
/// A directory is a doubly linked chain of blocks: +0 previous block, +2 next
/// block, then 13 entry slots of 39 bytes from +4. Slot 0 of the key block
/// holds the volume or subdirectory header.

use super::bitmap::VolumeBitmap;
use super::entry::{le16, DirectoryHeader, FileEntry, HeaderKind, StorageType};
use crate::error::{DiskError, Result};
use crate::format::constants::*;
use crate::image::DiskImage;
use log::{debug, trace, warn};
use std::collections::HashSet;

/// Position of an entry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryLocation {
    /// Directory block
    pub block: u16,
    /// Slot index within the block (0-12)
    pub slot: usize,
}

impl EntryLocation {
    /// Byte offset of the slot within its block
    pub fn offset(&self) -> usize {
        DIRECTORY_ENTRIES_OFFSET + self.slot * ENTRY_LENGTH
    }

    /// 1-based entry number as stored in subdirectory headers
    pub fn entry_number(&self) -> u8 {
        self.slot as u8 + 1
    }
}

/// Entry found by a search, with the key block of the directory holding it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundEntry {
    /// Key block of the containing directory
    pub directory: u16,
    /// Slot location
    pub location: EntryLocation,
    /// Decoded entry
    pub entry: FileEntry,
}

/// Follow a directory's next pointers, refusing loops and wild pointers
pub fn read_chain(image: &DiskImage, key_block: u16, total_blocks: usize) -> Result<Vec<u16>> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut block = key_block;

    loop {
        if block == 0 || block as usize >= total_blocks {
            return Err(DiskError::corrupt(format!(
                "Directory block pointer {} outside volume",
                block
            )));
        }
        if !visited.insert(block) {
            return Err(DiskError::corrupt(format!(
                "Directory chain from block {} loops back to block {}",
                key_block, block
            )));
        }
        chain.push(block);

        let data = image.read_block(block as usize)?;
        let next = le16(&data, 2);
        if next == 0 {
            break;
        }
        trace!("Directory block {} -> {}", block, next);
        block = next;
    }
    Ok(chain)
}

/// Read the header in slot 0 of a directory key block
pub fn read_header(image: &DiskImage, key_block: u16) -> Result<DirectoryHeader> {
    let data = image.read_block(key_block as usize)?;
    DirectoryHeader::parse(&data[DIRECTORY_ENTRIES_OFFSET..DIRECTORY_ENTRIES_OFFSET + ENTRY_LENGTH])
}

/// Rewrite the header in slot 0 of a directory key block
pub fn write_header(image: &mut DiskImage, key_block: u16, header: &DirectoryHeader) -> Result<()> {
    write_slot(
        image,
        EntryLocation {
            block: key_block,
            slot: 0,
        },
        &header.to_bytes(),
    )
}

fn write_slot(image: &mut DiskImage, location: EntryLocation, bytes: &[u8]) -> Result<()> {
    let mut data = image.read_block(location.block as usize)?;
    let offset = location.offset();
    data[offset..offset + ENTRY_LENGTH].copy_from_slice(&bytes[..ENTRY_LENGTH]);
    image.write_block(location.block as usize, &data)
}

/// Write an entry into its slot
pub fn write_entry(image: &mut DiskImage, location: EntryLocation, entry: &FileEntry) -> Result<()> {
    write_slot(image, location, &entry.to_bytes())
}

/// Read the entry in a slot, if any
pub fn read_entry(image: &DiskImage, location: EntryLocation) -> Result<Option<FileEntry>> {
    let data = image.read_block(location.block as usize)?;
    let offset = location.offset();
    Ok(FileEntry::parse(&data[offset..offset + ENTRY_LENGTH]))
}

/// Every slot of a directory in chain order, the key block's header slot excluded
fn slots(
    image: &DiskImage,
    key_block: u16,
    total_blocks: usize,
) -> Result<Vec<(EntryLocation, Vec<u8>)>> {
    let mut out = Vec::new();
    for block in read_chain(image, key_block, total_blocks)? {
        let data = image.read_block(block as usize)?;
        for slot in 0..ENTRIES_PER_BLOCK {
            if block == key_block && slot == 0 {
                continue;
            }
            let location = EntryLocation { block, slot };
            let offset = location.offset();
            out.push((location, data[offset..offset + ENTRY_LENGTH].to_vec()));
        }
    }
    Ok(out)
}

/// Active entries of a directory
pub fn list_entries(
    image: &DiskImage,
    key_block: u16,
    total_blocks: usize,
) -> Result<Vec<(EntryLocation, FileEntry)>> {
    Ok(slots(image, key_block, total_blocks)?
        .into_iter()
        .filter_map(|(location, bytes)| FileEntry::parse(&bytes).map(|e| (location, e)))
        .collect())
}

/// First free slot of a directory
pub fn find_free_entry(
    image: &DiskImage,
    key_block: u16,
    total_blocks: usize,
) -> Result<Option<EntryLocation>> {
    Ok(slots(image, key_block, total_blocks)?
        .into_iter()
        .find(|(_, bytes)| StorageType::from_nibble(bytes[0] >> 4) == StorageType::Deleted)
        .map(|(location, _)| location))
}

/// Find an entry by name, optionally descending into subdirectories
///
/// Names compare case-insensitively. Descent is breadth first and bounded
/// by `max_depth`; a directory reached twice is reported as corruption.
pub fn find_entry(
    image: &DiskImage,
    key_block: u16,
    name: &str,
    recursive: bool,
    total_blocks: usize,
    max_depth: usize,
) -> Result<Option<FoundEntry>> {
    let mut worklist = vec![(key_block, 0usize)];
    let mut visited = HashSet::new();

    while !worklist.is_empty() {
        let (directory, depth) = worklist.remove(0);
        if !visited.insert(directory) {
            return Err(DiskError::corrupt(format!(
                "Directory at block {} reached twice",
                directory
            )));
        }
        if depth > max_depth {
            return Err(DiskError::corrupt(format!(
                "Directories nested deeper than {}",
                max_depth
            )));
        }

        for (location, entry) in list_entries(image, directory, total_blocks)? {
            if entry.name.eq_ignore_ascii_case(name) {
                return Ok(Some(FoundEntry {
                    directory,
                    location,
                    entry,
                }));
            }
            if recursive && entry.is_directory() {
                worklist.push((entry.key_pointer, depth + 1));
            }
        }
    }
    Ok(None)
}

/// Resolve directory path components to a directory key block
///
/// Every component must name an existing subdirectory.
pub fn resolve_path(
    image: &DiskImage,
    volume_key: u16,
    components: &[&str],
    total_blocks: usize,
) -> Result<u16> {
    let mut current = volume_key;
    for (i, component) in components.iter().enumerate() {
        let found = find_entry(image, current, component, false, total_blocks, 0)?;
        match found {
            Some(found) if found.entry.is_directory() => current = found.entry.key_pointer,
            _ => return Err(DiskError::not_found(components[..=i].join("/"))),
        }
    }
    Ok(current)
}

fn adjust_file_count(image: &mut DiskImage, key_block: u16, delta: i32) -> Result<()> {
    let mut header = read_header(image, key_block)?;
    let count = header.file_count as i32 + delta;
    if count < 0 {
        warn!("File count of directory at block {} already zero", key_block);
    }
    header.file_count = count.clamp(0, u16::MAX as i32) as u16;
    write_header(image, key_block, &header)
}

/// Add one to a directory's file count
pub fn increment_file_count(image: &mut DiskImage, key_block: u16) -> Result<()> {
    adjust_file_count(image, key_block, 1)
}

/// Subtract one from a directory's file count
pub fn decrement_file_count(image: &mut DiskImage, key_block: u16) -> Result<()> {
    adjust_file_count(image, key_block, -1)
}

/// Locate the parent entry describing a subdirectory
fn parent_entry_location(
    image: &DiskImage,
    key_block: u16,
    header: &DirectoryHeader,
) -> Result<Option<EntryLocation>> {
    let HeaderKind::Subdirectory {
        parent_pointer,
        parent_entry_number,
        ..
    } = header.kind
    else {
        return Ok(None);
    };
    if parent_pointer == 0 {
        return Ok(None);
    }

    let hinted = EntryLocation {
        block: parent_pointer,
        slot: (parent_entry_number as usize).saturating_sub(1).min(ENTRIES_PER_BLOCK - 1),
    };
    if let Some(entry) = read_entry(image, hinted)? {
        if entry.key_pointer == key_block {
            return Ok(Some(hinted));
        }
    }
    for slot in 0..ENTRIES_PER_BLOCK {
        let location = EntryLocation {
            block: parent_pointer,
            slot,
        };
        if let Some(entry) = read_entry(image, location)? {
            if entry.is_directory() && entry.key_pointer == key_block {
                return Ok(Some(location));
            }
        }
    }
    Ok(None)
}

/// Append a block to a full subdirectory and return its first slot
fn grow_directory(
    image: &mut DiskImage,
    bitmap: &mut VolumeBitmap,
    key_block: u16,
    total_blocks: usize,
) -> Result<EntryLocation> {
    let header = read_header(image, key_block)?;
    if matches!(header.kind, HeaderKind::Volume { .. }) {
        return Err(DiskError::InsufficientSpace {
            unit: "directory entries",
            needed: 1,
            available: 0,
        });
    }

    let chain = read_chain(image, key_block, total_blocks)?;
    let last = *chain.last().unwrap_or(&key_block);
    let new_block = bitmap.allocate(1)?[0];

    let mut fresh = vec![0u8; BLOCK_SIZE];
    fresh[0..2].copy_from_slice(&last.to_le_bytes());
    image.write_block(new_block as usize, &fresh)?;

    let mut tail = image.read_block(last as usize)?;
    tail[2..4].copy_from_slice(&new_block.to_le_bytes());
    image.write_block(last as usize, &tail)?;

    match parent_entry_location(image, key_block, &header)? {
        Some(location) => {
            if let Some(mut entry) = read_entry(image, location)? {
                entry.blocks_used = entry.blocks_used.saturating_add(1);
                entry.eof += BLOCK_SIZE as u32;
                write_entry(image, location, &entry)?;
            }
        }
        None => warn!(
            "Parent entry of directory at block {} not found, size not updated",
            key_block
        ),
    }

    debug!("Directory at block {} grew into block {}", key_block, new_block);
    Ok(EntryLocation {
        block: new_block,
        slot: 0,
    })
}

/// Store a new entry in a directory and bump its file count
///
/// A full subdirectory grows by one block; a full volume directory is an error.
pub fn create_entry(
    image: &mut DiskImage,
    bitmap: &mut VolumeBitmap,
    directory: u16,
    mut entry: FileEntry,
) -> Result<EntryLocation> {
    let total_blocks = bitmap.total_blocks();
    let location = match find_free_entry(image, directory, total_blocks)? {
        Some(location) => location,
        None => grow_directory(image, bitmap, directory, total_blocks)?,
    };

    entry.header_pointer = directory;
    write_entry(image, location, &entry)?;
    increment_file_count(image, directory)?;
    debug!(
        "Created {} '{}' in block {} slot {}",
        entry.storage_type, entry.name, location.block, location.slot
    );
    Ok(location)
}

/// Clear an entry slot and drop the directory's file count
pub fn delete_entry(image: &mut DiskImage, directory: u16, location: EntryLocation) -> Result<()> {
    write_slot(image, location, &[0u8; ENTRY_LENGTH])?;
    decrement_file_count(image, directory)
}

/// Build an empty subdirectory key block
pub fn new_subdirectory_block(header: &DirectoryHeader) -> Vec<u8> {
    let mut block = vec![0u8; BLOCK_SIZE];
    block[DIRECTORY_ENTRIES_OFFSET..DIRECTORY_ENTRIES_OFFSET + ENTRY_LENGTH]
        .copy_from_slice(&header.to_bytes());
    block
}

#[cfg(test)]
mod tests {
    use super::super::entry::Timestamp;
    use super::*;
    use crate::format::SectorOrder;

    const TOTAL: usize = 280;

    fn volume() -> (DiskImage, VolumeBitmap) {
        let mut image = DiskImage::blank(TOTAL * BLOCK_SIZE, SectorOrder::Prodos, false);
        for block in 2u16..=5 {
            let mut data = vec![0u8; BLOCK_SIZE];
            let prev = if block == 2 { 0 } else { block - 1 };
            let next = if block == 5 { 0 } else { block + 1 };
            data[0..2].copy_from_slice(&prev.to_le_bytes());
            data[2..4].copy_from_slice(&next.to_le_bytes());
            image.write_block(block as usize, &data).unwrap();
        }
        let header = DirectoryHeader {
            name: "TEST".to_string(),
            created: Timestamp::default(),
            version: 0,
            min_version: 0,
            access: 0xC3,
            entry_length: ENTRY_LENGTH as u8,
            entries_per_block: ENTRIES_PER_BLOCK as u8,
            file_count: 0,
            kind: HeaderKind::Volume {
                bitmap_pointer: 6,
                total_blocks: TOTAL as u16,
            },
        };
        write_header(&mut image, 2, &header).unwrap();
        let mut bitmap = VolumeBitmap::new_all_free(6, TOTAL);
        for block in 0..7 {
            bitmap.mark_used(block);
        }
        (image, bitmap)
    }

    fn file(name: &str, key: u16) -> FileEntry {
        FileEntry {
            storage_type: StorageType::Seedling,
            name: name.to_string(),
            file_type: 0x06,
            key_pointer: key,
            blocks_used: 1,
            eof: 10,
            created: Timestamp::default(),
            version: 0,
            min_version: 0,
            access: ACCESS_DEFAULT,
            aux_type: 0,
            modified: Timestamp::default(),
            header_pointer: 0,
        }
    }

    #[test]
    fn test_free_slot_skips_header() {
        let (image, _) = volume();
        let location = find_free_entry(&image, 2, TOTAL).unwrap().unwrap();
        assert_eq!(location, EntryLocation { block: 2, slot: 1 });
        assert_eq!(location.offset(), 4 + 39);
    }

    #[test]
    fn test_create_find_delete() {
        let (mut image, mut bitmap) = volume();
        let location = create_entry(&mut image, &mut bitmap, 2, file("HELLO", 50)).unwrap();
        assert_eq!(read_header(&image, 2).unwrap().file_count, 1);

        let found = find_entry(&image, 2, "hello", false, TOTAL, 0).unwrap().unwrap();
        assert_eq!(found.location, location);
        assert_eq!(found.entry.header_pointer, 2);

        delete_entry(&mut image, 2, location).unwrap();
        assert_eq!(read_header(&image, 2).unwrap().file_count, 0);
        assert!(find_entry(&image, 2, "HELLO", false, TOTAL, 0).unwrap().is_none());
    }

    #[test]
    fn test_volume_directory_fills_up() {
        let (mut image, mut bitmap) = volume();
        // 4 blocks × 13 slots minus the header
        for i in 0..51 {
            create_entry(&mut image, &mut bitmap, 2, file(&format!("F{}", i), 50)).unwrap();
        }
        let result = create_entry(&mut image, &mut bitmap, 2, file("EXTRA", 50));
        assert!(matches!(result, Err(DiskError::InsufficientSpace { .. })));
    }

    #[test]
    fn test_cycle_is_structural_corruption() {
        let (mut image, _) = volume();
        // Block 5 points back to block 3
        let mut data = image.read_block(5).unwrap();
        data[2..4].copy_from_slice(&3u16.to_le_bytes());
        image.write_block(5, &data).unwrap();

        assert!(matches!(
            read_chain(&image, 2, TOTAL),
            Err(DiskError::StructuralCorruption(_))
        ));
        assert!(matches!(
            find_entry(&image, 2, "X", false, TOTAL, 0),
            Err(DiskError::StructuralCorruption(_))
        ));
    }

    #[test]
    fn test_pointer_outside_volume() {
        let (mut image, _) = volume();
        let mut data = image.read_block(5).unwrap();
        data[2..4].copy_from_slice(&9999u16.to_le_bytes());
        image.write_block(5, &data).unwrap();
        assert!(matches!(
            read_chain(&image, 2, TOTAL),
            Err(DiskError::StructuralCorruption(_))
        ));
    }

    #[test]
    fn test_resolve_path_requires_directories() {
        let (mut image, mut bitmap) = volume();
        create_entry(&mut image, &mut bitmap, 2, file("PLAIN", 50)).unwrap();
        assert_eq!(resolve_path(&image, 2, &[], TOTAL).unwrap(), 2);
        assert!(matches!(
            resolve_path(&image, 2, &["PLAIN"], TOTAL),
            Err(DiskError::EntryNotFound(_))
        ));
        assert!(matches!(
            resolve_path(&image, 2, &["MISSING"], TOTAL),
            Err(DiskError::EntryNotFound(_))
        ));
    }
}
