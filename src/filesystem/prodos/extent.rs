/// ProDOS file extents: seedling, sapling and tree storage
///
/// Index blocks hold 256 block pointers as 256 low bytes followed by 256 high
/// bytes. A zero pointer is a sparse hole that reads as zeros.

use super::bitmap::VolumeBitmap;
use super::entry::StorageType;
use crate::error::{DiskError, Result};
use crate::format::constants::*;
use crate::image::DiskImage;
use log::{debug, warn};
use std::collections::HashSet;

/// Blocks a payload needs, split by role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentPlan {
    /// Storage type the payload gets
    pub storage_type: StorageType,
    /// Data blocks
    pub data_blocks: usize,
    /// Index blocks (master included)
    pub index_blocks: usize,
}

impl ExtentPlan {
    /// Total blocks to allocate
    pub fn total_blocks(&self) -> usize {
        self.data_blocks + self.index_blocks
    }
}

/// Where a written file ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// Storage type
    pub storage_type: StorageType,
    /// Key block
    pub key_block: u16,
    /// Blocks used, index blocks included
    pub blocks_used: u16,
    /// File length
    pub eof: u32,
}

/// Choose the storage layout for a payload of `len` bytes
///
/// An empty payload still gets one zeroed data block.
pub fn plan(len: usize) -> Result<ExtentPlan> {
    if len > PRODOS_MAX_EOF {
        return Err(DiskError::FileTooLarge {
            size: len,
            max: PRODOS_MAX_EOF,
        });
    }
    let data_blocks = len.div_ceil(BLOCK_SIZE).max(1);
    let (storage_type, index_blocks) = match data_blocks {
        1 => (StorageType::Seedling, 0),
        2..=POINTERS_PER_INDEX => (StorageType::Sapling, 1),
        n => (StorageType::Tree, n.div_ceil(POINTERS_PER_INDEX) + 1),
    };
    Ok(ExtentPlan {
        storage_type,
        data_blocks,
        index_blocks,
    })
}

/// Decode an index block into its 256 pointers
pub fn decode_index(block: &[u8]) -> [u16; POINTERS_PER_INDEX] {
    let mut pointers = [0u16; POINTERS_PER_INDEX];
    for (i, pointer) in pointers.iter_mut().enumerate() {
        *pointer = block[i] as u16 | (block[POINTERS_PER_INDEX + i] as u16) << 8;
    }
    pointers
}

/// Encode up to 256 pointers into an index block
pub fn encode_index(pointers: &[u16]) -> Vec<u8> {
    let mut block = vec![0u8; BLOCK_SIZE];
    for (i, &pointer) in pointers.iter().take(POINTERS_PER_INDEX).enumerate() {
        block[i] = pointer as u8;
        block[POINTERS_PER_INDEX + i] = (pointer >> 8) as u8;
    }
    block
}

/// Allocate blocks for `data`, write it and any index blocks
///
/// Index blocks come first in allocation order, then the data blocks.
pub fn write_file_data(
    image: &mut DiskImage,
    bitmap: &mut VolumeBitmap,
    data: &[u8],
) -> Result<Extent> {
    let plan = plan(data.len())?;
    let blocks = bitmap.allocate(plan.total_blocks())?;
    let (index, data_blocks) = blocks.split_at(plan.index_blocks);

    for (i, &block) in data_blocks.iter().enumerate() {
        let start = i * BLOCK_SIZE;
        let end = (start + BLOCK_SIZE).min(data.len());
        let chunk = if start < data.len() { &data[start..end] } else { &[][..] };
        image.write_block(block as usize, chunk)?;
    }

    let key_block = match plan.storage_type {
        StorageType::Seedling => data_blocks[0],
        StorageType::Sapling => {
            image.write_block(index[0] as usize, &encode_index(data_blocks))?;
            index[0]
        }
        _ => {
            let (master, secondaries) = index.split_at(1);
            for (secondary, chunk) in secondaries
                .iter()
                .zip(data_blocks.chunks(POINTERS_PER_INDEX))
            {
                image.write_block(*secondary as usize, &encode_index(chunk))?;
            }
            image.write_block(master[0] as usize, &encode_index(secondaries))?;
            master[0]
        }
    };

    debug!(
        "Wrote {} bytes as {} at block {} ({} blocks)",
        data.len(),
        plan.storage_type,
        key_block,
        blocks.len()
    );
    Ok(Extent {
        storage_type: plan.storage_type,
        key_block,
        blocks_used: blocks.len() as u16,
        eof: data.len() as u32,
    })
}

fn check_pointer(block: u16, total_blocks: usize) -> Result<()> {
    if block as usize >= total_blocks {
        return Err(DiskError::corrupt(format!(
            "Block pointer {} beyond end of {}-block volume",
            block, total_blocks
        )));
    }
    Ok(())
}

/// Append one data block (or hole) to `out`, never past `eof`
fn append_block(
    image: &DiskImage,
    block: u16,
    eof: usize,
    total_blocks: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    let take = (eof - out.len()).min(BLOCK_SIZE);
    if block == 0 {
        out.resize(out.len() + take, 0);
    } else {
        check_pointer(block, total_blocks)?;
        let data = image.read_block(block as usize)?;
        out.extend_from_slice(&data[..take]);
    }
    Ok(())
}

fn read_through_index(
    image: &DiskImage,
    index_block: u16,
    eof: usize,
    total_blocks: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    let pointers = if index_block == 0 {
        [0u16; POINTERS_PER_INDEX]
    } else {
        check_pointer(index_block, total_blocks)?;
        decode_index(&image.read_block(index_block as usize)?)
    };
    for &pointer in pointers.iter() {
        if out.len() >= eof {
            break;
        }
        append_block(image, pointer, eof, total_blocks, out)?;
    }
    Ok(())
}

/// Read a file's bytes through its extent
pub fn read_file_data(
    image: &DiskImage,
    storage_type: StorageType,
    key_block: u16,
    eof: usize,
    total_blocks: usize,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(eof.min(PRODOS_MAX_EOF));
    match storage_type {
        StorageType::Seedling => {
            let eof = eof.min(BLOCK_SIZE);
            append_block(image, key_block, eof, total_blocks, &mut out)?;
        }
        StorageType::Sapling => {
            read_through_index(image, key_block, eof, total_blocks, &mut out)?;
        }
        StorageType::Tree => {
            check_pointer(key_block, total_blocks)?;
            let master = decode_index(&image.read_block(key_block as usize)?);
            for &secondary in master.iter() {
                if out.len() >= eof {
                    break;
                }
                read_through_index(image, secondary, eof, total_blocks, &mut out)?;
            }
        }
        other => {
            return Err(DiskError::unsupported(format!(
                "Cannot read {} storage",
                other
            )))
        }
    }

    if out.len() < eof {
        warn!(
            "{} at block {} ends at {} bytes, EOF says {}",
            storage_type,
            key_block,
            out.len(),
            eof
        );
    }
    Ok(out)
}

/// Every block a file owns, index blocks included, holes skipped
pub fn collect_blocks(
    image: &DiskImage,
    storage_type: StorageType,
    key_block: u16,
    total_blocks: usize,
) -> Result<Vec<u16>> {
    let mut blocks = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |block: u16, blocks: &mut Vec<u16>| -> Result<()> {
        check_pointer(block, total_blocks)?;
        if !seen.insert(block) {
            return Err(DiskError::corrupt(format!(
                "Block {} referenced twice by one file",
                block
            )));
        }
        blocks.push(block);
        Ok(())
    };

    match storage_type {
        StorageType::Seedling => push(key_block, &mut blocks)?,
        StorageType::Sapling => {
            push(key_block, &mut blocks)?;
            for pointer in decode_index(&image.read_block(key_block as usize)?) {
                if pointer != 0 {
                    push(pointer, &mut blocks)?;
                }
            }
        }
        StorageType::Tree => {
            push(key_block, &mut blocks)?;
            for secondary in decode_index(&image.read_block(key_block as usize)?) {
                if secondary == 0 {
                    continue;
                }
                push(secondary, &mut blocks)?;
                for pointer in decode_index(&image.read_block(secondary as usize)?) {
                    if pointer != 0 {
                        push(pointer, &mut blocks)?;
                    }
                }
            }
        }
        other => {
            return Err(DiskError::unsupported(format!(
                "Cannot walk {} storage",
                other
            )))
        }
    }
    Ok(blocks)
}

/// Free every block a file owns
pub fn free_file_data(
    image: &DiskImage,
    bitmap: &mut VolumeBitmap,
    storage_type: StorageType,
    key_block: u16,
) -> Result<usize> {
    let blocks = collect_blocks(image, storage_type, key_block, bitmap.total_blocks())?;
    bitmap.free(&blocks);
    Ok(blocks.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SectorOrder;

    fn setup() -> (DiskImage, VolumeBitmap) {
        let image = DiskImage::blank(1600 * BLOCK_SIZE, SectorOrder::Prodos, false);
        let bitmap = VolumeBitmap::new_all_free(6, 1600);
        (image, bitmap)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + i / 512) as u8).collect()
    }

    #[test]
    fn test_plan_storage_types() {
        assert_eq!(plan(0).unwrap().storage_type, StorageType::Seedling);
        assert_eq!(plan(512).unwrap().storage_type, StorageType::Seedling);
        assert_eq!(plan(513).unwrap().storage_type, StorageType::Sapling);
        assert_eq!(plan(256 * 512).unwrap().index_blocks, 1);

        let tree = plan(257 * 512).unwrap();
        assert_eq!(tree.storage_type, StorageType::Tree);
        assert_eq!(tree.index_blocks, 3);

        // 510 data blocks + 2 secondaries + master = 513 blocks used
        let tree = plan(510 * 512).unwrap();
        assert_eq!(tree.index_blocks - 1, 2);
        assert_eq!(tree.total_blocks(), 513);

        assert!(matches!(
            plan(PRODOS_MAX_EOF + 1),
            Err(DiskError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_index_encoding() {
        let block = encode_index(&[0x0102, 0x0304]);
        assert_eq!(block[0], 0x02);
        assert_eq!(block[1], 0x04);
        assert_eq!(block[256], 0x01);
        assert_eq!(block[257], 0x03);
        assert_eq!(&decode_index(&block)[..3], &[0x0102, 0x0304, 0]);
    }

    #[test]
    fn test_seedling_round_trip() {
        let (mut image, mut bitmap) = setup();
        let data = pattern(100);
        let extent = write_file_data(&mut image, &mut bitmap, &data).unwrap();
        assert_eq!(extent.storage_type, StorageType::Seedling);
        assert_eq!(extent.blocks_used, 1);
        let read = read_file_data(&image, extent.storage_type, extent.key_block, 100, 1600).unwrap();
        assert_eq!(read, data);
    }

    #[test]
    fn test_sapling_round_trip_and_free() {
        let (mut image, mut bitmap) = setup();
        let before = bitmap.clone();
        let data = pattern(5 * 512);
        let extent = write_file_data(&mut image, &mut bitmap, &data).unwrap();
        assert_eq!(extent.storage_type, StorageType::Sapling);
        assert_eq!(extent.blocks_used, 6);

        let read =
            read_file_data(&image, extent.storage_type, extent.key_block, data.len(), 1600).unwrap();
        assert_eq!(read, data);

        let freed = free_file_data(&image, &mut bitmap, extent.storage_type, extent.key_block).unwrap();
        assert_eq!(freed, 6);
        assert_eq!(bitmap, before);
    }

    #[test]
    fn test_tree_round_trip() {
        let (mut image, mut bitmap) = setup();
        let data = pattern(300 * 512 + 17);
        let extent = write_file_data(&mut image, &mut bitmap, &data).unwrap();
        assert_eq!(extent.storage_type, StorageType::Tree);
        // 301 data blocks, 2 secondaries, 1 master
        assert_eq!(extent.blocks_used, 304);

        let read =
            read_file_data(&image, extent.storage_type, extent.key_block, data.len(), 1600).unwrap();
        assert_eq!(read, data);

        let master = decode_index(&image.read_block(extent.key_block as usize).unwrap());
        assert_ne!(master[0], 0);
        assert_ne!(master[1], 0);
        assert_eq!(master[2], 0);
    }

    #[test]
    fn test_sparse_holes_clamped_to_eof() {
        let (mut image, _) = setup();
        // Sapling with an index block full of holes and an EOF of 1000 bytes
        image.write_block(20, &encode_index(&[])).unwrap();
        let read = read_file_data(&image, StorageType::Sapling, 20, 1000, 1600).unwrap();
        assert_eq!(read, vec![0u8; 1000]);

        // Tree whose master is all holes
        let read = read_file_data(&image, StorageType::Tree, 20, 3000, 1600).unwrap();
        assert_eq!(read.len(), 3000);
    }

    #[test]
    fn test_bad_pointer_is_corruption() {
        let (mut image, _) = setup();
        image.write_block(20, &encode_index(&[5000])).unwrap();
        let result = read_file_data(&image, StorageType::Sapling, 20, 100, 1600);
        assert!(matches!(result, Err(DiskError::StructuralCorruption(_))));
    }
}
