/// ProDOS volume bitmap allocator
///
/// One bit per block, most significant bit first, bit set = free. The bitmap
/// starts at the block named by the volume header and spans
/// ⌈total_blocks / 4096⌉ blocks.

use crate::error::{DiskError, Result};
use crate::format::constants::*;
use crate::image::DiskImage;
use log::{debug, trace};

/// In-memory copy of a volume bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBitmap {
    bits: Vec<u8>,
    start_block: u16,
    total_blocks: usize,
}

impl VolumeBitmap {
    /// Number of bitmap blocks for a volume size
    pub fn blocks_needed(total_blocks: usize) -> usize {
        total_blocks.div_ceil(BLOCKS_PER_BITMAP_BLOCK)
    }

    /// Fresh bitmap with every block free
    pub fn new_all_free(start_block: u16, total_blocks: usize) -> Self {
        let mut bits = vec![0u8; Self::blocks_needed(total_blocks) * BLOCK_SIZE];
        for block in 0..total_blocks {
            bits[block / 8] |= 0x80 >> (block % 8);
        }
        Self {
            bits,
            start_block,
            total_blocks,
        }
    }

    /// Read the bitmap from an image
    pub fn load(image: &DiskImage, start_block: u16, total_blocks: usize) -> Result<Self> {
        let count = Self::blocks_needed(total_blocks);
        if start_block as usize + count > total_blocks {
            return Err(DiskError::corrupt(format!(
                "Bitmap at block {} does not fit a {}-block volume",
                start_block, total_blocks
            )));
        }
        let mut bits = Vec::with_capacity(count * BLOCK_SIZE);
        for i in 0..count {
            bits.extend(image.read_block(start_block as usize + i)?);
        }
        Ok(Self {
            bits,
            start_block,
            total_blocks,
        })
    }

    /// Write the bitmap back to an image
    pub fn store(&self, image: &mut DiskImage) -> Result<()> {
        for (i, chunk) in self.bits.chunks(BLOCK_SIZE).enumerate() {
            image.write_block(self.start_block as usize + i, chunk)?;
        }
        Ok(())
    }

    /// First bitmap block
    pub fn start_block(&self) -> u16 {
        self.start_block
    }

    /// Blocks on the volume
    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    /// First block after the boot blocks, volume directory and bitmap
    pub fn first_allocatable(&self) -> usize {
        let after_bitmap = self.start_block as usize + Self::blocks_needed(self.total_blocks);
        after_bitmap.max(VOLUME_DIRECTORY_LAST_BLOCK as usize + 1)
    }

    /// Whether a block is marked free
    pub fn is_free(&self, block: usize) -> bool {
        block < self.total_blocks && self.bits[block / 8] & (0x80 >> (block % 8)) != 0
    }

    /// Mark a block free
    pub fn mark_free(&mut self, block: usize) {
        if block < self.total_blocks {
            self.bits[block / 8] |= 0x80 >> (block % 8);
        }
    }

    /// Mark a block used
    pub fn mark_used(&mut self, block: usize) {
        if block < self.total_blocks {
            self.bits[block / 8] &= !(0x80 >> (block % 8));
        }
    }

    /// Number of free blocks
    pub fn free_count(&self) -> usize {
        (0..self.total_blocks).filter(|&b| self.is_free(b)).count()
    }

    /// Allocate `n` blocks, lowest numbered first
    ///
    /// Candidates are gathered before anything is marked, so a request that
    /// cannot be satisfied leaves the bitmap unchanged.
    pub fn allocate(&mut self, n: usize) -> Result<Vec<u16>> {
        let found: Vec<u16> = (self.first_allocatable()..self.total_blocks)
            .filter(|&b| self.is_free(b))
            .take(n)
            .map(|b| b as u16)
            .collect();

        if found.len() < n {
            trace!("Bitmap has {} free blocks, {} requested", found.len(), n);
            return Err(DiskError::InsufficientSpace {
                unit: "blocks",
                needed: n,
                available: self.free_count(),
            });
        }

        for &block in &found {
            self.mark_used(block as usize);
        }
        debug!("Allocated {} blocks: {:?}", n, found);
        Ok(found)
    }

    /// Return blocks to the free pool
    pub fn free(&mut self, blocks: &[u16]) {
        for &block in blocks {
            self.mark_free(block as usize);
        }
        debug!("Freed {} blocks", blocks.len());
    }
}
