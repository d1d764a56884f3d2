/// Block and sector address translation
///
/// Every byte offset into an image buffer is computed here. A 512-byte ProDOS
/// block is always two 256-byte halves. On a linear ("ProDOS order") image the
/// halves are adjacent; on an interleaved ("DOS order") image each half lives
/// in the DOS sector given by a per-track permutation table:
///
/// - track 0 holds the boot blocks and the volume directory and uses a
///   countdown table (half-sector N is DOS sector 15-N)
/// - tracks 1 and up use the standard data interleave

use std::ops::Range;

use crate::error::{DiskError, Result};
use crate::format::constants::*;

/// Half-sector to DOS sector map for track 0
pub const TRACK0_SECTOR_MAP: [u8; SECTORS_PER_TRACK] =
    [15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0];

/// Half-sector to DOS sector map for tracks 1 and up
pub const DATA_TRACK_SECTOR_MAP: [u8; SECTORS_PER_TRACK] =
    [0, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 15];

/// Physical layout of the image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout {
    /// Bytes preceding the disk data (2IMG header)
    pub container_offset: usize,
    /// DOS-ordered sectors instead of linear blocks
    pub interleaved: bool,
}

impl Layout {
    /// Linear ("ProDOS order") layout
    pub fn linear(container_offset: usize) -> Self {
        Self {
            container_offset,
            interleaved: false,
        }
    }

    /// Interleaved ("DOS order") layout
    pub fn interleaved(container_offset: usize) -> Self {
        Self {
            container_offset,
            interleaved: true,
        }
    }

    /// Same container offset, other ordering
    pub fn with_interleaved(self, interleaved: bool) -> Self {
        Self {
            interleaved,
            ..self
        }
    }

    /// Permutation table used on a track
    pub fn sector_map(track: usize) -> &'static [u8; SECTORS_PER_TRACK] {
        if track == 0 {
            &TRACK0_SECTOR_MAP
        } else {
            &DATA_TRACK_SECTOR_MAP
        }
    }

    /// Position of a DOS sector within the linear half-sector sequence of a track
    fn half_sector_of(track: usize, sector: usize) -> usize {
        Self::sector_map(track)
            .iter()
            .position(|&s| s as usize == sector)
            .unwrap_or(sector)
    }

    /// Unchecked byte range of one half of a block
    fn half_block_range(&self, block: usize, half: usize) -> Range<usize> {
        let track = block / BLOCKS_PER_TRACK;
        let half_sector = (block % BLOCKS_PER_TRACK) * 2 + half;
        let sector = if self.interleaved {
            Self::sector_map(track)[half_sector] as usize
        } else {
            half_sector
        };
        let start = self.container_offset + track * TRACK_SIZE + sector * SECTOR_SIZE;
        start..start + SECTOR_SIZE
    }

    /// Byte ranges holding the two halves of a block
    pub fn block_ranges(&self, block: usize) -> [Range<usize>; 2] {
        [self.half_block_range(block, 0), self.half_block_range(block, 1)]
    }

    /// Byte range of a DOS 3.3 sector
    pub fn sector_range(&self, track: usize, sector: usize) -> Range<usize> {
        let position = if self.interleaved {
            sector
        } else {
            Self::half_sector_of(track, sector)
        };
        let start = self.container_offset + track * TRACK_SIZE + position * SECTOR_SIZE;
        start..start + SECTOR_SIZE
    }
}

fn check_range(
    range: &Range<usize>,
    len: usize,
    unit: &'static str,
    index: usize,
) -> Result<()> {
    if range.end > len {
        return Err(DiskError::OutOfRange {
            unit,
            index,
            start: range.start,
            end: range.end,
            len,
        });
    }
    Ok(())
}

/// Read one 512-byte block
pub fn read_unit(image: &[u8], block: usize, layout: &Layout) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(BLOCK_SIZE);
    for range in layout.block_ranges(block) {
        check_range(&range, image.len(), "block", block)?;
        data.extend_from_slice(&image[range]);
    }
    Ok(data)
}

/// Write one 512-byte block; shorter data is zero padded
pub fn write_unit(image: &mut [u8], block: usize, bytes: &[u8], layout: &Layout) -> Result<()> {
    let mut padded = [0u8; BLOCK_SIZE];
    let len = bytes.len().min(BLOCK_SIZE);
    padded[..len].copy_from_slice(&bytes[..len]);

    let ranges = layout.block_ranges(block);
    for range in &ranges {
        check_range(range, image.len(), "block", block)?;
    }
    for (half, range) in ranges.into_iter().enumerate() {
        image[range].copy_from_slice(&padded[half * SECTOR_SIZE..(half + 1) * SECTOR_SIZE]);
    }
    Ok(())
}

/// Read one 256-byte DOS 3.3 sector
pub fn read_sector(image: &[u8], track: usize, sector: usize, layout: &Layout) -> Result<Vec<u8>> {
    let range = layout.sector_range(track, sector);
    check_range(&range, image.len(), "sector", track * SECTORS_PER_TRACK + sector)?;
    Ok(image[range].to_vec())
}

/// Write one 256-byte DOS 3.3 sector; shorter data is zero padded
pub fn write_sector(
    image: &mut [u8],
    track: usize,
    sector: usize,
    bytes: &[u8],
    layout: &Layout,
) -> Result<()> {
    let range = layout.sector_range(track, sector);
    check_range(&range, image.len(), "sector", track * SECTORS_PER_TRACK + sector)?;
    let dest = &mut image[range];
    dest.fill(0);
    let len = bytes.len().min(SECTOR_SIZE);
    dest[..len].copy_from_slice(&bytes[..len]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_permutation(map: &[u8; SECTORS_PER_TRACK]) -> bool {
        let mut seen = [false; SECTORS_PER_TRACK];
        for &s in map {
            if seen[s as usize] {
                return false;
            }
            seen[s as usize] = true;
        }
        true
    }

    #[test]
    fn test_tables_are_bijections() {
        assert!(is_permutation(&TRACK0_SECTOR_MAP));
        assert!(is_permutation(&DATA_TRACK_SECTOR_MAP));
    }

    #[test]
    fn test_linear_offsets() {
        let layout = Layout::linear(64);
        let [a, b] = layout.block_ranges(3);
        assert_eq!(a, 64 + 1536..64 + 1792);
        assert_eq!(b, 64 + 1792..64 + 2048);
    }

    #[test]
    fn test_interleaved_volume_directory() {
        let layout = Layout::interleaved(0);
        // Block 2 lives on track 0 in DOS sectors 11 and 10
        let [a, b] = layout.block_ranges(2);
        assert_eq!(a.start, 11 * SECTOR_SIZE);
        assert_eq!(b.start, 10 * SECTOR_SIZE);
        // Block 8 is the first block of track 1
        let [a, b] = layout.block_ranges(8);
        assert_eq!(a.start, TRACK_SIZE);
        assert_eq!(b.start, TRACK_SIZE + 14 * SECTOR_SIZE);
    }

    #[test]
    fn test_sector_range_inverse_on_linear() {
        let layout = Layout::linear(0);
        // DOS sector 14 of track 1 is half-sector 1 (second half of block 8)
        assert_eq!(layout.sector_range(1, 14).start, TRACK_SIZE + SECTOR_SIZE);
        // DOS sector 0 of track 0 is the last half-sector
        assert_eq!(layout.sector_range(0, 0).start, 15 * SECTOR_SIZE);
    }

    #[test]
    fn test_out_of_range() {
        let image = vec![0u8; 1024];
        let result = read_unit(&image, 2, &Layout::linear(0));
        assert!(matches!(result, Err(DiskError::OutOfRange { .. })));
    }

    proptest! {
        #[test]
        fn prop_block_round_trip(block in 0usize..280, interleaved in any::<bool>(), fill in any::<u8>()) {
            let layout = Layout { container_offset: 0, interleaved };
            let mut image: Vec<u8> = (0..FLOPPY_140K_SIZE).map(|i| (i % 251) as u8).collect();
            let original = image.clone();

            let data = read_unit(&image, block, &layout).unwrap();
            write_unit(&mut image, block, &data, &layout).unwrap();
            prop_assert_eq!(&image, &original);

            let payload: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i as u8).wrapping_add(fill)).collect();
            write_unit(&mut image, block, &payload, &layout).unwrap();
            prop_assert_eq!(read_unit(&image, block, &layout).unwrap(), payload);
        }

        #[test]
        fn prop_sector_and_block_views_agree(track in 0usize..35, sector in 0usize..16) {
            // The same DOS sector must be reachable through both orderings
            let mut dos: Vec<u8> = vec![0u8; FLOPPY_140K_SIZE];
            let marker = vec![0xA5u8; SECTOR_SIZE];
            write_sector(&mut dos, track, sector, &marker, &Layout::interleaved(0)).unwrap();
            prop_assert_eq!(dos[track * TRACK_SIZE + sector * SECTOR_SIZE], 0xA5);

            let mut po: Vec<u8> = vec![0u8; FLOPPY_140K_SIZE];
            write_sector(&mut po, track, sector, &marker, &Layout::linear(0)).unwrap();
            prop_assert_eq!(read_sector(&po, track, sector, &Layout::linear(0)).unwrap(), marker);
        }
    }
}
