/// DOS 3.3 track/sector lists
///
/// A file's data sectors are named by a chain of T/S list sectors, each
/// holding up to 122 pairs. A (0, n) pair is a hole.

use super::vtoc::TrackSector;
use crate::error::{DiskError, Result};
use crate::format::constants::*;
use crate::image::DiskImage;
use std::collections::HashSet;

/// A file's sectors as recorded in its T/S lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorList {
    /// T/S list sectors in chain order
    pub lists: Vec<TrackSector>,
    /// Data sectors in file order, `None` for holes; trailing holes dropped
    pub data: Vec<Option<TrackSector>>,
}

impl SectorList {
    /// Every sector the file owns
    pub fn owned(&self) -> Vec<TrackSector> {
        self.lists
            .iter()
            .copied()
            .chain(self.data.iter().flatten().copied())
            .collect()
    }
}

fn check(ts: TrackSector, tracks: u8) -> Result<()> {
    if ts.0 >= tracks || ts.1 as usize >= SECTORS_PER_TRACK {
        return Err(DiskError::corrupt(format!(
            "Sector pointer {}/{} outside the disk",
            ts.0, ts.1
        )));
    }
    Ok(())
}

/// Walk a T/S list chain
pub fn read_list(image: &DiskImage, head: TrackSector, tracks: u8) -> Result<SectorList> {
    let mut list = SectorList::default();
    let mut seen = HashSet::new();
    let mut current = head;

    while current.0 != 0 {
        check(current, tracks)?;
        if !seen.insert(current) {
            return Err(DiskError::corrupt(format!(
                "T/S list sector {}/{} reached twice",
                current.0, current.1
            )));
        }
        list.lists.push(current);

        let sector = image.read_sector(current.0 as usize, current.1 as usize)?;
        for pair in sector[TS_LIST_PAIRS_OFFSET..].chunks_exact(2) {
            let ts = (pair[0], pair[1]);
            if ts.0 == 0 {
                list.data.push(None);
                continue;
            }
            check(ts, tracks)?;
            if !seen.insert(ts) {
                return Err(DiskError::corrupt(format!(
                    "Sector {}/{} referenced twice by one file",
                    ts.0, ts.1
                )));
            }
            list.data.push(Some(ts));
        }
        current = (sector[1], sector[2]);
    }

    while list.data.last() == Some(&None) {
        list.data.pop();
    }
    Ok(list)
}

/// Write `data` into freshly allocated sectors
///
/// `lists` and `sectors` come from the allocator; every data sector is
/// recorded, in order, across the chained list sectors.
pub fn write_file(
    image: &mut DiskImage,
    lists: &[TrackSector],
    sectors: &[TrackSector],
    data: &[u8],
) -> Result<()> {
    for (i, &(track, sector)) in sectors.iter().enumerate() {
        let start = i * SECTOR_SIZE;
        let end = (start + SECTOR_SIZE).min(data.len());
        image.write_sector(track as usize, sector as usize, &data[start..end])?;
    }

    for (i, &(track, sector)) in lists.iter().enumerate() {
        let mut list = vec![0u8; SECTOR_SIZE];
        if let Some(&(next_track, next_sector)) = lists.get(i + 1) {
            list[1] = next_track;
            list[2] = next_sector;
        }
        let first = i * TS_PAIRS_PER_SECTOR;
        list[TS_LIST_SECTOR_OFFSET..TS_LIST_SECTOR_OFFSET + 2]
            .copy_from_slice(&(first as u16).to_le_bytes());

        let chunk = sectors.iter().skip(first).take(TS_PAIRS_PER_SECTOR);
        for (j, &(t, s)) in chunk.enumerate() {
            list[TS_LIST_PAIRS_OFFSET + j * 2] = t;
            list[TS_LIST_PAIRS_OFFSET + j * 2 + 1] = s;
        }
        image.write_sector(track as usize, sector as usize, &list)?;
    }
    Ok(())
}

/// Concatenate a file's data sectors, holes read as zeros
pub fn read_data(image: &DiskImage, list: &SectorList) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(list.data.len() * SECTOR_SIZE);
    for ts in &list.data {
        match ts {
            Some((track, sector)) => out.extend(image.read_sector(*track as usize, *sector as usize)?),
            None => out.extend(std::iter::repeat(0u8).take(SECTOR_SIZE)),
        }
    }
    Ok(out)
}

/// List sectors needed for a number of data sectors (at least one)
pub fn lists_needed(data_sectors: usize) -> usize {
    data_sectors.div_ceil(TS_PAIRS_PER_SECTOR).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SectorOrder;

    #[test]
    fn test_lists_needed() {
        assert_eq!(lists_needed(0), 1);
        assert_eq!(lists_needed(3), 1);
        assert_eq!(lists_needed(122), 1);
        assert_eq!(lists_needed(123), 2);
    }

    #[test]
    fn test_write_and_read_chain() {
        let mut image = DiskImage::blank(FLOPPY_140K_SIZE, SectorOrder::Dos, false);
        let lists = [(20, 15), (20, 14)];
        let sectors: Vec<TrackSector> = (0..130).map(|i| (21 + i / 16, (i % 16) as u8)).collect();
        let data: Vec<u8> = (0..130 * SECTOR_SIZE - 10).map(|i| (i % 251) as u8).collect();

        write_file(&mut image, &lists, &sectors, &data).unwrap();
        let second = image.read_sector(20, 14).unwrap();
        assert_eq!(u16::from_le_bytes([second[5], second[6]]), 122);

        let list = read_list(&image, (20, 15), 35).unwrap();
        assert_eq!(list.lists, lists.to_vec());
        assert_eq!(list.data.len(), 130);
        assert_eq!(list.owned().len(), 132);

        let read = read_data(&image, &list).unwrap();
        assert_eq!(&read[..data.len()], &data[..]);
        assert!(read[data.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_list_cycle_is_corruption() {
        let mut image = DiskImage::blank(FLOPPY_140K_SIZE, SectorOrder::Dos, false);
        let mut list = vec![0u8; SECTOR_SIZE];
        list[1] = 20;
        list[2] = 15;
        image.write_sector(20, 15, &list).unwrap();
        assert!(matches!(
            read_list(&image, (20, 15), 35),
            Err(DiskError::StructuralCorruption(_))
        ));
    }
}
