/// ProDOS directory entry and header encoding
///
/// Entry layout (39 bytes):
/// - +0: storage type (high nibble) / name length (low nibble)
/// - +1..16: name
/// - +16: file type
/// - +17: key pointer (u16)
/// - +19: blocks used (u16)
/// - +21: EOF (u24)
/// - +24: creation date (u16) / time (u16)
/// - +28: version, +29: min version, +30: access
/// - +31: aux type (u16)
/// - +33: modification date (u16) / time (u16)
/// - +37: header pointer (u16)

use crate::error::{DiskError, Result};
use crate::format::constants::*;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};

/// Storage type held in the high nibble of an entry's first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// Free slot (0x0)
    Deleted,
    /// Single data block (0x1)
    Seedling,
    /// One index block (0x2)
    Sapling,
    /// Master index plus secondary index blocks (0x3)
    Tree,
    /// Subdirectory file entry (0xD)
    Subdirectory,
    /// Subdirectory header (0xE)
    SubdirectoryHeader,
    /// Volume directory header (0xF)
    VolumeHeader,
    /// Anything else (Pascal areas, extended files)
    Other(u8),
}

impl StorageType {
    /// Parse from the high nibble
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x0 => StorageType::Deleted,
            0x1 => StorageType::Seedling,
            0x2 => StorageType::Sapling,
            0x3 => StorageType::Tree,
            0xD => StorageType::Subdirectory,
            0xE => StorageType::SubdirectoryHeader,
            0xF => StorageType::VolumeHeader,
            other => StorageType::Other(other),
        }
    }

    /// Nibble value
    pub fn nibble(&self) -> u8 {
        match self {
            StorageType::Deleted => 0x0,
            StorageType::Seedling => 0x1,
            StorageType::Sapling => 0x2,
            StorageType::Tree => 0x3,
            StorageType::Subdirectory => 0xD,
            StorageType::SubdirectoryHeader => 0xE,
            StorageType::VolumeHeader => 0xF,
            StorageType::Other(n) => *n & 0x0F,
        }
    }

    /// Whether this is a header slot rather than a file entry
    pub fn is_header(&self) -> bool {
        matches!(
            self,
            StorageType::SubdirectoryHeader | StorageType::VolumeHeader
        )
    }

    /// Whether this is a regular file with a block extent
    pub fn is_file(&self) -> bool {
        matches!(
            self,
            StorageType::Seedling | StorageType::Sapling | StorageType::Tree
        )
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::Deleted => write!(f, "deleted"),
            StorageType::Seedling => write!(f, "seedling"),
            StorageType::Sapling => write!(f, "sapling"),
            StorageType::Tree => write!(f, "tree"),
            StorageType::Subdirectory => write!(f, "subdirectory"),
            StorageType::SubdirectoryHeader => write!(f, "subdirectory header"),
            StorageType::VolumeHeader => write!(f, "volume header"),
            StorageType::Other(n) => write!(f, "storage ${:X}", n),
        }
    }
}

/// Raw ProDOS date and time words
///
/// Date: bits 9-15 year, 5-8 month, 0-4 day. Time: low byte hour, high byte minute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
    /// Date word
    pub date: u16,
    /// Time word
    pub time: u16,
}

impl Timestamp {
    /// Current local time
    pub fn now() -> Self {
        Self::from_datetime(&Local::now().naive_local())
    }

    /// Encode a date and time
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        let year = (dt.year().rem_euclid(100)) as u16;
        let date = (year << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
        let time = (dt.hour() as u16) | ((dt.minute() as u16) << 8);
        Self { date, time }
    }

    /// Decode into a date and time; `None` when unset or invalid
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        if self.date == 0 {
            return None;
        }
        let raw_year = ((self.date >> 9) & 0x7F) as i32;
        let month = ((self.date >> 5) & 0x0F) as u32;
        let day = (self.date & 0x1F) as u32;
        let year = match raw_year {
            0..=39 => 2000 + raw_year,
            _ => 1900 + raw_year,
        };
        let hour = (self.time & 0xFF) as u32;
        let minute = (self.time >> 8) as u32;

        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        date.and_hms_opt(hour, minute, 0)
            .or_else(|| date.and_hms_opt(0, 0, 0))
    }

    fn read(data: &[u8], offset: usize) -> Self {
        Self {
            date: le16(data, offset),
            time: le16(data, offset + 2),
        }
    }

    fn write(&self, data: &mut [u8], offset: usize) {
        data[offset..offset + 2].copy_from_slice(&self.date.to_le_bytes());
        data[offset + 2..offset + 4].copy_from_slice(&self.time.to_le_bytes());
    }
}

pub(crate) fn le16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn put16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn read_name(data: &[u8]) -> String {
    let len = (data[0] & 0x0F) as usize;
    data[1..1 + len].iter().map(|&b| (b & 0x7F) as char).collect()
}

fn write_name(data: &mut [u8], storage: StorageType, name: &str) {
    let bytes = name.as_bytes();
    let len = bytes.len().min(PRODOS_NAME_MAX);
    data[0] = (storage.nibble() << 4) | len as u8;
    data[1..1 + PRODOS_NAME_MAX].fill(0);
    data[1..1 + len].copy_from_slice(&bytes[..len]);
}

/// Whether a name is a legal ProDOS filename
pub fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= PRODOS_NAME_MAX
        && bytes[0].is_ascii_uppercase()
        && bytes
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || *b == b'.')
}

/// Turn an arbitrary name into a legal ProDOS filename
///
/// Uppercases, replaces other characters with `.`, prefixes `A` when the
/// first character is not a letter and truncates to 15 characters.
pub fn sanitize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DiskError::InvalidFilename(name.to_string()));
    }
    let mut out: String = trimmed
        .chars()
        .map(|c| {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' {
                c
            } else {
                '.'
            }
        })
        .collect();
    if !out.starts_with(|c: char| c.is_ascii_uppercase()) {
        out.insert(0, 'A');
    }
    out.truncate(PRODOS_NAME_MAX);
    Ok(out)
}

/// File or subdirectory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Storage type
    pub storage_type: StorageType,
    /// Filename
    pub name: String,
    /// ProDOS file type
    pub file_type: u8,
    /// Key block (data block, index block, master index or directory key block)
    pub key_pointer: u16,
    /// Blocks used, index blocks included
    pub blocks_used: u16,
    /// File length in bytes
    pub eof: u32,
    /// Creation time
    pub created: Timestamp,
    /// Version that created the entry
    pub version: u8,
    /// Minimum version to access the entry
    pub min_version: u8,
    /// Access bits
    pub access: u8,
    /// Aux type
    pub aux_type: u16,
    /// Last modification time
    pub modified: Timestamp,
    /// Key block of the directory holding this entry
    pub header_pointer: u16,
}

impl FileEntry {
    /// Parse a 39-byte slot; `None` for free slots and headers
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ENTRY_LENGTH {
            return None;
        }
        let storage_type = StorageType::from_nibble(data[0] >> 4);
        let name_len = (data[0] & 0x0F) as usize;
        if storage_type == StorageType::Deleted || storage_type.is_header() || name_len == 0 {
            return None;
        }

        Some(Self {
            storage_type,
            name: read_name(data),
            file_type: data[0x10],
            key_pointer: le16(data, 0x11),
            blocks_used: le16(data, 0x13),
            eof: data[0x15] as u32 | (data[0x16] as u32) << 8 | (data[0x17] as u32) << 16,
            created: Timestamp::read(data, 0x18),
            version: data[0x1C],
            min_version: data[0x1D],
            access: data[0x1E],
            aux_type: le16(data, 0x1F),
            modified: Timestamp::read(data, 0x21),
            header_pointer: le16(data, 0x25),
        })
    }

    /// Encode into a 39-byte slot
    pub fn to_bytes(&self) -> [u8; ENTRY_LENGTH] {
        let mut data = [0u8; ENTRY_LENGTH];
        write_name(&mut data, self.storage_type, &self.name);
        data[0x10] = self.file_type;
        put16(&mut data, 0x11, self.key_pointer);
        put16(&mut data, 0x13, self.blocks_used);
        data[0x15] = self.eof as u8;
        data[0x16] = (self.eof >> 8) as u8;
        data[0x17] = (self.eof >> 16) as u8;
        self.created.write(&mut data, 0x18);
        data[0x1C] = self.version;
        data[0x1D] = self.min_version;
        data[0x1E] = self.access;
        put16(&mut data, 0x1F, self.aux_type);
        self.modified.write(&mut data, 0x21);
        put16(&mut data, 0x25, self.header_pointer);
        data
    }

    /// Whether this entry is a subdirectory
    pub fn is_directory(&self) -> bool {
        self.storage_type == StorageType::Subdirectory
    }

    /// Whether destroy, rename and write are all disabled
    pub fn is_locked(&self) -> bool {
        self.access & ACCESS_LOCK_MASK == 0
    }

    /// Whether the entry may be deleted
    pub fn can_destroy(&self) -> bool {
        self.access & 0x80 != 0
    }

    /// Whether the entry may be renamed
    pub fn can_rename(&self) -> bool {
        self.access & 0x40 != 0
    }
}

/// Fields specific to the kind of directory header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// Volume directory header
    Volume {
        /// First bitmap block
        bitmap_pointer: u16,
        /// Blocks on the volume
        total_blocks: u16,
    },
    /// Subdirectory header
    Subdirectory {
        /// Directory block holding this directory's entry
        parent_pointer: u16,
        /// 1-based slot number of that entry within its block
        parent_entry_number: u8,
        /// Entry length of the parent directory
        parent_entry_length: u8,
    },
}

/// Volume or subdirectory header held in slot 0 of a directory key block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHeader {
    /// Directory name
    pub name: String,
    /// Creation time
    pub created: Timestamp,
    /// Version that created the directory
    pub version: u8,
    /// Minimum version to access the directory
    pub min_version: u8,
    /// Access bits
    pub access: u8,
    /// Entry length (0x27)
    pub entry_length: u8,
    /// Entries per block (0x0D)
    pub entries_per_block: u8,
    /// Active entries in the directory
    pub file_count: u16,
    /// Volume or subdirectory specific fields
    pub kind: HeaderKind,
}

impl DirectoryHeader {
    /// Parse a 39-byte header slot
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ENTRY_LENGTH {
            return Err(DiskError::corrupt("Directory header truncated"));
        }
        let storage = StorageType::from_nibble(data[0] >> 4);
        let kind = match storage {
            StorageType::VolumeHeader => HeaderKind::Volume {
                bitmap_pointer: le16(data, 0x23),
                total_blocks: le16(data, 0x25),
            },
            StorageType::SubdirectoryHeader => HeaderKind::Subdirectory {
                parent_pointer: le16(data, 0x23),
                parent_entry_number: data[0x25],
                parent_entry_length: data[0x26],
            },
            other => {
                return Err(DiskError::corrupt(format!(
                    "Expected a directory header, found {}",
                    other
                )))
            }
        };

        Ok(Self {
            name: read_name(data),
            created: Timestamp::read(data, 0x18),
            version: data[0x1C],
            min_version: data[0x1D],
            access: data[0x1E],
            entry_length: data[0x1F],
            entries_per_block: data[0x20],
            file_count: le16(data, 0x21),
            kind,
        })
    }

    /// Encode into a 39-byte header slot
    pub fn to_bytes(&self) -> [u8; ENTRY_LENGTH] {
        let mut data = [0u8; ENTRY_LENGTH];
        let storage = match self.kind {
            HeaderKind::Volume { .. } => StorageType::VolumeHeader,
            HeaderKind::Subdirectory { .. } => StorageType::SubdirectoryHeader,
        };
        write_name(&mut data, storage, &self.name);
        self.created.write(&mut data, 0x18);
        data[0x1C] = self.version;
        data[0x1D] = self.min_version;
        data[0x1E] = self.access;
        data[0x1F] = self.entry_length;
        data[0x20] = self.entries_per_block;
        put16(&mut data, 0x21, self.file_count);
        match self.kind {
            HeaderKind::Volume {
                bitmap_pointer,
                total_blocks,
            } => {
                put16(&mut data, 0x23, bitmap_pointer);
                put16(&mut data, 0x25, total_blocks);
            }
            HeaderKind::Subdirectory {
                parent_pointer,
                parent_entry_number,
                parent_entry_length,
            } => {
                data[0x10] = SUBDIR_HEADER_MAGIC;
                put16(&mut data, 0x23, parent_pointer);
                data[0x25] = parent_entry_number;
                data[0x26] = parent_entry_length;
            }
        }
        data
    }

    /// Whether the entry size constants match what this crate can walk
    pub fn has_standard_geometry(&self) -> bool {
        self.entry_length as usize == ENTRY_LENGTH
            && self.entries_per_block as usize == ENTRIES_PER_BLOCK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> FileEntry {
        FileEntry {
            storage_type: StorageType::Sapling,
            name: "HELLO.WORLD".to_string(),
            file_type: 0x06,
            key_pointer: 0x1234,
            blocks_used: 6,
            eof: 0x0A_0B0C,
            created: Timestamp { date: 0x1234, time: 0x1E0C },
            version: 0,
            min_version: 0,
            access: ACCESS_DEFAULT,
            aux_type: 0x2000,
            modified: Timestamp::default(),
            header_pointer: 2,
        }
    }

    #[test]
    fn test_entry_layout() {
        let bytes = sample_entry().to_bytes();
        assert_eq!(bytes[0], 0x2B);
        assert_eq!(&bytes[1..12], b"HELLO.WORLD");
        assert_eq!(bytes[0x10], 0x06);
        assert_eq!(&bytes[0x11..0x13], &[0x34, 0x12]);
        assert_eq!(&bytes[0x15..0x18], &[0x0C, 0x0B, 0x0A]);
        assert_eq!(&bytes[0x1F..0x21], &[0x00, 0x20]);
        assert_eq!(FileEntry::parse(&bytes), Some(sample_entry()));
    }

    #[test]
    fn test_free_slot_and_header_are_not_entries() {
        assert_eq!(FileEntry::parse(&[0u8; ENTRY_LENGTH]), None);
        let mut header = [0u8; ENTRY_LENGTH];
        header[0] = 0xF5;
        assert_eq!(FileEntry::parse(&header), None);
    }

    #[test]
    fn test_volume_header_offsets() {
        let header = DirectoryHeader {
            name: "BLANK".to_string(),
            created: Timestamp::default(),
            version: 0,
            min_version: 0,
            access: 0xC3,
            entry_length: ENTRY_LENGTH as u8,
            entries_per_block: ENTRIES_PER_BLOCK as u8,
            file_count: 3,
            kind: HeaderKind::Volume {
                bitmap_pointer: 6,
                total_blocks: 280,
            },
        };
        let bytes = header.to_bytes();
        // Offsets within the block are the slot offsets plus 4
        assert_eq!(bytes[0x23 - 4], 0x27);
        assert_eq!(bytes[0x24 - 4], 0x0D);
        assert_eq!(le16(&bytes, 0x25 - 4), 3);
        assert_eq!(le16(&bytes, 0x27 - 4), 6);
        assert_eq!(le16(&bytes, 0x29 - 4), 280);
        assert_eq!(DirectoryHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_subdirectory_header_magic() {
        let header = DirectoryHeader {
            name: "GAMES".to_string(),
            created: Timestamp::default(),
            version: 0,
            min_version: 0,
            access: ACCESS_DEFAULT,
            entry_length: ENTRY_LENGTH as u8,
            entries_per_block: ENTRIES_PER_BLOCK as u8,
            file_count: 0,
            kind: HeaderKind::Subdirectory {
                parent_pointer: 2,
                parent_entry_number: 2,
                parent_entry_length: 0x27,
            },
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[0] >> 4, 0xE);
        assert_eq!(bytes[0x10], SUBDIR_HEADER_MAGIC);
        assert_eq!(DirectoryHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_timestamp() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(13, 45, 0)
            .unwrap();
        let ts = Timestamp::from_datetime(&dt);
        assert_eq!(ts.date, (24 << 9) | (3 << 5) | 15);
        assert_eq!(ts.time & 0xFF, 13);
        assert_eq!(ts.time >> 8, 45);
        assert_eq!(ts.to_datetime(), Some(dt));

        let old = Timestamp { date: (86 << 9) | (7 << 5) | 4, time: 0 };
        assert_eq!(old.to_datetime().unwrap().year(), 1986);
        assert_eq!(Timestamp::default().to_datetime(), None);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("hello world").unwrap(), "HELLO.WORLD");
        assert_eq!(sanitize_name("1st_file").unwrap(), "A1ST.FILE");
        assert_eq!(
            sanitize_name("a_very_long_filename.txt").unwrap(),
            "A.VERY.LONG.FIL"
        );
        assert!(sanitize_name("   ").is_err());
        assert!(is_valid_name("HELLO.WORLD"));
        assert!(!is_valid_name("1HELLO"));
    }

    #[test]
    fn test_lock_bits() {
        let mut entry = sample_entry();
        assert!(!entry.is_locked());
        entry.access &= !ACCESS_LOCK_MASK;
        assert!(entry.is_locked());
        assert!(!entry.can_destroy());
    }
}
