/// Apple II disk format constants

/// ProDOS block size in bytes
pub const BLOCK_SIZE: usize = 512;

/// DOS 3.3 sector size in bytes
pub const SECTOR_SIZE: usize = 256;

/// Sectors per track on a 16-sector 5.25" floppy
pub const SECTORS_PER_TRACK: usize = 16;

/// Bytes per 5.25" track
pub const TRACK_SIZE: usize = SECTOR_SIZE * SECTORS_PER_TRACK;

/// ProDOS blocks per 5.25" track
pub const BLOCKS_PER_TRACK: usize = TRACK_SIZE / BLOCK_SIZE;

/// Largest track count accepted for a DOS-ordered image
pub const MAX_FLOPPY_TRACKS: usize = 50;

/// Size of a standard 35-track 5.25" image (140K)
pub const FLOPPY_140K_SIZE: usize = 35 * TRACK_SIZE;

/// 2IMG container magic
pub const TWO_IMG_SIGNATURE: &[u8] = b"2IMG";

/// Creator code written into 2IMG headers we produce
pub const TWO_IMG_CREATOR: &[u8] = b"A2DK";

/// Standard 2IMG header length
pub const TWO_IMG_HEADER_SIZE: usize = 64;

/// 2IMG header: header length (u16)
pub const TWO_IMG_HEADER_SIZE_OFFSET: usize = 0x08;

/// 2IMG header: version (u16)
pub const TWO_IMG_VERSION_OFFSET: usize = 0x0A;

/// 2IMG header: image format (u32)
pub const TWO_IMG_FORMAT_OFFSET: usize = 0x0C;

/// 2IMG header: flags (u32)
pub const TWO_IMG_FLAGS_OFFSET: usize = 0x10;

/// 2IMG header: ProDOS block count (u32)
pub const TWO_IMG_BLOCKS_OFFSET: usize = 0x14;

/// 2IMG header: data offset (u32)
pub const TWO_IMG_DATA_OFFSET_OFFSET: usize = 0x18;

/// 2IMG header: data length (u32)
pub const TWO_IMG_DATA_LENGTH_OFFSET: usize = 0x1C;

// ProDOS

/// First volume directory block
pub const VOLUME_DIRECTORY_BLOCK: u16 = 2;

/// Last volume directory block on volumes we format
pub const VOLUME_DIRECTORY_LAST_BLOCK: u16 = 5;

/// Bitmap start block on volumes we format
pub const BITMAP_START_BLOCK: u16 = 6;

/// Length of a directory entry
pub const ENTRY_LENGTH: usize = 0x27;

/// Directory entries per block
pub const ENTRIES_PER_BLOCK: usize = 0x0D;

/// Offset of the first entry slot within a directory block
pub const DIRECTORY_ENTRIES_OFFSET: usize = 4;

/// Maximum ProDOS filename length
pub const PRODOS_NAME_MAX: usize = 15;

/// Block pointers per index block
pub const POINTERS_PER_INDEX: usize = 256;

/// Largest file a 24-bit EOF can describe
pub const PRODOS_MAX_EOF: usize = 0xFF_FFFF;

/// Smallest volume the formatter accepts
pub const PRODOS_MIN_BLOCKS: usize = 16;

/// Largest ProDOS volume
pub const PRODOS_MAX_BLOCKS: usize = 65535;

/// Blocks covered by one bitmap block
pub const BLOCKS_PER_BITMAP_BLOCK: usize = BLOCK_SIZE * 8;

/// Default access: destroy, rename, backup, write, read
pub const ACCESS_DEFAULT: u8 = 0xE3;

/// Access bits cleared when locking (destroy, rename, write)
pub const ACCESS_LOCK_MASK: u8 = 0xC2;

/// Subdirectory header reserved byte value required by ProDOS
pub const SUBDIR_HEADER_MAGIC: u8 = 0x75;

/// Bound on subdirectory nesting while walking a volume
pub const MAX_DIRECTORY_DEPTH: usize = 64;

/// Bound on automatic `.N` suffixes when a name is taken
pub const MAX_NAME_SUFFIX: usize = 99;

// DOS 3.3

/// Track holding the VTOC and catalog
pub const VTOC_TRACK: u8 = 17;

/// Sector holding the VTOC
pub const VTOC_SECTOR: u8 = 0;

/// VTOC: catalog track / sector
pub const VTOC_CATALOG_TRACK_OFFSET: usize = 0x01;

/// VTOC: DOS release
pub const VTOC_DOS_VERSION_OFFSET: usize = 0x03;

/// VTOC: volume number
pub const VTOC_VOLUME_OFFSET: usize = 0x06;

/// VTOC: maximum T/S pairs per list sector
pub const VTOC_MAX_PAIRS_OFFSET: usize = 0x27;

/// VTOC: last track allocated
pub const VTOC_LAST_TRACK_OFFSET: usize = 0x30;

/// VTOC: allocation direction (+1 / -1)
pub const VTOC_DIRECTION_OFFSET: usize = 0x31;

/// VTOC: tracks per disk
pub const VTOC_TRACKS_OFFSET: usize = 0x34;

/// VTOC: sectors per track
pub const VTOC_SECTORS_OFFSET: usize = 0x35;

/// VTOC: bytes per sector (u16)
pub const VTOC_BYTES_PER_SECTOR_OFFSET: usize = 0x36;

/// VTOC: start of the free-sector bitmap
pub const VTOC_BITMAP_OFFSET: usize = 0x38;

/// Bitmap bytes per track
pub const VTOC_BITMAP_BYTES_PER_TRACK: usize = 4;

/// T/S pairs per list sector
pub const TS_PAIRS_PER_SECTOR: usize = 122;

/// Offset of the first T/S pair in a list sector
pub const TS_LIST_PAIRS_OFFSET: usize = 0x0C;

/// T/S list: sector offset in file (u16)
pub const TS_LIST_SECTOR_OFFSET: usize = 0x05;

/// Offset of the first catalog entry
pub const CATALOG_ENTRIES_OFFSET: usize = 0x0B;

/// Catalog entry length
pub const CATALOG_ENTRY_LENGTH: usize = 35;

/// Catalog entries per sector
pub const CATALOG_ENTRIES_PER_SECTOR: usize = 7;

/// Maximum DOS 3.3 filename length
pub const DOS33_NAME_MAX: usize = 30;

/// Track byte marking a deleted catalog entry
pub const DOS33_DELETED_MARKER: u8 = 0xFF;

/// Name byte that keeps the original track of a deleted entry
pub const DOS33_DELETED_TRACK_OFFSET: usize = 0x20;

/// Standard DOS 3.3 volume number
pub const DOS33_DEFAULT_VOLUME: u8 = 254;
