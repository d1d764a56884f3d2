/// Filesystem implementations

/// DOS 3.3 filesystem
pub mod dos33;
/// ProDOS filesystem
pub mod prodos;

pub use dos33::Dos33FileSystem;
pub use prodos::ProdosFileSystem;

use crate::error::{DiskError, Result};
use crate::format::SectorOrder;
use crate::image::DiskImage;
use chrono::NaiveDateTime;

/// Supported filesystem types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSystemType {
    /// ProDOS block filesystem
    Prodos,
    /// DOS 3.3 sector filesystem
    Dos33,
}

impl std::fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSystemType::Prodos => write!(f, "ProDOS"),
            FileSystemType::Dos33 => write!(f, "DOS 3.3"),
        }
    }
}

/// File attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributes {
    /// Locked against delete, rename and write
    pub locked: bool,
    /// Deleted entry still visible in the catalog (DOS 3.3 only)
    pub deleted: bool,
}

/// Whether an entry is a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Subdirectory
    Directory,
}

/// File type payload carried through add and change-type requests
///
/// Expressed in ProDOS terms; DOS 3.3 converts it with
/// [`crate::filetype::prodos_to_dos33`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileType {
    /// ProDOS file type byte
    pub file_type: u8,
    /// ProDOS aux type
    pub aux_type: u16,
}

impl FileType {
    /// Create a file type
    pub fn new(file_type: u8, aux_type: u16) -> Self {
        Self {
            file_type,
            aux_type,
        }
    }

    /// Binary file loaded at an address
    pub fn binary(load_address: u16) -> Self {
        Self::new(crate::filetype::PRODOS_BIN, load_address)
    }

    /// Text file
    pub fn text() -> Self {
        Self::new(crate::filetype::PRODOS_TXT, 0)
    }
}

impl Default for FileType {
    fn default() -> Self {
        Self::binary(0)
    }
}

/// Directory entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Filename
    pub name: String,
    /// File or directory
    pub kind: EntryKind,
    /// Native type byte (ProDOS type or DOS 3.3 type code)
    pub file_type: u8,
    /// ProDOS aux type (0 on DOS 3.3)
    pub aux_type: u16,
    /// Display name of the type ("BIN", "A", ...)
    pub type_name: String,
    /// File size in bytes
    pub size: usize,
    /// Allocation units used (blocks or sectors)
    pub units_used: usize,
    /// Creation time
    pub created: Option<NaiveDateTime>,
    /// Last modification time
    pub modified: Option<NaiveDateTime>,
    /// File attributes
    pub attributes: FileAttributes,
}

impl DirEntry {
    /// Whether this entry is a directory
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Node of a catalog tree
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Entry metadata
    pub entry: DirEntry,
    /// Path from the volume root ("DIR/FILE")
    pub path: String,
    /// Extracted file contents (empty for directories)
    pub data: Vec<u8>,
    /// Children (directories only)
    pub children: Vec<CatalogEntry>,
}

impl CatalogEntry {
    /// Depth-first iterator over this node and its descendants
    pub fn walk(&self) -> Vec<&CatalogEntry> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

/// Filesystem information
#[derive(Debug, Clone)]
pub struct FileSystemInfo {
    /// Filesystem type
    pub fs_type: FileSystemType,
    /// Volume name (ProDOS) or "DISK VOLUME n" (DOS 3.3)
    pub volume_name: String,
    /// Physical ordering of the image
    pub order: SectorOrder,
    /// Total allocation units
    pub total_units: usize,
    /// Free allocation units
    pub free_units: usize,
    /// Allocation unit size in bytes
    pub unit_size: usize,
    /// Files in the root directory or catalog
    pub file_count: usize,
}

impl FileSystemInfo {
    /// Used allocation units
    pub fn used_units(&self) -> usize {
        self.total_units.saturating_sub(self.free_units)
    }

    /// Free space in bytes
    pub fn free_bytes(&self) -> usize {
        self.free_units * self.unit_size
    }
}

impl std::fmt::Display for FileSystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = if self.unit_size == crate::format::BLOCK_SIZE {
            "blocks"
        } else {
            "sectors"
        };
        writeln!(f, "Filesystem: {} ({})", self.fs_type, self.order)?;
        writeln!(f, "Volume: {}", self.volume_name)?;
        writeln!(f, "Files: {}", self.file_count)?;
        writeln!(
            f,
            "Total: {} {} ({} KB)",
            self.total_units,
            unit,
            self.total_units * self.unit_size / 1024
        )?;
        writeln!(f, "Used: {} {}", self.used_units(), unit)?;
        write!(
            f,
            "Free: {} {} ({} KB)",
            self.free_units,
            unit,
            self.free_bytes() / 1024
        )
    }
}

/// Allocation state of every unit on a volume
#[derive(Debug, Clone)]
pub struct AllocationMap {
    /// Units per column when drawn (sectors per track, blocks per track)
    pub units_per_column: usize,
    /// Used flag per unit, in unit order
    pub used: Vec<bool>,
}

/// Result of a volume consistency check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Units reachable from the directory structure
    pub reachable: usize,
    /// Units in use by a file but marked free in the bitmap
    pub used_but_free: Vec<usize>,
    /// Units marked used but not reachable from any entry
    pub orphans: Vec<usize>,
    /// Structural problems found while walking
    pub problems: Vec<String>,
}

impl CheckReport {
    /// Whether no inconsistency was found
    pub fn is_clean(&self) -> bool {
        self.used_but_free.is_empty() && self.orphans.is_empty() && self.problems.is_empty()
    }
}

/// Filesystem trait for accessing files on Apple II images
///
/// Paths use `/` separators relative to the volume root. DOS 3.3 has a flat
/// catalog, so any path with a directory component is not found.
/// Mutating operations either complete fully or leave the image unchanged.
pub trait FileSystem {
    /// Get the filesystem type
    fn fs_type(&self) -> FileSystemType;

    /// Get the underlying image
    fn image(&self) -> &DiskImage;

    /// List directory entries ("" or "/" for the root)
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Read a file's contents
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Add a file, returning the name it was stored under
    fn write_file(&mut self, path: &str, data: &[u8], file_type: FileType) -> Result<String>;

    /// Delete a file or empty directory
    fn delete_file(&mut self, path: &str) -> Result<()>;

    /// Rename an entry, returning the stored name
    fn rename_file(&mut self, path: &str, new_name: &str) -> Result<String>;

    /// Change a file's type
    fn set_file_type(&mut self, path: &str, file_type: FileType) -> Result<()>;

    /// Lock or unlock an entry
    fn set_locked(&mut self, path: &str, locked: bool) -> Result<()>;

    /// Create a directory, returning the stored name
    fn create_directory(&mut self, path: &str) -> Result<String>;

    /// Build the full catalog tree with extracted file contents
    fn catalog(&self) -> Result<Vec<CatalogEntry>>;

    /// Get filesystem information
    fn info(&self) -> Result<FileSystemInfo>;

    /// Get the allocation state of every unit
    fn allocation(&self) -> Result<AllocationMap>;

    /// Cross-check the directory structure against the free-space bitmap
    fn check(&self) -> Result<CheckReport>;
}

/// Split a path into its parent directory components and final name
pub(crate) fn split_path(path: &str) -> (Vec<&str>, &str) {
    let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let name = parts.pop().unwrap_or("");
    (parts, name)
}

/// Pick a name not yet taken, appending `.1` ... `.99` when needed
///
/// The base is shortened so the suffixed name still fits `max_len`.
pub(crate) fn unique_name<F>(name: &str, max_len: usize, exists: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    if !exists(name) {
        return Ok(name.to_string());
    }
    for n in 1..=crate::format::MAX_NAME_SUFFIX {
        let suffix = format!(".{}", n);
        let keep = max_len.saturating_sub(suffix.len()).min(name.len());
        let candidate = format!("{}{}", &name[..keep], suffix);
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }
    Err(DiskError::NameCollision(name.to_string()))
}
