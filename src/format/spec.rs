/// Volume format specifications and presets

use crate::format::constants::*;

/// Filesystem laid down by the formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    /// ProDOS block filesystem
    Prodos,
    /// DOS 3.3 sector filesystem
    Dos33,
}

/// Physical sector ordering of an image file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorOrder {
    /// Linear 512-byte blocks ("ProDOS order", .po)
    Prodos,
    /// Interleaved 256-byte sectors ("DOS order", .do/.dsk)
    Dos,
}

impl SectorOrder {
    /// Whether blocks are split across interleaved sectors
    pub fn is_interleaved(&self) -> bool {
        matches!(self, SectorOrder::Dos)
    }
}

impl std::fmt::Display for SectorOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectorOrder::Prodos => write!(f, "ProDOS order"),
            SectorOrder::Dos => write!(f, "DOS order"),
        }
    }
}

/// Volume format specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Filesystem to create
    pub kind: VolumeKind,
    /// Total 512-byte blocks (ProDOS) or 16-sector tracks × 8 (DOS 3.3)
    pub total_blocks: usize,
    /// Volume name (ProDOS only)
    pub volume_name: String,
    /// DOS 3.3 volume number
    pub volume_number: u8,
    /// Physical ordering of the image file
    pub order: SectorOrder,
    /// Wrap the image in a 2IMG container
    pub two_img: bool,
}

impl VolumeSpec {
    /// Create a new ProDOS volume specification
    pub fn new(total_blocks: usize, volume_name: &str) -> Self {
        Self {
            kind: VolumeKind::Prodos,
            total_blocks,
            volume_name: volume_name.to_string(),
            volume_number: DOS33_DEFAULT_VOLUME,
            order: SectorOrder::Prodos,
            two_img: false,
        }
    }

    /// ProDOS 5.25" floppy (280 blocks)
    pub fn prodos_140k() -> Self {
        Self::new(280, "BLANK")
    }

    /// ProDOS 3.5" floppy (1600 blocks)
    pub fn prodos_800k() -> Self {
        Self::new(1600, "BLANK")
    }

    /// ProDOS hard disk volume (65535 blocks)
    pub fn prodos_32m() -> Self {
        Self::new(PRODOS_MAX_BLOCKS, "HARD.DISK")
    }

    /// DOS 3.3 5.25" floppy (35 tracks, 16 sectors)
    pub fn dos33_140k() -> Self {
        Self {
            kind: VolumeKind::Dos33,
            total_blocks: 280,
            volume_name: String::new(),
            volume_number: DOS33_DEFAULT_VOLUME,
            order: SectorOrder::Dos,
            two_img: false,
        }
    }

    /// Set the volume name
    pub fn with_volume_name(mut self, name: &str) -> Self {
        self.volume_name = name.to_string();
        self
    }

    /// Set the physical ordering
    pub fn with_order(mut self, order: SectorOrder) -> Self {
        self.order = order;
        self
    }

    /// Wrap in a 2IMG container
    pub fn with_two_img(mut self, two_img: bool) -> Self {
        self.two_img = two_img;
        self
    }

    /// Set the DOS 3.3 volume number
    pub fn with_volume_number(mut self, volume_number: u8) -> Self {
        self.volume_number = volume_number;
        self
    }

    /// Image data size in bytes (excluding any container header)
    pub fn data_size(&self) -> usize {
        self.total_blocks * BLOCK_SIZE
    }

    /// Number of 16-sector tracks
    pub fn num_tracks(&self) -> usize {
        self.data_size() / TRACK_SIZE
    }

    /// Capacity in KB
    pub fn total_capacity_kb(&self) -> usize {
        self.data_size() / 1024
    }
}
