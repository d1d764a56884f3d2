/// Apple II disk image buffer

/// Image builder for creating formatted images
pub mod builder;
/// 2IMG container header
pub mod container;
/// Block and sector address translation
pub mod layout;

pub use builder::DiskImageBuilder;
pub use container::TwoImgHeader;
pub use layout::Layout;

use crate::error::Result;
use crate::format::{detect_format, ImageFormat, SectorOrder, BLOCK_SIZE, TRACK_SIZE};
use log::debug;
use std::path::Path;

/// In-memory disk image
///
/// Holds the whole image file. All block and sector addressing goes through
/// the image's [`Layout`], which knows the container offset and ordering.
#[derive(Debug, Clone)]
pub struct DiskImage {
    /// Complete file contents, container header included
    pub(crate) bytes: Vec<u8>,
    /// Container offset and ordering
    pub(crate) layout: Layout,
    /// Length of the disk data region
    pub(crate) data_len: usize,
    /// 2IMG header when the file had one
    pub(crate) container: Option<TwoImgHeader>,
    /// Has the image been modified?
    pub(crate) changed: bool,
    /// Original filename if loaded from disk
    pub(crate) filename: Option<String>,
}

impl DiskImage {
    /// Open an image file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        crate::io::read_image(path)
    }

    /// Wrap raw file contents, parsing a 2IMG header if present
    ///
    /// The ordering starts as the container's declared ordering, or linear
    /// for bare images; probing may change it with [`DiskImage::set_order`].
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (layout, data_len, container) = match detect_format(&bytes) {
            ImageFormat::TwoImg => {
                let header = TwoImgHeader::parse(&bytes)?;
                let interleaved = header.order == Some(SectorOrder::Dos);
                debug!(
                    "2IMG container: data at {} ({} bytes), format {}",
                    header.data_offset, header.data_length, header.format_code
                );
                (
                    Layout {
                        container_offset: header.data_offset,
                        interleaved,
                    },
                    header.data_length,
                    Some(header),
                )
            }
            ImageFormat::Raw => (Layout::linear(0), bytes.len(), None),
        };

        Ok(Self {
            bytes,
            layout,
            data_len,
            container,
            changed: false,
            filename: None,
        })
    }

    /// Create a zero-filled image with the given data size and ordering
    pub fn blank(data_len: usize, order: SectorOrder, two_img: bool) -> Self {
        let (bytes, container) = if two_img {
            let header = TwoImgHeader::new(order, data_len);
            let mut bytes = header.raw.clone();
            bytes.resize(header.data_offset + data_len, 0);
            (bytes, Some(header))
        } else {
            (vec![0u8; data_len], None)
        };
        let offset = container.as_ref().map(|h| h.data_offset).unwrap_or(0);

        Self {
            bytes,
            layout: Layout {
                container_offset: offset,
                interleaved: order.is_interleaved(),
            },
            data_len,
            container,
            changed: true,
            filename: None,
        }
    }

    /// Create a new builder for constructing formatted images
    pub fn builder() -> DiskImageBuilder {
        DiskImageBuilder::new()
    }

    /// Get the container format
    pub fn format(&self) -> ImageFormat {
        if self.container.is_some() {
            ImageFormat::TwoImg
        } else {
            ImageFormat::Raw
        }
    }

    /// Get the 2IMG header, if any
    pub fn container(&self) -> Option<&TwoImgHeader> {
        self.container.as_ref()
    }

    /// Get the current layout
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Get the current sector ordering
    pub fn order(&self) -> SectorOrder {
        if self.layout.interleaved {
            SectorOrder::Dos
        } else {
            SectorOrder::Prodos
        }
    }

    /// Reinterpret the buffer under another ordering without moving any bytes
    pub fn set_order(&mut self, order: SectorOrder) {
        self.layout = self.layout.with_interleaved(order.is_interleaved());
    }

    /// Get the original filename if loaded from disk
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Length of the disk data region in bytes
    pub fn data_len(&self) -> usize {
        self.data_len
    }

    /// Number of 512-byte blocks in the data region
    pub fn total_blocks(&self) -> usize {
        self.data_len / BLOCK_SIZE
    }

    /// Number of whole 16-sector tracks in the data region
    pub fn num_tracks(&self) -> usize {
        self.data_len / TRACK_SIZE
    }

    /// Complete file contents, container header included
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Addressable part of the buffer (container header plus data region)
    fn addressable(&self) -> &[u8] {
        let end = (self.layout.container_offset + self.data_len).min(self.bytes.len());
        &self.bytes[..end]
    }

    fn addressable_mut(&mut self) -> &mut [u8] {
        let end = (self.layout.container_offset + self.data_len).min(self.bytes.len());
        &mut self.bytes[..end]
    }

    /// Read a 512-byte block
    pub fn read_block(&self, block: usize) -> Result<Vec<u8>> {
        layout::read_unit(self.addressable(), block, &self.layout)
    }

    /// Write a 512-byte block
    pub fn write_block(&mut self, block: usize, data: &[u8]) -> Result<()> {
        let layout = self.layout;
        layout::write_unit(self.addressable_mut(), block, data, &layout)?;
        self.changed = true;
        Ok(())
    }

    /// Read a 256-byte DOS 3.3 sector
    pub fn read_sector(&self, track: usize, sector: usize) -> Result<Vec<u8>> {
        layout::read_sector(self.addressable(), track, sector, &self.layout)
    }

    /// Write a 256-byte DOS 3.3 sector
    pub fn write_sector(&mut self, track: usize, sector: usize, data: &[u8]) -> Result<()> {
        let layout = self.layout;
        layout::write_sector(self.addressable_mut(), track, sector, data, &layout)?;
        self.changed = true;
        Ok(())
    }

    /// Copy of this image with its sectors physically rearranged into another ordering
    ///
    /// Logical blocks keep their contents; only their position in the file
    /// changes. A 2IMG header has its format field updated.
    pub fn reordered(&self, order: SectorOrder) -> Result<DiskImage> {
        let mut target = self.clone();
        target.layout = self.layout.with_interleaved(order.is_interleaved());
        if let Some(header) = target.container.as_mut() {
            header.set_order(order);
            let raw_len = header.raw.len().min(target.bytes.len());
            target.bytes[..raw_len].copy_from_slice(&header.raw[..raw_len]);
        }
        if target.layout == self.layout {
            return Ok(target);
        }

        for block in 0..self.total_blocks() {
            let data = self.read_block(block)?;
            target.write_block(block, &data)?;
        }
        debug!("Reordered {} blocks to {}", self.total_blocks(), order);
        target.changed = true;
        Ok(target)
    }

    /// Save the image to a file, replacing it atomically
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        crate::io::write_image(self, &path)?;
        self.changed = false;
        self.filename = Some(path.as_ref().to_string_lossy().into_owned());
        Ok(())
    }

    /// Check if the image has been modified
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Mark the image as unchanged
    pub fn mark_unchanged(&mut self) {
        self.changed = false;
    }
}
