/// Builder for creating formatted Apple II images

use crate::error::{DiskError, Result};
use crate::filesystem::{dos33, prodos};
use crate::format::{allows_dos_order, SectorOrder, VolumeKind, VolumeSpec};
use crate::image::DiskImage;

/// Builder for constructing blank, formatted images
pub struct DiskImageBuilder {
    spec: VolumeSpec,
}

impl DiskImageBuilder {
    /// Create a new builder for a 140K ProDOS floppy
    pub fn new() -> Self {
        Self {
            spec: VolumeSpec::prodos_140k(),
        }
    }

    /// Set the volume specification
    pub fn spec(mut self, spec: VolumeSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Set the filesystem to lay down
    pub fn kind(mut self, kind: VolumeKind) -> Self {
        self.spec.kind = kind;
        self
    }

    /// Set the ProDOS volume name
    pub fn volume_name(mut self, name: &str) -> Self {
        self.spec.volume_name = name.to_string();
        self
    }

    /// Set the DOS 3.3 volume number
    pub fn volume_number(mut self, volume_number: u8) -> Self {
        self.spec.volume_number = volume_number;
        self
    }

    /// Set the number of 512-byte blocks
    pub fn total_blocks(mut self, total_blocks: usize) -> Self {
        self.spec.total_blocks = total_blocks;
        self
    }

    /// Set the physical ordering
    pub fn order(mut self, order: SectorOrder) -> Self {
        self.spec.order = order;
        self
    }

    /// Wrap the image in a 2IMG container
    pub fn two_img(mut self, two_img: bool) -> Self {
        self.spec.two_img = two_img;
        self
    }

    /// Build the image and format it
    pub fn build(self) -> Result<DiskImage> {
        let size = self.spec.data_size();
        if self.spec.order == SectorOrder::Dos && !allows_dos_order(size) {
            return Err(DiskError::invalid_format(format!(
                "{} bytes is not a floppy size, DOS order unavailable",
                size
            )));
        }

        let mut image = DiskImage::blank(size, self.spec.order, self.spec.two_img);
        match self.spec.kind {
            VolumeKind::Prodos => prodos::format_volume(&mut image, &self.spec.volume_name)?,
            VolumeKind::Dos33 => dos33::format_volume(&mut image, self.spec.volume_number)?,
        }
        Ok(image)
    }
}

impl Default for DiskImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}
