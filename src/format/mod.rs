/// Apple II image format specifications and detection

/// Format constants
pub mod constants;
/// Volume specification presets
pub mod spec;

pub use constants::*;
pub use spec::{SectorOrder, VolumeKind, VolumeSpec};

use std::path::Path;

/// Image container type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Bare sector dump (.po, .do, .dsk, .hdv)
    Raw,
    /// 2IMG/2MG container with a header before the disk data
    TwoImg,
}

impl ImageFormat {
    /// Get the magic bytes for this format
    pub fn magic_bytes(&self) -> &'static [u8] {
        match self {
            ImageFormat::Raw => &[],
            ImageFormat::TwoImg => TWO_IMG_SIGNATURE,
        }
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Raw => "Raw sector image",
            ImageFormat::TwoImg => "2IMG",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the container format from the start of a file
pub fn detect_format(data: &[u8]) -> ImageFormat {
    if crate::image::container::has_two_img_signature(data) {
        ImageFormat::TwoImg
    } else {
        ImageFormat::Raw
    }
}

/// Whether an image of this data length may be in DOS order
///
/// Only whole 16-sector tracks up to the floppy limit qualify.
pub fn allows_dos_order(data_len: usize) -> bool {
    data_len > 0 && data_len % TRACK_SIZE == 0 && data_len / TRACK_SIZE <= MAX_FLOPPY_TRACKS
}

/// Ordering suggested by a file extension
pub fn order_from_extension<P: AsRef<Path>>(path: P) -> Option<SectorOrder> {
    let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "po" | "hdv" => Some(SectorOrder::Prodos),
        "do" | "dsk" => Some(SectorOrder::Dos),
        _ => None,
    }
}

/// Whether a path names a 2IMG container
pub fn is_two_img_path<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("2mg") || e.eq_ignore_ascii_case("2img"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        let mut data = vec![0u8; 128];
        assert_eq!(detect_format(&data), ImageFormat::Raw);
        data[..4].copy_from_slice(b"2IMG");
        assert_eq!(detect_format(&data), ImageFormat::TwoImg);
    }

    #[test]
    fn test_allows_dos_order() {
        assert!(allows_dos_order(FLOPPY_140K_SIZE));
        assert!(allows_dos_order(40 * TRACK_SIZE));
        assert!(!allows_dos_order(1600 * BLOCK_SIZE));
        assert!(!allows_dos_order(FLOPPY_140K_SIZE + 512));
        assert!(!allows_dos_order(0));
    }

    #[test]
    fn test_order_from_extension() {
        assert_eq!(order_from_extension("game.PO"), Some(SectorOrder::Prodos));
        assert_eq!(order_from_extension("game.dsk"), Some(SectorOrder::Dos));
        assert_eq!(order_from_extension("game.2mg"), None);
        assert!(is_two_img_path("disk.2MG"));
    }
}
