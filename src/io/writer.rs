/// Atomic image file writer

use crate::error::Result;
use crate::image::DiskImage;
use log::info;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write an image file, replacing any existing file atomically
///
/// The bytes go to a temporary file in the destination directory which is
/// then renamed over the target, so readers see either the old image or the
/// new one and a failed write leaves the old file untouched.
pub fn write_image<P: AsRef<Path>>(image: &DiskImage, path: P) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(image.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    info!("Saved {} ({} bytes)", path.display(), image.as_bytes().len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SectorOrder;
    use tempfile::TempDir;

    #[test]
    fn test_write_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.po");
        std::fs::write(&path, b"old contents").unwrap();

        let mut image = DiskImage::blank(280 * 512, SectorOrder::Prodos, false);
        image.write_block(3, &[0xEEu8; 512]).unwrap();
        write_image(&image, &path).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), 280 * 512);
        assert_eq!(written[3 * 512], 0xEE);

        // No temporary files left behind
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 1);
    }
}
