/// Image file reader

use crate::error::{DiskError, Result};
use crate::format::BLOCK_SIZE;
use crate::image::DiskImage;
use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read an image file into memory
///
/// The whole file is loaded; nothing is kept open afterwards.
pub fn read_image<P: AsRef<Path>>(path: P) -> Result<DiskImage> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    let mut image = DiskImage::from_bytes(bytes)?;
    if image.data_len() < BLOCK_SIZE {
        return Err(DiskError::invalid_format(format!(
            "Image too small: {} bytes",
            image.data_len()
        )));
    }

    debug!(
        "Read {} ({} bytes, {} blocks, {})",
        path.display(),
        image.as_bytes().len(),
        image.total_blocks(),
        image.format()
    );
    image.filename = Some(path.to_string_lossy().into_owned());
    Ok(image)
}
