/// I/O operations for reading and writing image files

/// Reader implementation for image files
pub mod reader;
/// Atomic writer implementation for image files
pub mod writer;

pub use reader::read_image;
pub use writer::write_image;
