/*!
# a2disk

A Rust library for reading and writing Apple II disk images with ProDOS and
DOS 3.3 filesystem support.

## Features

- Raw `.po`/`.do`/`.dsk`/`.hdv` images and 2IMG containers
- Transparent ProDOS order / DOS order translation, with export to either
- ProDOS volumes with subdirectories and seedling, sapling and tree files
- DOS 3.3 volumes with VTOC allocation and T/S lists
- Atomic saves: a failed operation never changes the image file
- Idiomatic Rust API with comprehensive error handling

## Quick Start

```rust,no_run
use a2disk::{DiskImage, FileType, SectorOrder, Volume, VolumeSpec};

// Open an existing image; the filesystem and ordering are detected
let mut volume = Volume::open("games.po")?;
for entry in volume.fs().read_dir("")? {
    println!("{} {} {} bytes", entry.name, entry.type_name, entry.size);
}

// Read and add files
let contents = volume.fs().read_file("STARTUP")?;
volume.fs_mut().write_file("COPY", &contents, FileType::binary(0x2000))?;
volume.save("games.po")?;

// Create a blank DOS 3.3 floppy
let mut blank = DiskImage::builder()
    .spec(VolumeSpec::dos33_140k())
    .build()?;
blank.save("blank.dsk")?;

// Export in the other ordering
volume.export("games.do", SectorOrder::Dos)?;
# Ok::<(), a2disk::DiskError>(())
```

## Modules

- `format`: ordering, volume presets and on-disk constants
- `image`: in-memory images, block/sector translation, 2IMG headers, builder
- `filesystem`: ProDOS and DOS 3.3 implementations behind one trait
- `filetype`: DOS 3.3 / ProDOS file type mapping
- `volume`: format detection and serialized image sessions
- `map`: allocation map rendering
- `error`: Error types and Result alias
*/

#![warn(missing_docs)]

/// Error types and Result alias
pub mod error;
/// File type mapping between DOS 3.3 and ProDOS
pub mod filetype;
/// Filesystem implementations (ProDOS, DOS 3.3)
pub mod filesystem;
/// Format constants, orderings and volume presets
pub mod format;
/// In-memory images and address translation
pub mod image;
/// I/O operations for reading and writing image files
pub mod io;
/// Allocation map visualization
pub mod map;
/// Format detection and image sessions
pub mod volume;

// Re-export common types
pub use error::{DiskError, Result};
pub use filesystem::dos33::format_volume as format_dos33;
pub use filesystem::prodos::format_volume as format_prodos;
pub use filesystem::{
    AllocationMap, CatalogEntry, CheckReport, DirEntry, Dos33FileSystem, EntryKind,
    FileAttributes, FileSystem, FileSystemInfo, FileSystemType, FileType, ProdosFileSystem,
};
pub use filetype::{dos33_to_prodos, prodos_to_dos33, Dos33FileType};
pub use format::{ImageFormat, SectorOrder, VolumeKind, VolumeSpec};
pub use image::{DiskImage, DiskImageBuilder, Layout, TwoImgHeader};
pub use map::{draw_allocation_map, render_allocation_map};
pub use volume::{ImageSession, OpenOptions, OperationReport, Probe, Volume};
