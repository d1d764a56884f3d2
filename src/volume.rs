/// Opening images as volumes and serialized per-file sessions
///
/// Opening probes a fixed list of filesystem/ordering hypotheses and keeps the
/// first one whose structures validate. [`ImageSession`] wraps a path so that
/// every operation loads, mutates and atomically saves the file under a lock.

use crate::error::{DiskError, Result};
use crate::filesystem::{
    dos33, prodos, CatalogEntry, Dos33FileSystem, FileSystem, FileSystemInfo, FileSystemType,
    FileType, ProdosFileSystem,
};
use crate::format::{allows_dos_order, order_from_extension, SectorOrder, MAX_DIRECTORY_DEPTH};
use crate::image::DiskImage;
use log::{debug, info, trace};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One filesystem/ordering hypothesis tried while opening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// ProDOS volume in the given ordering
    Prodos(SectorOrder),
    /// DOS 3.3 volume in the given ordering
    Dos33(SectorOrder),
}

impl Probe {
    /// Ordering this hypothesis reads the image in
    pub fn order(&self) -> SectorOrder {
        match self {
            Probe::Prodos(order) | Probe::Dos33(order) => *order,
        }
    }
}

impl std::fmt::Display for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Probe::Prodos(order) => write!(f, "ProDOS ({})", order),
            Probe::Dos33(order) => write!(f, "DOS 3.3 ({})", order),
        }
    }
}

/// Hypotheses for an image, in the order they are tried
///
/// ProDOS linear, ProDOS DOS-order, DOS 3.3 DOS-order, DOS 3.3 linear. A
/// declared ordering (2IMG header or file extension) is tried first within
/// each filesystem. DOS order is dropped for images that are not floppy sized.
pub fn probe_order(image: &DiskImage, hint: Option<SectorOrder>) -> Vec<Probe> {
    let declared = image.container().and_then(|h| h.order).or(hint);

    let mut prodos = [Probe::Prodos(SectorOrder::Prodos), Probe::Prodos(SectorOrder::Dos)];
    let mut dos = [Probe::Dos33(SectorOrder::Dos), Probe::Dos33(SectorOrder::Prodos)];
    match declared {
        Some(SectorOrder::Dos) => prodos.reverse(),
        Some(SectorOrder::Prodos) => dos.reverse(),
        None => {}
    }

    let dos_ok = allows_dos_order(image.data_len());
    prodos
        .into_iter()
        .chain(dos)
        .filter(|p| dos_ok || p.order() == SectorOrder::Prodos)
        .collect()
}

/// Options controlling how images are opened
#[derive(Debug, Clone)]
pub struct OpenOptions {
    probes: Option<Vec<Probe>>,
    max_depth: usize,
    use_extension: bool,
}

impl OpenOptions {
    /// Default options: every hypothesis, standard depth bound
    pub fn new() -> Self {
        Self {
            probes: None,
            max_depth: MAX_DIRECTORY_DEPTH,
            use_extension: true,
        }
    }

    /// Only try these hypotheses, in this order
    pub fn only(mut self, probes: Vec<Probe>) -> Self {
        self.probes = Some(probes);
        self
    }

    /// Bound on subdirectory nesting
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Whether the file extension may suggest an ordering
    pub fn use_extension(mut self, use_extension: bool) -> Self {
        self.use_extension = use_extension;
        self
    }

    /// Open an image file as a volume
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Volume> {
        let path = path.as_ref();
        let image = DiskImage::open(path)?;
        let hint = if self.use_extension {
            order_from_extension(path)
        } else {
            None
        };
        self.open_image_with_hint(image, hint)
    }

    /// Interpret an in-memory image as a volume
    pub fn open_image(&self, image: DiskImage) -> Result<Volume> {
        self.open_image_with_hint(image, None)
    }

    fn open_image_with_hint(&self, mut image: DiskImage, hint: Option<SectorOrder>) -> Result<Volume> {
        let probes = match &self.probes {
            Some(probes) => probes.clone(),
            None => probe_order(&image, hint),
        };

        for probe in probes {
            image.set_order(probe.order());
            let result = match probe {
                Probe::Prodos(_) => prodos::probe(&image).map(|_| ()),
                Probe::Dos33(_) => dos33::probe(&image).map(|_| ()),
            };
            match result {
                Ok(()) => {
                    debug!("Recognized {}", probe);
                    return match probe {
                        Probe::Prodos(_) => Ok(Volume::Prodos(
                            ProdosFileSystem::new(image)?.with_max_depth(self.max_depth),
                        )),
                        Probe::Dos33(_) => Ok(Volume::Dos33(Dos33FileSystem::new(image)?)),
                    };
                }
                Err(e) if e.is_recoverable_probe_failure() => {
                    trace!("{} not recognized: {}", probe, e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(DiskError::FormatNotRecognized(
            "no ProDOS or DOS 3.3 volume found".into(),
        ))
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A recognized volume
#[derive(Debug, Clone)]
pub enum Volume {
    /// ProDOS volume
    Prodos(ProdosFileSystem),
    /// DOS 3.3 volume
    Dos33(Dos33FileSystem),
}

impl Volume {
    /// Open an image file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        OpenOptions::new().open(path)
    }

    /// Interpret an in-memory image with default options
    pub fn from_image(image: DiskImage) -> Result<Self> {
        OpenOptions::new().open_image(image)
    }

    /// Filesystem operations
    pub fn fs(&self) -> &dyn FileSystem {
        match self {
            Volume::Prodos(fs) => fs,
            Volume::Dos33(fs) => fs,
        }
    }

    /// Mutable filesystem operations
    pub fn fs_mut(&mut self) -> &mut dyn FileSystem {
        match self {
            Volume::Prodos(fs) => fs,
            Volume::Dos33(fs) => fs,
        }
    }

    /// Filesystem type
    pub fn fs_type(&self) -> FileSystemType {
        self.fs().fs_type()
    }

    /// Underlying image
    pub fn image(&self) -> &DiskImage {
        self.fs().image()
    }

    /// Give back the image
    pub fn into_image(self) -> DiskImage {
        match self {
            Volume::Prodos(fs) => fs.into_image(),
            Volume::Dos33(fs) => fs.into_image(),
        }
    }

    /// Save in the image's current ordering, replacing the file atomically
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let image = match self {
            Volume::Prodos(fs) => fs.image_mut(),
            Volume::Dos33(fs) => fs.image_mut(),
        };
        image.save(path)
    }

    /// Write a copy of the image in another ordering
    pub fn export<P: AsRef<Path>>(&self, path: P, order: SectorOrder) -> Result<()> {
        let mut copy = self.image().reordered(order)?;
        copy.save(path)
    }
}

/// Outcome of a session request: success flag and a message for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReport {
    /// Whether the operation completed
    pub success: bool,
    /// Human-readable description or the error message
    pub message: String,
}

impl From<Result<String>> for OperationReport {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(message) => Self {
                success: true,
                message,
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
            },
        }
    }
}

/// Serialized access to one image file
///
/// Each call opens the file, runs against the in-memory volume and, for
/// mutations, saves it back atomically. A failed mutation never touches the
/// file. The lock serializes callers sharing the session, not separate
/// sessions: keep one `ImageSession` per image path and share it.
#[derive(Debug)]
pub struct ImageSession {
    path: PathBuf,
    options: OpenOptions,
    lock: Mutex<()>,
}

impl ImageSession {
    /// Session on an image file
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options: OpenOptions::new(),
            lock: Mutex::new(()),
        }
    }

    /// Use these options when opening the file
    pub fn with_options(mut self, options: OpenOptions) -> Self {
        self.options = options;
        self
    }

    /// Image path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Volume) -> Result<T>,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let volume = self.options.open(&self.path)?;
        f(&volume)
    }

    fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Volume) -> Result<T>,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut volume = self.options.open(&self.path)?;
        let result = f(&mut volume)?;
        volume.save(&self.path)?;
        Ok(result)
    }

    /// Catalog tree with extracted file contents
    pub fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        self.read(|volume| volume.fs().catalog())
    }

    /// Volume information
    pub fn info(&self) -> Result<FileSystemInfo> {
        self.read(|volume| volume.fs().info())
    }

    /// Read one file
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.read(|volume| volume.fs().read_file(path))
    }

    /// Add a file
    pub fn add_file(&self, path: &str, data: &[u8], file_type: FileType) -> Result<String> {
        let name = self.modify(|volume| volume.fs_mut().write_file(path, data, file_type))?;
        info!("{}: added {}", self.path.display(), name);
        Ok(format!("Added {} ({} bytes)", name, data.len()))
    }

    /// Delete a file or empty directory
    pub fn delete(&self, path: &str) -> Result<String> {
        self.modify(|volume| volume.fs_mut().delete_file(path))?;
        Ok(format!("Deleted {}", path))
    }

    /// Rename an entry
    pub fn rename(&self, path: &str, new_name: &str) -> Result<String> {
        let name = self.modify(|volume| volume.fs_mut().rename_file(path, new_name))?;
        Ok(format!("Renamed {} to {}", path, name))
    }

    /// Create a directory
    pub fn create_directory(&self, path: &str) -> Result<String> {
        let name = self.modify(|volume| volume.fs_mut().create_directory(path))?;
        Ok(format!("Created directory {}", name))
    }

    /// Change a file's type
    pub fn set_file_type(&self, path: &str, file_type: FileType) -> Result<String> {
        self.modify(|volume| volume.fs_mut().set_file_type(path, file_type))?;
        Ok(format!(
            "Set {} to type ${:02X} aux ${:04X}",
            path, file_type.file_type, file_type.aux_type
        ))
    }

    /// Lock or unlock an entry
    pub fn set_locked(&self, path: &str, locked: bool) -> Result<String> {
        self.modify(|volume| volume.fs_mut().set_locked(path, locked))?;
        let verb = if locked { "Locked" } else { "Unlocked" };
        Ok(format!("{} {}", verb, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{VolumeSpec, BLOCK_SIZE};
    use tempfile::TempDir;

    #[test]
    fn test_probe_order() {
        let image = DiskImage::blank(280 * BLOCK_SIZE, SectorOrder::Prodos, false);
        assert_eq!(
            probe_order(&image, None),
            vec![
                Probe::Prodos(SectorOrder::Prodos),
                Probe::Prodos(SectorOrder::Dos),
                Probe::Dos33(SectorOrder::Dos),
                Probe::Dos33(SectorOrder::Prodos),
            ]
        );
        assert_eq!(
            probe_order(&image, Some(SectorOrder::Dos))[0],
            Probe::Prodos(SectorOrder::Dos)
        );

        let hard_disk = DiskImage::blank(1600 * BLOCK_SIZE, SectorOrder::Prodos, false);
        assert_eq!(
            probe_order(&hard_disk, None),
            vec![
                Probe::Prodos(SectorOrder::Prodos),
                Probe::Dos33(SectorOrder::Prodos),
            ]
        );
    }

    #[test]
    fn test_open_detects_ordering() {
        for spec in [
            VolumeSpec::prodos_140k(),
            VolumeSpec::prodos_140k().with_order(SectorOrder::Dos),
            VolumeSpec::dos33_140k(),
        ] {
            let image = DiskImage::builder().spec(spec.clone()).build().unwrap();
            let volume = Volume::from_image(image).unwrap();
            assert_eq!(volume.image().order(), spec.order);
        }
    }

    #[test]
    fn test_open_unrecognized() {
        let image = DiskImage::blank(280 * BLOCK_SIZE, SectorOrder::Prodos, false);
        assert!(matches!(
            Volume::from_image(image),
            Err(DiskError::FormatNotRecognized(_))
        ));
    }

    #[test]
    fn test_restricted_probes() {
        let image = DiskImage::builder().build().unwrap();
        let options = OpenOptions::new().only(vec![Probe::Dos33(SectorOrder::Dos)]);
        assert!(options.open_image(image).is_err());
    }

    #[test]
    fn test_session_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("work.po");
        let mut volume = Volume::from_image(DiskImage::builder().build().unwrap()).unwrap();
        volume.save(&path).unwrap();

        let session = ImageSession::new(&path);
        let message = session
            .add_file("NOTES", b"hello", FileType::text())
            .unwrap();
        assert_eq!(message, "Added NOTES (5 bytes)");
        session.create_directory("DOCS").unwrap();
        session.rename("NOTES", "README").unwrap();

        let catalog = session.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(session.read_file("README").unwrap(), b"hello");

        let report = OperationReport::from(session.delete("MISSING"));
        assert!(!report.success);
        assert!(report.message.contains("MISSING"));
    }

    #[test]
    fn test_failed_mutation_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("full.po");
        let mut volume = Volume::from_image(DiskImage::builder().build().unwrap()).unwrap();
        volume.save(&path).unwrap();
        let before = std::fs::read(&path).unwrap();

        let session = ImageSession::new(&path);
        let huge = vec![0u8; 300 * BLOCK_SIZE];
        assert!(session.add_file("HUGE", &huge, FileType::binary(0)).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_export_other_ordering() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.do");
        let mut volume = Volume::from_image(DiskImage::builder().build().unwrap()).unwrap();
        volume
            .fs_mut()
            .write_file("DATA", &[7u8; 1500], FileType::binary(0x300))
            .unwrap();
        volume.export(&path, SectorOrder::Dos).unwrap();

        let reopened = Volume::open(&path).unwrap();
        assert_eq!(reopened.image().order(), SectorOrder::Dos);
        assert_eq!(reopened.fs().read_file("DATA").unwrap(), vec![7u8; 1500]);
    }

    #[test]
    fn test_shared_session_serializes_writers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.po");
        let mut volume = Volume::from_image(DiskImage::builder().build().unwrap()).unwrap();
        volume.save(&path).unwrap();

        let session = ImageSession::new(&path);
        std::thread::scope(|scope| {
            for i in 0..4u8 {
                let session = &session;
                scope.spawn(move || {
                    session
                        .add_file(&format!("FILE{}", i), &[i; 100], FileType::text())
                        .unwrap();
                });
            }
        });

        let catalog = session.catalog().unwrap();
        assert_eq!(catalog.len(), 4);
        for i in 0..4u8 {
            assert_eq!(session.read_file(&format!("FILE{}", i)).unwrap(), vec![i; 100]);
        }
    }
}
