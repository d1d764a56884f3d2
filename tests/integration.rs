/// Integration tests for a2disk

use a2disk::filesystem::dos33::tslist;
use a2disk::filesystem::prodos::{extent, StorageType};
use a2disk::format::{BLOCK_SIZE, TS_LIST_PAIRS_OFFSET};
use a2disk::*;
use proptest::prelude::*;
use tempfile::TempDir;

fn blank_prodos(spec: VolumeSpec) -> ProdosFileSystem {
    let image = DiskImage::builder()
        .spec(spec)
        .build()
        .expect("Failed to build image");
    ProdosFileSystem::new(image).expect("Failed to open ProDOS volume")
}

fn blank_dos33() -> Dos33FileSystem {
    let image = DiskImage::builder()
        .spec(VolumeSpec::dos33_140k())
        .build()
        .expect("Failed to build image");
    Dos33FileSystem::new(image).expect("Failed to open DOS 3.3 volume")
}

fn free_blocks(fs: &ProdosFileSystem) -> usize {
    fs.bitmap().expect("Failed to load bitmap").free_count()
}

#[test]
fn test_create_and_save_image() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("blank.po");

    let mut image = DiskImage::builder()
        .volume_name("BLANK")
        .build()
        .expect("Failed to build image");
    assert!(image.is_changed());
    image.save(&path).expect("Failed to save image");
    assert!(!image.is_changed());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 140 * 1024);

    let volume = Volume::open(&path).expect("Failed to reopen image");
    assert_eq!(volume.fs_type(), FileSystemType::Prodos);
    let info = volume.fs().info().unwrap();
    assert_eq!(info.volume_name, "/BLANK");
    assert_eq!(info.total_units, 280);
    assert_eq!(info.free_units, 273);
    assert_eq!(info.file_count, 0);
}

#[test]
fn test_prodos_tree_file() {
    let mut fs = blank_prodos(VolumeSpec::prodos_800k());
    let before = free_blocks(&fs);

    // 510 data blocks plus 2 secondary index blocks and the master
    let data: Vec<u8> = (0..510 * BLOCK_SIZE).map(|i| (i / BLOCK_SIZE) as u8).collect();
    fs.add_file("", "BIGFILE", &data, FileType::binary(0))
        .expect("Failed to add tree file");

    let found = fs.lookup("BIGFILE").unwrap();
    assert_eq!(found.entry.storage_type, StorageType::Tree);
    assert_eq!(found.entry.blocks_used, 513);
    assert_eq!(free_blocks(&fs), before - 513);

    let master = fs.image().read_block(found.entry.key_pointer as usize).unwrap();
    let secondaries = extent::decode_index(&master);
    assert!(secondaries[0] != 0 && secondaries[1] != 0);
    assert!(secondaries[2..].iter().all(|&p| p == 0));

    assert_eq!(fs.read_file("BIGFILE").unwrap(), data);
}

#[test]
fn test_prodos_storage_type_selection() {
    let mut fs = blank_prodos(VolumeSpec::prodos_140k());
    fs.add_file("", "ONE", &[0x42; 512], FileType::binary(0)).unwrap();
    fs.add_file("", "TWO", &[0x42; 513], FileType::binary(0)).unwrap();
    fs.add_file("", "EMPTY", &[], FileType::text()).unwrap();

    assert_eq!(fs.lookup("ONE").unwrap().entry.storage_type, StorageType::Seedling);
    assert_eq!(fs.lookup("TWO").unwrap().entry.storage_type, StorageType::Sapling);
    let empty = fs.lookup("EMPTY").unwrap().entry;
    assert_eq!(empty.storage_type, StorageType::Seedling);
    assert_eq!(empty.eof, 0);
    assert_eq!(empty.blocks_used, 1);
    assert!(fs.read_file("EMPTY").unwrap().is_empty());
}

#[test]
fn test_prodos_delete_sapling_frees_its_blocks() {
    let mut fs = blank_prodos(VolumeSpec::prodos_140k());
    fs.add_file("", "KEEP", &[1; 100], FileType::text()).unwrap();
    let before = fs.bitmap().unwrap();

    fs.add_file("", "SAPLING", &[7; 5 * BLOCK_SIZE], FileType::binary(0x2000))
        .unwrap();
    assert_eq!(fs.lookup("SAPLING").unwrap().entry.blocks_used, 6);
    assert_eq!(free_blocks(&fs), before.free_count() - 6);

    fs.delete("SAPLING").unwrap();
    let after = fs.bitmap().unwrap();
    assert_eq!(after.free_count(), before.free_count());
    for block in 0..fs.total_blocks() {
        assert_eq!(after.is_free(block), before.is_free(block), "block {}", block);
    }
    assert!(matches!(fs.lookup("SAPLING"), Err(DiskError::EntryNotFound(_))));
    assert_eq!(fs.read_file("KEEP").unwrap(), vec![1; 100]);
}

#[test]
fn test_prodos_one_free_block() {
    let fs = blank_prodos(VolumeSpec::prodos_140k());
    let mut bitmap = fs.bitmap().unwrap();
    let last = fs.total_blocks() - 1;
    for block in bitmap.first_allocatable()..last {
        bitmap.mark_used(block);
    }
    assert_eq!(bitmap.free_count(), 1);

    let mut image = fs.into_image();
    bitmap.store(&mut image).unwrap();
    let mut fs = ProdosFileSystem::new(image).unwrap();

    fs.add_file("", "TINY", &[0xAA], FileType::binary(0))
        .expect("One byte should fit in the last block");
    assert_eq!(free_blocks(&fs), 0);
    assert_eq!(fs.lookup("TINY").unwrap().entry.key_pointer as usize, last);

    let result = fs.add_file("", "TINY2", &[0xBB], FileType::binary(0));
    assert!(matches!(
        result,
        Err(DiskError::InsufficientSpace { unit: "blocks", needed: 1, available: 0 })
    ));
    assert!(matches!(fs.lookup("TINY2"), Err(DiskError::EntryNotFound(_))));
}

#[test]
fn test_prodos_directory_cycle() {
    let fs = blank_prodos(VolumeSpec::prodos_140k());
    let mut image = fs.into_image();

    // Point the last volume directory block back at block 3
    let mut block = image.read_block(5).unwrap();
    block[2..4].copy_from_slice(&3u16.to_le_bytes());
    image.write_block(5, &block).unwrap();

    let fs = ProdosFileSystem::new(image).unwrap();
    assert!(matches!(fs.read_dir(""), Err(DiskError::StructuralCorruption(_))));
    assert!(matches!(fs.catalog(), Err(DiskError::StructuralCorruption(_))));
}

#[test]
fn test_prodos_nested_directories() {
    let mut fs = blank_prodos(VolumeSpec::prodos_140k());
    fs.create_directory("GAMES").unwrap();
    fs.create_directory("GAMES/ARCADE").unwrap();
    fs.write_file("GAMES/ARCADE/PONG", b"PONG", FileType::binary(0x0800))
        .unwrap();

    assert!(matches!(
        fs.delete_file("GAMES"),
        Err(DiskError::DirectoryNotEmpty(_))
    ));

    let catalog = fs.catalog().unwrap();
    assert_eq!(catalog.len(), 1);
    let paths: Vec<&str> = catalog[0].walk().iter().map(|n| n.path.as_str()).collect();
    assert_eq!(paths, vec!["GAMES", "GAMES/ARCADE", "GAMES/ARCADE/PONG"]);
    let pong = catalog[0].walk()[2];
    assert_eq!(pong.data, b"PONG");
    assert_eq!(pong.entry.aux_type, 0x0800);

    fs.delete_file("GAMES/ARCADE/PONG").unwrap();
    fs.delete_file("GAMES/ARCADE").unwrap();
    fs.delete_file("GAMES").unwrap();
    assert_eq!(free_blocks(&fs), 273);
}

#[test]
fn test_dos33_hello_scenario() {
    let mut fs = blank_dos33();
    let before = fs.vtoc().free_count();

    let text = vec![0xC1u8; 600];
    let name = fs.add_file("HELLO", &text, FileType::text()).unwrap();
    assert_eq!(name, "HELLO");

    let (_, entry) = fs.lookup("HELLO").unwrap();
    assert_eq!(entry.sector_count, 3);
    assert_eq!(entry.dos_type(), Dos33FileType::Text);
    assert_eq!(fs.vtoc().free_count(), before - 4);

    let (track, sector) = entry.ts_list;
    let list = fs.image().read_sector(track as usize, sector as usize).unwrap();
    assert_eq!((list[1], list[2]), (0, 0));
    let pairs: Vec<(u8, u8)> = list[TS_LIST_PAIRS_OFFSET..]
        .chunks(2)
        .map(|p| (p[0], p[1]))
        .filter(|&(t, _)| t != 0)
        .collect();
    assert_eq!(pairs.len(), 3);

    assert_eq!(fs.read_file("HELLO").unwrap(), text);
    let listing = fs.read_dir("").unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].units_used, 3);
}

#[test]
fn test_dos33_binary_round_trip_and_delete() {
    let mut fs = blank_dos33();
    let before = fs.vtoc().free_count();

    let data: Vec<u8> = (0..0x300).map(|i| i as u8).collect();
    fs.add_file("PROGRAM", &data, FileType::binary(0x2000)).unwrap();
    assert_eq!(fs.read_file("PROGRAM").unwrap(), data);

    // The stored sectors start with the load address and length
    let raw = fs.read_file_raw("PROGRAM").unwrap();
    assert_eq!(raw.len(), 4 * 256);
    assert_eq!(&raw[..4], &[0x00, 0x20, 0x00, 0x03]);
    assert_eq!(&raw[4..4 + data.len()], &data[..]);

    fs.delete("PROGRAM").unwrap();
    assert_eq!(fs.vtoc().free_count(), before);
    let deleted = fs.deleted_entries().unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].name, "PROGRAM");
    assert!(deleted[0].deleted);
}

#[test]
fn test_dos33_binary_spans_several_lists() {
    let mut fs = blank_dos33();
    let data: Vec<u8> = (0..0xFFFF).map(|i| (i % 251) as u8).collect();
    fs.add_file("LARGEST", &data, FileType::binary(0x0800)).unwrap();

    let (_, entry) = fs.lookup("LARGEST").unwrap();
    assert_eq!(entry.sector_count, 257);
    let list = tslist::read_list(fs.image(), entry.ts_list, fs.vtoc().tracks()).unwrap();
    assert_eq!(list.lists.len(), 3);

    assert_eq!(fs.read_file("LARGEST").unwrap(), data);
    assert!(fs.check().unwrap().is_clean());
}

#[test]
fn test_filetype_mapping() {
    assert_eq!(dos33_to_prodos(0x04), (0x06, 0));
    assert_eq!(prodos_to_dos33(0x06, 0), 0x04);
    assert_eq!(dos33_to_prodos(0x00), (0x04, 0));
    assert_eq!(dos33_to_prodos(0x02), (0xFC, 0x0801));
    assert_eq!(prodos_to_dos33(0xFC, 0x0801), 0x02);
}

#[test]
fn test_export_other_ordering() {
    let temp_dir = TempDir::new().unwrap();
    let po_path = temp_dir.path().join("disk.po");
    let do_path = temp_dir.path().join("disk.do");

    let mut fs = blank_prodos(VolumeSpec::prodos_140k().with_volume_name("ORDERS"));
    let data: Vec<u8> = (0..3000).map(|i| (i * 7) as u8).collect();
    fs.add_file("", "DATA", &data, FileType::binary(0)).unwrap();
    let mut volume = Volume::Prodos(fs);
    volume.save(&po_path).unwrap();
    volume.export(&do_path, SectorOrder::Dos).unwrap();

    let po_bytes = std::fs::read(&po_path).unwrap();
    let do_bytes = std::fs::read(&do_path).unwrap();
    assert_eq!(po_bytes.len(), do_bytes.len());
    assert_ne!(po_bytes, do_bytes);

    let reopened = Volume::open(&do_path).expect("Failed to open DOS-order copy");
    assert_eq!(reopened.fs_type(), FileSystemType::Prodos);
    assert_eq!(reopened.image().order(), SectorOrder::Dos);
    assert_eq!(reopened.fs().read_file("DATA").unwrap(), data);

    // Converting back reproduces the original bytes
    let back = reopened.image().reordered(SectorOrder::Prodos).unwrap();
    assert_eq!(back.as_bytes(), &po_bytes[..]);
}

#[test]
fn test_dos_order_prodos_without_extension_hint() {
    let image = DiskImage::builder()
        .spec(VolumeSpec::prodos_140k().with_order(SectorOrder::Dos))
        .build()
        .unwrap();
    let bytes = image.as_bytes().to_vec();

    let volume = Volume::from_image(DiskImage::from_bytes(bytes).unwrap()).unwrap();
    assert_eq!(volume.fs_type(), FileSystemType::Prodos);
    assert_eq!(volume.image().order(), SectorOrder::Dos);
}

#[test]
fn test_two_img_container() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("disk.2mg");

    let mut image = DiskImage::builder()
        .spec(VolumeSpec::dos33_140k().with_two_img(true))
        .build()
        .unwrap();
    assert_eq!(image.format(), ImageFormat::TwoImg);
    image.save(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], b"2IMG");
    assert_eq!(bytes.len(), 64 + 140 * 1024);

    let mut volume = Volume::open(&path).unwrap();
    assert_eq!(volume.fs_type(), FileSystemType::Dos33);
    assert_eq!(volume.image().order(), SectorOrder::Dos);
    let header = volume.image().container().expect("2IMG header").clone();
    assert_eq!(header.data_offset, 64);
    assert_eq!(header.data_length, 140 * 1024);

    volume
        .fs_mut()
        .write_file("NOTES", b"HI\r", FileType::text())
        .unwrap();
    volume.save(&path).unwrap();

    let reopened = Volume::open(&path).unwrap();
    assert_eq!(reopened.image().container().unwrap().raw, header.raw);
    assert_eq!(reopened.fs().read_file("NOTES").unwrap(), b"HI\r");
}

#[test]
fn test_session_operations() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("session.po");
    DiskImage::builder().build().unwrap().save(&path).unwrap();

    let session = ImageSession::new(&path);
    let report = OperationReport::from(session.add_file("README", b"hello", FileType::text()));
    assert!(report.success);
    assert_eq!(report.message, "Added README (5 bytes)");

    let report = OperationReport::from(session.add_file("README", b"again", FileType::text()));
    assert_eq!(report.message, "Added README.1 (5 bytes)");

    assert!(session.create_directory("DOCS").unwrap().contains("DOCS"));
    session.rename("README.1", "NOTES").unwrap();
    session.set_locked("NOTES", true).unwrap();

    let report = OperationReport::from(session.delete("NOTES"));
    assert!(!report.success);
    assert!(report.message.contains("locked"));

    let names: Vec<String> = session
        .catalog()
        .unwrap()
        .into_iter()
        .map(|n| n.entry.name)
        .collect();
    assert_eq!(names, vec!["README", "NOTES", "DOCS"]);
    assert_eq!(session.read_file("README").unwrap(), b"hello");
}

#[test]
fn test_session_failed_write_leaves_file_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("full.dsk");
    DiskImage::builder()
        .spec(VolumeSpec::dos33_140k())
        .build()
        .unwrap()
        .save(&path)
        .unwrap();
    let before = std::fs::read(&path).unwrap();

    let session = ImageSession::new(&path);
    let huge = vec![0u8; 200 * 1024];
    let report = OperationReport::from(session.add_file("HUGE", &huge, FileType::text()));
    assert!(!report.success);
    assert!(report.message.contains("Not enough free sectors"));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_check_clean_volumes() {
    let mut prodos = blank_prodos(VolumeSpec::prodos_140k());
    prodos.create_directory("DIR").unwrap();
    prodos
        .write_file("DIR/FILE", &[3; 2000], FileType::binary(0))
        .unwrap();
    assert!(prodos.check().unwrap().is_clean());

    let mut dos = blank_dos33();
    dos.add_file("FILE", &[0xC1; 1000], FileType::text()).unwrap();
    assert!(dos.check().unwrap().is_clean());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_prodos_round_trip(data in proptest::collection::vec(any::<u8>(), 0..40_000)) {
        let mut fs = blank_prodos(VolumeSpec::prodos_140k());
        let name = fs.add_file("", "PAYLOAD", &data, FileType::binary(0)).unwrap();
        prop_assert_eq!(fs.read_file(&name).unwrap(), data);
        prop_assert!(fs.check().unwrap().is_clean());
    }

    #[test]
    fn test_dos33_binary_round_trip(
        data in proptest::collection::vec(any::<u8>(), 0..40_000),
        address in any::<u16>(),
    ) {
        let mut fs = blank_dos33();
        let name = fs.add_file("PAYLOAD", &data, FileType::binary(address)).unwrap();
        prop_assert_eq!(fs.read_file(&name).unwrap(), data);
        prop_assert!(fs.check().unwrap().is_clean());
    }

    #[test]
    fn test_reorder_is_reversible(seed in any::<u8>()) {
        let mut image = DiskImage::blank(140 * 1024, SectorOrder::Prodos, false);
        for block in 0..image.total_blocks() {
            let fill = vec![seed.wrapping_add(block as u8); BLOCK_SIZE];
            image.write_block(block, &fill).unwrap();
        }
        let dos = image.reordered(SectorOrder::Dos).unwrap();
        for block in 0..image.total_blocks() {
            prop_assert_eq!(dos.read_block(block).unwrap(), image.read_block(block).unwrap());
        }
        let back = dos.reordered(SectorOrder::Prodos).unwrap();
        prop_assert_eq!(back.as_bytes(), image.as_bytes());
    }
}
