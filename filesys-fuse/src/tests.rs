use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use block_dev::{BlockDevice, SectorId, SECTOR_SIZE};
use std::io;

use filesys::{BitmapFreeMap, BlockCache, DiskInode, FreeMap, InodeTable};

use crate::{check_inode, load, store, BlockFile};

/// 每个测试一个独立的镜像文件
fn image(name: &str, sectors: u64) -> (PathBuf, File) {
    let path = std::env::temp_dir().join(format!(
        "filesys-fuse-{}-{name}.img",
        std::process::id()
    ));
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    fd.set_len(sectors * SECTOR_SIZE as u64).unwrap();

    (path, fd)
}

#[test]
fn block_file_round_trip() {
    let (path, fd) = image("raw", 4);
    let dev = BlockFile::new(fd);

    let data = [0x5A; SECTOR_SIZE];
    dev.write_block(SectorId::new(2), &data);
    let mut buf = [0; SECTOR_SIZE];
    dev.read_block(SectorId::new(2), &mut buf);
    assert_eq!(buf, data);
    dev.read_block(SectorId::new(1), &mut buf);
    assert_eq!(buf, [0; SECTOR_SIZE]);

    std::fs::remove_file(path).unwrap();
}

#[test]
fn packed_files_survive_reopening_the_image() {
    let (path, fd) = image("pack", 256);
    let small = b"hello, sectors".to_vec();
    let large: Vec<u8> = (0..3000).map(|i| (i % 251) as u8).collect();

    let (small_id, large_id) = {
        let cache = Arc::new(BlockCache::new(Arc::new(BlockFile::new(fd))));
        let free_map = Arc::new(BitmapFreeMap::new(256));
        free_map.reserve(SectorId::new(0), 1);
        let inodes = InodeTable::new(cache.clone(), free_map.clone());

        let small_id = store(&inodes, free_map.as_ref(), &small).unwrap();
        let large_id = store(&inodes, free_map.as_ref(), &large).unwrap();
        cache.sync_all();
        (small_id, large_id)
    };
    assert_ne!(small_id, large_id);

    let fd = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    let cache = Arc::new(BlockCache::new(Arc::new(BlockFile::new(fd))));
    let inodes = InodeTable::new(cache, Arc::new(BitmapFreeMap::new(256)));
    assert_eq!(load(&inodes, small_id), small);
    assert_eq!(load(&inodes, large_id), large);

    drop(inodes);
    std::fs::remove_file(path).unwrap();
}

#[test]
fn store_reports_a_full_image() {
    let (path, fd) = image("full", 8);
    let cache = Arc::new(BlockCache::new(Arc::new(BlockFile::new(fd))));
    let free_map = Arc::new(BitmapFreeMap::new(8));
    let inodes = InodeTable::new(cache, free_map.clone());

    assert!(store(&inodes, free_map.as_ref(), &[1; 7 * SECTOR_SIZE]).is_ok());
    assert!(store(&inodes, free_map.as_ref(), &[1]).is_err());

    drop(inodes);
    std::fs::remove_file(path).unwrap();
}

#[test]
fn bad_inumbers_are_reported() {
    let (path, fd) = image("check", 64);
    let cache = Arc::new(BlockCache::new(Arc::new(BlockFile::new(fd))));
    let free_map = Arc::new(BitmapFreeMap::new(64));
    free_map.reserve(SectorId::new(0), 1);
    let inodes = InodeTable::new(cache.clone(), free_map.clone());

    let good = store(&inodes, free_map.as_ref(), b"hello").unwrap();
    assert!(check_inode(&cache, good, 64).is_ok());

    let beyond = check_inode(&cache, SectorId::new(500), 64).unwrap_err();
    assert_eq!(beyond.kind(), io::ErrorKind::InvalidInput);

    // 0 号扇区全零，没有魔数
    let blank = check_inode(&cache, SectorId::new(0), 64).unwrap_err();
    assert_eq!(blank.kind(), io::ErrorKind::InvalidData);

    // 数据从 60 号扇区开始，长 8 个扇区，越出镜像
    let overflow = free_map.allocate(1).unwrap();
    let disk_inode = DiskInode::new(SectorId::new(60), 8 * SECTOR_SIZE as i32);
    cache.write(overflow, 0, &disk_inode.to_bytes());
    let err = check_inode(&cache, overflow, 64).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    drop(inodes);
    drop(cache);
    std::fs::remove_file(path).unwrap();
}
