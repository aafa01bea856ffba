use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use block_dev::{BlockDevice, SectorId, SECTOR_SIZE};

/// 以宿主文件充当块设备
#[derive(Debug)]
pub struct BlockFile(Mutex<File>);

impl BlockFile {
    pub fn new(fd: File) -> Self {
        Self(Mutex::new(fd))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, sector: SectorId, buf: &mut [u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete sector!");
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start(sector.byte_offset()))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete sector!");
    }

    fn write_block(&self, sector: SectorId, buf: &[u8]) {
        assert_eq!(buf.len(), SECTOR_SIZE, "not a complete sector!");
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start(sector.byte_offset()))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete sector!");
    }
}
