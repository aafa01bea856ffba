#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use filesys::{BitmapFreeMap, BlockDevice, FreeMap, SectorId, SECTOR_SIZE};

/// 内存里的块设备，记录每个扇区被读写的次数
pub struct RamDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
    reads: Mutex<BTreeMap<SectorId, usize>>,
    writes: Mutex<BTreeMap<SectorId, usize>>,
}

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self {
            sectors: Mutex::new(vec![[0; SECTOR_SIZE]; sectors]),
            reads: Mutex::default(),
            writes: Mutex::default(),
        }
    }

    pub fn reads_of(&self, sector: u32) -> usize {
        let reads = self.reads.lock().unwrap();
        reads.get(&SectorId::new(sector)).copied().unwrap_or(0)
    }

    pub fn writes_of(&self, sector: u32) -> usize {
        let writes = self.writes.lock().unwrap();
        writes.get(&SectorId::new(sector)).copied().unwrap_or(0)
    }

    pub fn total_writes(&self) -> usize {
        self.writes.lock().unwrap().values().sum()
    }

    /// 绕过缓存直接看设备上的内容
    pub fn raw(&self, sector: u32) -> [u8; SECTOR_SIZE] {
        self.sectors.lock().unwrap()[sector as usize]
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, sector: SectorId, buf: &mut [u8]) {
        *self.reads.lock().unwrap().entry(sector).or_default() += 1;
        buf.copy_from_slice(&self.sectors.lock().unwrap()[usize::from(sector)]);
    }

    fn write_block(&self, sector: SectorId, buf: &[u8]) {
        *self.writes.lock().unwrap().entry(sector).or_default() += 1;
        self.sectors.lock().unwrap()[usize::from(sector)].copy_from_slice(buf);
    }
}

/// 记下每次归还的位图分配器
pub struct RecordingFreeMap {
    pub inner: BitmapFreeMap,
    released: Mutex<Vec<(SectorId, usize)>>,
}

impl RecordingFreeMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: BitmapFreeMap::new(capacity),
            released: Mutex::default(),
        }
    }

    pub fn released(&self) -> Vec<(u32, usize)> {
        let released = self.released.lock().unwrap();
        released.iter().map(|&(s, n)| (s.raw(), n)).collect()
    }
}

impl FreeMap for RecordingFreeMap {
    fn allocate(&self, count: usize) -> Option<SectorId> {
        self.inner.allocate(count)
    }

    fn release(&self, start: SectorId, count: usize) {
        self.released.lock().unwrap().push((start, count));
        self.inner.release(start, count);
    }
}

/// 每个扇区一个可辨认的内容
pub fn pattern(sector: u32, generation: u8) -> [u8; SECTOR_SIZE] {
    let mut data = [0; SECTOR_SIZE];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (sector as u8)
            .wrapping_mul(31)
            .wrapping_add(i as u8)
            .wrapping_add(generation);
    }
    data
}
