//! # 块缓存层
//!
//! 块设备读写速度远慢于内存，因此在内存中开辟固定数量的槽位，
//! 把正在操作的扇区复制进来。使用者对块设备的读写都经过块缓存层，
//! 且**读写时扇区一定在槽位当中**。
//!
//! ## 锁
//!
//! 每个槽位一把锁，另有一把全局的淘汰锁（它同时守护时钟指针）。
//! 命中查找时一次只持有一把槽位锁；未命中时先取淘汰锁，再取候选槽位的锁，
//! 顺序固定。持有槽位锁时绝不去取淘汰锁。
//!
//! ## 淘汰
//!
//! 时钟算法（二次机会）：指针扫过的槽位若访问位为真，则清零并跳过；
//! 否则将其淘汰，脏槽位先写回。
//!
//! 脏数据只在被淘汰或 [`BlockCache::sync_all`] 时落盘。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use block_dev::{BlockDevice, SectorId, SECTOR_SIZE};
use spin::{Mutex, MutexGuard};

use crate::CACHE_CAPACITY;

/// 固定容量的扇区缓存池
pub struct BlockCache {
    device: Arc<dyn BlockDevice>,
    slots: Box<[Mutex<Slot>]>,
    /// 淘汰锁，守护的是时钟指针
    evict_cursor: Mutex<usize>,
    counters: Counters,
}

/// 缓存槽位
struct Slot {
    data: [u8; SECTOR_SIZE],
    /// `None` 表示槽位尚未分配
    sector: Option<SectorId>,
    /// 访问位，给予二次机会
    access: bool,
    /// 是否为脏块
    dirty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// 缓存的命中统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// 淘汰时写回的脏块数，不含 `sync_all`
    pub write_backs: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    write_backs: AtomicUsize,
}

impl BlockCache {
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            device,
            slots: (0..CACHE_CAPACITY).map(|_| Mutex::new(Slot::new())).collect(),
            evict_cursor: Mutex::new(0),
            counters: Counters::default(),
        }
    }

    /// 从扇区`sector`的`offset`处读出数据填满`buf`
    pub fn read(&self, sector: SectorId, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= SECTOR_SIZE);
        let slot = self.claim(sector, Access::Read);
        buf.copy_from_slice(&slot.data[offset..offset + buf.len()]);
    }

    /// 把`buf`写进扇区`sector`的`offset`处
    pub fn write(&self, sector: SectorId, offset: usize, buf: &[u8]) {
        assert!(offset + buf.len() <= SECTOR_SIZE);
        let mut slot = self.claim(sector, Access::Write);
        slot.data[offset..offset + buf.len()].copy_from_slice(buf);
    }

    /// 写回所有脏块，槽位仍保留在缓存中
    pub fn sync_all(&self) {
        for slot in self.slots.iter() {
            let mut slot = slot.lock();
            if let Some(sector) = slot.sector.filter(|_| slot.dirty) {
                self.device.write_block(sector, &slot.data);
                slot.dirty = false;
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            write_backs: self.counters.write_backs.load(Ordering::Relaxed),
        }
    }

    /// 当前驻留在缓存中的扇区，按槽位顺序
    pub fn resident(&self) -> Vec<SectorId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.lock().sector)
            .collect()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl BlockCache {
    /// 取得装有`sector`的槽位并持有其锁
    fn claim(&self, sector: SectorId, access: Access) -> MutexGuard<'_, Slot> {
        if let Some(slot) = self.lookup(sector, access) {
            return slot;
        }

        let mut cursor = self.evict_cursor.lock();

        // 等淘汰锁期间，别的线程可能已经把这个扇区调了进来
        if let Some(slot) = self.lookup(sector, access) {
            return slot;
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        loop {
            let index = *cursor;
            *cursor = (index + 1) % self.slots.len();

            let mut slot = self.slots[index].lock();
            let current = slot.sector;
            match current {
                None => log::trace!("slot {index}: admit {sector:?}"),
                Some(_) if slot.access => {
                    slot.access = false;
                    continue;
                }
                Some(victim) => {
                    log::trace!("slot {index}: evict {victim:?} for {sector:?}");
                    if slot.dirty {
                        self.device.write_block(victim, &slot.data);
                        self.counters.write_backs.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            self.device.read_block(sector, &mut slot.data);
            slot.admit(sector, access);
            return slot;
        }
    }

    /// 按槽位顺序查找已缓存的`sector`，一次只持有一把槽位锁
    fn lookup(&self, sector: SectorId, access: Access) -> Option<MutexGuard<'_, Slot>> {
        let mut slot = self
            .slots
            .iter()
            .map(|slot| slot.lock())
            .find(|slot| slot.sector == Some(sector))?;

        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        slot.touch(access);
        Some(slot)
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.sync_all();
    }
}

impl Slot {
    const fn new() -> Self {
        Self {
            data: [0; SECTOR_SIZE],
            sector: None,
            access: false,
            dirty: false,
        }
    }

    /// 命中时更新标志位
    fn touch(&mut self, access: Access) {
        match access {
            Access::Read => self.access = true,
            Access::Write => {
                self.access = true;
                self.dirty = true;
            }
        }
    }

    /// 新调入扇区后的标志位：读入的槽位没有访问位，写入的槽位既脏且被访问
    fn admit(&mut self, sector: SectorId, access: Access) {
        self.sector = Some(sector);
        self.access = false;
        self.dirty = false;
        if access == Access::Write {
            self.touch(access);
        }
    }
}
