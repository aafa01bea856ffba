//! # 索引节点层
//!
//! 文件由一个描述扇区和一段连续的数据扇区组成，读写都经过块缓存。
//! 同一描述扇区在内存中至多只有一个 [`Inode`]，由 [`InodeTable`] 登记并去重；
//! 最后一个打开者关闭时，若文件已被删除，才真正归还它的扇区。
//!
//! 文件不会增长：越过末尾的写入会被截断。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::ops::Range;

use block_dev::{SectorId, SECTOR_SIZE};
use spin::Mutex;

use crate::layout::{bytes_to_sectors, DiskInode};
use crate::{BlockCache, FreeMap};

/// 已打开 inode 的登记表
pub struct InodeTable {
    cache: Arc<BlockCache>,
    free_map: Arc<dyn FreeMap>,
    /// 按描述扇区去重。
    /// 锁顺序：先取此锁，再取 inode 自身的计数锁
    open_inodes: Mutex<BTreeMap<SectorId, Arc<Inode>>>,
}

/// 内存中的 inode
pub struct Inode {
    /// 描述扇区
    sector: SectorId,
    /// 描述扇区的副本，文件不增长，故打开后不变
    disk_inode: DiskInode,
    cache: Arc<BlockCache>,
    state: Mutex<InodeState>,
}

#[derive(Debug, Default)]
struct InodeState {
    open_count: usize,
    /// 大于 0 时拒绝写入
    deny_write_count: usize,
    removed: bool,
}

/// 空闲扇区不足
#[derive(Debug, PartialEq, Eq)]
pub struct NoSpace;

impl InodeTable {
    pub fn new(cache: Arc<BlockCache>, free_map: Arc<dyn FreeMap>) -> Self {
        Self {
            cache,
            free_map,
            open_inodes: Mutex::new(BTreeMap::new()),
        }
    }

    /// 在扇区`sector`写入一个长为`length`字节的新 inode，数据扇区全部清零。
    ///
    /// 分配失败时不回收已写入的扇区。
    pub fn create(&self, sector: SectorId, length: usize) -> Result<(), NoSpace> {
        let length = i32::try_from(length).map_err(|_| NoSpace)?;
        let sectors = bytes_to_sectors(length as usize);
        let start = self.free_map.allocate(sectors).ok_or(NoSpace)?;

        let disk_inode = DiskInode::new(start, length);
        self.cache.write(sector, 0, &disk_inode.to_bytes());

        let zeros = [0; SECTOR_SIZE];
        for i in 0..sectors as u32 {
            self.cache.write(start + i, 0, &zeros);
        }

        log::debug!("create inode {sector:?}: {length} bytes, {sectors} sectors from {start:?}");
        Ok(())
    }

    /// 打开扇区`sector`上的 inode；已打开的则返回同一个 inode
    pub fn open(&self, sector: SectorId) -> Arc<Inode> {
        let mut open_inodes = self.open_inodes.lock();

        if let Some(inode) = open_inodes.get(&sector) {
            inode.state.lock().open_count += 1;
            return Arc::clone(inode);
        }

        let mut raw = [0; SECTOR_SIZE];
        self.cache.read(sector, 0, &mut raw);
        let disk_inode = DiskInode::from_bytes(&raw);
        if !disk_inode.is_valid() {
            log::warn!("inode {sector:?} has a bad magic number");
        }

        let inode = Arc::new(Inode {
            sector,
            disk_inode,
            cache: Arc::clone(&self.cache),
            state: Mutex::new(InodeState {
                open_count: 1,
                ..Default::default()
            }),
        });
        open_inodes.insert(sector, Arc::clone(&inode));

        inode
    }

    pub fn reopen(&self, inode: &Arc<Inode>) -> Arc<Inode> {
        let _open_inodes = self.open_inodes.lock();
        inode.state.lock().open_count += 1;
        Arc::clone(inode)
    }

    /// 关闭 inode。最后一个打开者关闭时将其移出登记表，
    /// 若已被删除，则归还描述扇区与数据扇区。
    pub fn close(&self, inode: Arc<Inode>) {
        let mut open_inodes = self.open_inodes.lock();

        let removed = {
            let mut state = inode.state.lock();
            assert!(state.open_count > 0, "inode {:?} is not open", inode.sector);
            state.open_count -= 1;
            if state.open_count > 0 {
                return;
            }
            state.removed
        };

        open_inodes.remove(&inode.sector);
        drop(open_inodes);

        if removed {
            log::debug!("release inode {:?}", inode.sector);
            self.free_map.release(inode.sector, 1);
            self.free_map
                .release(inode.disk_inode.start, inode.disk_inode.sectors());
        }
    }

    /// 登记表中的 inode 个数
    pub fn open_inodes(&self) -> usize {
        self.open_inodes.lock().len()
    }
}

impl Inode {
    /// inode 编号，即描述扇区号
    #[inline]
    pub fn inumber(&self) -> SectorId {
        self.sector
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.disk_inode.len()
    }

    /// 标记删除，扇区在最后一个打开者关闭时归还
    pub fn remove(&self) {
        self.state.lock().removed = true;
    }

    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// 禁止写入。每个打开者至多调用一次
    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        state.deny_write_count += 1;
        assert!(state.deny_write_count <= state.open_count);
    }

    /// 恢复写入。调用过 [`Inode::deny_write`] 的打开者须在关闭前调用一次
    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        assert!(state.deny_write_count > 0);
        assert!(state.deny_write_count <= state.open_count);
        state.deny_write_count -= 1;
    }

    /// 从`offset`处读出数据填充`buf`，返回读到的字节数，到达文件末尾时会少于`buf.len()`
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let mut read_size = 0;
        for (sector, range) in self.chunks(offset, buf.len()) {
            let dest = &mut buf[read_size..read_size + range.len()];
            self.cache.read(sector, range.start, dest);
            read_size += range.len();
        }

        read_size
    }

    /// 把`buf`写到`offset`处，返回写入的字节数。
    /// 文件不会增长，越过末尾的部分被丢弃；禁止写入时返回 0
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        if self.state.lock().deny_write_count > 0 {
            return 0;
        }

        let mut written_size = 0;
        for (sector, range) in self.chunks(offset, buf.len()) {
            let src = &buf[written_size..written_size + range.len()];
            self.cache.write(sector, range.start, src);
            written_size += range.len();
        }

        written_size
    }
}

impl Inode {
    /// 把`[offset, offset + size)`按扇区切块，产出（扇区号，扇区内范围）。
    /// 块长取请求剩余、扇区剩余与文件剩余三者的最小值
    fn chunks(
        &self,
        mut offset: usize,
        mut size: usize,
    ) -> impl Iterator<Item = (SectorId, Range<usize>)> + '_ {
        core::iter::from_fn(move || {
            let sector = self.disk_inode.byte_to_sector(offset)?;
            let sector_offset = offset % SECTOR_SIZE;
            let inode_left = self.length() - offset;
            let sector_left = SECTOR_SIZE - sector_offset;
            let chunk_size = size.min(inode_left).min(sector_left);
            if chunk_size == 0 {
                return None;
            }

            size -= chunk_size;
            offset += chunk_size;
            Some((sector, sector_offset..sector_offset + chunk_size))
        })
    }
}
