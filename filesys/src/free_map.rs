//! 空闲扇区分配器
//!
//! 索引节点层只依赖 [`FreeMap`]；[`BitmapFreeMap`] 是放在内存里的位图实现，
//! 不负责持久化。

use alloc::vec;
use alloc::vec::Vec;

use block_dev::SectorId;
use spin::Mutex;

/// 分配连续扇区的接口
pub trait FreeMap: Send + Sync {
    /// 分配`count`个连续扇区，返回首个扇区号；空间不足时返回空
    fn allocate(&self, count: usize) -> Option<SectorId>;
    /// 归还从`start`起的`count`个扇区
    fn release(&self, start: SectorId, count: usize);
}

/// 位图分配器，首次适配
#[derive(Debug)]
pub struct BitmapFreeMap {
    /// 每一位对应一个扇区，1 表示已分配
    groups: Mutex<Vec<u64>>,
    /// 管理的扇区总数
    capacity: usize,
}

impl BitmapFreeMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: Mutex::new(vec![0; capacity.div_ceil(64)]),
            capacity,
        }
    }

    /// 把`start`起的`count`个扇区标记为占用，用于保留系统扇区
    pub fn reserve(&self, start: SectorId, count: usize) {
        let mut groups = self.groups.lock();
        let start = usize::from(start);
        for bit in start..start + count {
            assert!(!test(&groups, bit), "sector {bit} is already in use");
            flip(&mut groups, bit);
        }
    }

    /// 尚未分配的扇区数
    pub fn free_sectors(&self) -> usize {
        let groups = self.groups.lock();
        (0..self.capacity).filter(|&bit| !test(&groups, bit)).count()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl FreeMap for BitmapFreeMap {
    fn allocate(&self, count: usize) -> Option<SectorId> {
        if count == 0 {
            return Some(SectorId::default());
        }

        let mut groups = self.groups.lock();
        let mut run_start = 0;
        let mut run_len = 0;
        for bit in 0..self.capacity {
            if test(&groups, bit) {
                run_start = bit + 1;
                run_len = 0;
                continue;
            }

            run_len += 1;
            if run_len == count {
                (run_start..run_start + count).for_each(|bit| flip(&mut groups, bit));
                log::trace!("free map: allocate {count} sectors from #{run_start}");
                return Some(SectorId::new(run_start as u32));
            }
        }

        log::debug!("free map: no run of {count} free sectors");
        None
    }

    fn release(&self, start: SectorId, count: usize) {
        let mut groups = self.groups.lock();
        let start = usize::from(start);
        for bit in start..start + count {
            // 编号一定得有对应的位
            assert!(test(&groups, bit), "sector {bit} has not been allocated");
            flip(&mut groups, bit);
        }
        log::trace!("free map: release {count} sectors from #{start}");
    }
}

#[inline]
fn test(groups: &[u64], bit: usize) -> bool {
    groups[bit / 64] & (1 << (bit % 64)) != 0
}

#[inline]
fn flip(groups: &mut [u64], bit: usize) {
    groups[bit / 64] ^= 1 << (bit % 64);
}
