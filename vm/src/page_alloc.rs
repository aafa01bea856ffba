use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;

use enumflags2::{bitflags, BitFlags};

use crate::{PhysPageNum, PAGE_SIZE};

/// 物理页分配器
pub trait PageAllocator {
    /// 分配一个物理页，内存用尽时返回空
    fn get_page(&mut self, flags: BitFlags<PageFlag>) -> Option<PhysPageNum>;
    /// 归还物理页
    fn free_page(&mut self, ppn: PhysPageNum);
}

/// 分配标志
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFlag {
    /// 内存用尽时 panic 而非返回空
    Assert = 0b01,
    /// 把新页清零
    Zero = 0b10,
}

/// 栈式物理页分配器
///
/// 页号区间 [current, end) 的物理页**从未**被分配，
/// 回收的页号压入`recycled`，分配时优先弹出栈顶。
/// 每个页都有一份宿主内存作为它的内容。
#[derive(Debug)]
pub struct StackFrameAllocator {
    start: usize,
    current: usize,
    end: usize,
    /// 被回收的物理页号之栈，栈顶位于尾部
    recycled: Vec<usize>,
    memory: Vec<u8>,
}

impl StackFrameAllocator {
    pub fn new(range: Range<PhysPageNum>) -> Self {
        let start = usize::from(range.start);
        let end = usize::from(range.end);
        assert!(start <= end);

        Self {
            start,
            current: start,
            end,
            recycled: Vec::new(),
            memory: vec![0; (end - start) * PAGE_SIZE],
        }
    }

    /// 已分配出去的页数
    pub fn allocated(&self) -> usize {
        self.current - self.start - self.recycled.len()
    }

    /// 尚可分配的页数
    pub fn available(&self) -> usize {
        self.end - self.current + self.recycled.len()
    }

    /// 读出指定物理页的数据
    pub fn page_bytes(&self, ppn: PhysPageNum) -> &[u8] {
        let range = self.page_range(ppn);
        &self.memory[range]
    }

    pub fn page_bytes_mut(&mut self, ppn: PhysPageNum) -> &mut [u8] {
        let range = self.page_range(ppn);
        &mut self.memory[range]
    }

    fn page_range(&self, ppn: PhysPageNum) -> Range<usize> {
        let ppn = usize::from(ppn);
        assert!((self.start..self.end).contains(&ppn), "ppn={ppn:#x} is out of range");
        let offset = (ppn - self.start) * PAGE_SIZE;
        offset..offset + PAGE_SIZE
    }
}

impl PageAllocator for StackFrameAllocator {
    fn get_page(&mut self, flags: BitFlags<PageFlag>) -> Option<PhysPageNum> {
        let ppn = match self.recycled.pop() {
            // 尝试分配以前的回收的物理页号
            Some(ppn) => Some(ppn),
            None => (self.current < self.end).then(|| {
                let current = self.current;
                self.current += 1;
                current
            }),
        };

        let Some(ppn) = ppn.map(PhysPageNum::from_raw) else {
            if flags.contains(PageFlag::Assert) {
                panic!("run out of physical pages");
            }
            log::debug!("page allocator: out of pages");
            return None;
        };

        if flags.contains(PageFlag::Zero) {
            self.page_bytes_mut(ppn).fill(0);
        }

        Some(ppn)
    }

    /// 合法的被回收页面
    /// - 之前一定被分配出去过，因此其物理页号位于 [start, current)
    /// - 它不是回收状态，即`recycled`中不包含此物理页号
    fn free_page(&mut self, ppn: PhysPageNum) {
        let ppn: usize = ppn.into();
        if !(self.start..self.current).contains(&ppn) || self.recycled.contains(&ppn) {
            panic!("Frame ppn={ppn:#x} has not been allocated!");
        }
        self.recycled.push(ppn);
    }
}
