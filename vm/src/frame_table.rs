//! # 物理页帧表
//!
//! 记录每个已占用的物理页被哪些页表项引用，是从物理页到页表项的反向索引。
//! 引用集合非空时页帧才存在于表中；最后一个引用移除时，物理页归还分配器。
//!
//! 页帧表自身不加锁：所有操作都要求 `&mut self`，
//! 调用者须持有 [`crate::VmLock`] 之类的外部锁。

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use enumflags2::BitFlags;

use crate::{
    EntryAddr, InstallError, PageAllocator, PageDirectory, PageFlag, PhysPageNum, VirtPageNum,
};

pub struct FrameTable<A: PageAllocator> {
    allocator: A,
    frames: BTreeMap<PhysPageNum, Frame>,
}

/// 一个已占用的物理页，以及映射到它的页表项
#[derive(Debug)]
pub struct Frame {
    ppn: PhysPageNum,
    /// 引用它的页表项，顺序无关，不重复
    entries: Vec<EntryAddr>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// 物理页用尽
    OutOfMemory,
    /// 虚拟页已有映射
    AlreadyMapped(VirtPageNum),
    /// 物理页不在页帧表中
    NotResident(PhysPageNum),
    /// 虚拟页超出页表范围
    OutOfRange(VirtPageNum),
}

impl From<InstallError> for FrameError {
    fn from(err: InstallError) -> Self {
        match err {
            InstallError::Mapped(vpn) => Self::AlreadyMapped(vpn),
            InstallError::OutOfRange(vpn) => Self::OutOfRange(vpn),
        }
    }
}

impl<A: PageAllocator> FrameTable<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            frames: BTreeMap::new(),
        }
    }

    /// 分配一个物理页并映射到`vpn`，返回该物理页。
    ///
    /// 映射失败时物理页会先归还分配器。
    pub fn acquire_frame(
        &mut self,
        flags: BitFlags<PageFlag>,
        pagedir: &mut impl PageDirectory,
        vpn: VirtPageNum,
        writable: bool,
    ) -> Result<PhysPageNum, FrameError> {
        let ppn = self
            .allocator
            .get_page(flags)
            .ok_or(FrameError::OutOfMemory)?;

        if let Err(err) = install_page(pagedir, vpn, ppn, writable) {
            self.allocator.free_page(ppn);
            return Err(err);
        }

        self.track(pagedir, vpn, ppn);
        Ok(ppn)
    }

    /// 把已驻留的物理页`ppn`再映射到`vpn`，记下新的页表项
    pub fn share_frame(
        &mut self,
        pagedir: &mut impl PageDirectory,
        vpn: VirtPageNum,
        ppn: PhysPageNum,
        writable: bool,
    ) -> Result<(), FrameError> {
        if !self.is_resident(ppn) {
            return Err(FrameError::NotResident(ppn));
        }

        install_page(pagedir, vpn, ppn, writable)?;
        self.track(pagedir, vpn, ppn);
        Ok(())
    }

    /// 移除页表项`entry`的引用。引用集合变空时移除页帧并归还物理页。
    ///
    /// 页表项本身不会被清空，由调用者负责。
    pub fn release_frame(&mut self, pagedir: &impl PageDirectory, entry: EntryAddr) {
        let Some(ppn) = pagedir.entry_page(entry) else {
            log::warn!("release {entry:?}: entry maps nothing");
            return;
        };
        let Some(frame) = self.frames.get_mut(&ppn) else {
            log::warn!("release {entry:?}: frame {ppn:?} is not tracked");
            return;
        };

        let Some(index) = frame.entries.iter().position(|&e| e == entry) else {
            log::warn!("release {entry:?}: not a reference of frame {ppn:?}");
            return;
        };
        frame.entries.swap_remove(index);

        if frame.entries.is_empty() {
            self.frames.remove(&ppn);
            self.allocator.free_page(ppn);
            log::trace!("frame {ppn:?} freed");
        }
    }

    #[inline]
    pub fn is_resident(&self, ppn: PhysPageNum) -> bool {
        self.frames.contains_key(&ppn)
    }

    /// 引用`ppn`的页表项
    pub fn references(&self, ppn: PhysPageNum) -> &[EntryAddr] {
        self.frames
            .get(&ppn)
            .map(|frame| frame.entries.as_slice())
            .unwrap_or_default()
    }

    pub fn frame(&self, ppn: PhysPageNum) -> Option<&Frame> {
        self.frames.get(&ppn)
    }

    /// 驻留的页帧个数
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }
}

impl<A: PageAllocator> FrameTable<A> {
    /// 把`vpn`的页表项记到`ppn`的页帧下，没有页帧则新建
    fn track(&mut self, pagedir: &mut impl PageDirectory, vpn: VirtPageNum, ppn: PhysPageNum) {
        let entry = pagedir
            .lookup_entry(vpn, true)
            .expect("installed page has no page table entry");

        let frame = self.frames.entry(ppn).or_insert_with(|| Frame {
            ppn,
            entries: Vec::new(),
        });
        if frame.entries.contains(&entry) {
            log::debug!("frame {ppn:?}: {entry:?} is already tracked");
            return;
        }
        frame.entries.push(entry);
        log::trace!("frame {ppn:?}: +{entry:?} ({} refs)", frame.entries.len());
    }
}

impl<A: PageAllocator> Drop for FrameTable<A> {
    fn drop(&mut self) {
        if !self.frames.is_empty() {
            log::warn!("frame table dropped with {} resident frames", self.frames.len());
        }
    }
}

impl Frame {
    #[inline]
    pub fn ppn(&self) -> PhysPageNum {
        self.ppn
    }

    #[inline]
    pub fn entries(&self) -> &[EntryAddr] {
        &self.entries
    }
}

/// 先确认`vpn`尚无映射，再建立映射
fn install_page(
    pagedir: &mut impl PageDirectory,
    vpn: VirtPageNum,
    ppn: PhysPageNum,
    writable: bool,
) -> Result<(), FrameError> {
    if pagedir.get_mapping(vpn).is_some() {
        return Err(FrameError::AlreadyMapped(vpn));
    }

    pagedir.install(vpn, ppn, writable)?;
    Ok(())
}
