//! 地址与页号

use core::fmt::{self, LowerHex};

use crate::{PAGE_SIZE, PAGE_SIZE_BITS};

/// 虚拟地址
/// - [12:] 虚拟页号
/// - [0:11] 页内偏移
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr(usize);

#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtPageNum(usize);

/// 物理地址
/// - [12:] 物理页号
/// - [0:11] 页内偏移
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr(usize);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysPageNum(usize);

impl VirtAddr {
    pub const fn from_raw(va: usize) -> Self {
        Self(va)
    }

    /// 本虚拟地址所在的页号
    pub fn page_number(&self) -> VirtPageNum {
        VirtPageNum(self.0 / PAGE_SIZE)
    }

    pub fn page_offset(&self) -> usize {
        self.0 & ((1 << PAGE_SIZE_BITS) - 1)
    }

    pub fn is_aligned(&self) -> bool {
        self.page_offset() == 0
    }
}

impl VirtPageNum {
    pub const fn from_raw(vpn: usize) -> Self {
        Self(vpn)
    }
}

impl PhysAddr {
    pub fn page_number(&self) -> PhysPageNum {
        PhysPageNum(self.0 / PAGE_SIZE)
    }

    pub fn page_offset(&self) -> usize {
        self.0 & ((1 << PAGE_SIZE_BITS) - 1)
    }
}

impl PhysPageNum {
    pub const fn from_raw(ppn: usize) -> Self {
        Self(ppn)
    }
}

impl From<usize> for VirtAddr {
    fn from(va: usize) -> Self {
        Self(va)
    }
}

impl From<VirtPageNum> for VirtAddr {
    fn from(vpn: VirtPageNum) -> Self {
        Self(vpn.0 << PAGE_SIZE_BITS)
    }
}

impl From<usize> for VirtPageNum {
    fn from(vpn: usize) -> Self {
        Self(vpn)
    }
}

impl From<VirtPageNum> for usize {
    fn from(vpn: VirtPageNum) -> Self {
        vpn.0
    }
}

impl From<usize> for PhysAddr {
    fn from(pa: usize) -> Self {
        Self(pa)
    }
}

impl From<PhysAddr> for usize {
    fn from(pa: PhysAddr) -> Self {
        pa.0
    }
}

impl From<PhysPageNum> for PhysAddr {
    fn from(ppn: PhysPageNum) -> Self {
        Self(ppn.0 << PAGE_SIZE_BITS)
    }
}

impl From<usize> for PhysPageNum {
    fn from(ppn: usize) -> Self {
        Self(ppn)
    }
}

impl From<PhysPageNum> for usize {
    fn from(ppn: PhysPageNum) -> Self {
        ppn.0
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "va:{:#x}", self.0)
    }
}

impl fmt::Debug for VirtPageNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pa:{:#x}", self.0)
    }
}

impl fmt::Debug for PhysPageNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}
