#![no_std]

extern crate alloc;

pub mod address;

// 物理页帧表：物理页 -> 映射到它的页表项
mod frame_table;

// 物理页分配器接口，以及栈式实现
mod page_alloc;

// 页表接口，以及一级软件页表
mod page_table;

pub use self::{
    address::{PhysAddr, PhysPageNum, VirtAddr, VirtPageNum},
    frame_table::{Frame, FrameError, FrameTable},
    page_alloc::{PageAllocator, PageFlag, StackFrameAllocator},
    page_table::{
        Entry, EntryAddr, InstallError, PTEFlag, PageDirectory, SoftPageTable, UnmappedVpn,
    },
};

/// 物理页大小
pub const PAGE_SIZE: usize = 0x1000;
/// 物理页内寻址的位数
pub const PAGE_SIZE_BITS: usize = 12;

/// 守护页帧表的外部锁。页帧表自身不加锁，所有操作都要求 `&mut`，
/// 调用者须先持有此锁（或以别的方式证明独占）
pub type VmLock<A> = spin::Mutex<FrameTable<A>>;
