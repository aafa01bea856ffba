//! # 块设备接口层
//!
//! 块设备是以**扇区**为单位存储数据的设备；
//! [`BlockDevice`] 是对读写块设备的抽象，实现了此特质的类型称为**块设备驱动**。
//!
//! 本层假定读写总会成功，驱动无法完成传输时应直接 panic。

#![no_std]

use core::any::Any;
use core::fmt;

use derive_more::{Add, From, Into};

/// 扇区大小，必须与底层设备的传输单位严格一致
pub const SECTOR_SIZE: usize = 512;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 读出一整个扇区，`buf` 的长度为 [`SECTOR_SIZE`]
    fn read_block(&self, sector: SectorId, buf: &mut [u8]);
    /// 写入一整个扇区，`buf` 的长度为 [`SECTOR_SIZE`]
    fn write_block(&self, sector: SectorId, buf: &[u8]);
}

/// 扇区号
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Add, From, Into)]
#[repr(transparent)]
pub struct SectorId(u32);

impl SectorId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// 扇区在设备上的字节偏移
    #[inline]
    pub const fn byte_offset(self) -> u64 {
        self.0 as u64 * SECTOR_SIZE as u64
    }
}

impl core::ops::Add<u32> for SectorId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        self + Self(rhs)
    }
}

impl From<SectorId> for usize {
    fn from(id: SectorId) -> Self {
        id.0 as usize
    }
}

impl fmt::Debug for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
