//! # 磁盘数据结构层
//!
//! 每个文件由一个描述扇区和一段连续的数据扇区组成。
//! 描述扇区的布局（小端）：
//!
//! | 偏移 | 长度 | 字段                 |
//! |------|------|----------------------|
//! | 0    | 4    | 首个数据扇区         |
//! | 4    | 4    | 文件字节数（有符号） |
//! | 8    | 4    | 魔数                 |
//! | 12   | 500  | 填充 0               |

use core::mem;

use block_dev::{SectorId, SECTOR_SIZE};

use crate::INODE_MAGIC;

/// 磁盘上的 inode，恰好占满一个扇区
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DiskInode {
    /// 首个数据扇区
    pub start: SectorId,
    /// 文件字节数
    pub length: i32,
    magic: u32,
    unused: [u32; 125],
}

const _: () = assert!(mem::size_of::<DiskInode>() == SECTOR_SIZE);

impl DiskInode {
    pub fn new(start: SectorId, length: i32) -> Self {
        Self {
            start,
            length,
            magic: INODE_MAGIC,
            unused: [0; 125],
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length.max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 数据扇区的个数
    #[inline]
    pub fn sectors(&self) -> usize {
        bytes_to_sectors(self.len())
    }

    /// 字节偏移`pos`所在的数据扇区；越过文件末尾则为空
    pub fn byte_to_sector(&self, pos: usize) -> Option<SectorId> {
        (pos < self.len()).then(|| self.start + (pos / SECTOR_SIZE) as u32)
    }

    pub fn to_bytes(&self) -> [u8; SECTOR_SIZE] {
        let mut raw = [0; SECTOR_SIZE];
        raw[0..4].copy_from_slice(&self.start.raw().to_le_bytes());
        raw[4..8].copy_from_slice(&self.length.to_le_bytes());
        raw[8..12].copy_from_slice(&self.magic.to_le_bytes());
        raw
    }

    pub fn from_bytes(raw: &[u8; SECTOR_SIZE]) -> Self {
        let word = |at: usize| [raw[at], raw[at + 1], raw[at + 2], raw[at + 3]];
        Self {
            start: SectorId::new(u32::from_le_bytes(word(0))),
            length: i32::from_le_bytes(word(4)),
            magic: u32::from_le_bytes(word(8)),
            unused: [0; 125],
        }
    }
}

/// 容纳`size`字节需要多少个扇区
#[inline]
pub fn bytes_to_sectors(size: usize) -> usize {
    size.div_ceil(SECTOR_SIZE)
}
