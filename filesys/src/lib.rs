#![no_std]

extern crate alloc;

/* filesys 的整体架构，自上而下 */

// 索引节点层：文件的创建、打开、读写与删除
mod inode;

// 空闲扇区分配器接口，以及一个位图实现
mod free_map;

// 磁盘数据结构层：inode 在磁盘上的描述扇区
mod layout;

// 块缓存层：内存上的扇区缓存，时钟算法淘汰
mod block_cache;

pub use self::{
    block_cache::{BlockCache, CacheStats},
    free_map::{BitmapFreeMap, FreeMap},
    inode::{Inode, InodeTable, NoSpace},
    layout::{bytes_to_sectors, DiskInode},
};
pub use block_dev::{BlockDevice, SectorId, SECTOR_SIZE};

/// 描述扇区的魔数
pub const INODE_MAGIC: u32 = 0x494e_4f44;
/// 块缓存的槽位个数
pub const CACHE_CAPACITY: usize = 64;
