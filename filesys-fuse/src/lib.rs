#[cfg(test)]
mod tests;

mod block_file;

use std::io;

use filesys::{BlockCache, DiskInode, FreeMap, InodeTable, NoSpace, SectorId, SECTOR_SIZE};

pub use self::block_file::BlockFile;

/// 为`data`分配描述扇区并存成一个文件，返回其 inode 编号
pub fn store(inodes: &InodeTable, free_map: &dyn FreeMap, data: &[u8]) -> Result<SectorId, NoSpace> {
    let sector = free_map.allocate(1).ok_or(NoSpace)?;
    if let Err(err) = inodes.create(sector, data.len()) {
        free_map.release(sector, 1);
        return Err(err);
    }

    let inode = inodes.open(sector);
    let written = inode.write_at(0, data);
    inodes.close(inode);
    assert_eq!(written, data.len());

    Ok(sector)
}

/// 读出 inode`sector`的全部内容
pub fn load(inodes: &InodeTable, sector: SectorId) -> Vec<u8> {
    let inode = inodes.open(sector);
    let mut data = vec![0; inode.length()];
    let read = inode.read_at(0, &mut data);
    inodes.close(inode);
    data.truncate(read);

    data
}

/// 确认`sector`上是一个描述扇区，且它的数据完整落在`sectors`个扇区的镜像内
pub fn check_inode(cache: &BlockCache, sector: SectorId, sectors: usize) -> io::Result<()> {
    if usize::from(sector) >= sectors {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("inode {sector} is beyond the image ({sectors} sectors)"),
        ));
    }

    let mut raw = [0; SECTOR_SIZE];
    cache.read(sector, 0, &mut raw);
    let disk_inode = DiskInode::from_bytes(&raw);
    if !disk_inode.is_valid() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("sector {sector} holds no inode"),
        ));
    }

    let end = usize::from(disk_inode.start) + disk_inode.sectors();
    if end > sectors {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("data of inode {sector} ends at sector {end}, beyond the image"),
        ));
    }

    Ok(())
}
