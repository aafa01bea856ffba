mod cli;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use block_dev::SECTOR_SIZE;
use clap::Parser;
use cli::{Cli, Command};
use filesys::{BitmapFreeMap, BlockCache, InodeTable, SectorId};
use filesys_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Pack {
            out,
            sectors,
            files,
        } => pack(&out, sectors, &files),
        Command::Cat { image, inumber } => cat(&image, SectorId::new(inumber)),
    }
}

fn pack(out: &Path, sectors: u32, files: &[PathBuf]) -> io::Result<()> {
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(out)?;
    fd.set_len(sectors as u64 * SECTOR_SIZE as u64)?;

    let cache = Arc::new(BlockCache::new(Arc::new(BlockFile::new(fd))));
    let free_map = Arc::new(BitmapFreeMap::new(sectors as usize));
    // 0 号扇区留给引导
    free_map.reserve(SectorId::new(0), 1);
    let inodes = InodeTable::new(cache.clone(), free_map.clone());

    for file in files {
        let data = fs::read(file)?;
        let inumber = filesys_fuse::store(&inodes, free_map.as_ref(), &data)
            .map_err(|_| io::Error::other(format!("no space left for {file:?}")))?;
        log::info!("{file:?}: {} bytes", data.len());
        println!("{} -> {inumber}", file.display());
    }

    cache.sync_all();
    log::info!("{} of {sectors} sectors free", free_map.free_sectors());

    Ok(())
}

fn cat(image: &Path, inumber: SectorId) -> io::Result<()> {
    let fd = OpenOptions::new().read(true).write(true).open(image)?;
    let sectors = (fd.metadata()?.len() / SECTOR_SIZE as u64) as usize;

    let cache = Arc::new(BlockCache::new(Arc::new(BlockFile::new(fd))));
    filesys_fuse::check_inode(&cache, inumber, sectors)?;
    let inodes = InodeTable::new(cache, Arc::new(BitmapFreeMap::new(sectors)));

    let data = filesys_fuse::load(&inodes, inumber);
    io::stdout().write_all(&data)
}
