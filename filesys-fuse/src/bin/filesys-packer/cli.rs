use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a disk image holding every input file as an inode
    Pack {
        /// Output image
        #[arg(long, short)]
        out: PathBuf,

        /// Image size in sectors
        #[arg(long, short, default_value_t = 4096)]
        sectors: u32,

        /// Files to store
        files: Vec<PathBuf>,
    },

    /// Print the contents of an inode to stdout
    Cat {
        /// Disk image
        #[arg(long, short)]
        image: PathBuf,

        /// Descriptor sector of the inode
        #[arg(long, short = 'n')]
        inumber: u32,
    },
}
