use std::path::Path;

use crate::dir::DirectoryHandle;
use crate::disk::Disk;
use crate::error::{FsError, Result};
use crate::io::BlockStorage;
use crate::layout::{FirstDirectoryBlock, ROOT_BLOCK};

use log::{debug, info};

/// A tree of directories and files whose metadata and contents are chains of
/// disk blocks.
///
/// The file system holds no notion of a current directory: every namespace
/// operation takes the [`DirectoryHandle`] it works in, and file operations
/// take the [`FileHandle`](crate::FileHandle) they move.
///
/// # Layout
/// =================================================================
/// | DiskHeader | Bitmap | Root directory (block 0) | Blocks ...   |
/// =================================================================
pub struct ChainFs<T: BlockStorage> {
    pub(crate) disk: Disk<T>,
}

impl<T: BlockStorage> ChainFs<T> {
    pub fn new(disk: Disk<T>) -> Self {
        Self { disk }
    }

    /// Opens (creating or growing) the medium at `path` without formatting it.
    pub fn open_or_create<P: AsRef<Path>>(path: P, num_blocks: usize) -> Result<Self> {
        Ok(Self::new(Disk::open_or_create(path, num_blocks)?))
    }

    pub fn disk(&self) -> &Disk<T> {
        &self.disk
    }

    /// Frees every block and writes an empty root directory into block 0.
    ///
    /// Handles opened before formatting refer to blocks that no longer exist.
    pub fn format(&mut self) -> Result<()> {
        info!("formatting disk with {} blocks", self.disk.num_blocks());
        self.disk.reset();
        self.disk.write_chain(&FirstDirectoryBlock::root())?;
        self.disk.flush()
    }

    /// Returns a handle on the root directory, formatting the disk first when
    /// it has no root yet.
    pub fn init(&mut self) -> Result<DirectoryHandle> {
        if !self.disk.is_used(ROOT_BLOCK) {
            self.format()?;
        }
        let root = self.disk.read_chain::<FirstDirectoryBlock>(ROOT_BLOCK)?;
        Ok(DirectoryHandle::new(root, None))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.disk.flush()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.disk.sync()
    }

    /// Block indices of the chain starting at `first`, in link order.
    pub fn chain(&mut self, first: usize) -> Result<Vec<usize>> {
        let mut chain = vec![first];
        let mut next = self.disk.read_header(first)?.next();
        while let Some(index) = next {
            if chain.len() >= self.disk.num_blocks() {
                return Err(FsError::BadBlock {
                    index,
                    found: index as i32,
                });
            }
            chain.push(index);
            next = self.disk.read_header(index)?.next();
        }
        Ok(chain)
    }

    /// Frees every block of the chain starting at `first`, last block first.
    /// Returns the blocks in the order they were freed.
    pub(crate) fn release_chain(&mut self, first: usize) -> Result<Vec<usize>> {
        let mut chain = self.chain(first)?;
        chain.reverse();
        for &index in &chain {
            self.disk.free_block(index)?;
        }
        debug!("released chain of {} blocks at {}", chain.len(), first);
        Ok(chain)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::FileBlockEmulator;
    use crate::layout::BLOCK_SIZE;

    pub(crate) fn create_test_fs(blocks: usize) -> (tempfile::NamedTempFile, ChainFs<FileBlockEmulator>) {
        let disk = tempfile::NamedTempFile::new().unwrap();
        let fs = ChainFs::open_or_create(disk.path(), blocks).unwrap();
        (disk, fs)
    }

    #[test]
    fn init_formats_an_empty_disk() {
        let (_disk, mut fs) = create_test_fs(16);
        let root = fs.init().unwrap();
        assert_eq!(root.block_index(), ROOT_BLOCK);
        assert_eq!(root.name(), "/");
        assert_eq!(root.num_entries(), 0);
        assert_eq!(fs.disk().free_blocks(), 15);
        assert!(fs.disk().is_used(ROOT_BLOCK));
    }

    #[test]
    fn format_frees_everything_but_the_root() {
        let (_disk, mut fs) = create_test_fs(16);
        let mut root = fs.init().unwrap();
        fs.create_file(&mut root, "a").unwrap();
        fs.make_dir(&mut root, "b").unwrap();
        assert_eq!(fs.disk().free_blocks(), 13);

        fs.format().unwrap();
        let root = fs.init().unwrap();
        assert_eq!(root.num_entries(), 0);
        assert_eq!(fs.disk().free_blocks(), 15);
        assert_eq!(fs.disk().header().first_free_block, 1);
    }

    #[test]
    fn contents_survive_reopening() {
        let disk = tempfile::NamedTempFile::new().unwrap();
        {
            let mut fs: ChainFs<FileBlockEmulator> =
                ChainFs::open_or_create(disk.path(), 64).unwrap();
            let mut root = fs.init().unwrap();
            fs.make_dir(&mut root, "docs").unwrap();
            fs.change_dir(&mut root, "docs").unwrap();
            fs.create_file(&mut root, "readme").unwrap();
            let mut fh = fs.open_file(&root, "readme").unwrap();
            fs.write(&mut fh, &[7; BLOCK_SIZE * 2]).unwrap();
            fs.close_file(fh);
            fs.flush().unwrap();
        }

        let mut fs: ChainFs<FileBlockEmulator> = ChainFs::open_or_create(disk.path(), 64).unwrap();
        let mut root = fs.init().unwrap();
        assert_eq!(fs.list(&root).unwrap(), vec!["docs".to_string()]);
        fs.change_dir(&mut root, "docs").unwrap();
        let mut fh = fs.open_file(&root, "readme").unwrap();
        let mut buf = vec![0; BLOCK_SIZE * 3];
        assert_eq!(fs.read(&mut fh, &mut buf).unwrap(), BLOCK_SIZE * 2);
        assert!(buf[..BLOCK_SIZE * 2].iter().all(|&b| b == 7));
        assert_eq!(
            fs.disk().free_blocks() + fs.disk().bitmap().count(crate::alloc::State::Used),
            64
        );
    }

    #[test]
    fn release_chain_frees_tail_before_head() {
        let (_disk, mut fs) = create_test_fs(32);
        let mut root = fs.init().unwrap();
        fs.create_file(&mut root, "big").unwrap();
        let mut fh = fs.open_file(&root, "big").unwrap();
        fs.write(&mut fh, &[1; BLOCK_SIZE * 3]).unwrap();
        let first = fh.block_index();
        let chain = fs.chain(first).unwrap();
        let used = fs.disk().bitmap().count(crate::alloc::State::Used);

        let released = fs.release_chain(first).unwrap();

        assert_eq!(chain.len(), 4);
        assert_eq!(released, chain.iter().rev().copied().collect::<Vec<_>>());
        assert_eq!(released.last(), Some(&first));
        assert!(chain.iter().all(|&b| !fs.disk().is_used(b)));
        assert_eq!(fs.disk().bitmap().count(crate::alloc::State::Used), used - 4);
        assert_eq!(fs.disk().header().first_free_block, first as i32);
    }
}
