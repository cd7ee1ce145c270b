use std::path::Path;

use crate::alloc::{Bitmap, State};
use crate::error::{FsError, Result};
use crate::io::BlockStorage;
use crate::layout::{BlockHeader, ChainBlock, BLOCK_SIZE};
use crate::sb::{DiskHeader, DISK_HEADER_SIZE};

use log::{debug, trace, warn};
use zerocopy::FromBytes;

/// Block addressable storage with free space tracking.
///
/// The header and the bitmap are kept in memory and written back by
/// [`Disk::flush`]; block contents go straight to the medium. Allocation is two
/// steps: [`Disk::free_block_hint`] names a free block, and writing to it with
/// [`Disk::write_block`] claims it. Only one writer may use a disk at a time.
pub struct Disk<T: BlockStorage> {
    dev: T,
    header: DiskHeader,
    bitmap: Bitmap,
    dirty: bool,
}

impl<T: BlockStorage> Disk<T> {
    /// Opens the medium at `path`, creating it or growing it to `num_blocks`.
    pub fn open_or_create<P: AsRef<Path>>(path: P, num_blocks: usize) -> Result<Self> {
        let dev = T::open_disk(path, num_blocks)?;
        Disk::open(dev)
    }

    /// Loads the header and bitmap from an already prepared medium.
    pub fn open(mut dev: T) -> Result<Self> {
        let mut buf = [0; DISK_HEADER_SIZE];
        dev.read_meta(0, &mut buf)?;
        let header = DiskHeader::parse(&buf)?;
        if header.num_blocks() != dev.block_count() {
            return Err(FsError::InvalidArgument(format!(
                "header describes {} blocks but the medium holds {}",
                header.num_blocks(),
                dev.block_count()
            )));
        }

        let mut bits = vec![0; header.bitmap_size()];
        dev.read_meta(DISK_HEADER_SIZE, &mut bits)?;
        let bitmap = Bitmap::parse(&bits, header.num_blocks());

        Ok(Disk {
            dev,
            header,
            bitmap,
            dirty: false,
        })
    }

    pub fn header(&self) -> &DiskHeader {
        &self.header
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn num_blocks(&self) -> usize {
        self.header.num_blocks()
    }

    pub fn free_blocks(&self) -> usize {
        self.header.free_blocks as usize
    }

    pub fn is_used(&self, index: usize) -> bool {
        index < self.num_blocks() && self.bitmap.get(index) == State::Used
    }

    fn check_range(&self, index: usize) -> Result<()> {
        if index >= self.num_blocks() {
            return Err(FsError::OutOfRange(index));
        }
        Ok(())
    }

    /// Reads an allocated block into `buf`.
    pub fn read_block(&mut self, index: usize, buf: &mut [u8]) -> Result<()> {
        self.check_range(index)?;
        if self.bitmap.get(index) == State::Free {
            return Err(FsError::Unallocated(index));
        }
        trace!("read block {}", index);
        self.dev.read_block(index, buf)?;
        Ok(())
    }

    /// Overwrites a block, claiming it first if it was free.
    pub fn write_block(&mut self, index: usize, buf: &[u8]) -> Result<()> {
        self.check_range(index)?;
        if self.bitmap.get(index) == State::Free {
            self.bitmap.set(index, State::Used)?;
            self.header.free_blocks -= 1;
            debug!("claimed block {}, {} free", index, self.header.free_blocks);
            if index as i32 == self.header.first_free_block {
                self.header.first_free_block = self
                    .bitmap
                    .find(index + 1, State::Free)
                    .map_or(-1, |i| i as i32);
            }
            self.dirty = true;
        }
        trace!("write block {}", index);
        self.dev.write_block(index, buf)?;
        Ok(())
    }

    /// Returns a block to the free pool. Freeing a free block changes nothing.
    pub fn free_block(&mut self, index: usize) -> Result<()> {
        self.check_range(index)?;
        if self.bitmap.get(index) == State::Free {
            return Ok(());
        }
        self.bitmap.set(index, State::Free)?;
        self.header.free_blocks += 1;
        if self.header.first_free_block < 0 || (index as i32) < self.header.first_free_block {
            self.header.first_free_block = index as i32;
        }
        self.dirty = true;
        debug!("freed block {}, {} free", index, self.header.free_blocks);
        Ok(())
    }

    /// First free block at or after the allocation hint. The block is not
    /// claimed until it is written.
    pub fn free_block_hint(&self) -> Option<usize> {
        if self.header.first_free_block < 0 {
            return None;
        }
        self.bitmap
            .find(self.header.first_free_block as usize, State::Free)
    }

    /// First free block at or after `start`.
    pub fn free_block_from(&self, start: usize) -> Option<usize> {
        self.bitmap.find(start, State::Free)
    }

    /// Reads a chain block and checks that it sits where its header says.
    pub fn read_chain<B: ChainBlock>(&mut self, index: usize) -> Result<B> {
        let mut buf = [0; BLOCK_SIZE];
        self.read_block(index, &mut buf)?;
        let block = B::read_from(&buf[..]).ok_or(FsError::BadBlock {
            index,
            found: -1,
        })?;
        check_header(index, block.header())?;
        Ok(block)
    }

    /// Reads only the header of a chain block.
    pub fn read_header(&mut self, index: usize) -> Result<BlockHeader> {
        let mut buf = [0; BLOCK_SIZE];
        self.read_block(index, &mut buf)?;
        let header = BlockHeader::read_from_prefix(&buf[..]).ok_or(FsError::BadBlock {
            index,
            found: -1,
        })?;
        check_header(index, &header)?;
        Ok(header)
    }

    /// Writes a chain block to the index its header names.
    pub fn write_chain<B: ChainBlock>(&mut self, block: &B) -> Result<()> {
        let index = block.header().index();
        self.write_block(index, block.as_bytes())
    }

    /// Marks every block free and resets the allocation hint.
    pub fn reset(&mut self) {
        self.bitmap.clear();
        self.header.free_blocks = self.header.num_blocks;
        self.header.first_free_block = 0;
        self.dirty = true;
    }

    fn write_meta(&mut self) -> Result<()> {
        if self.dirty {
            self.dev.write_meta(0, self.header.serialize())?;
            self.dev.write_meta(DISK_HEADER_SIZE, self.bitmap.serialize())?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Pushes the header, the bitmap and any buffered blocks to the medium
    /// without waiting for the device.
    pub fn flush(&mut self) -> Result<()> {
        self.write_meta()?;
        self.dev.flush_disk()?;
        Ok(())
    }

    /// Like [`Disk::flush`], then waits until the device has the data.
    pub fn sync(&mut self) -> Result<()> {
        self.write_meta()?;
        self.dev.sync_disk()?;
        Ok(())
    }
}

fn check_header(index: usize, header: &BlockHeader) -> Result<()> {
    if header.block_in_disk as usize != index || header.block_in_disk < 0 {
        return Err(FsError::BadBlock {
            index,
            found: header.block_in_disk,
        });
    }
    Ok(())
}

impl<T: BlockStorage> Drop for Disk<T> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("failed to flush disk metadata on drop: {}", e);
        }
    }
}
