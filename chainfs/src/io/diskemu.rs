use crate::alloc::bitmap_len;
use crate::io::{BlockNumber, BlockStorage};
use crate::layout::BLOCK_SIZE;
use crate::sb::{DiskHeader, DISK_HEADER_SIZE};

use log::info;
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, ErrorKind, SeekFrom};
use std::path::Path;

pub struct FileBlockEmulator {
    /// Holds the disk header, the bitmap and then every block back to back.
    fd: File,
    /// The total number of blocks available in the file store.
    block_count: usize,
    /// Offset of block 0 in the file.
    data_offset: u64,
}

/// Emulates block disk storage in userspace using a regular file for the
/// header, the bitmap and the blocks.
impl FileBlockEmulator {
    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn block_offset(&self, blocknr: BlockNumber) -> std::io::Result<u64> {
        if blocknr >= self.block_count {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "block out of range",
            ));
        }
        Ok(self.data_offset + (blocknr * BLOCK_SIZE) as u64)
    }

    fn meta_range(&self, offset: usize, len: usize) -> std::io::Result<u64> {
        if (offset + len) as u64 > self.data_offset {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "access past the metadata region",
            ));
        }
        Ok(offset as u64)
    }
}

impl BlockStorage for FileBlockEmulator {
    fn open_disk<P: AsRef<Path>>(dest: P, nblocks: usize) -> std::io::Result<Self>
    where
        Self: std::marker::Sized,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dest)?;
        FileBlockEmulatorBuilder::from(file)
            .with_block_count(nblocks)
            .build()
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_meta(&mut self, offset: usize, buf: &mut [u8]) -> std::io::Result<()> {
        let pos = self.meta_range(offset, buf.len())?;
        self.fd.seek(SeekFrom::Start(pos))?;
        self.fd.read_exact(buf)
    }

    fn write_meta(&mut self, offset: usize, buf: &[u8]) -> std::io::Result<()> {
        let pos = self.meta_range(offset, buf.len())?;
        self.fd.seek(SeekFrom::Start(pos))?;
        self.fd.write_all(buf)
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()> {
        let pos = self.block_offset(blocknr)?;
        if buf.len() < BLOCK_SIZE {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "buffer does not contain enough space to read block",
            ));
        }
        self.fd.seek(SeekFrom::Start(pos))?;
        self.fd.read_exact(&mut buf[..BLOCK_SIZE])
    }

    /// This method truncates writes that exceed the total block size.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()> {
        let pos = self.block_offset(blocknr)?;
        self.fd.seek(SeekFrom::Start(pos))?;
        let max = BLOCK_SIZE.min(buf.len());
        self.fd.write_all(&buf[..max])
    }

    fn flush_disk(&mut self) -> std::io::Result<()> {
        self.fd.flush()
    }

    fn sync_disk(&mut self) -> std::io::Result<()> {
        self.fd.sync_all()
    }
}

pub struct FileBlockEmulatorBuilder {
    fd: File,
    block_count: usize,
    clear: bool,
}

impl From<File> for FileBlockEmulatorBuilder {
    fn from(fd: File) -> Self {
        FileBlockEmulatorBuilder {
            fd,
            block_count: 0,
            clear: false,
        }
    }
}

impl FileBlockEmulatorBuilder {
    /// Sets the number of desired blocks in the block store device. An existing
    /// medium with more blocks keeps its size.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Discards whatever the file holds and lays out a fresh disk.
    pub fn clear_medium(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    /// Lays out a fresh disk when the file is empty (or clearing was
    /// requested), otherwise opens the disk it holds and grows it to the
    /// requested block count.
    pub fn build(mut self) -> std::io::Result<FileBlockEmulator> {
        if self.block_count == 0 {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "a disk needs at least one block",
            ));
        }
        let header = if self.clear || self.fd.metadata()?.len() == 0 {
            self.create()?
        } else {
            self.grow()?
        };
        Ok(FileBlockEmulator {
            fd: self.fd,
            block_count: header.num_blocks(),
            data_offset: header.data_offset(),
        })
    }

    fn create(&mut self) -> std::io::Result<DiskHeader> {
        let header = DiskHeader::new(self.block_count);
        info!("creating disk with {} blocks", self.block_count);
        self.fd.set_len(0)?;
        self.fd.seek(SeekFrom::Start(0))?;
        let mut bfd = BufWriter::new(&self.fd);
        bfd.write_all(header.serialize())?;
        bfd.write_all(&vec![0x00; header.bitmap_size()])?;
        // Zero out the "disk" blocks, buffering each write to prevent excessive writes.
        let zero = [0x00; BLOCK_SIZE];
        for _ in 0..self.block_count {
            bfd.write_all(&zero)?;
        }
        bfd.flush()?;
        Ok(header)
    }

    fn grow(&mut self) -> std::io::Result<DiskHeader> {
        let mut buf = [0; DISK_HEADER_SIZE];
        self.fd.seek(SeekFrom::Start(0))?;
        self.fd.read_exact(&mut buf)?;
        let mut header = DiskHeader::parse(&buf)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e.to_string()))?;
        let old_blocks = header.num_blocks();
        if self.block_count <= old_blocks {
            return Ok(header);
        }

        info!("growing disk from {} to {} blocks", old_blocks, self.block_count);
        let old_offset = header.data_offset();
        let old_bitmap = header.bitmap_size();
        header.grow(self.block_count);
        let new_offset = header.data_offset();
        self.fd
            .set_len(new_offset + (self.block_count * BLOCK_SIZE) as u64)?;

        // The bitmap grew into the space of the first blocks: move every old
        // block up, last one first so nothing is overwritten before it is read.
        if new_offset != old_offset {
            let mut block = [0; BLOCK_SIZE];
            for i in (0..old_blocks).rev() {
                let from = old_offset + (i * BLOCK_SIZE) as u64;
                let to = new_offset + (i * BLOCK_SIZE) as u64;
                self.fd.seek(SeekFrom::Start(from))?;
                self.fd.read_exact(&mut block)?;
                self.fd.seek(SeekFrom::Start(to))?;
                self.fd.write_all(&block)?;
            }
            let added = bitmap_len(self.block_count) - old_bitmap;
            self.fd
                .seek(SeekFrom::Start((DISK_HEADER_SIZE + old_bitmap) as u64))?;
            self.fd.write_all(&vec![0x00; added])?;
        }

        self.fd.seek(SeekFrom::Start(0))?;
        self.fd.write_all(header.serialize())?;
        Ok(header)
    }
}
