use crate::alloc::bitmap_len;
use crate::error::{FsError, Result};

use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Size in bytes of the persisted disk header.
pub const DISK_HEADER_SIZE: usize = std::mem::size_of::<DiskHeader>();

/// The record at the very start of the medium, followed by the bitmap bytes and
/// then the blocks themselves:
///
/// ==========================================================
/// | DiskHeader | Bitmap (1 bit/block) | Block 0 | ... | N-1 |
/// ==========================================================
///
/// Keeps the free block count and a hint for where to start looking for the
/// next free block. The hint is only ever a lower bound for the search.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, PartialEq, Clone, Copy)]
pub struct DiskHeader {
    /// Total number of blocks in the data region.
    pub num_blocks: i32,
    /// Number of blocks tracked by the bitmap; always equal to `num_blocks`.
    pub bitmap_blocks: i32,
    /// Number of bytes in the bitmap.
    pub bitmap_entries: i32,
    /// Blocks currently available to be allocated.
    pub free_blocks: i32,
    /// Lowest block that may be free, or -1 when the disk is full.
    pub first_free_block: i32,
}

impl DiskHeader {
    /// Header for a fresh disk with every block free.
    pub fn new(num_blocks: usize) -> Self {
        Self {
            num_blocks: num_blocks as i32,
            bitmap_blocks: num_blocks as i32,
            bitmap_entries: bitmap_len(num_blocks) as i32,
            free_blocks: num_blocks as i32,
            first_free_block: 0,
        }
    }

    /// Reads the header from the front of `buf`, rejecting values that cannot
    /// describe a volume.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let header = DiskHeader::read_from_prefix(buf).ok_or_else(|| {
            FsError::InvalidArgument("medium too short for a disk header".to_string())
        })?;
        if header.num_blocks <= 0
            || header.bitmap_entries as usize != bitmap_len(header.num_blocks as usize)
            || header.free_blocks < 0
            || header.free_blocks > header.num_blocks
        {
            return Err(FsError::InvalidArgument(format!(
                "medium header is not valid: {:?}",
                header
            )));
        }
        Ok(header)
    }

    pub fn serialize(&self) -> &[u8] {
        self.as_bytes()
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks as usize
    }

    pub fn bitmap_size(&self) -> usize {
        self.bitmap_entries as usize
    }

    /// Offset of block 0 from the start of the medium.
    pub fn data_offset(&self) -> u64 {
        (DISK_HEADER_SIZE + self.bitmap_size()) as u64
    }

    /// Extends the header to `num_blocks`, counting the added blocks as free.
    pub fn grow(&mut self, num_blocks: usize) {
        let added = num_blocks as i32 - self.num_blocks;
        if added <= 0 {
            return;
        }
        if self.first_free_block < 0 {
            self.first_free_block = self.num_blocks;
        }
        self.num_blocks = num_blocks as i32;
        self.bitmap_blocks = num_blocks as i32;
        self.bitmap_entries = bitmap_len(num_blocks) as i32;
        self.free_blocks += added;
    }
}
