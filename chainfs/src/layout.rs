//! On-disk block formats.
//!
//! Every block starts with a [`BlockHeader`] linking it into a chain. The first
//! block of a chain also carries the [`FileControlBlock`] describing the file or
//! directory; continuation blocks hold only payload.
//!
//! ```text
//! FirstFileBlock      | header | fcb | data ...                   |
//! FileBlock           | header | data ...                         |
//! FirstDirectoryBlock | header | fcb | num_entries | entries ...  |
//! DirectoryBlock      | header | entries ...                      |
//! ```
use std::mem::size_of;

use zerocopy::{AsBytes, FromBytes, FromZeroes};

pub const BLOCK_SIZE: usize = 512;

/// Longest name stored in a control block; longer names are truncated.
pub const NAME_LEN: usize = 128;

/// Link value meaning "no block".
pub const NO_BLOCK: i32 = -1;

/// Entry value left in a directory slot whose file was removed.
pub const TOMBSTONE: i32 = -1;

/// The root directory always lives in the first block.
pub const ROOT_BLOCK: usize = 0;

const HEADER_SIZE: usize = size_of::<BlockHeader>();
const FCB_SIZE: usize = size_of::<FileControlBlock>();

/// Payload bytes in the first block of a file.
pub const MAX_DATA_FFB: usize = BLOCK_SIZE - HEADER_SIZE - FCB_SIZE;
/// Payload bytes in every later block of a file.
pub const MAX_DATA_FB: usize = BLOCK_SIZE - HEADER_SIZE;
/// Entry slots in the first block of a directory.
pub const MAX_ENTRIES_FDB: usize = (BLOCK_SIZE - HEADER_SIZE - FCB_SIZE - size_of::<i32>()) / 4;
/// Entry slots in every later block of a directory.
pub const MAX_ENTRIES_DB: usize = (BLOCK_SIZE - HEADER_SIZE) / 4;

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq)]
pub struct BlockHeader {
    pub previous_block: i32,
    pub next_block: i32,
    /// Position of this block within its own chain, starting at 0.
    pub block_in_file: i32,
    /// Must equal the index this block is stored at.
    pub block_in_disk: i32,
}

impl BlockHeader {
    pub fn new(block_in_disk: usize, previous_block: i32, block_in_file: i32) -> Self {
        Self {
            previous_block,
            next_block: NO_BLOCK,
            block_in_file,
            block_in_disk: block_in_disk as i32,
        }
    }

    pub fn next(&self) -> Option<usize> {
        link(self.next_block)
    }

    pub fn index(&self) -> usize {
        self.block_in_disk as usize
    }
}

pub(crate) fn link(value: i32) -> Option<usize> {
    if value < 0 {
        None
    } else {
        Some(value as usize)
    }
}

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq)]
pub struct FileControlBlock {
    /// First block of the directory holding this entry, -1 for the root.
    pub directory_block: i32,
    /// Slot of this entry in the parent's entry list.
    pub idx_in_directory: i32,
    pub size_in_bytes: i32,
    pub size_in_blocks: i32,
    pub is_dir: i32,
    pub name: [u8; NAME_LEN],
}

impl FileControlBlock {
    pub fn new(name: &str, directory_block: i32, idx_in_directory: i32, is_dir: bool) -> Self {
        Self {
            directory_block,
            idx_in_directory,
            size_in_bytes: 0,
            size_in_blocks: 1,
            is_dir: is_dir as i32,
            name: encode_name(name),
        }
    }

    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }

    /// Compares `name` the way it would have been stored.
    pub fn has_name(&self, name: &str) -> bool {
        self.name == encode_name(name)
    }
}

/// Copies at most `NAME_LEN` bytes of `name`, zero padding the rest. A
/// character that does not fit whole is dropped.
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut buf = [0; NAME_LEN];
    let mut len = name.len().min(NAME_LEN);
    while !name.is_char_boundary(len) {
        len -= 1;
    }
    buf[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf
}

/// Implemented by the four block roles so the store can check any block of a
/// chain through its header.
pub trait ChainBlock: AsBytes + FromBytes + Sized {
    fn header(&self) -> &BlockHeader;
}

macro_rules! chain_block {
    ($($ty:ty),*) => {
        $(impl ChainBlock for $ty {
            fn header(&self) -> &BlockHeader {
                &self.header
            }
        })*
    };
}

chain_block!(FirstFileBlock, FileBlock, FirstDirectoryBlock, DirectoryBlock);

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq)]
pub struct FirstFileBlock {
    pub header: BlockHeader,
    pub fcb: FileControlBlock,
    pub data: [u8; MAX_DATA_FFB],
}

impl FirstFileBlock {
    pub fn new(block: usize, fcb: FileControlBlock) -> Self {
        Self {
            header: BlockHeader::new(block, NO_BLOCK, 0),
            fcb,
            data: [0; MAX_DATA_FFB],
        }
    }
}

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq)]
pub struct FileBlock {
    pub header: BlockHeader,
    pub data: [u8; MAX_DATA_FB],
}

impl FileBlock {
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            data: [0; MAX_DATA_FB],
        }
    }
}

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq)]
pub struct FirstDirectoryBlock {
    pub header: BlockHeader,
    pub fcb: FileControlBlock,
    pub num_entries: i32,
    pub file_blocks: [i32; MAX_ENTRIES_FDB],
}

impl FirstDirectoryBlock {
    /// An empty directory; it already accounts for its own block.
    pub fn new(block: usize, fcb: FileControlBlock) -> Self {
        let mut fcb = fcb;
        fcb.size_in_bytes = BLOCK_SIZE as i32;
        fcb.size_in_blocks = 1;
        Self {
            header: BlockHeader::new(block, NO_BLOCK, 0),
            fcb,
            num_entries: 0,
            file_blocks: [0; MAX_ENTRIES_FDB],
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_BLOCK, FileControlBlock::new("/", NO_BLOCK, 0, true))
    }

    pub fn index(&self) -> usize {
        self.header.index()
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries as usize
    }
}

#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq)]
pub struct DirectoryBlock {
    pub header: BlockHeader,
    pub file_blocks: [i32; MAX_ENTRIES_DB],
}

impl DirectoryBlock {
    pub fn new(header: BlockHeader) -> Self {
        Self {
            header,
            file_blocks: [0; MAX_ENTRIES_DB],
        }
    }
}
