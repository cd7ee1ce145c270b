use std::path::Path;

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// The medium a disk lives on: a metadata region (disk header followed by the
/// bitmap) and then `block_count()` blocks of `BLOCK_SIZE` bytes.
///
/// Implementations own the physical layout. Opening a medium that does not
/// exist creates it with a header describing a free disk; opening one with
/// fewer blocks than requested grows it without losing any block contents.
pub trait BlockStorage {
    /// Opens the medium at `path`, creating or growing it to `nblocks` blocks.
    /// A medium is never shrunk.
    fn open_disk<P: AsRef<Path>>(path: P, nblocks: usize) -> std::io::Result<Self>
    where
        Self: std::marker::Sized;
    /// Number of blocks in the data region.
    fn block_count(&self) -> usize;
    /// Reads `buf.len()` bytes of the metadata region starting at `offset`.
    fn read_meta(&mut self, offset: usize, buf: &mut [u8]) -> std::io::Result<()>;
    /// Writes `buf` into the metadata region starting at `offset`.
    fn write_meta(&mut self, offset: usize, buf: &[u8]) -> std::io::Result<()>;
    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range will return an error.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> std::io::Result<()>;
    /// Writes provided buffer into the specified block number.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range will return an error.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> std::io::Result<()>;
    /// Hands buffered writes to the operating system without waiting for the
    /// device.
    fn flush_disk(&mut self) -> std::io::Result<()>;
    /// Blocks until every write has reached the device.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}
