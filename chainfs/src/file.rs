use crate::dir::DirectoryHandle;
use crate::error::{FsError, Result};
use crate::fs::ChainFs;
use crate::io::BlockStorage;
use crate::layout::{BlockHeader, FileBlock, FirstFileBlock, MAX_DATA_FB, MAX_DATA_FFB};

use log::{debug, trace};

/// An open file: a copy of its first block, the chain block the cursor is in
/// (`None` while that is the first block) and the cursor itself.
///
/// Two handles on the same file do not see each other's size updates.
#[derive(Debug)]
pub struct FileHandle {
    ffb: FirstFileBlock,
    current: Option<FileBlock>,
    pos_in_file: usize,
}

impl FileHandle {
    pub fn name(&self) -> String {
        self.ffb.fcb.name()
    }

    pub fn size(&self) -> usize {
        self.ffb.fcb.size_in_bytes as usize
    }

    pub fn size_in_blocks(&self) -> usize {
        self.ffb.fcb.size_in_blocks as usize
    }

    pub fn position(&self) -> usize {
        self.pos_in_file
    }

    /// Index of the file's first block.
    pub fn block_index(&self) -> usize {
        self.ffb.header.index()
    }

    fn current_header(&self) -> &BlockHeader {
        match &self.current {
            Some(fb) => &fb.header,
            None => &self.ffb.header,
        }
    }

    /// File offset where the current block's payload starts, and its length.
    fn span(&self) -> (usize, usize) {
        match &self.current {
            Some(fb) => (
                MAX_DATA_FFB + (fb.header.block_in_file as usize - 1) * MAX_DATA_FB,
                MAX_DATA_FB,
            ),
            None => (0, MAX_DATA_FFB),
        }
    }

    fn data(&self) -> &[u8] {
        match &self.current {
            Some(fb) => &fb.data,
            None => &self.ffb.data,
        }
    }

    fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.current {
            Some(fb) => &mut fb.data,
            None => &mut self.ffb.data,
        }
    }
}

impl<T: BlockStorage> ChainFs<T> {
    /// Opens a file of the directory with the cursor at its first byte.
    pub fn open_file(&mut self, dir: &DirectoryHandle, name: &str) -> Result<FileHandle> {
        let block = self
            .exists(dir, name)?
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        let ffb: FirstFileBlock = self.disk.read_chain(block)?;
        if ffb.fcb.is_dir() {
            return Err(FsError::IsADirectory(name.to_string()));
        }
        trace!("opened \"{}\" at block {}", name, block);
        Ok(FileHandle {
            ffb,
            current: None,
            pos_in_file: 0,
        })
    }

    /// Releases the handle and the blocks it caches. Every write has already
    /// been persisted.
    pub fn close_file(&mut self, handle: FileHandle) {
        trace!("closed \"{}\"", handle.name());
    }

    /// Reads up to `buf.len()` bytes from the cursor, following the chain.
    ///
    /// Returns fewer bytes than asked for when the end of the file is reached.
    pub fn read(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
        let wanted = buf.len().min(handle.size().saturating_sub(handle.pos_in_file));
        let mut read = 0;
        while read < wanted {
            let (start, cap) = handle.span();
            let offset = handle.pos_in_file - start;
            if offset == cap {
                match handle.current_header().next() {
                    Some(next) => {
                        handle.current = Some(self.disk.read_chain(next)?);
                        continue;
                    }
                    None => break,
                }
            }
            let n = (cap - offset).min(wanted - read);
            buf[read..read + n].copy_from_slice(&handle.data()[offset..offset + n]);
            handle.pos_in_file += n;
            read += n;
        }
        Ok(read)
    }

    /// Writes `data` at the cursor, growing the chain as needed.
    ///
    /// Each block is persisted as soon as it is filled. If the disk runs out
    /// of space part way, the bytes written so far stay on disk, the cursor
    /// points past them and `NoSpace` is returned.
    pub fn write(&mut self, handle: &mut FileHandle, data: &[u8]) -> Result<usize> {
        let result = self.write_chunks(handle, data);
        if handle.current.is_some() {
            // Size and block count live in the first block.
            self.disk.write_chain(&handle.ffb)?;
        }
        result
    }

    fn write_chunks(&mut self, handle: &mut FileHandle, data: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < data.len() {
            let (start, cap) = handle.span();
            let offset = handle.pos_in_file - start;
            if offset == cap {
                self.next_block_for_write(handle)?;
                continue;
            }
            let n = (cap - offset).min(data.len() - written);
            handle.data_mut()[offset..offset + n].copy_from_slice(&data[written..written + n]);
            handle.pos_in_file += n;
            written += n;
            if handle.pos_in_file > handle.size() {
                handle.ffb.fcb.size_in_bytes = handle.pos_in_file as i32;
            }
            match &handle.current {
                Some(fb) => self.disk.write_chain(fb)?,
                None => self.disk.write_chain(&handle.ffb)?,
            }
        }
        Ok(written)
    }

    /// Moves the handle into the next chain block, allocating and linking a
    /// new one at the end of the chain.
    fn next_block_for_write(&mut self, handle: &mut FileHandle) -> Result<()> {
        if let Some(next) = handle.current_header().next() {
            handle.current = Some(self.disk.read_chain(next)?);
            return Ok(());
        }

        let index = self.disk.free_block_hint().ok_or(FsError::NoSpace)?;
        let tail = *handle.current_header();
        let block = FileBlock::new(BlockHeader::new(
            index,
            tail.block_in_disk,
            tail.block_in_file + 1,
        ));
        self.disk.write_chain(&block)?;
        match &mut handle.current {
            Some(fb) => {
                fb.header.next_block = index as i32;
                self.disk.write_chain(fb)?;
            }
            None => {
                handle.ffb.header.next_block = index as i32;
                self.disk.write_chain(&handle.ffb)?;
            }
        }
        handle.ffb.fcb.size_in_blocks += 1;
        handle.current = Some(block);
        debug!(
            "file \"{}\" grew into block {} ({} blocks)",
            handle.name(),
            index,
            handle.size_in_blocks()
        );
        Ok(())
    }

    /// Moves the cursor to byte `pos`, which may be at most the file size.
    pub fn seek(&mut self, handle: &mut FileHandle, pos: usize) -> Result<()> {
        if pos > handle.size() {
            return Err(FsError::InvalidArgument(format!(
                "cannot seek to {} in a file of {} bytes",
                pos,
                handle.size()
            )));
        }
        let ordinal = if pos < MAX_DATA_FFB {
            0
        } else {
            1 + (pos - MAX_DATA_FFB) / MAX_DATA_FB
        };

        handle.current = None;
        let mut next = handle.ffb.header.next();
        for _ in 0..ordinal {
            match next {
                Some(index) => {
                    let fb: FileBlock = self.disk.read_chain(index)?;
                    next = fb.header.next();
                    handle.current = Some(fb);
                }
                None => break,
            }
        }
        handle.pos_in_file = pos;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::State;
    use crate::fs::tests::create_test_fs;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn write_then_read(len: usize) {
        let (_disk, mut fs) = create_test_fs(64);
        let mut root = fs.init().unwrap();
        fs.create_file(&mut root, "data").unwrap();
        let data = pattern(len);

        let mut fh = fs.open_file(&root, "data").unwrap();
        assert_eq!(fs.write(&mut fh, &data).unwrap(), len);
        fs.close_file(fh);

        let mut fh = fs.open_file(&root, "data").unwrap();
        assert_eq!(fh.size(), len);
        let mut buf = vec![0; len];
        assert_eq!(fs.read(&mut fh, &mut buf).unwrap(), len);
        assert_eq!(buf, data);
    }

    #[test]
    fn round_trip_empty_file() {
        write_then_read(0);
    }

    #[test]
    fn round_trip_just_under_first_block() {
        write_then_read(MAX_DATA_FFB - 1);
    }

    #[test]
    fn round_trip_exactly_first_block() {
        write_then_read(MAX_DATA_FFB);
    }

    #[test]
    fn round_trip_across_several_blocks() {
        write_then_read(MAX_DATA_FFB + 3 * MAX_DATA_FB + 17);
    }

    #[test]
    fn block_count_grows_once_per_new_block() {
        let (_disk, mut fs) = create_test_fs(64);
        let mut root = fs.init().unwrap();
        fs.create_file(&mut root, "f").unwrap();
        let mut fh = fs.open_file(&root, "f").unwrap();
        assert_eq!(fh.size_in_blocks(), 1);

        fs.write(&mut fh, &[1; MAX_DATA_FFB]).unwrap();
        assert_eq!(fh.size_in_blocks(), 1);
        fs.write(&mut fh, &[2; 1]).unwrap();
        assert_eq!(fh.size_in_blocks(), 2);
        fs.write(&mut fh, &vec![3; MAX_DATA_FB * 2]).unwrap();
        assert_eq!(fh.size_in_blocks(), 4);
        assert_eq!(fs.disk().bitmap().count(State::Used), 5);
    }

    #[test]
    fn small_reads_cross_block_boundaries() {
        let (_disk, mut fs) = create_test_fs(64);
        let mut root = fs.init().unwrap();
        fs.create_file(&mut root, "f").unwrap();
        let data = pattern(2000);
        let mut fh = fs.open_file(&root, "f").unwrap();
        fs.write(&mut fh, &data).unwrap();

        fs.seek(&mut fh, 0).unwrap();
        let mut out = Vec::new();
        let mut chunk = [0; 37];
        loop {
            let n = fs.read(&mut fh, &mut chunk).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(out, data);
    }

    #[test]
    fn reads_stop_at_end_of_file() {
        let (_disk, mut fs) = create_test_fs(64);
        let mut root = fs.init().unwrap();
        fs.create_file(&mut root, "f").unwrap();
        let mut fh = fs.open_file(&root, "f").unwrap();
        fs.write(&mut fh, b"hello").unwrap();

        fs.seek(&mut fh, 0).unwrap();
        let mut buf = [0; 64];
        assert_eq!(fs.read(&mut fh, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(fs.read(&mut fh, &mut buf).unwrap(), 0);
    }

    #[test]
    fn overwrite_in_the_middle_keeps_size() {
        let (_disk, mut fs) = create_test_fs(64);
        let mut root = fs.init().unwrap();
        fs.create_file(&mut root, "f").unwrap();
        let mut data = pattern(1500);
        let mut fh = fs.open_file(&root, "f").unwrap();
        fs.write(&mut fh, &data).unwrap();
        let blocks = fh.size_in_blocks();

        fs.seek(&mut fh, 340).unwrap();
        fs.write(&mut fh, &[0xaa; 20]).unwrap();
        data[340..360].copy_from_slice(&[0xaa; 20]);
        assert_eq!(fh.size(), 1500);
        assert_eq!(fh.size_in_blocks(), blocks);
        fs.close_file(fh);

        let mut fh = fs.open_file(&root, "f").unwrap();
        let mut buf = vec![0; 1500];
        fs.read(&mut fh, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn seek_to_block_boundaries() {
        let (_disk, mut fs) = create_test_fs(64);
        let mut root = fs.init().unwrap();
        fs.create_file(&mut root, "f").unwrap();
        let data = pattern(MAX_DATA_FFB + MAX_DATA_FB);
        let mut fh = fs.open_file(&root, "f").unwrap();
        fs.write(&mut fh, &data).unwrap();

        let mut byte = [0; 1];
        fs.seek(&mut fh, MAX_DATA_FFB).unwrap();
        fs.read(&mut fh, &mut byte).unwrap();
        assert_eq!(byte[0], data[MAX_DATA_FFB]);

        fs.seek(&mut fh, data.len()).unwrap();
        assert_eq!(fs.read(&mut fh, &mut byte).unwrap(), 0);
        fs.write(&mut fh, b"z").unwrap();
        assert_eq!(fh.size(), data.len() + 1);

        assert!(matches!(
            fs.seek(&mut fh, data.len() + 2),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn directories_cannot_be_opened_as_files() {
        let (_disk, mut fs) = create_test_fs(16);
        let mut root = fs.init().unwrap();
        fs.make_dir(&mut root, "d").unwrap();
        assert!(matches!(fs.open_file(&root, "d"), Err(FsError::IsADirectory(_))));
        assert!(matches!(fs.open_file(&root, "x"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn running_out_of_space_keeps_the_written_prefix() {
        let (_disk, mut fs) = create_test_fs(4);
        let mut root = fs.init().unwrap();
        fs.create_file(&mut root, "f").unwrap();
        let data = pattern(MAX_DATA_FFB + 3 * MAX_DATA_FB);
        let mut fh = fs.open_file(&root, "f").unwrap();

        assert!(matches!(fs.write(&mut fh, &data), Err(FsError::NoSpace)));
        let kept = MAX_DATA_FFB + 2 * MAX_DATA_FB;
        assert_eq!(fh.position(), kept);
        fs.close_file(fh);

        let mut fh = fs.open_file(&root, "f").unwrap();
        assert_eq!(fh.size(), kept);
        assert_eq!(fh.size_in_blocks(), 3);
        let mut buf = vec![0; data.len()];
        assert_eq!(fs.read(&mut fh, &mut buf).unwrap(), kept);
        assert_eq!(&buf[..kept], &data[..kept]);
    }
}
