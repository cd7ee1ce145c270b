use std::mem;

use crate::error::{FsError, Result};
use crate::fs::ChainFs;
use crate::io::BlockStorage;
use crate::layout::{
    link, BlockHeader, DirectoryBlock, FileControlBlock, FirstDirectoryBlock, FirstFileBlock,
    BLOCK_SIZE, MAX_ENTRIES_DB, MAX_ENTRIES_FDB, ROOT_BLOCK, TOMBSTONE,
};

use log::{debug, info};

/// An open directory: a copy of its first block plus, when known, a copy of
/// its parent's first block so `..` can be resolved without a lookup.
#[derive(Debug, Clone)]
pub struct DirectoryHandle {
    fdb: FirstDirectoryBlock,
    parent: Option<FirstDirectoryBlock>,
}

impl DirectoryHandle {
    pub(crate) fn new(fdb: FirstDirectoryBlock, parent: Option<FirstDirectoryBlock>) -> Self {
        Self { fdb, parent }
    }

    pub fn name(&self) -> String {
        self.fdb.fcb.name()
    }

    pub fn block_index(&self) -> usize {
        self.fdb.index()
    }

    pub fn is_root(&self) -> bool {
        self.fdb.index() == ROOT_BLOCK
    }

    /// Slots used in the entry list, removed entries included.
    pub fn num_entries(&self) -> usize {
        self.fdb.num_entries()
    }

    pub fn control_block(&self) -> &FileControlBlock {
        &self.fdb.fcb
    }

    /// Block index of the cached parent directory.
    pub fn parent_block(&self) -> Option<usize> {
        self.parent.as_ref().map(|p| p.index())
    }
}

/// One live entry of a directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub block: usize,
    pub is_dir: bool,
    pub size_in_bytes: usize,
    pub size_in_blocks: usize,
}

impl From<(usize, &FileControlBlock)> for DirEntry {
    fn from((block, fcb): (usize, &FileControlBlock)) -> Self {
        DirEntry {
            name: fcb.name(),
            block,
            is_dir: fcb.is_dir(),
            size_in_bytes: fcb.size_in_bytes as usize,
            size_in_blocks: fcb.size_in_blocks as usize,
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(FsError::InvalidArgument(format!(
            "\"{}\" cannot be used as a name",
            name
        )));
    }
    Ok(())
}

impl<T: BlockStorage> ChainFs<T> {
    /// Live entries of a directory as `(slot, block)` pairs in slot order,
    /// inline entries first and then each chained block in link order.
    fn entries(&mut self, fdb: &FirstDirectoryBlock) -> Result<Vec<(usize, usize)>> {
        let total = fdb.num_entries();
        let mut entries = Vec::with_capacity(total);
        let inline = total.min(MAX_ENTRIES_FDB);
        collect_live(&fdb.file_blocks[..inline], 0, &mut entries);

        let mut seen = inline;
        let mut next = fdb.header.next();
        while seen < total {
            let index = next.ok_or(FsError::BadBlock {
                index: fdb.index(),
                found: fdb.header.next_block,
            })?;
            let db: DirectoryBlock = self.disk.read_chain(index)?;
            let count = (total - seen).min(MAX_ENTRIES_DB);
            collect_live(&db.file_blocks[..count], seen, &mut entries);
            seen += count;
            next = db.header.next();
        }
        Ok(entries)
    }

    fn read_fcb(&mut self, index: usize) -> Result<FileControlBlock> {
        let ffb: FirstFileBlock = self.disk.read_chain(index)?;
        Ok(ffb.fcb)
    }

    /// Finds `name` in the directory, returning its slot and first block.
    fn lookup(&mut self, dir: &DirectoryHandle, name: &str) -> Result<Option<(usize, usize)>> {
        for (slot, block) in self.entries(&dir.fdb)? {
            if self.read_fcb(block)?.has_name(name) {
                return Ok(Some((slot, block)));
            }
        }
        Ok(None)
    }

    /// First block of the entry called `name`, comparing at most the stored
    /// name length. Block 0 is the root and never an entry, so `None` and a
    /// zero index cannot be confused.
    pub fn exists(&mut self, dir: &DirectoryHandle, name: &str) -> Result<Option<usize>> {
        Ok(self.lookup(dir, name)?.map(|(_, block)| block))
    }

    /// Creates an empty file in the directory.
    pub fn create_file(&mut self, dir: &mut DirectoryHandle, name: &str) -> Result<()> {
        let block = self.create_entry(dir, name, false)?;
        debug!("created file \"{}\" at block {}", name, block);
        Ok(())
    }

    /// Creates an empty directory in the directory.
    pub fn make_dir(&mut self, dir: &mut DirectoryHandle, name: &str) -> Result<()> {
        let block = self.create_entry(dir, name, true)?;
        debug!("created directory \"{}\" at block {}", name, block);
        Ok(())
    }

    fn create_entry(&mut self, dir: &mut DirectoryHandle, name: &str, is_dir: bool) -> Result<usize> {
        validate_name(name)?;
        if self.exists(dir, name)?.is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let slot = dir.fdb.num_entries();
        let grows_list =
            slot >= MAX_ENTRIES_FDB && (slot - MAX_ENTRIES_FDB) % MAX_ENTRIES_DB == 0;
        let needed = if grows_list { 2 } else { 1 };
        if self.disk.free_blocks() < needed {
            return Err(FsError::NoSpace);
        }

        let block = self.disk.free_block_hint().ok_or(FsError::NoSpace)?;
        let fcb = FileControlBlock::new(name, dir.fdb.index() as i32, slot as i32, is_dir);
        if is_dir {
            self.disk.write_chain(&FirstDirectoryBlock::new(block, fcb))?;
        } else {
            self.disk.write_chain(&FirstFileBlock::new(block, fcb))?;
        }
        self.append_entry(dir, block)?;
        Ok(block)
    }

    /// Last block of the directory's entry list chain, `None` when the list
    /// still fits in the first block.
    fn last_directory_block(&mut self, fdb: &FirstDirectoryBlock) -> Result<Option<DirectoryBlock>> {
        let mut last = None;
        let mut next = fdb.header.next();
        while let Some(index) = next {
            let db: DirectoryBlock = self.disk.read_chain(index)?;
            next = db.header.next();
            last = Some(db);
        }
        Ok(last)
    }

    /// Appends `child` to the tail of the entry list, chaining a new block
    /// when the tail is full.
    fn append_entry(&mut self, dir: &mut DirectoryHandle, child: usize) -> Result<()> {
        let slot = dir.fdb.num_entries();
        if slot < MAX_ENTRIES_FDB {
            dir.fdb.file_blocks[slot] = child as i32;
        } else {
            let pos = (slot - MAX_ENTRIES_FDB) % MAX_ENTRIES_DB;
            if pos == 0 {
                let index = self.disk.free_block_hint().ok_or(FsError::NoSpace)?;
                let header = match self.last_directory_block(&dir.fdb)? {
                    Some(mut tail) => {
                        tail.header.next_block = index as i32;
                        self.disk.write_chain(&tail)?;
                        BlockHeader::new(index, tail.header.block_in_disk, tail.header.block_in_file + 1)
                    }
                    None => {
                        dir.fdb.header.next_block = index as i32;
                        BlockHeader::new(index, dir.fdb.header.block_in_disk, dir.fdb.header.block_in_file + 1)
                    }
                };
                let mut db = DirectoryBlock::new(header);
                db.file_blocks[0] = child as i32;
                self.disk.write_chain(&db)?;
                dir.fdb.fcb.size_in_bytes += BLOCK_SIZE as i32;
                dir.fdb.fcb.size_in_blocks += 1;
                debug!("directory {} grew into block {}", dir.fdb.index(), index);
            } else {
                let mut tail = self
                    .last_directory_block(&dir.fdb)?
                    .ok_or(FsError::BadBlock {
                        index: dir.fdb.index(),
                        found: dir.fdb.header.next_block,
                    })?;
                tail.file_blocks[pos] = child as i32;
                self.disk.write_chain(&tail)?;
            }
        }
        dir.fdb.num_entries += 1;
        self.disk.write_chain(&dir.fdb)
    }

    /// Overwrites the entry list slot `slot` with `value`.
    fn set_entry(&mut self, dir: &mut DirectoryHandle, slot: usize, value: i32) -> Result<()> {
        if slot < MAX_ENTRIES_FDB {
            dir.fdb.file_blocks[slot] = value;
            return self.disk.write_chain(&dir.fdb);
        }
        let ordinal = (slot - MAX_ENTRIES_FDB) / MAX_ENTRIES_DB;
        let mut next = dir.fdb.header.next();
        for _ in 0..ordinal {
            let index = next.ok_or(FsError::BadBlock {
                index: dir.fdb.index(),
                found: -1,
            })?;
            next = self.disk.read_header(index)?.next();
        }
        let index = next.ok_or(FsError::BadBlock {
            index: dir.fdb.index(),
            found: -1,
        })?;
        let mut db: DirectoryBlock = self.disk.read_chain(index)?;
        db.file_blocks[(slot - MAX_ENTRIES_FDB) % MAX_ENTRIES_DB] = value;
        self.disk.write_chain(&db)
    }

    /// Names of the live entries in creation order.
    pub fn list(&mut self, dir: &DirectoryHandle) -> Result<Vec<String>> {
        Ok(self
            .read_dir(dir)?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    /// Live entries with their metadata, in creation order.
    pub fn read_dir(&mut self, dir: &DirectoryHandle) -> Result<Vec<DirEntry>> {
        let mut listing = Vec::new();
        for (_, block) in self.entries(&dir.fdb)? {
            let fcb = self.read_fcb(block)?;
            listing.push(DirEntry::from((block, &fcb)));
        }
        Ok(listing)
    }

    /// Metadata of the entry called `name`.
    pub fn stat(&mut self, dir: &DirectoryHandle, name: &str) -> Result<DirEntry> {
        let block = self
            .exists(dir, name)?
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        let fcb = self.read_fcb(block)?;
        Ok(DirEntry::from((block, &fcb)))
    }

    /// Moves the handle to another directory.
    ///
    /// `.` and the directory's own name stay put, `..` pops to the parent (a
    /// no-op at the root), `/` jumps to the root, anything else must name a
    /// subdirectory of the current one.
    pub fn change_dir(&mut self, dir: &mut DirectoryHandle, target: &str) -> Result<()> {
        if target == "." || dir.fdb.fcb.has_name(target) {
            return Ok(());
        }

        if target == ".." {
            let parent_block = match link(dir.fdb.fcb.directory_block) {
                Some(block) if !dir.is_root() => block,
                _ => return Ok(()),
            };
            let parent = match dir.parent {
                Some(parent) => parent,
                None => self.disk.read_chain(parent_block)?,
            };
            let grandparent = match link(parent.fcb.directory_block) {
                Some(block) => Some(self.disk.read_chain(block)?),
                None => None,
            };
            dir.fdb = parent;
            dir.parent = grandparent;
            return Ok(());
        }

        if target == "/" {
            dir.fdb = self.disk.read_chain(ROOT_BLOCK)?;
            dir.parent = None;
            return Ok(());
        }

        let block = self
            .exists(dir, target)?
            .ok_or_else(|| FsError::NotFound(target.to_string()))?;
        let fdb: FirstDirectoryBlock = self.disk.read_chain(block)?;
        if !fdb.fcb.is_dir() {
            return Err(FsError::NotADirectory(target.to_string()));
        }
        dir.parent = Some(mem::replace(&mut dir.fdb, fdb));
        Ok(())
    }

    /// Removes a file, or a directory without live entries, and frees its
    /// blocks.
    ///
    /// The parent's slot is overwritten with a tombstone rather than
    /// compacted: the entry count does not shrink and new entries still go
    /// to the tail of the list.
    pub fn remove(&mut self, dir: &mut DirectoryHandle, name: &str) -> Result<()> {
        let (slot, block) = self
            .lookup(dir, name)?
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;

        let fcb = self.read_fcb(block)?;
        if fcb.is_dir() {
            let fdb: FirstDirectoryBlock = self.disk.read_chain(block)?;
            if !self.entries(&fdb)?.is_empty() {
                return Err(FsError::DirectoryNotEmpty(name.to_string()));
            }
        }

        self.set_entry(dir, slot, TOMBSTONE)?;
        let freed = self.release_chain(block)?;
        info!("removed \"{}\", {} blocks freed", name, freed.len());
        Ok(())
    }
}

fn collect_live(slots: &[i32], first_slot: usize, out: &mut Vec<(usize, usize)>) {
    for (i, &value) in slots.iter().enumerate() {
        if value != TOMBSTONE {
            out.push((first_slot + i, value as usize));
        }
    }
}
