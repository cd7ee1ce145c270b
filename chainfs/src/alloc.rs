use crate::error::{FsError, Result};

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum State {
    Free,
    Used,
}

impl State {
    fn bit(self) -> u8 {
        match self {
            State::Free => 0,
            State::Used => 1,
        }
    }
}

/// Byte and bit coordinate of a block inside the bitmap.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct EntryKey {
    pub entry: usize,
    pub bit: u8,
}

/// One bit per physical block, eight blocks per byte. Bit `n % 8` of byte
/// `n / 8` holds the state of block `n`; a set bit means the block is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    entries: Vec<u8>,
    num_bits: usize,
}

/// Number of bytes needed to track `num_bits` blocks.
pub fn bitmap_len(num_bits: usize) -> usize {
    (num_bits + 7) / 8
}

impl Bitmap {
    /// Creates a bitmap for `num_bits` blocks, all free.
    pub fn new(num_bits: usize) -> Self {
        Self {
            entries: vec![0; bitmap_len(num_bits)],
            num_bits,
        }
    }

    /// Loads a bitmap from its on-disk bytes. Missing trailing bytes read as free.
    pub fn parse(buf: &[u8], num_bits: usize) -> Self {
        let mut entries = vec![0; bitmap_len(num_bits)];
        let len = entries.len().min(buf.len());
        entries[..len].copy_from_slice(&buf[..len]);
        Self { entries, num_bits }
    }

    pub fn serialize(&self) -> &[u8] {
        &self.entries
    }

    pub fn index_of(blocknr: usize) -> EntryKey {
        EntryKey {
            entry: blocknr / 8,
            bit: (blocknr % 8) as u8,
        }
    }

    pub fn block_of(key: EntryKey) -> usize {
        key.entry * 8 + (key.bit & 0x7) as usize
    }

    pub fn get(&self, blocknr: usize) -> State {
        assert!(blocknr < self.num_bits, "block {} outside bitmap", blocknr);
        let key = Self::index_of(blocknr);
        match (self.entries[key.entry] >> key.bit) & 0x1 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    /// Flips exactly the bit of `blocknr` to `state`.
    pub fn set(&mut self, blocknr: usize, state: State) -> Result<()> {
        if blocknr >= self.num_bits {
            return Err(FsError::OutOfRange(blocknr));
        }
        let key = Self::index_of(blocknr);
        self.entries[key.entry] &= !(1 << key.bit);
        self.entries[key.entry] |= state.bit() << key.bit;
        Ok(())
    }

    /// Scans forward from `start` for the first block in `state`.
    pub fn find(&self, start: usize, state: State) -> Option<usize> {
        (start..self.num_bits).find(|&i| self.get(i) == state)
    }

    pub fn count(&self, state: State) -> usize {
        (0..self.num_bits).filter(|&i| self.get(i) == state).count()
    }

    /// Marks every block free.
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|b| *b = 0);
    }
}
