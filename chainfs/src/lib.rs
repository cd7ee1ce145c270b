//! A single-volume file system kept in one backing file.
//!
//! The volume is an array of fixed size blocks tracked by a bitmap. Files and
//! directories are chains of those blocks linked through indices stored in
//! every block header; a file's first block carries its control block and the
//! first bytes of data, a directory's first block carries the start of its
//! entry list.
//!
//! ```no_run
//! use chainfs::{ChainFs, FileBlockEmulator};
//!
//! let mut fs: ChainFs<FileBlockEmulator> = ChainFs::open_or_create("disk.img", 1024)?;
//! let mut cwd = fs.init()?;
//! fs.create_file(&mut cwd, "hello.txt")?;
//! let mut fh = fs.open_file(&cwd, "hello.txt")?;
//! fs.write(&mut fh, b"hello")?;
//! fs.close_file(fh);
//! fs.flush()?;
//! # Ok::<(), chainfs::FsError>(())
//! ```
mod alloc;
mod dir;
mod disk;
mod error;
mod file;
mod fs;
pub mod io;
pub mod layout;
mod sb;

pub use crate::alloc::{Bitmap, EntryKey, State};
pub use crate::dir::{DirEntry, DirectoryHandle};
pub use crate::disk::Disk;
pub use crate::error::{FsError, Result};
pub use crate::file::FileHandle;
pub use crate::fs::ChainFs;
pub use crate::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder};
pub use crate::sb::DiskHeader;
