use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("block {0} is outside the volume")]
    OutOfRange(usize),
    #[error("block {0} is not allocated")]
    Unallocated(usize),
    #[error("block {index} claims to be block {found}")]
    BadBlock { index: usize, found: i32 },
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("no free blocks left on disk")]
    NoSpace,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("disk i/o failed")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
