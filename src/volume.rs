//! Capabilities a mounted filesystem offers to its callers, independent of the
//! on-disk format behind them.

use alloc::boxed::Box;

use crate::{Block, Cluster, Error, FileInfo, RawIo};

pub trait Volume {
    type Device: RawIo;

    /// Takes ownership of the device and validates the filesystem on it.
    fn mount(&mut self, device: Self::Device) -> Result<(), Error>;

    /// Opens a file by name. `None` if it cannot be opened; `error()` says why.
    fn open(&self, name: &str) -> Option<Box<dyn RawFile + '_>>;

    fn create(&self, name: &str) -> Result<(), Error>;

    fn remove(&self, name: &str) -> Result<(), Error>;

    fn exists(&self, name: &str) -> bool;

    /// Lists the regular files of the directory at `path`. `None` if the
    /// directory cannot be found; `error()` says why.
    fn directory_iterator(&self, path: &str) -> Option<Box<dyn DirectoryIterator + '_>>;

    /// `NotMounted` until a mount succeeds, then the result of the last
    /// operation.
    fn error(&self) -> Result<(), Error>;

    fn error_detail(&self, error: Error) -> &'static str {
        error.detail()
    }
}

/// Block level access to a single file.
///
/// Block numbers are logical, i.e. relative to the start of the file. A single
/// transfer must stay inside one cluster; spans crossing a cluster boundary
/// are rejected rather than split.
pub trait RawFile {
    fn read(&mut self, buf: &mut [u8], block: Block, count: u32) -> Result<(), Error>;

    fn write(&mut self, buf: &[u8], block: Block, count: u32) -> Result<(), Error>;

    /// Size in bytes as recorded in the directory entry.
    fn size(&self) -> u32;

    /// Writes a new size into the directory entry.
    fn update_size(&mut self, size: u32) -> Result<(), Error>;

    fn rename(&mut self, to: &str) -> Result<(), Error>;

    /// Appends one cluster to the end of the file's cluster chain.
    fn insert_cluster(&mut self) -> Result<Cluster, Error>;

    /// Number of blocks in one cluster of the underlying volume.
    fn blocks_per_cluster(&self) -> u32;

    /// Result of the last operation on this file.
    fn error(&self) -> Result<(), Error>;
}

/// Forward-only walk over the regular files of a directory.
pub trait DirectoryIterator: Iterator<Item = FileInfo> {
    /// `false` once the end of the directory (or an error) was reached.
    fn is_valid(&self) -> bool;

    /// Entry the iterator currently sits on.
    fn file_info(&self) -> Option<&FileInfo>;

    /// Result of the last step.
    fn error(&self) -> Result<(), Error>;
}
