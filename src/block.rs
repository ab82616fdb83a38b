use core::fmt;
use core::ops::Add;

use crate::Error;

/// Every transfer between the engine and a device is made of blocks of this
/// many bytes.
pub const BLOCK_SIZE: usize = 512;

/// A block device the filesystem sits on, e.g. an SD card or a disk image.
///
/// Block addresses are absolute to the device, not relative to a partition.
/// `buf` must hold at least `count * BLOCK_SIZE` bytes; partial blocks are not
/// supported.
pub trait RawIo {
    fn read(&mut self, buf: &mut [u8], block: Block, count: u32) -> Result<(), Error>;

    fn write(&mut self, buf: &[u8], block: Block, count: u32) -> Result<(), Error>;

    /// Native block size of the device. Mounting fails for anything but
    /// [`BLOCK_SIZE`].
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }
}

impl<T: RawIo + ?Sized> RawIo for &mut T {
    fn read(&mut self, buf: &mut [u8], block: Block, count: u32) -> Result<(), Error> {
        (**self).read(buf, block, count)
    }

    fn write(&mut self, buf: &[u8], block: Block, count: u32) -> Result<(), Error> {
        (**self).write(buf, block, count)
    }

    fn block_size(&self) -> usize {
        (**self).block_size()
    }
}

/// Address of a 512 byte block. Depending on context this is absolute on the
/// device, relative to the start of the partition, or relative to the start
/// of a file.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(u32);

impl Block {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for Block {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Block> for u32 {
    fn from(value: Block) -> Self {
        value.0
    }
}

impl Add<u32> for Block {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Add for Block {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}", self.0)
    }
}

/// Index of a cluster, the allocation unit chained together by the FAT.
/// Clusters 0 and 1 are reserved; data clusters start at 2.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cluster(u32);

impl Cluster {
    /// Stored in directory entries of empty files, and used as "no previous
    /// cluster" when starting a new chain.
    pub const NONE: Self = Self(0);

    /// First cluster of the data region.
    pub const FIRST_DATA: Self = Self(2);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_data(self) -> bool {
        self.0 >= Self::FIRST_DATA.0
    }
}

impl From<u32> for Cluster {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Cluster> for u32 {
    fn from(value: Cluster) -> Self {
        value.0
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster {}", self.0)
    }
}
