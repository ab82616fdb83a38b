use bitflags::bitflags;
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::{Block, Cluster, BLOCK_SIZE};

use super::name::{FileName, ShortName};

/// Short name directory entry.
///
/// See <https://wiki.osdev.org/FAT#Standard_8.3_format>
#[repr(C)]
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub(crate) struct DirEntry {
    pub(crate) name: [u8; 11],
    pub(crate) attributes: u8,
    pub(crate) nt_reserved: u8,
    pub(crate) creation_tenths: u8,
    pub(crate) creation_time: U16<LittleEndian>,
    pub(crate) creation_date: U16<LittleEndian>,
    pub(crate) access_date: U16<LittleEndian>,
    pub(crate) cluster_high: U16<LittleEndian>,
    pub(crate) write_time: U16<LittleEndian>,
    pub(crate) write_date: U16<LittleEndian>,
    pub(crate) cluster_low: U16<LittleEndian>,
    pub(crate) size: U32<LittleEndian>,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// How the iterator treats an entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum EntryKind {
    /// A regular file.
    File,
    SubDir,
    /// Free slot left behind by a removed file.
    Deleted,
    /// Volume label, system, hidden or long name fragment.
    Skip,
    /// End of directory marker. Nothing after it is in use.
    End,
}

impl DirEntry {
    pub(crate) const SIZE: usize = core::mem::size_of::<Self>();
    pub(crate) const PER_BLOCK: usize = BLOCK_SIZE / Self::SIZE;

    const END_MARKER: u8 = 0x00;
    const DELETED_MARKER: u8 = 0xE5;
    /// Some writers store an initial 0xE5 as 0x05. We treat it as deleted too.
    const DELETED_MARKER_ALT: u8 = 0x05;

    /// Any of these in the low nibble means the entry is not a plain file or
    /// directory. All four together mark a long file name fragment.
    const SPECIAL_ATTRIBUTES: u8 = 0x0F;

    pub(crate) fn new_file(name: ShortName, cluster: Cluster) -> Self {
        let mut entry = Self::new_zeroed();
        entry.name = name.0;
        entry.attributes = Attributes::ARCHIVE.bits();
        entry.set_cluster(cluster);
        entry
    }

    pub(crate) fn kind(&self) -> EntryKind {
        match self.name[0] {
            Self::END_MARKER => EntryKind::End,
            Self::DELETED_MARKER | Self::DELETED_MARKER_ALT => EntryKind::Deleted,
            _ if self.attributes & Self::SPECIAL_ATTRIBUTES != 0 => EntryKind::Skip,
            _ if self.attributes().contains(Attributes::DIRECTORY) => EntryKind::SubDir,
            _ => EntryKind::File,
        }
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.name[0] = Self::DELETED_MARKER;
    }

    pub(crate) fn attributes(&self) -> Attributes {
        Attributes::from_bits_retain(self.attributes)
    }

    pub(crate) fn short_name(&self) -> ShortName {
        ShortName(self.name)
    }

    pub(crate) fn cluster(&self) -> Cluster {
        let high = u32::from(self.cluster_high.get());
        let low = u32::from(self.cluster_low.get());
        Cluster::new((high << 16) | low)
    }

    pub(crate) fn set_cluster(&mut self, cluster: Cluster) {
        self.cluster_high.set((cluster.get() >> 16) as u16);
        self.cluster_low.set(cluster.get() as u16);
    }

    /// Entry number `index` of a directory block.
    pub(crate) fn read(block: &[u8; BLOCK_SIZE], index: usize) -> Self {
        let offset = index * Self::SIZE;
        let mut entry = Self::new_zeroed();
        entry
            .as_bytes_mut()
            .copy_from_slice(&block[offset..offset + Self::SIZE]);
        entry
    }

    pub(crate) fn write(&self, block: &mut [u8; BLOCK_SIZE], index: usize) {
        let offset = index * Self::SIZE;
        block[offset..offset + Self::SIZE].copy_from_slice(self.as_bytes());
    }
}

/// Where a directory entry lives on disk: a partition relative block and the
/// entry's index inside it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntryLocation {
    pub block: Block,
    pub index: usize,
}

/// Decoded directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: FileName,
    pub size: u32,
    pub cluster: Cluster,
    pub attributes: Attributes,
    /// Location of the entry this was decoded from, needed to update it later.
    pub location: EntryLocation,
}

impl FileInfo {
    pub(crate) fn decode(entry: &DirEntry, location: EntryLocation) -> Self {
        Self {
            name: entry.short_name().decode(),
            size: entry.size.get(),
            cluster: entry.cluster(),
            attributes: entry.attributes(),
            location,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }
}
