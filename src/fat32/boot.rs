use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::{Block, Cluster, Error, BLOCK_SIZE};

/// The BIOS parameter block is the first part of the boot sector. This is the
/// FAT32 layout, including the extended fields after `total_sectors_large`.
///
/// See <https://wiki.osdev.org/FAT#BPB_(BIOS_Parameter_Block)>
#[repr(C)]
#[derive(Debug, Clone, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub(crate) struct BiosParameterBlock {
    pub(crate) jmp_boot: [u8; 3],
    pub(crate) oem_name: [u8; 8],
    pub(crate) bytes_per_sector: U16<LittleEndian>,
    pub(crate) sectors_per_cluster: u8,
    pub(crate) reserved_sectors: U16<LittleEndian>,
    pub(crate) fat_count: u8,
    pub(crate) root_dir_entries: U16<LittleEndian>,
    pub(crate) total_sectors: U16<LittleEndian>,
    pub(crate) media_descriptor: u8,
    pub(crate) sectors_per_fat: U16<LittleEndian>,
    pub(crate) sectors_per_track: U16<LittleEndian>,
    pub(crate) head_count: U16<LittleEndian>,
    pub(crate) hidden_sectors: U32<LittleEndian>,
    pub(crate) total_sectors_large: U32<LittleEndian>,

    // FAT32 extended boot record
    pub(crate) sectors_per_fat_large: U32<LittleEndian>,
    pub(crate) ext_flags: U16<LittleEndian>,
    pub(crate) fs_version: U16<LittleEndian>,
    pub(crate) root_cluster: U32<LittleEndian>,
    pub(crate) fs_info_sector: U16<LittleEndian>,
    pub(crate) backup_boot_sector: U16<LittleEndian>,
    pub(crate) reserved: [u8; 12],
    pub(crate) drive_number: u8,
    pub(crate) reserved1: u8,
    pub(crate) extended_signature: u8,
    pub(crate) volume_id: U32<LittleEndian>,
    pub(crate) volume_label: [u8; 11],
    pub(crate) fs_type: [u8; 8],
}

impl BiosParameterBlock {
    /// Same trailer as the MBR, at the end of the boot sector.
    pub(crate) const SIGNATURE: [u8; 2] = [0x55, 0xAA];

    pub(crate) fn parse(block: &[u8; BLOCK_SIZE]) -> Result<Self, Error> {
        if block[510..512] != Self::SIGNATURE {
            return Err(Error::BadBpbSignature);
        }
        Self::read_from_prefix(&block[..]).ok_or(Error::Failed)
    }

    fn total_sectors(&self) -> u32 {
        match self.total_sectors.get() {
            0 => self.total_sectors_large.get(),
            small => u32::from(small),
        }
    }
}

/// Layout of a mounted volume, computed once from the BPB.
///
/// Everything except `first_block` is relative to the start of the partition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// Absolute device block where the partition starts.
    pub first_block: Block,
    pub total_blocks: u32,
    pub blocks_per_cluster: u32,
    pub root_cluster: Cluster,
    pub fat_start: Block,
    /// Size of one FAT copy, in blocks.
    pub fat_size: u32,
    pub fat_count: u32,
    pub data_start: Block,
    /// Number of clusters in the data region. Valid clusters are
    /// `2..cluster_count + 2`.
    pub cluster_count: u32,
}

impl Geometry {
    /// Bytes per FAT entry.
    pub(crate) const FAT_ENTRY_SIZE: usize = 4;
    pub(crate) const FAT_ENTRIES_PER_BLOCK: u32 = (BLOCK_SIZE / Self::FAT_ENTRY_SIZE) as u32;

    pub(crate) fn from_bpb(bpb: &BiosParameterBlock, first_block: Block) -> Result<Self, Error> {
        if usize::from(bpb.bytes_per_sector.get()) != BLOCK_SIZE {
            return Err(Error::UnsupportedBlockSize);
        }
        if !(1..=2).contains(&bpb.fat_count) {
            return Err(Error::UnsupportedFatCount);
        }

        // FAT12/FAT16 have a fixed root directory and a 16-bit FAT size.
        let fat_size = bpb.sectors_per_fat_large.get();
        if bpb.sectors_per_fat.get() != 0 || bpb.root_dir_entries.get() != 0 || fat_size == 0 {
            return Err(Error::UnsupportedType);
        }

        let blocks_per_cluster = u32::from(bpb.sectors_per_cluster);
        if !blocks_per_cluster.is_power_of_two() {
            return Err(Error::UnsupportedType);
        }

        let total_blocks = bpb.total_sectors();
        let fat_count = u32::from(bpb.fat_count);
        let fat_start = Block::new(u32::from(bpb.reserved_sectors.get()));
        let data_start = fat_count
            .checked_mul(fat_size)
            .and_then(|fats| fat_start.get().checked_add(fats))
            .filter(|&start| start < total_blocks)
            .map(Block::new)
            .ok_or(Error::UnsupportedType)?;

        // The FAT may have room for more entries than there are clusters, and
        // (on a broken volume) the other way around.
        let data_clusters = (total_blocks - data_start.get()) / blocks_per_cluster;
        let fat_clusters = fat_size
            .checked_mul(Self::FAT_ENTRIES_PER_BLOCK)
            .ok_or(Error::UnsupportedType)?
            .saturating_sub(2);
        let cluster_count = data_clusters.min(fat_clusters);

        let geometry = Self {
            first_block,
            total_blocks,
            blocks_per_cluster,
            root_cluster: Cluster::new(bpb.root_cluster.get()),
            fat_start,
            fat_size,
            fat_count,
            data_start,
            cluster_count,
        };
        if !geometry.contains(geometry.root_cluster) {
            return Err(Error::UnsupportedType);
        }
        Ok(geometry)
    }

    /// First block of a data cluster. Clusters outside the data region are
    /// `InternalError`.
    pub fn cluster_to_block(&self, cluster: Cluster) -> Result<Block, Error> {
        if !self.contains(cluster) {
            log::warn!("{cluster} is outside the data region");
            return Err(Error::InternalError);
        }
        (cluster.get() - 2)
            .checked_mul(self.blocks_per_cluster)
            .and_then(|offset| self.data_start.get().checked_add(offset))
            .map(Block::new)
            .ok_or(Error::InternalError)
    }

    /// FAT block (in the first copy) holding the entry for `cluster`, and the
    /// byte offset of the entry inside that block.
    pub(crate) fn fat_location(&self, cluster: Cluster) -> (Block, usize) {
        let offset = cluster.get() as usize * Self::FAT_ENTRY_SIZE;
        let block = self.fat_start + (offset / BLOCK_SIZE) as u32;
        (block, offset % BLOCK_SIZE)
    }

    /// One past the last valid cluster.
    pub(crate) fn end_cluster(&self) -> Cluster {
        Cluster::new(self.cluster_count + 2)
    }

    pub(crate) fn contains(&self, cluster: Cluster) -> bool {
        cluster.is_data() && cluster < self.end_cluster()
    }
}
