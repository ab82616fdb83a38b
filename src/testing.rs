//! In-memory devices and images for tests.

use alloc::vec;
use alloc::vec::Vec;

use zerocopy::{AsBytes, FromZeroes};

use crate::fat32::boot::BiosParameterBlock;
use crate::fat32::dir_entry::DirEntry;
use crate::fat32::mbr::MasterBootRecord;
use crate::fat32::name::ShortName;
use crate::fat32::{Fat32, Geometry};
use crate::{Block, Cluster, Error, RawIo, BLOCK_SIZE};

/// Disk image held in memory, counting every request that reaches it.
#[derive(Debug, Clone)]
pub(crate) struct MemoryDisk {
    data: Vec<u8>,
    reads: usize,
    writes: usize,
    /// Requests touching this block or anything after it fail.
    fail_from: Option<u32>,
    /// Same, for writes only.
    fail_writes_from: Option<u32>,
    block_size: usize,
}

impl MemoryDisk {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            reads: 0,
            writes: 0,
            fail_from: None,
            fail_writes_from: None,
            block_size: BLOCK_SIZE,
        }
    }

    pub(crate) fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes
    }

    pub(crate) fn fail_from(&mut self, block: u32) {
        self.fail_from = Some(block);
    }

    pub(crate) fn fail_writes_from(&mut self, block: u32) {
        self.fail_writes_from = Some(block);
    }

    pub(crate) fn block(&self, block: Block) -> &[u8] {
        let start = block.get() as usize * BLOCK_SIZE;
        &self.data[start..start + BLOCK_SIZE]
    }

    /// Little endian u32 at `offset` inside an absolute block.
    pub(crate) fn u32_at(&self, block: Block, offset: usize) -> u32 {
        let bytes = &self.block(block)[offset..offset + 4];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn range(&self, len: usize, block: Block, count: u32) -> Result<core::ops::Range<usize>, Error> {
        let start = block.get() as usize * BLOCK_SIZE;
        let end = start + count as usize * BLOCK_SIZE;
        let failing = self
            .fail_from
            .is_some_and(|fail| block.get() + count > fail);
        if failing || len < end - start || end > self.data.len() {
            return Err(Error::Failed);
        }
        Ok(start..end)
    }
}

impl RawIo for MemoryDisk {
    fn read(&mut self, buf: &mut [u8], block: Block, count: u32) -> Result<(), Error> {
        self.reads += 1;
        let range = self.range(buf.len(), block, count)?;
        let len = range.len();
        buf[..len].copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, buf: &[u8], block: Block, count: u32) -> Result<(), Error> {
        self.writes += 1;
        if self
            .fail_writes_from
            .is_some_and(|fail| block.get() + count > fail)
        {
            return Err(Error::Failed);
        }
        let range = self.range(buf.len(), block, count)?;
        let len = range.len();
        self.data[range].copy_from_slice(&buf[..len]);
        Ok(())
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

/// Builds a small MBR partitioned FAT32 image.
///
/// The layout is fixed apart from the knobs below: 32 reserved blocks, a FAT
/// just big enough for the clusters, root directory in cluster 2.
#[derive(Debug, Clone)]
pub(crate) struct ImageBuilder {
    start: u32,
    blocks_per_cluster: u32,
    clusters: u32,
    fat_count: u8,
    partition_type: u8,
    fat: Vec<(u32, u32)>,
    entries: Vec<(u32, DirEntry)>,
    blocks: Vec<(u32, Vec<u8>)>,
}

impl ImageBuilder {
    const RESERVED_BLOCKS: u32 = 32;
    const ROOT_CLUSTER: u32 = 2;

    pub(crate) fn new() -> Self {
        Self {
            start: 63,
            blocks_per_cluster: 1,
            clusters: 200,
            fat_count: 2,
            partition_type: MasterBootRecord::TYPE_FAT32_LBA,
            fat: Vec::new(),
            entries: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub(crate) fn start(mut self, start: u32) -> Self {
        self.start = start;
        self
    }

    pub(crate) fn blocks_per_cluster(mut self, blocks_per_cluster: u32) -> Self {
        self.blocks_per_cluster = blocks_per_cluster;
        self
    }

    pub(crate) fn clusters(mut self, clusters: u32) -> Self {
        self.clusters = clusters;
        self
    }

    pub(crate) fn fat_count(mut self, fat_count: u8) -> Self {
        self.fat_count = fat_count;
        self
    }

    pub(crate) fn partition_type(mut self, partition_type: u8) -> Self {
        self.partition_type = partition_type;
        self
    }

    /// Overrides the raw FAT entry of `cluster`.
    pub(crate) fn fat_entry(&mut self, cluster: u32, raw: u32) -> &mut Self {
        self.fat.push((cluster, raw));
        self
    }

    /// Links `clusters` in order and terminates the chain.
    pub(crate) fn chain(&mut self, clusters: &[u32]) -> &mut Self {
        for pair in clusters.windows(2) {
            self.fat_entry(pair[0], pair[1]);
        }
        if let Some(&last) = clusters.last() {
            self.fat_entry(last, 0x0FFF_FFFF);
        }
        self
    }

    /// Appends a raw entry to the directory starting at `dir` (which must be
    /// a single cluster).
    pub(crate) fn entry(
        &mut self,
        dir: u32,
        name: &[u8; 11],
        attributes: u8,
        cluster: u32,
        size: u32,
    ) -> &mut Self {
        let mut entry = DirEntry::new_zeroed();
        entry.name = *name;
        entry.attributes = attributes;
        entry.set_cluster(Cluster::new(cluster));
        entry.size.set(size);
        self.entries.push((dir, entry));
        self
    }

    /// Adds a regular file to the root directory.
    pub(crate) fn file(&mut self, name: &str, cluster: u32, size: u32) -> &mut Self {
        let short = ShortName::encode(name).unwrap_or_else(|| panic!("bad name {name}"));
        self.entry(Self::ROOT_CLUSTER, &short.0, 0x20, cluster, size)
    }

    /// Fills a partition relative block.
    pub(crate) fn block_data(&mut self, block: Block, data: &[u8]) -> &mut Self {
        self.blocks.push((block.get(), data.to_vec()));
        self
    }

    /// Fills every block of `cluster` with the low byte of its own partition
    /// relative block number.
    pub(crate) fn stamp_cluster(&mut self, cluster: u32) -> &mut Self {
        let first = self.geometry().cluster_to_block(Cluster::new(cluster)).unwrap();
        for i in 0..self.blocks_per_cluster {
            let block = first + i;
            self.block_data(block, &[block.get() as u8; BLOCK_SIZE]);
        }
        self
    }

    fn fat_size(&self) -> u32 {
        ((self.clusters + 2) * Geometry::FAT_ENTRY_SIZE as u32).div_ceil(BLOCK_SIZE as u32)
    }

    fn total_blocks(&self) -> u32 {
        Self::RESERVED_BLOCKS
            + u32::from(self.fat_count) * self.fat_size()
            + self.clusters * self.blocks_per_cluster
    }

    /// What mounting the image should compute.
    pub(crate) fn geometry(&self) -> Geometry {
        let fat_start = Block::new(Self::RESERVED_BLOCKS);
        Geometry {
            first_block: Block::new(self.start),
            total_blocks: self.total_blocks(),
            blocks_per_cluster: self.blocks_per_cluster,
            root_cluster: Cluster::new(Self::ROOT_CLUSTER),
            fat_start,
            fat_size: self.fat_size(),
            fat_count: u32::from(self.fat_count),
            data_start: fat_start + u32::from(self.fat_count) * self.fat_size(),
            cluster_count: self.clusters,
        }
    }

    pub(crate) fn build(&self) -> MemoryDisk {
        let geometry = self.geometry();
        let mut data = vec![0u8; (self.start + geometry.total_blocks) as usize * BLOCK_SIZE];

        let mut mbr = MasterBootRecord::new_zeroed();
        mbr.partitions[0].partition_type = self.partition_type;
        mbr.partitions[0].lba_start.set(self.start);
        mbr.partitions[0].sector_count.set(geometry.total_blocks);
        mbr.signature = MasterBootRecord::SIGNATURE;
        data[..BLOCK_SIZE].copy_from_slice(mbr.as_bytes());

        let partition = self.start as usize * BLOCK_SIZE;
        let bpb = self.bpb(&geometry);
        data[partition..partition + bpb.as_bytes().len()].copy_from_slice(bpb.as_bytes());
        data[partition + 510..partition + 512].copy_from_slice(&BiosParameterBlock::SIGNATURE);

        let block_offset = |block: Block| partition + block.get() as usize * BLOCK_SIZE;

        let mut fat = vec![0u32; (geometry.fat_size * Geometry::FAT_ENTRIES_PER_BLOCK) as usize];
        fat[0] = 0x0FFF_FFF8;
        fat[1] = 0x0FFF_FFFF;
        fat[Self::ROOT_CLUSTER as usize] = 0x0FFF_FFFF;
        for &(cluster, raw) in &self.fat {
            fat[cluster as usize] = raw;
        }
        for copy in 0..geometry.fat_count {
            let start = block_offset(geometry.fat_start + copy * geometry.fat_size);
            for (i, raw) in fat.iter().enumerate() {
                let at = start + i * Geometry::FAT_ENTRY_SIZE;
                data[at..at + 4].copy_from_slice(&raw.to_le_bytes());
            }
        }

        let mut used: Vec<(u32, usize)> = Vec::new();
        for (dir, entry) in &self.entries {
            let slot = match used.iter_mut().find(|(d, _)| d == dir) {
                Some((_, count)) => {
                    *count += 1;
                    *count - 1
                }
                None => {
                    used.push((*dir, 1));
                    0
                }
            };
            let first = geometry.cluster_to_block(Cluster::new(*dir)).unwrap();
            let at = block_offset(first) + slot * DirEntry::SIZE;
            data[at..at + DirEntry::SIZE].copy_from_slice(entry.as_bytes());
        }

        for (block, bytes) in &self.blocks {
            let at = block_offset(Block::new(*block));
            data[at..at + bytes.len()].copy_from_slice(bytes);
        }

        MemoryDisk::new(data)
    }

    fn bpb(&self, geometry: &Geometry) -> BiosParameterBlock {
        let mut bpb = BiosParameterBlock::new_zeroed();
        bpb.jmp_boot = [0xEB, 0x58, 0x90];
        bpb.oem_name = *b"MSWIN4.1";
        bpb.bytes_per_sector.set(BLOCK_SIZE as u16);
        bpb.sectors_per_cluster = self.blocks_per_cluster as u8;
        bpb.reserved_sectors.set(Self::RESERVED_BLOCKS as u16);
        bpb.fat_count = self.fat_count;
        bpb.media_descriptor = 0xF8;
        bpb.hidden_sectors.set(self.start);
        bpb.total_sectors_large.set(geometry.total_blocks);
        bpb.sectors_per_fat_large.set(geometry.fat_size);
        bpb.root_cluster.set(Self::ROOT_CLUSTER);
        bpb.fs_info_sector.set(1);
        bpb.backup_boot_sector.set(6);
        bpb.drive_number = 0x80;
        bpb.extended_signature = 0x29;
        bpb.volume_label = *b"NO NAME    ";
        bpb.fs_type = *b"FAT32   ";
        bpb
    }

    pub(crate) fn mount(&self) -> Fat32<MemoryDisk> {
        let mut volume = Fat32::new(0);
        volume.mount(self.build()).unwrap();
        volume
    }
}
