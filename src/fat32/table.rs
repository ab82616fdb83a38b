//! The file allocation table and the device it lives on.
//!
//! Everything that touches the device goes through [`Disk`], which owns the
//! one-sector FAT cache. The engine keeps a `Disk` behind a lock, so every
//! read-modify-write of a FAT sector is atomic with respect to other
//! allocators.

use crate::{Block, Cluster, Error, RawIo, BLOCK_SIZE};

use super::boot::Geometry;

/// Meaning of one 32-bit FAT entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum FatEntry {
    Free,
    /// The chain continues at this cluster.
    Next(Cluster),
    /// Last cluster of its chain.
    End,
}

impl FatEntry {
    /// The top four bits of an entry are reserved and must be preserved.
    pub(crate) const MASK: u32 = 0x0FFF_FFFF;
    const END_MIN: u32 = 0x0FFF_FFF8;
    /// Written to terminate a chain.
    pub(crate) const END_MARKER: u32 = 0x0FFF_FFFF;

    pub(crate) fn from_raw(raw: u32) -> Self {
        match raw & Self::MASK {
            0 => Self::Free,
            value if value >= Self::END_MIN => Self::End,
            value => Self::Next(Cluster::new(value)),
        }
    }

    pub(crate) fn to_raw(self) -> u32 {
        match self {
            Self::Free => 0,
            Self::Next(cluster) => cluster.get() & Self::MASK,
            Self::End => Self::END_MARKER,
        }
    }
}

/// The FAT sector currently in memory.
#[derive(Debug)]
struct FatCache {
    buffer: [u8; BLOCK_SIZE],
    /// Partition relative block of the first FAT copy.
    block: Block,
    valid: bool,
    dirty: bool,
}

/// Block device plus the FAT cache in front of it.
#[derive(Debug)]
pub(crate) struct Disk<D> {
    device: D,
    geometry: Geometry,
    cache: FatCache,
}

impl<D: RawIo> Disk<D> {
    pub(crate) fn new(device: D, geometry: Geometry) -> Self {
        Self {
            device,
            geometry,
            cache: FatCache {
                buffer: [0; BLOCK_SIZE],
                block: Block::new(0),
                valid: false,
                dirty: false,
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Reads partition relative blocks.
    pub(crate) fn read(&mut self, buf: &mut [u8], block: Block, count: u32) -> Result<(), Error> {
        let absolute = self.geometry.first_block + block;
        self.device.read(buf, absolute, count).map_err(|err| {
            log::error!("reading {count} blocks at {absolute} failed: {err}");
            err
        })
    }

    /// Writes partition relative blocks.
    pub(crate) fn write(&mut self, buf: &[u8], block: Block, count: u32) -> Result<(), Error> {
        let absolute = self.geometry.first_block + block;
        self.device.write(buf, absolute, count).map_err(|err| {
            log::error!("writing {count} blocks at {absolute} failed: {err}");
            err
        })
    }

    /// Writes zeroes over every block of `cluster`.
    pub(crate) fn zero_cluster(&mut self, cluster: Cluster) -> Result<(), Error> {
        let zeroes = [0u8; BLOCK_SIZE];
        let first = self.geometry.cluster_to_block(cluster)?;
        for i in 0..self.geometry.blocks_per_cluster {
            self.write(&zeroes, first + i, 1)?;
        }
        Ok(())
    }

    /// Writes the cached FAT sector back to every FAT copy, if it was
    /// modified.
    pub(crate) fn flush(&mut self) -> Result<(), Error> {
        if !(self.cache.valid && self.cache.dirty) {
            return Ok(());
        }
        let buffer = self.cache.buffer;
        for copy in 0..self.geometry.fat_count {
            let block = self.cache.block + copy * self.geometry.fat_size;
            self.write(&buffer, block, 1)?;
        }
        self.cache.dirty = false;
        Ok(())
    }

    /// Makes `block` the resident FAT sector.
    fn load_fat_block(&mut self, block: Block) -> Result<(), Error> {
        if self.cache.valid && self.cache.block == block {
            return Ok(());
        }
        self.flush()?;

        let mut buffer = [0u8; BLOCK_SIZE];
        if let Err(err) = self.read(&mut buffer, block, 1) {
            self.cache.valid = false;
            return Err(err);
        }
        self.cache.buffer = buffer;
        self.cache.block = block;
        self.cache.valid = true;
        Ok(())
    }

    fn raw_entry(&mut self, cluster: Cluster) -> Result<u32, Error> {
        // Past the end, the entry would be read from the next FAT copy or
        // the data region.
        if !self.geometry.contains(cluster) {
            log::warn!("no FAT entry for {cluster}");
            return Err(Error::InternalError);
        }
        let (block, offset) = self.geometry.fat_location(cluster);
        self.load_fat_block(block)?;
        let bytes = &self.cache.buffer[offset..offset + Geometry::FAT_ENTRY_SIZE];
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Looks up the FAT entry of `cluster`.
    pub(crate) fn next_cluster(&mut self, cluster: Cluster) -> Result<FatEntry, Error> {
        self.raw_entry(cluster).map(FatEntry::from_raw)
    }

    /// Updates the FAT entry of `cluster` in the cache. The reserved top bits
    /// of the old value are kept.
    pub(crate) fn set_entry(&mut self, cluster: Cluster, entry: FatEntry) -> Result<(), Error> {
        let old = self.raw_entry(cluster)?;
        let raw = (old & !FatEntry::MASK) | entry.to_raw();
        let (_, offset) = self.geometry.fat_location(cluster);
        self.cache.buffer[offset..offset + Geometry::FAT_ENTRY_SIZE]
            .copy_from_slice(&raw.to_le_bytes());
        self.cache.dirty = true;
        Ok(())
    }

    /// Follows one link of a live chain. Reaching the end of the chain is
    /// `EndOfFile`; a free entry or a link outside the data region means the
    /// chain is corrupt.
    pub(crate) fn follow(&mut self, cluster: Cluster) -> Result<Cluster, Error> {
        match self.next_cluster(cluster)? {
            FatEntry::Next(next) if self.geometry.contains(next) => Ok(next),
            FatEntry::Next(next) => {
                log::warn!("{cluster} links to {next}, outside the data region");
                Err(Error::InternalError)
            }
            FatEntry::End => Err(Error::EndOfFile),
            FatEntry::Free => {
                log::warn!("{cluster} is free but part of a chain");
                Err(Error::InternalError)
            }
        }
    }

    /// Finds a free cluster, marks it as the end of a chain and, unless
    /// `prev` is `Cluster::NONE`, links `prev` to it.
    ///
    /// Returns `Ok(None)` when the volume is full.
    pub(crate) fn allocate_cluster(&mut self, prev: Cluster) -> Result<Option<Cluster>, Error> {
        let Some(cluster) = self.find_free_cluster()? else {
            log::error!("no free cluster left on the volume");
            return Ok(None);
        };

        self.set_entry(cluster, FatEntry::End)?;
        if prev != Cluster::NONE {
            self.set_entry(prev, FatEntry::Next(cluster))?;
        }
        Ok(Some(cluster))
    }

    /// Linear scan of the FAT, one sector at a time, starting at the first
    /// data cluster.
    fn find_free_cluster(&mut self) -> Result<Option<Cluster>, Error> {
        let end = self.geometry.end_cluster().get();
        let per_block = Geometry::FAT_ENTRIES_PER_BLOCK;

        let mut cluster = Cluster::FIRST_DATA.get();
        while cluster < end {
            let (block, _) = self.geometry.fat_location(Cluster::new(cluster));
            self.load_fat_block(block)?;

            let block_end = (cluster / per_block + 1) * per_block;
            for candidate in cluster..block_end.min(end) {
                let offset = (candidate % per_block) as usize * Geometry::FAT_ENTRY_SIZE;
                let bytes = &self.cache.buffer[offset..offset + Geometry::FAT_ENTRY_SIZE];
                let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if FatEntry::from_raw(raw) == FatEntry::Free {
                    return Ok(Some(Cluster::new(candidate)));
                }
            }
            cluster = block_end;
        }
        Ok(None)
    }

    /// Marks every cluster of the chain starting at `start` as free. Returns
    /// the number of clusters freed.
    ///
    /// Running into a free entry before the end of the chain (a corrupt or
    /// already freed chain) stops the walk with `InternalError`.
    pub(crate) fn free_clusters(&mut self, start: Cluster) -> Result<u32, Error> {
        if !self.geometry.contains(start) {
            log::warn!("refusing to free chain at {start}");
            return Err(Error::InternalError);
        }

        let mut cluster = start;
        let mut freed = 0;
        loop {
            let entry = self.next_cluster(cluster)?;
            match entry {
                FatEntry::Free => {
                    log::warn!("{cluster} already free while freeing chain at {start}");
                    return Err(Error::InternalError);
                }
                FatEntry::Next(next) if !self.geometry.contains(next) => {
                    log::warn!("{cluster} links to {next}, outside the data region");
                    return Err(Error::InternalError);
                }
                FatEntry::Next(_) | FatEntry::End => {}
            }

            self.set_entry(cluster, FatEntry::Free)?;
            freed += 1;
            match entry {
                FatEntry::Next(next) => cluster = next,
                _ => return Ok(freed),
            }
        }
    }

    pub(crate) fn into_device(self) -> D {
        self.device
    }
}
