use core::cmp::Ordering;

use crate::{Block, Cluster, Error, RawFile, RawIo, BLOCK_SIZE};

use super::boot::Geometry;
use super::name::ShortName;
use super::{EntryLocation, Fat32, FileInfo};

/// Position in the cluster chain reached by the last translation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Cursor {
    /// Index of the cluster within the file.
    logical: u32,
    physical: Cluster,
}

/// An open file, or the chain of a directory being iterated.
///
/// Translating a logical block walks the cluster chain from the cursor, so
/// sequential access costs at most one FAT lookup per cluster. Going backwards
/// restarts from the first cluster.
pub struct Fat32RawFile<'a, D: RawIo> {
    volume: &'a Fat32<D>,
    geometry: Geometry,
    base: Cluster,
    cursor: Cursor,
    /// Directory entry describing the file. Directories walked by an iterator
    /// have none.
    entry: Option<EntryLocation>,
    size: u32,
    result: Result<(), Error>,
    hops: u32,
}

impl<'a, D: RawIo> Fat32RawFile<'a, D> {
    pub(crate) fn open(volume: &'a Fat32<D>, geometry: Geometry, info: &FileInfo) -> Self {
        volume.register(info.location);
        Self::new(volume, geometry, info.cluster, Some(info.location), info.size)
    }

    pub(crate) fn directory(volume: &'a Fat32<D>, geometry: Geometry, cluster: Cluster) -> Self {
        Self::new(volume, geometry, cluster, None, 0)
    }

    fn new(
        volume: &'a Fat32<D>,
        geometry: Geometry,
        base: Cluster,
        entry: Option<EntryLocation>,
        size: u32,
    ) -> Self {
        Self {
            volume,
            geometry,
            base,
            cursor: Cursor {
                logical: 0,
                physical: base,
            },
            entry,
            size,
            result: Ok(()),
            hops: 0,
        }
    }

    pub(crate) fn volume(&self) -> &'a Fat32<D> {
        self.volume
    }

    /// First cluster of the chain, `Cluster::NONE` for an empty file.
    pub fn base_cluster(&self) -> Cluster {
        self.base
    }

    /// Number of FAT entries followed so far to move the cursor.
    pub fn hops(&self) -> u32 {
        self.hops
    }

    /// Partition relative block holding logical block `logical` of the file.
    pub(crate) fn logical_to_physical(&mut self, logical: Block) -> Result<Block, Error> {
        if !self.base.is_data() {
            return Err(Error::EndOfFile);
        }

        let blocks_per_cluster = self.geometry.blocks_per_cluster;
        let target = logical.get() / blocks_per_cluster;
        let offset = logical.get() % blocks_per_cluster;
        // No chain can be longer than the volume.
        if target >= self.geometry.cluster_count {
            return Err(Error::EndOfFile);
        }

        match target.cmp(&self.cursor.logical) {
            Ordering::Equal => {}
            Ordering::Greater => self.walk_to(target)?,
            Ordering::Less => {
                self.cursor = Cursor {
                    logical: 0,
                    physical: self.base,
                };
                self.walk_to(target)?;
            }
        }
        Ok(self.geometry.cluster_to_block(self.cursor.physical)? + offset)
    }

    /// Follows the chain from the cursor, one FAT lookup per cluster. The
    /// cursor only moves on success.
    fn walk_to(&mut self, target: u32) -> Result<(), Error> {
        let mut cursor = self.cursor;
        while cursor.logical < target {
            cursor.physical = self.volume.follow(cursor.physical)?;
            cursor.logical += 1;
            self.hops += 1;
        }
        self.cursor = cursor;
        Ok(())
    }

    /// Validates a transfer and translates its first block.
    fn start_block(&mut self, len: usize, block: Block, count: u32) -> Result<Block, Error> {
        if len < count as usize * BLOCK_SIZE {
            log::warn!("buffer of {len} bytes is too small for {count} blocks");
            return Err(Error::Failed);
        }
        let offset = block.get() % self.geometry.blocks_per_cluster;
        if count > self.geometry.blocks_per_cluster - offset {
            log::warn!("transfer of {count} blocks at logical {block} crosses a cluster boundary");
            return Err(Error::Failed);
        }
        self.logical_to_physical(block)
    }

    fn location(&self) -> Result<EntryLocation, Error> {
        self.entry.ok_or(Error::InternalError)
    }

    fn rename_entry(&mut self, to: &str) -> Result<(), Error> {
        let location = self.location()?;
        if to.contains('/') {
            return Err(Error::NotImplemented);
        }
        let short = ShortName::encode(to).ok_or(Error::CreationFailure)?;
        match self.volume.find_in_root(to) {
            Ok(_) => return Err(Error::FileExists),
            Err(Error::FileNotFound) => {}
            Err(err) => return Err(err),
        }
        self.volume
            .update_entry(location, |entry| entry.name = short.0)
    }

    /// Walks to the end of the chain and links a fresh cluster to it, all
    /// under one lock so no other allocation can interleave.
    fn append_cluster(&mut self) -> Result<Cluster, Error> {
        if !self.geometry.contains(self.cursor.physical) {
            log::warn!("cannot extend a chain at {}", self.cursor.physical);
            return Err(Error::InternalError);
        }

        let start = self.cursor;
        let limit = self.geometry.cluster_count;
        let (tail, cluster) = self.volume.with_disk(|disk| {
            let mut tail = start;
            loop {
                match disk.follow(tail.physical) {
                    Ok(next) => {
                        tail = Cursor {
                            logical: tail.logical + 1,
                            physical: next,
                        };
                    }
                    Err(Error::EndOfFile) => break,
                    Err(err) => return Err(err),
                }
                if tail.logical - start.logical > limit {
                    log::warn!("cluster chain starting at {} loops", start.physical);
                    return Err(Error::InternalError);
                }
            }
            let cluster = disk
                .allocate_cluster(tail.physical)?
                .ok_or(Error::CreationFailure)?;
            Ok((tail, cluster))
        })?;

        self.hops += tail.logical - start.logical;
        self.cursor = Cursor {
            logical: tail.logical + 1,
            physical: cluster,
        };
        Ok(cluster)
    }

    fn record<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        self.result = result.as_ref().map(|_| ()).map_err(|&err| err);
        result
    }
}

impl<D: RawIo> RawFile for Fat32RawFile<'_, D> {
    fn read(&mut self, buf: &mut [u8], block: Block, count: u32) -> Result<(), Error> {
        let result = self
            .start_block(buf.len(), block, count)
            .and_then(|physical| self.volume.raw_read(buf, physical, count));
        self.record(result)
    }

    fn write(&mut self, buf: &[u8], block: Block, count: u32) -> Result<(), Error> {
        let result = self
            .start_block(buf.len(), block, count)
            .and_then(|physical| self.volume.raw_write(buf, physical, count));
        self.record(result)
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn update_size(&mut self, size: u32) -> Result<(), Error> {
        let result = self
            .location()
            .and_then(|location| self.volume.update_entry(location, |entry| entry.size.set(size)));
        if result.is_ok() {
            self.size = size;
        }
        self.record(result)
    }

    fn rename(&mut self, to: &str) -> Result<(), Error> {
        let result = self.rename_entry(to);
        self.record(result)
    }

    fn insert_cluster(&mut self) -> Result<Cluster, Error> {
        let result = self.append_cluster();
        self.record(result)
    }

    fn blocks_per_cluster(&self) -> u32 {
        self.geometry.blocks_per_cluster
    }

    fn error(&self) -> Result<(), Error> {
        self.result
    }
}

impl<D: RawIo> Drop for Fat32RawFile<'_, D> {
    fn drop(&mut self) {
        if let Some(location) = self.entry {
            self.volume.unregister(location);
        }
    }
}
