//! FAT32 volumes on MBR partitioned block devices.
//!
//! # Resources
//!
//! - <https://wiki.osdev.org/FAT>
//! - <https://en.wikipedia.org/wiki/Design_of_the_FAT_file_system>
//! - <https://academy.cba.mit.edu/classes/networking_communications/SD/FAT.pdf>

pub(crate) mod boot;
mod dir;
pub(crate) mod dir_entry;
mod file;
pub(crate) mod mbr;
pub(crate) mod name;
mod table;

#[cfg(test)]
mod interop;

pub use boot::Geometry;
pub use dir::Fat32DirectoryIterator;
pub use dir_entry::{Attributes, EntryLocation, FileInfo};
pub use file::Fat32RawFile;
pub use name::FileName;

use alloc::boxed::Box;
use alloc::vec::Vec;
use spin::Mutex;

use crate::{Block, Cluster, DirectoryIterator, Error, RawFile, RawIo, Volume, BLOCK_SIZE};

use boot::BiosParameterBlock;
use dir_entry::DirEntry;
use mbr::MasterBootRecord;
use name::ShortName;
use table::Disk;

/// A FAT32 filesystem engine for one partition of a block device.
///
/// File handles and directory iterators borrow the volume, so any number of
/// them can be alive at once. The device and the FAT cache sit behind a lock
/// that is only held for the duration of a single block or FAT operation.
pub struct Fat32<D: RawIo> {
    /// MBR slot to mount.
    partition: usize,
    mounted: Option<Mounted<D>>,
    last_result: Mutex<Result<(), Error>>,
    /// Directory entries of files with a live handle. A file opened twice is
    /// listed twice.
    open_entries: Mutex<Vec<EntryLocation>>,
}

struct Mounted<D> {
    geometry: Geometry,
    disk: Mutex<Disk<D>>,
}

impl<D: RawIo> Fat32<D> {
    pub const fn new(partition: usize) -> Self {
        Self {
            partition,
            mounted: None,
            last_result: Mutex::new(Err(Error::NotMounted)),
            open_entries: Mutex::new(Vec::new()),
        }
    }

    /// Reads the partition table and the boot sector of the configured
    /// partition. A volume that was already mounted is flushed and replaced,
    /// but only once the new device has been validated.
    pub fn mount(&mut self, device: D) -> Result<(), Error> {
        let result = self.mount_device(device);
        self.record(result)
    }

    fn mount_device(&mut self, mut device: D) -> Result<(), Error> {
        if device.block_size() != BLOCK_SIZE {
            log::error!(
                "device has {} byte blocks, only {BLOCK_SIZE} are supported",
                device.block_size()
            );
            return Err(Error::UnsupportedDevice);
        }

        let mut block = [0u8; BLOCK_SIZE];
        device.read(&mut block, Block::new(0), 1)?;
        let mbr = MasterBootRecord::parse(&block)?;
        let first_block = mbr.fat32_partition_start(self.partition)?;

        device.read(&mut block, first_block, 1)?;
        let bpb = BiosParameterBlock::parse(&block)?;
        let geometry = Geometry::from_bpb(&bpb, first_block)?;
        log::debug!("mounted partition {}: {geometry:?}", self.partition);

        self.release();
        self.mounted = Some(Mounted {
            geometry,
            disk: Mutex::new(Disk::new(device, geometry)),
        });
        Ok(())
    }

    /// Flushes and gives back the device. Handles borrow the volume, so none
    /// can be open here.
    pub fn unmount(&mut self) -> Option<D> {
        let device = self.release();
        *self.last_result.get_mut() = Err(Error::NotMounted);
        device
    }

    fn release(&mut self) -> Option<D> {
        let mounted = self.mounted.take()?;
        let mut disk = mounted.disk.into_inner();
        if let Err(err) = disk.flush() {
            log::error!("failed to flush FAT while releasing the device: {err}");
        }
        Some(disk.into_device())
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.mounted.as_ref().map(|mounted| &mounted.geometry)
    }

    /// Writes the cached FAT sector back to every FAT copy.
    pub fn flush(&self) -> Result<(), Error> {
        let result = self.with_disk(Disk::flush);
        self.record(result)
    }

    /// Looks `name` up in the root directory.
    pub fn find(&self, name: &str) -> Result<FileInfo, Error> {
        let result = self.find_in_root(name);
        self.record(result)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.find(name).is_ok()
    }

    pub fn open_file(&self, name: &str) -> Result<Fat32RawFile<'_, D>, Error> {
        let result = self.open_in_root(name);
        self.record(result)
    }

    /// Iterates over the regular files of the directory at `path`. Both `/`
    /// and the empty path are the root directory.
    pub fn directory(&self, path: &str) -> Result<Fat32DirectoryIterator<'_, D>, Error> {
        let result = self.resolve_directory(path);
        self.record(result)
    }

    /// Creates an empty file in the root directory. The file gets its first
    /// cluster right away.
    pub fn create(&self, name: &str) -> Result<(), Error> {
        let result = self.create_in_root(name);
        self.record(result)
    }

    /// Frees the file's clusters and marks its directory entry deleted.
    pub fn remove(&self, name: &str) -> Result<(), Error> {
        let result = self.remove_from_root(name);
        self.record(result)
    }

    /// `NotMounted` until a mount succeeds, then the result of the last
    /// volume level operation.
    pub fn error(&self) -> Result<(), Error> {
        *self.last_result.lock()
    }

    fn record<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        *self.last_result.lock() = result.as_ref().map(|_| ()).map_err(|&err| err);
        result
    }

    fn mounted(&self) -> Result<&Mounted<D>, Error> {
        self.mounted.as_ref().ok_or(Error::NotMounted)
    }

    /// Runs `f` with the device locked. `f` must not call back into anything
    /// that locks the device again.
    pub(crate) fn with_disk<T>(
        &self,
        f: impl FnOnce(&mut Disk<D>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mounted = self.mounted()?;
        let mut disk = mounted.disk.lock();
        f(&mut disk)
    }

    pub(crate) fn raw_read(&self, buf: &mut [u8], block: Block, count: u32) -> Result<(), Error> {
        self.with_disk(|disk| disk.read(buf, block, count))
    }

    pub(crate) fn raw_write(&self, buf: &[u8], block: Block, count: u32) -> Result<(), Error> {
        self.with_disk(|disk| disk.write(buf, block, count))
    }

    pub(crate) fn follow(&self, cluster: Cluster) -> Result<Cluster, Error> {
        self.with_disk(|disk| disk.follow(cluster))
    }

    pub(crate) fn allocate_cluster(&self, prev: Cluster) -> Result<Option<Cluster>, Error> {
        self.with_disk(|disk| disk.allocate_cluster(prev))
    }

    pub(crate) fn free_clusters(&self, start: Cluster) -> Result<u32, Error> {
        self.with_disk(|disk| disk.free_clusters(start))
    }

    pub(crate) fn zero_cluster(&self, cluster: Cluster) -> Result<(), Error> {
        self.with_disk(|disk| disk.zero_cluster(cluster))
    }

    /// Read-modify-write of a single directory entry.
    pub(crate) fn update_entry(
        &self,
        location: EntryLocation,
        f: impl FnOnce(&mut DirEntry),
    ) -> Result<(), Error> {
        self.with_disk(|disk| {
            let mut block = [0u8; BLOCK_SIZE];
            disk.read(&mut block, location.block, 1)?;
            let mut entry = DirEntry::read(&block, location.index);
            f(&mut entry);
            entry.write(&mut block, location.index);
            disk.write(&block, location.block, 1)
        })
    }

    pub(crate) fn register(&self, location: EntryLocation) {
        self.open_entries.lock().push(location);
    }

    pub(crate) fn unregister(&self, location: EntryLocation) {
        let mut open = self.open_entries.lock();
        if let Some(i) = open.iter().position(|&l| l == location) {
            open.swap_remove(i);
        }
    }

    fn is_open(&self, location: EntryLocation) -> bool {
        self.open_entries.lock().contains(&location)
    }

    fn iterate(&self, cluster: Cluster) -> Result<Fat32DirectoryIterator<'_, D>, Error> {
        let geometry = self.mounted()?.geometry;
        if !geometry.contains(cluster) {
            log::warn!("directory at {cluster} is outside the data region");
            return Err(Error::InternalError);
        }
        Ok(Fat32DirectoryIterator::new(Fat32RawFile::directory(
            self, geometry, cluster,
        )))
    }

    fn root(&self) -> Result<Fat32DirectoryIterator<'_, D>, Error> {
        self.iterate(self.mounted()?.geometry.root_cluster)
    }

    pub(crate) fn find_in_root(&self, name: &str) -> Result<FileInfo, Error> {
        check_root_name(name)?;
        self.root()?.find_file(name)
    }

    fn open_in_root(&self, name: &str) -> Result<Fat32RawFile<'_, D>, Error> {
        let geometry = self.mounted()?.geometry;
        let info = self.find_in_root(name)?;
        check_first_cluster(&geometry, &info)?;
        Ok(Fat32RawFile::open(self, geometry, &info))
    }

    fn resolve_directory(&self, path: &str) -> Result<Fat32DirectoryIterator<'_, D>, Error> {
        let root = self.mounted()?.geometry.root_cluster;
        let mut cluster = root;
        for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            let info = self.iterate(cluster)?.find_subdir(component)?;
            // `..` entries of first level directories point at cluster 0.
            cluster = if info.cluster.is_data() {
                info.cluster
            } else {
                root
            };
        }
        self.iterate(cluster)
    }

    fn create_in_root(&self, name: &str) -> Result<(), Error> {
        check_root_name(name)?;
        let short = ShortName::encode(name).ok_or(Error::CreationFailure)?;
        match self.find_in_root(name) {
            Ok(_) => return Err(Error::FileExists),
            Err(Error::FileNotFound) => {}
            Err(err) => return Err(err),
        }

        let cluster = self
            .allocate_cluster(Cluster::NONE)?
            .ok_or(Error::CreationFailure)?;
        if let Err(err) = self.root()?.create_entry(short, cluster) {
            if let Err(free_err) = self.free_clusters(cluster) {
                log::warn!("leaked {cluster} after failed create: {free_err}");
            }
            return Err(err);
        }
        self.with_disk(Disk::flush)
    }

    fn remove_from_root(&self, name: &str) -> Result<(), Error> {
        check_root_name(name)?;
        let geometry = self.mounted()?.geometry;
        let mut root = self.root()?;
        let info = root.find_file(name)?;
        if self.is_open(info.location) {
            return Err(Error::FileInUse);
        }
        check_first_cluster(&geometry, &info)?;

        // Entry first: a failure after this leaks the chain but never leaves
        // a live entry pointing at free clusters.
        root.delete_entry()?;
        if info.cluster != Cluster::NONE {
            self.free_clusters(info.cluster)?;
        }
        self.with_disk(Disk::flush)
    }
}

/// The first cluster of an entry is either none (empty file) or a cluster of
/// this volume.
fn check_first_cluster(geometry: &Geometry, info: &FileInfo) -> Result<(), Error> {
    if info.cluster == Cluster::NONE || geometry.contains(info.cluster) {
        return Ok(());
    }
    log::warn!("{} starts at {}, outside the data region", info.name, info.cluster);
    Err(Error::InternalError)
}

/// Only the root directory can be modified.
fn check_root_name(name: &str) -> Result<(), Error> {
    if name.contains('/') {
        return Err(Error::NotImplemented);
    }
    Ok(())
}

impl<D: RawIo> Drop for Fat32<D> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<D: RawIo> Volume for Fat32<D> {
    type Device = D;

    fn mount(&mut self, device: D) -> Result<(), Error> {
        Self::mount(self, device)
    }

    fn open(&self, name: &str) -> Option<Box<dyn RawFile + '_>> {
        let file = self.open_file(name).ok()?;
        Some(Box::new(file))
    }

    fn create(&self, name: &str) -> Result<(), Error> {
        Self::create(self, name)
    }

    fn remove(&self, name: &str) -> Result<(), Error> {
        Self::remove(self, name)
    }

    fn exists(&self, name: &str) -> bool {
        Self::exists(self, name)
    }

    fn directory_iterator(&self, path: &str) -> Option<Box<dyn DirectoryIterator + '_>> {
        let iterator = self.directory(path).ok()?;
        Some(Box::new(iterator))
    }

    fn error(&self) -> Result<(), Error> {
        Self::error(self)
    }
}
