use crate::{Block, Cluster, DirectoryIterator, Error, RawFile, RawIo, BLOCK_SIZE};

use super::dir_entry::{DirEntry, EntryKind};
use super::name::{names_match, ShortName};
use super::{EntryLocation, Fat32RawFile, FileInfo};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    /// Not positioned on an entry yet.
    Scanning,
    /// `current` is the entry last returned.
    Valid,
    End,
}

/// Walks the 32 byte entries of a directory, one block at a time.
///
/// Only regular files are yielded. Deleted slots, subdirectories, volume
/// labels and long name fragments are stepped over.
pub struct Fat32DirectoryIterator<'a, D: RawIo> {
    file: Fat32RawFile<'a, D>,
    /// Index of the next entry to read, counted from the start of the
    /// directory.
    position: u32,
    buffer: [u8; BLOCK_SIZE],
    /// Logical and physical block held in `buffer`.
    loaded: Option<(u32, Block)>,
    state: State,
    current: Option<FileInfo>,
    result: Result<(), Error>,
}

impl<'a, D: RawIo> Fat32DirectoryIterator<'a, D> {
    const ENTRIES_PER_BLOCK: u32 = DirEntry::PER_BLOCK as u32;

    pub(crate) fn new(file: Fat32RawFile<'a, D>) -> Self {
        Self {
            file,
            position: 0,
            buffer: [0; BLOCK_SIZE],
            loaded: None,
            state: State::Scanning,
            current: None,
            result: Ok(()),
        }
    }

    /// Reads the next raw entry. When the chain runs out and `extend` is set,
    /// the directory grows by one zeroed cluster.
    fn raw_next(&mut self, extend: bool) -> Result<(DirEntry, EntryLocation), Error> {
        let block = self.position / Self::ENTRIES_PER_BLOCK;
        let index = (self.position % Self::ENTRIES_PER_BLOCK) as usize;
        let physical = self.load(block, extend)?;
        self.position += 1;

        let entry = DirEntry::read(&self.buffer, index);
        Ok((
            entry,
            EntryLocation {
                block: physical,
                index,
            },
        ))
    }

    fn load(&mut self, block: u32, extend: bool) -> Result<Block, Error> {
        if let Some((logical, physical)) = self.loaded {
            if logical == block {
                return Ok(physical);
            }
        }

        self.loaded = None;
        let physical = match self.file.logical_to_physical(Block::new(block)) {
            Err(Error::EndOfFile) if extend => return self.grow(block),
            result => result?,
        };
        self.file
            .volume()
            .raw_read(&mut self.buffer, physical, 1)?;
        self.loaded = Some((block, physical));
        Ok(physical)
    }

    fn grow(&mut self, block: u32) -> Result<Block, Error> {
        let cluster = self.file.insert_cluster()?;
        self.file.volume().zero_cluster(cluster)?;
        log::debug!("directory at {} grew by {cluster}", self.file.base_cluster());

        let physical = self.file.logical_to_physical(Block::new(block))?;
        self.buffer = [0; BLOCK_SIZE];
        self.loaded = Some((block, physical));
        Ok(physical)
    }

    /// Steps to the next entry of kind `wanted`. `Ok(None)` at the end of the
    /// directory.
    fn advance(&mut self, wanted: EntryKind) -> Result<Option<FileInfo>, Error> {
        if self.state == State::End {
            return Ok(None);
        }

        loop {
            let (entry, location) = match self.raw_next(false) {
                Ok(next) => next,
                // A full directory has no end marker, the chain just stops.
                Err(Error::EndOfFile) => {
                    self.finish();
                    return Ok(None);
                }
                Err(err) => {
                    self.finish();
                    return Err(err);
                }
            };

            match entry.kind() {
                EntryKind::End => {
                    self.finish();
                    return Ok(None);
                }
                kind if kind == wanted => {
                    let info = FileInfo::decode(&entry, location);
                    self.current = Some(info.clone());
                    self.state = State::Valid;
                    return Ok(Some(info));
                }
                _ => {}
            }
        }
    }

    fn finish(&mut self) {
        self.state = State::End;
        self.current = None;
    }

    fn find_named(&mut self, wanted: EntryKind, name: &str) -> Result<FileInfo, Error> {
        while let Some(info) = self.advance(wanted)? {
            if names_match(&info.name, name) {
                return Ok(info);
            }
        }
        Err(Error::FileNotFound)
    }

    /// Positions the iterator on the regular file called `name`.
    pub(crate) fn find_file(&mut self, name: &str) -> Result<FileInfo, Error> {
        self.find_named(EntryKind::File, name)
    }

    pub(crate) fn find_subdir(&mut self, name: &str) -> Result<FileInfo, Error> {
        self.find_named(EntryKind::SubDir, name)
    }

    /// Writes a new file entry into the first free slot after the current
    /// position, growing the directory when there is none.
    pub(crate) fn create_entry(
        &mut self,
        name: ShortName,
        cluster: Cluster,
    ) -> Result<FileInfo, Error> {
        loop {
            let (entry, location) = self.raw_next(true)?;
            if !matches!(entry.kind(), EntryKind::Deleted | EntryKind::End) {
                continue;
            }

            let new = DirEntry::new_file(name, cluster);
            new.write(&mut self.buffer, location.index);
            self.file
                .volume()
                .raw_write(&self.buffer, location.block, 1)?;

            let info = FileInfo::decode(&new, location);
            self.current = Some(info.clone());
            self.state = State::Valid;
            return Ok(info);
        }
    }

    /// Marks the current entry deleted.
    pub(crate) fn delete_entry(&mut self) -> Result<(), Error> {
        let location = self
            .current
            .as_ref()
            .map(|info| info.location)
            .ok_or(Error::InternalError)?;
        if self.loaded.map(|(_, physical)| physical) != Some(location.block) {
            return Err(Error::InternalError);
        }

        let mut entry = DirEntry::read(&self.buffer, location.index);
        entry.mark_deleted();
        entry.write(&mut self.buffer, location.index);
        self.file
            .volume()
            .raw_write(&self.buffer, location.block, 1)?;

        self.current = None;
        self.state = State::Scanning;
        Ok(())
    }
}

impl<D: RawIo> Iterator for Fat32DirectoryIterator<'_, D> {
    type Item = FileInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.advance(EntryKind::File);
        self.result = result.as_ref().map(|_| ()).map_err(|&err| err);
        result.ok().flatten()
    }
}

impl<D: RawIo> DirectoryIterator for Fat32DirectoryIterator<'_, D> {
    fn is_valid(&self) -> bool {
        self.state != State::End
    }

    fn file_info(&self) -> Option<&FileInfo> {
        self.current.as_ref()
    }

    fn error(&self) -> Result<(), Error> {
        self.result
    }
}
