//! Byte oriented access on top of a block level [`RawFile`].

use crate::{Block, Error, RawFile, BLOCK_SIZE};

/// A byte position over a [`RawFile`].
///
/// Writes past the end of the cluster chain grow the file one cluster at a
/// time. The new size only reaches the directory entry on [`Self::flush`].
pub struct FileStream<F> {
    file: F,
    position: u32,
    size: u32,
    /// `size` is ahead of the directory entry.
    dirty: bool,
    block: [u8; BLOCK_SIZE],
}

impl<F: RawFile> FileStream<F> {
    pub fn new(file: F) -> Self {
        let size = file.size();
        Self {
            file,
            position: 0,
            size,
            dirty: false,
            block: [0; BLOCK_SIZE],
        }
    }

    pub fn len(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    /// Moves to an absolute byte offset. Seeking past the end is allowed; the
    /// gap reads as zeroes once something is written after it.
    pub fn seek(&mut self, position: u32) {
        self.position = position;
    }

    /// Reads up to `buf.len()` bytes, fewer at the end of the file. Returns 0
    /// once the end is reached.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let available = self.size.saturating_sub(self.position) as usize;
        let len = buf.len().min(available);

        let mut done = 0;
        while done < len {
            let (block, offset) = self.split_position();
            let chunk = (BLOCK_SIZE - offset).min(len - done);
            self.file.read(&mut self.block, block, 1)?;
            buf[done..done + chunk].copy_from_slice(&self.block[offset..offset + chunk]);

            done += chunk;
            self.position += chunk as u32;
        }
        Ok(done)
    }

    /// Writes all of `buf` at the current position.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        if self.position > self.size {
            self.fill_gap()?;
        }

        let mut done = 0;
        while done < buf.len() {
            let (block, offset) = self.split_position();
            let chunk = (BLOCK_SIZE - offset).min(buf.len() - done);
            if chunk < BLOCK_SIZE {
                // Keep the parts of the block that are not overwritten.
                if (block.get() * BLOCK_SIZE as u32) < self.size {
                    self.file.read(&mut self.block, block, 1)?;
                } else {
                    self.block.fill(0);
                }
            }
            self.block[offset..offset + chunk].copy_from_slice(&buf[done..done + chunk]);
            self.write_block(block)?;

            done += chunk;
            self.advance(chunk as u32);
        }
        Ok(done)
    }

    /// Persists the size of the file if writes grew it.
    pub fn flush(&mut self) -> Result<(), Error> {
        if self.dirty {
            self.file.update_size(self.size)?;
            self.dirty = false;
        }
        Ok(())
    }

    pub fn file(&self) -> &F {
        &self.file
    }

    /// Gives back the file. Call [`Self::flush`] first to keep the size.
    pub fn into_inner(self) -> F {
        self.file
    }

    fn split_position(&self) -> (Block, usize) {
        let block = Block::new(self.position / BLOCK_SIZE as u32);
        (block, self.position as usize % BLOCK_SIZE)
    }

    fn advance(&mut self, len: u32) {
        self.position += len;
        if self.position > self.size {
            self.size = self.position;
            self.dirty = true;
        }
    }

    fn write_block(&mut self, block: Block) -> Result<(), Error> {
        loop {
            match self.file.write(&self.block, block, 1) {
                Err(Error::EndOfFile) => {
                    self.file.insert_cluster()?;
                }
                result => return result,
            }
        }
    }

    /// Writes zeroes from the current end of file up to the position.
    fn fill_gap(&mut self) -> Result<(), Error> {
        let target = self.position;
        self.position = self.size;
        let zeroes = [0u8; BLOCK_SIZE];
        while self.position < target {
            let (_, offset) = self.split_position();
            let len = (target - self.position).min((BLOCK_SIZE - offset) as u32);
            self.write(&zeroes[..len as usize])?;
        }
        Ok(())
    }
}

impl<F: RawFile> genio::Read for FileStream<F> {
    type ReadError = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::ReadError> {
        Self::read(self, buf)
    }
}
