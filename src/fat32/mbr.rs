use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::{Block, Error, BLOCK_SIZE};

/// Classic partition table in block 0 of the device.
///
/// See <https://en.wikipedia.org/wiki/Master_boot_record#Sector_layout>
#[repr(C)]
#[derive(Debug, Clone, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub(crate) struct MasterBootRecord {
    pub(crate) bootstrap: [u8; 446],
    pub(crate) partitions: [PartitionEntry; 4],
    pub(crate) signature: [u8; 2],
}

/// See <https://en.wikipedia.org/wiki/Master_boot_record#PTE>
#[repr(C)]
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub(crate) struct PartitionEntry {
    pub(crate) status: u8,
    pub(crate) chs_first: [u8; 3],
    pub(crate) partition_type: u8,
    pub(crate) chs_last: [u8; 3],
    pub(crate) lba_start: U32<LittleEndian>,
    pub(crate) sector_count: U32<LittleEndian>,
}

impl MasterBootRecord {
    pub(crate) const SIGNATURE: [u8; 2] = [0x55, 0xAA];

    /// Partition type of FAT32 addressed with CHS.
    pub(crate) const TYPE_FAT32_CHS: u8 = 0x0B;
    /// Partition type of FAT32 addressed with LBA, the only one we mount.
    pub(crate) const TYPE_FAT32_LBA: u8 = 0x0C;

    pub(crate) fn parse(block: &[u8; BLOCK_SIZE]) -> Result<Self, Error> {
        let mbr = Self::read_from(&block[..]).ok_or(Error::Failed)?;
        if mbr.signature != Self::SIGNATURE {
            return Err(Error::BadMbrSignature);
        }
        Ok(mbr)
    }

    /// First block of the FAT32 partition in slot `index`.
    pub(crate) fn fat32_partition_start(&self, index: usize) -> Result<Block, Error> {
        let entry = self.partitions.get(index).ok_or(Error::UnsupportedPartition)?;
        match entry.partition_type {
            Self::TYPE_FAT32_LBA => {}
            Self::TYPE_FAT32_CHS => return Err(Error::OnlyFat32LbaSupported),
            other => {
                log::debug!("partition {index} has type {other:#04x}");
                return Err(Error::UnsupportedPartition);
            }
        }

        let start = entry.lba_start.get();
        if start == 0 {
            return Err(Error::UnsupportedPartition);
        }
        Ok(Block::new(start))
    }
}
