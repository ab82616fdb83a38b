use core::fmt;

/// Error vocabulary shared by volumes, files and directory iterators.
///
/// Success is `Ok(())`; there is no "OK" variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Error {
    /// No successful `mount` yet.
    NotMounted,
    /// The block device reported a failure, or a request was malformed.
    Failed,
    FileExists,
    FileNotFound,
    CreationFailure,
    /// Reserved for access mode enforcement.
    ReadOnly,
    /// Reserved for access mode enforcement.
    WriteOnly,
    /// The cluster chain ended before the requested block.
    EndOfFile,
    /// The on-disk structures are inconsistent, e.g. a chain runs into a free
    /// cluster. The volume should be considered suspect.
    InternalError,
    NotImplemented,
    UnsupportedDevice,
    /// The file still has an open handle.
    FileInUse,

    // Mount-time errors
    BadMbrSignature,
    BadBpbSignature,
    UnsupportedType,
    UnsupportedPartition,
    UnsupportedBlockSize,
    UnsupportedFatCount,
    OnlyFat32LbaSupported,
}

impl Error {
    /// Human readable description, meant for diagnostics only.
    pub const fn detail(self) -> &'static str {
        match self {
            Self::NotMounted => "volume is not mounted",
            Self::Failed => "operation failed",
            Self::FileExists => "file already exists",
            Self::FileNotFound => "file not found",
            Self::CreationFailure => "file could not be created",
            Self::ReadOnly => "file is read only",
            Self::WriteOnly => "file is write only",
            Self::EndOfFile => "end of file",
            Self::InternalError => "inconsistent filesystem structure",
            Self::NotImplemented => "not implemented",
            Self::UnsupportedDevice => "unsupported device",
            Self::FileInUse => "file is open",
            Self::BadMbrSignature => "bad MBR signature",
            Self::BadBpbSignature => "bad BPB signature",
            Self::UnsupportedType => "partition is not formatted as FAT32",
            Self::UnsupportedPartition => "unsupported partition",
            Self::UnsupportedBlockSize => "unsupported block size",
            Self::UnsupportedFatCount => "unsupported number of FATs",
            Self::OnlyFat32LbaSupported => "only FAT32 LBA partitions are supported",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.detail())
    }
}
