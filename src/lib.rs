//! A FAT32 filesystem engine that runs directly on a raw block device, e.g. an
//! SD card, with no operating system underneath.
//!
//! Only short (8.3) names are supported, and only files in the root directory
//! can be created, renamed or removed. Any directory can be listed.
//!
//! # Resources
//!
//! - <https://wiki.osdev.org/FAT>
//! - <https://en.wikipedia.org/wiki/Design_of_the_FAT_file_system>
//! - <https://academy.cba.mit.edu/classes/networking_communications/SD/FAT.pdf>

#![cfg_attr(not(test), no_std)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cargo_common_metadata,
    clippy::doc_markdown,
    clippy::implicit_hasher,
    clippy::implicit_return,
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::multiple_crate_versions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::redundant_pub_crate,
    clippy::suboptimal_flops,
    clippy::wildcard_imports
)]

extern crate alloc;

mod block;
mod error;
pub mod fat32;
mod stream;
mod volume;

#[cfg(test)]
mod testing;

pub use block::*;
pub use error::*;
pub use fat32::{
    Attributes, EntryLocation, Fat32, Fat32DirectoryIterator, Fat32RawFile, FileInfo, FileName,
    Geometry,
};
pub use stream::*;
pub use volume::*;
