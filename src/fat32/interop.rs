//! Cross-checks against the `fatfs` crate: images written by one side must be
//! readable by the other.

use std::io::{Cursor, Read, Write};

use crate::testing::MemoryDisk;
use crate::{Fat32, FileStream, BLOCK_SIZE};

const PARTITION_START: usize = 2048;
/// FAT32 needs at least 65525 clusters. With 512 byte clusters that is just
/// under 34 MiB.
const PARTITION_SIZE: usize = 40 * 1024 * 1024;

/// A single partition disk formatted by `fatfs`.
fn make_image() -> Vec<u8> {
    let start = PARTITION_START * BLOCK_SIZE;
    let mut data = vec![0u8; start + PARTITION_SIZE];
    fatfs::format_volume(
        &mut Cursor::new(&mut data[start..]),
        fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat32),
    )
    .expect("format_volume failed");

    let entry = 446;
    data[entry + 4] = 0x0C;
    data[entry + 8..entry + 12].copy_from_slice(&(PARTITION_START as u32).to_le_bytes());
    let blocks = (PARTITION_SIZE / BLOCK_SIZE) as u32;
    data[entry + 12..entry + 16].copy_from_slice(&blocks.to_le_bytes());
    data[510] = 0x55;
    data[511] = 0xAA;
    data
}

fn partition(data: &mut [u8]) -> Cursor<&mut [u8]> {
    Cursor::new(&mut data[PARTITION_START * BLOCK_SIZE..])
}

fn write_via_fatfs(data: &mut [u8], path: &[&str], content: &[u8]) {
    let mut cursor = partition(data);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new())
        .expect("FileSystem::new failed");
    let mut dir = fs.root_dir();
    let (name, parents) = path.split_last().expect("empty path");
    for parent in parents {
        dir = dir.create_dir(parent).expect("create_dir failed");
    }
    let mut file = dir.create_file(name).expect("create_file failed");
    file.truncate().unwrap();
    file.write_all(content).unwrap();
}

fn read_via_fatfs(data: &mut [u8], name: &str) -> Vec<u8> {
    let mut cursor = partition(data);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let mut file = fs.root_dir().open_file(name).unwrap();
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).unwrap();
    buf
}

fn list_via_fatfs(data: &mut [u8]) -> Vec<String> {
    let mut cursor = partition(data);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let names = fs
        .root_dir()
        .iter()
        .map(|entry| entry.unwrap().file_name().to_ascii_uppercase())
        .collect();
    names
}

fn mount(data: Vec<u8>) -> Fat32<MemoryDisk> {
    let mut volume = Fat32::new(0);
    volume.mount(MemoryDisk::new(data)).unwrap();
    volume
}

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn reads_files_written_by_fatfs() {
    let mut data = make_image();
    let expected = content(3000);
    write_via_fatfs(&mut data, &["HELLO.TXT"], &expected);
    write_via_fatfs(&mut data, &["OTHER.BIN"], b"x");

    let volume = mount(data);
    let names: Vec<_> = volume
        .directory("/")
        .unwrap()
        .map(|info| String::from(info.name.as_str()))
        .collect();
    assert_eq!(names, ["HELLO.TXT", "OTHER.BIN"]);

    let mut stream = FileStream::new(volume.open_file("hello.txt").unwrap());
    assert_eq!(stream.len(), 3000);
    let mut buf = vec![0u8; 4000];
    assert_eq!(stream.read(&mut buf), Ok(3000));
    assert_eq!(&buf[..3000], &expected[..]);
}

#[test]
fn lists_subdirectories_written_by_fatfs() {
    let mut data = make_image();
    write_via_fatfs(&mut data, &["DOCS", "NOTE.TXT"], b"note");
    write_via_fatfs(&mut data, &["TOP.TXT"], b"top");

    let volume = mount(data);
    let docs: Vec<_> = volume.directory("/DOCS").unwrap().collect();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].name.as_str(), "NOTE.TXT");
    assert_eq!(docs[0].size, 4);

    let root: Vec<_> = volume.directory("/docs/..").unwrap().collect();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].name.as_str(), "TOP.TXT");
}

#[test]
fn fatfs_reads_files_written_by_engine() {
    let mut volume = mount(make_image());
    let expected = content(5000);

    volume.create("OUT.TXT").unwrap();
    let mut stream = FileStream::new(volume.open_file("OUT.TXT").unwrap());
    assert_eq!(stream.write(&expected), Ok(5000));
    stream.flush().unwrap();
    drop(stream);

    let mut data = volume.unmount().unwrap().into_inner();
    assert_eq!(read_via_fatfs(&mut data, "OUT.TXT"), expected);
}

#[test]
fn fatfs_sees_removed_and_renamed_files() {
    let mut data = make_image();
    write_via_fatfs(&mut data, &["GONE.TXT"], &content(2048));
    write_via_fatfs(&mut data, &["KEEP.TXT"], b"keep");

    let mut volume = mount(data);
    volume.remove("gone.txt").unwrap();
    {
        let mut file = volume.open_file("keep.txt").unwrap();
        crate::RawFile::rename(&mut file, "kept.txt").unwrap();
    }

    let mut data = volume.unmount().unwrap().into_inner();
    assert_eq!(list_via_fatfs(&mut data), ["KEPT.TXT"]);
    assert_eq!(read_via_fatfs(&mut data, "KEPT.TXT"), b"keep");
}

#[test]
fn engine_reuses_clusters_freed_for_fatfs() {
    let mut data = make_image();
    write_via_fatfs(&mut data, &["A.BIN"], &content(4096));

    let mut volume = mount(data);
    let first = volume.find("a.bin").unwrap().cluster;
    volume.remove("a.bin").unwrap();
    volume.create("b.bin").unwrap();
    assert_eq!(volume.find("b.bin").unwrap().cluster, first);

    let mut data = volume.unmount().unwrap().into_inner();
    assert_eq!(read_via_fatfs(&mut data, "B.BIN"), b"");
}
