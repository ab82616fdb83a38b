use std::fs::File;
use std::io::Write;
use std::os::unix::prelude::FileExt;

use fat32::{Block, Error, Fat32, FileStream, RawIo, BLOCK_SIZE};

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let (disk_file, partition, path) = match &args[..] {
        [_, disk_file] => (disk_file, "0", "/"),
        [_, disk_file, partition] => (disk_file, partition.as_str(), "/"),
        [_, disk_file, partition, path] => (disk_file, partition.as_str(), path.as_str()),
        _ => {
            eprintln!("Usage: {} <disk_file> [partition] [path]", args[0]);
            std::process::exit(1);
        }
    };
    let partition: usize = partition.parse().unwrap_or_else(|_| {
        eprintln!("partition must be a number between 0 and 3, got {partition}");
        std::process::exit(1);
    });

    let file = File::open(disk_file).expect("failed to open disk file");
    let mut volume = Fat32::new(partition);
    if let Err(err) = volume.mount(DiskFile(file)) {
        eprintln!("failed to mount partition {partition} of {disk_file}: {err}");
        std::process::exit(1);
    }
    println!("{:#X?}", volume.geometry());

    // Anything that is not a directory is dumped as a file.
    match volume.directory(path) {
        Ok(files) => {
            for info in files {
                println!(
                    "{:<12} {:>10} bytes  {:>8}  {:?}",
                    info.name.as_str(),
                    info.size,
                    info.cluster.get(),
                    info.attributes
                );
            }
        }
        Err(Error::FileNotFound) => dump(&volume, path),
        Err(err) => {
            eprintln!("failed to read {path}: {err}");
            std::process::exit(1);
        }
    };
}

fn dump(volume: &Fat32<DiskFile>, name: &str) {
    let file = volume.open_file(name).unwrap_or_else(|err| {
        eprintln!("failed to open {name}: {err}");
        std::process::exit(1);
    });

    let mut stream = FileStream::new(file);
    let mut stdout = std::io::stdout().lock();
    let mut buf = [0; 4 * BLOCK_SIZE];
    loop {
        let len = stream.read(&mut buf).expect("failed to read file");
        if len == 0 {
            break;
        }
        stdout
            .write_all(&buf[..len])
            .expect("failed to write to stdout");
    }
}

/// A disk image on the host, read-only.
struct DiskFile(File);

impl DiskFile {
    fn offset(block: Block) -> u64 {
        u64::from(block.get()) * BLOCK_SIZE as u64
    }
}

impl RawIo for DiskFile {
    fn read(&mut self, buf: &mut [u8], block: Block, count: u32) -> Result<(), Error> {
        let buf = buf
            .get_mut(..count as usize * BLOCK_SIZE)
            .ok_or(Error::Failed)?;
        self.0.read_exact_at(buf, Self::offset(block)).map_err(|err| {
            log::error!("failed to read {count} blocks at {block}: {err}");
            Error::Failed
        })
    }

    fn write(&mut self, _buf: &[u8], block: Block, _count: u32) -> Result<(), Error> {
        log::error!("refusing to write {block}, the image is opened read-only");
        Err(Error::ReadOnly)
    }
}

/// Dummy type to help us implement a logger using the `log` crate.
struct Logger;

static LOGGER: Logger = Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging() {
    log::set_logger(&LOGGER).expect("failed to set logger");
    let level = if std::env::var_os("FAT32_DEBUG").is_some() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    log::set_max_level(level);
}
