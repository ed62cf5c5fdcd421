//! Trait abstraction for filesystem operations to enable testing

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Byte-oriented storage used by the recorder and exporter
pub trait Filesystem: Send + Sync {
    /// Whether a file or directory exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Create a directory and any missing parents
    fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Remove a file
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Length of a file in bytes
    fn size(&self, path: &Path) -> io::Result<u64>;

    /// Read a whole file
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace a file's contents
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Append to a file, creating it if missing. Returns bytes written.
    fn append(&self, path: &Path, data: &[u8]) -> io::Result<usize>;

    /// Open a file for sequential reading
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Create or truncate a file for writing
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;
}

/// `Filesystem` backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }

    fn append(&self, path: &Path, data: &[u8]) -> io::Result<usize> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(data)?;
        // Records must survive a power cut once the flush reports success
        file.sync_data()?;
        Ok(data.len())
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}
