use std::{
    cell::RefCell,
    collections::HashMap,
    fs::OpenOptions,
    io::{self, BufReader, BufWriter, Read as _, Write as _},
    path::{Path, PathBuf},
};

use log::trace;

/// Where the converter gets its input bytes and puts its output bytes.
pub trait Storage {
    fn read_all_bytes(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write_all_bytes(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}

/// The local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStorage;

impl Storage for FileStorage {
    fn read_all_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        let file = OpenOptions::new()
            .read(true)
            .write(false)
            .create(false)
            .open(path)?;
        let mut data = Vec::new();
        BufReader::new(file).read_to_end(&mut data)?;
        trace!("read {} bytes from {}", data.len(), path.display());
        Ok(data)
    }

    fn write_all_bytes(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let file = OpenOptions::new()
            .read(false)
            .write(true)
            .append(false)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(data)?;
        writer.flush()?;
        trace!("wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}

/// Files kept in a map, for tests and for callers that never touch disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RefCell<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.files.borrow_mut().insert(path.into(), data);
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.borrow().contains_key(path.as_ref())
    }
}

impl Storage for MemoryStorage {
    fn read_all_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not in memory storage", path.display()),
            )
        })
    }

    fn write_all_bytes(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.insert(path, data.to_vec());
        Ok(())
    }
}

impl<S: Storage + ?Sized> Storage for &S {
    fn read_all_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read_all_bytes(path)
    }

    fn write_all_bytes(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        (**self).write_all_bytes(path, data)
    }
}
