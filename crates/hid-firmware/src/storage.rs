//! Non-volatile memory seam (EEPROM or flash emulation).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StorageError;

/// Byte-addressed non-volatile memory with EEPROM "update" semantics: writing a byte that
/// already holds the same value costs nothing.
pub trait NonVolatileStorage {
    fn read_block(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;
    fn update_block(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;
}

impl<T: NonVolatileStorage + ?Sized> NonVolatileStorage for Box<T> {
    fn read_block(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read_block(offset, buf)
    }

    fn update_block(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        (**self).update_block(offset, data)
    }
}

const ERASED: u8 = 0xFF;

fn check_bounds(offset: usize, len: usize, size: usize) -> Result<(), StorageError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(StorageError::OutOfBounds { offset, len, size }),
    }
}

/// Copies `data` over `image`, returning how many bytes actually changed.
fn apply_update(image: &mut [u8], offset: usize, data: &[u8]) -> usize {
    let mut changed = 0;
    for (dst, &src) in image[offset..offset + data.len()].iter_mut().zip(data) {
        if *dst != src {
            *dst = src;
            changed += 1;
        }
    }
    changed
}

#[derive(Debug)]
struct MemoryInner {
    bytes: Vec<u8>,
    bytes_written: usize,
}

/// RAM-backed storage. Clones share the same memory, so a test can keep a handle and
/// inspect what the firmware wrote.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    /// Erased memory of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                bytes: vec![ERASED; size],
                bytes_written: 0,
            })),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Io("poisoned lock".to_string()))
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().map(|inner| inner.bytes.clone()).unwrap_or_default()
    }

    /// Total bytes physically rewritten so far (wear indicator).
    pub fn bytes_written(&self) -> usize {
        self.lock().map(|inner| inner.bytes_written).unwrap_or(0)
    }

    /// Overwrites memory directly, bypassing write accounting.
    pub fn poke(&self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        check_bounds(offset, data.len(), inner.bytes.len())?;
        inner.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl NonVolatileStorage for MemoryStorage {
    fn read_block(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let inner = self.lock()?;
        check_bounds(offset, buf.len(), inner.bytes.len())?;
        buf.copy_from_slice(&inner.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn update_block(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        check_bounds(offset, data.len(), inner.bytes.len())?;
        let changed = apply_update(&mut inner.bytes, offset, data);
        inner.bytes_written += changed;
        Ok(())
    }
}

/// File-backed storage for native builds. A missing file reads as erased memory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    size: usize,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>, size: usize) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    fn load(&self) -> Result<Vec<u8>, StorageError> {
        let mut image = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };
        image.resize(self.size, ERASED);
        Ok(image)
    }
}

impl NonVolatileStorage for FileStorage {
    fn read_block(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len(), self.size)?;
        let image = self.load()?;
        buf.copy_from_slice(&image[offset..offset + buf.len()]);
        Ok(())
    }

    fn update_block(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len(), self.size)?;
        let mut image = self.load()?;
        if apply_update(&mut image, offset, data) == 0 {
            return Ok(());
        }
        let tmp = Self::tmp_path(&self.path);
        fs::write(&tmp, &image).map_err(|e| StorageError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Builds without persistent configuration: nothing can be read back, writes vanish.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStorage;

impl NonVolatileStorage for NullStorage {
    fn read_block(&self, _offset: usize, _buf: &mut [u8]) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn update_block(&mut self, _offset: usize, _data: &[u8]) -> Result<(), StorageError> {
        Ok(())
    }
}
