//! Random-access byte storage for one open document.
//!
//! A document's bytes live in a [`BackingStore`]. Two strategies exist:
//! [`MemoryStore`] buffers everything in memory and [`ScratchFileStore`]
//! spools into an anonymous temporary file so memory stays bounded for large
//! inputs. Callers pick one through [`StorageStrategy`] at open time and never
//! see the difference beyond performance.
//!
//! Every store is released exactly once. `release()` is idempotent and also
//! runs on drop, so a store handed to a failing open is still cleaned up.

use crate::error::{Error, Result};
use crate::parser_config::StorageStrategy;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Random-access byte storage.
///
/// All implementations must satisfy these invariants:
/// - `read_at` never returns bytes past `len()`; short reads only happen at the end.
/// - `write_at` past the current end extends the store (append).
/// - After `release()`, reads and writes fail with an I/O error.
pub trait BackingStore: Send + std::fmt::Debug {
    /// Read up to `buf.len()` bytes starting at `offset`. Returns the byte count.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Write `data` at `offset`, overwriting or appending.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Current length in bytes.
    fn len(&self) -> u64;

    /// Release the underlying resources. Calling it again is a no-op.
    fn release(&mut self) -> Result<()>;

    /// Whether `release()` has run.
    fn is_released(&self) -> bool;

    /// True when the store holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the whole content when it is resident in memory.
    fn as_slice(&self) -> Option<&[u8]> {
        None
    }

    /// Append `data` at the end and return the offset it was written at.
    fn append(&mut self, data: &[u8]) -> Result<u64> {
        let offset = self.len();
        self.write_at(offset, data)?;
        Ok(offset)
    }

    /// Read `len` bytes at `offset`, clamped to the end of the store.
    fn read_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if self.is_released() {
            return Err(released());
        }
        let available = self.len().saturating_sub(offset);
        let mut buf = vec![0u8; len.min(available as usize)];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Read the entire content.
    fn read_all(&mut self) -> Result<Vec<u8>> {
        let len = self.len() as usize;
        self.read_range(0, len)
    }
}

fn released() -> Error {
    Error::Io(io::Error::other("backing store already released"))
}

/// Open an empty store for the given strategy.
///
/// `capacity_hint` pre-sizes in-memory buffers; file-backed stores ignore it.
pub fn open_store(
    strategy: &StorageStrategy,
    capacity_hint: usize,
) -> Result<Box<dyn BackingStore>> {
    match strategy {
        StorageStrategy::Memory => Ok(Box::new(MemoryStore::with_capacity(capacity_hint))),
        StorageStrategy::ScratchFile { dir } => {
            let store = match dir {
                Some(dir) => ScratchFileStore::new_in(dir)?,
                None => ScratchFileStore::new()?,
            };
            Ok(Box::new(store))
        },
    }
}

/// Open a store for `strategy` and fill it from `reader`.
pub fn store_from_reader<R: Read>(
    strategy: &StorageStrategy,
    reader: &mut R,
    capacity_hint: usize,
) -> Result<Box<dyn BackingStore>> {
    let mut store = open_store(strategy, capacity_hint)?;
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                store.release()?;
                return Err(e.into());
            },
        };
        store.append(&chunk[..n])?;
    }
    Ok(store)
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Vec<u8>,
    released: bool,
}

impl MemoryStore {
    /// Create an empty store with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            released: false,
        }
    }

    /// Wrap existing bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            released: false,
        }
    }
}

impl BackingStore for MemoryStore {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if self.released {
            return Err(released());
        }
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if self.released {
            return Err(released());
        }
        let start = offset as usize;
        let end = start + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            self.data = Vec::new();
        }
        Ok(())
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn as_slice(&self) -> Option<&[u8]> {
        if self.released {
            None
        } else {
            Some(&self.data)
        }
    }
}

/// Store backed by an anonymous temporary file.
///
/// The file is unlinked by the OS as soon as it is closed, so releasing the
/// store (or dropping it) leaves nothing behind on disk.
#[derive(Debug)]
pub struct ScratchFileStore {
    file: Option<File>,
    len: u64,
}

impl ScratchFileStore {
    /// Create a scratch file in the system temporary directory.
    pub fn new() -> Result<Self> {
        Ok(Self {
            file: Some(tempfile::tempfile()?),
            len: 0,
        })
    }

    /// Create a scratch file in `dir`.
    pub fn new_in<P: AsRef<std::path::Path>>(dir: P) -> Result<Self> {
        Ok(Self {
            file: Some(tempfile::tempfile_in(dir)?),
            len: 0,
        })
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(released)
    }
}

impl BackingStore for ScratchFileStore {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = self.len;
        let file = self.file()?;
        if offset >= len {
            return Ok(0);
        }
        let want = buf.len().min((len - offset) as usize);
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < want {
            match file.read(&mut buf[filled..want]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.len = self.len.max(offset + data.len() as u64);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn release(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            log::debug!("Releasing scratch file store ({} bytes)", self.len);
            file.sync_all().ok();
            drop(file);
        }
        Ok(())
    }

    fn is_released(&self) -> bool {
        self.file.is_none()
    }
}

impl Drop for ScratchFileStore {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to release scratch file store: {}", e);
        }
    }
}

/// `Read + Write + Seek` view over a store.
///
/// Cross-reference parsing and the writer work against std I/O traits; this
/// adapter gives them a cursor without copying the store.
pub struct StoreCursor<'a> {
    store: &'a mut dyn BackingStore,
    pos: u64,
}

impl<'a> StoreCursor<'a> {
    /// Cursor positioned at the start of `store`.
    pub fn new(store: &'a mut dyn BackingStore) -> Self {
        Self { store, pos: 0 }
    }

    /// Current position.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

fn to_io(err: Error) -> io::Error {
    match err {
        Error::Io(e) => e,
        other => io::Error::other(other.to_string()),
    }
}

impl Read for StoreCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.store.read_at(self.pos, buf).map_err(to_io)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for StoreCursor<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.store.write_at(self.pos, buf).map_err(to_io)?;
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for StoreCursor<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.store.len() as i128;
        let target = match pos {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::End(delta) => len + delta as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of store",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &mut dyn BackingStore) {
        assert!(store.is_empty());
        store.append(b"hello").unwrap();
        store.append(b" world").unwrap();
        assert_eq!(store.len(), 11);
        assert_eq!(store.read_range(6, 5).unwrap(), b"world");

        store.write_at(0, b"J").unwrap();
        assert_eq!(store.read_all().unwrap(), b"Jello world");

        // Clamped at the end
        assert_eq!(store.read_range(9, 100).unwrap(), b"ld");
        assert!(store.read_range(50, 4).unwrap().is_empty());

        store.release().unwrap();
        assert!(store.is_released());
        store.release().unwrap();
        assert!(store.read_range(0, 1).is_err());
        assert!(store.read_range(0, 0).is_err());
        assert!(store.read_all().is_err());
        assert!(store.append(b"x").is_err());
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::with_capacity(16);
        exercise(&mut store);
    }

    #[test]
    fn test_scratch_file_store() {
        let mut store = ScratchFileStore::new().unwrap();
        exercise(&mut store);
    }

    #[test]
    fn test_write_past_end_extends() {
        let mut store = MemoryStore::default();
        store.write_at(4, b"ab").unwrap();
        assert_eq!(store.read_all().unwrap(), b"\0\0\0\0ab");
    }

    #[test]
    fn test_cursor_seek_and_read() {
        let mut store = MemoryStore::from_bytes(b"0123456789".to_vec());
        let mut cursor = StoreCursor::new(&mut store);
        cursor.seek(SeekFrom::End(-3)).unwrap();
        let mut buf = String::new();
        cursor.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "789");
        assert!(cursor.seek(SeekFrom::Current(-20)).is_err());
    }

    #[test]
    fn test_store_from_reader_scratch() {
        let data = vec![7u8; 200_000];
        let strategy = StorageStrategy::ScratchFile { dir: None };
        let mut store = store_from_reader(&strategy, &mut &data[..], 0).unwrap();
        assert_eq!(store.len(), 200_000);
        assert!(store.as_slice().is_none());
        assert_eq!(store.read_range(199_998, 10).unwrap(), vec![7, 7]);
    }
}
