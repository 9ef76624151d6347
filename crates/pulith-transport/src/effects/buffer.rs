//! Random-access byte containers with independent read and write cursors.
//!
//! Both variants keep `reader_index <= writer_index <= written_bytes`.
//! Writes land at the writer index, overwriting and then extending the
//! stored bytes. Reads never go past the writer index.
//!
//! The file variant swallows I/O failures: a failed write does not move the
//! writer index and a failed read reports "no data". Callers treat `None` as
//! the end of the buffer.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::BufferError;

fn check_reader(to: usize, writer: usize) -> Result<(), BufferError> {
    if to > writer {
        return Err(BufferError::ReaderPastWriter { to, writer });
    }
    Ok(())
}

fn check_writer(to: usize, reader: usize, written: usize) -> Result<(), BufferError> {
    if to < reader {
        return Err(BufferError::WriterBeforeReader { to, reader });
    }
    if to > written {
        return Err(BufferError::WriterPastEnd { to, written });
    }
    Ok(())
}

/// In-memory buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBuffer {
    data:   Vec<u8>,
    reader: usize,
    writer: usize,
}

impl MemoryBuffer {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Copies every written byte of `file` and its cursor positions.
    pub fn from_file(file: &FileBuffer) -> Self {
        let data = file
            .read_range(0, file.written, file.written)
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default();
        // A short read leaves the cursors clamped to what was recovered.
        let writer = file.writer_index().min(data.len());
        Self {
            reader: file.reader_index().min(writer),
            writer,
            data,
        }
    }

    pub fn reader_index(&self) -> usize { self.reader }

    pub fn writer_index(&self) -> usize { self.writer }

    pub fn written_bytes(&self) -> usize { self.data.len() }

    pub fn readable_bytes(&self) -> usize { self.writer - self.reader }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        let end = self.writer + bytes.len();
        let overlap = self.data.len().min(end) - self.writer;
        self.data[self.writer..self.writer + overlap].copy_from_slice(&bytes[..overlap]);
        self.data.extend_from_slice(&bytes[overlap..]);
        self.writer = end;
        self
    }

    /// Up to `length` bytes from the reader index, advancing it. `None` when
    /// nothing would be returned.
    pub fn read(&mut self, length: usize) -> Option<Bytes> {
        let bytes = self.get_bytes(self.reader, length)?;
        self.reader += bytes.len();
        Some(bytes)
    }

    /// Up to `length` bytes starting at `at`, bounded by the writer index.
    /// Cursors do not move.
    pub fn get_bytes(&self, at: usize, length: usize) -> Option<Bytes> {
        if at >= self.writer || length == 0 {
            return None;
        }
        let end = self.writer.min(at.saturating_add(length));
        Some(Bytes::copy_from_slice(&self.data[at..end]))
    }

    pub fn move_reader_index(&mut self, to: usize) -> Result<(), BufferError> {
        check_reader(to, self.writer)?;
        self.reader = to;
        Ok(())
    }

    pub fn move_writer_index(&mut self, to: usize) -> Result<(), BufferError> {
        check_writer(to, self.reader, self.data.len())?;
        self.writer = to;
        Ok(())
    }
}

impl From<Vec<u8>> for MemoryBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self {
            writer: data.len(),
            reader: 0,
            data,
        }
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
struct Handle {
    file:     File,
    writable: bool,
}

/// File-backed buffer.
///
/// The backing file is created on the first write, not on construction, and
/// is deleted on drop unless [`FileBuffer::retain`] was called or the buffer
/// was opened over an existing file.
#[derive(Debug)]
pub struct FileBuffer {
    path:    PathBuf,
    handle:  Mutex<Option<Handle>>,
    reader:  usize,
    writer:  usize,
    written: usize,
    retain:  bool,
    created: bool,
}

impl FileBuffer {
    /// Buffer backed by `path`, created lazily.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path:    path.into(),
            handle:  Mutex::new(None),
            reader:  0,
            writer:  0,
            written: 0,
            retain:  false,
            created: false,
        }
    }

    /// Buffer backed by a fresh file name in the system temporary directory.
    pub fn temporary() -> Self { Self::temporary_in(std::env::temp_dir()) }

    pub fn temporary_in(dir: impl AsRef<Path>) -> Self {
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(".pulith-buffer-{}-{seq}", std::process::id());
        Self::new(dir.as_ref().join(name))
    }

    /// Wraps an existing file as a fully written, retained buffer. Used to
    /// upload files from disk.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let len = fs::metadata(&path)?.len();
        let len = usize::try_from(len)
            .map_err(|_| std::io::Error::other("file too large to address"))?;
        Ok(Self {
            path,
            handle: Mutex::new(None),
            reader: 0,
            writer: len,
            written: len,
            retain: true,
            created: true,
        })
    }

    /// Copies every written byte of `memory` and its cursor positions into a
    /// file buffer at `path`.
    pub fn from_memory(memory: &MemoryBuffer, path: impl Into<PathBuf>) -> Self {
        let mut buffer = Self::new(path);
        buffer.write(&memory.data);
        // Cursors are only moved if every byte made it to disk.
        if buffer.written == memory.written_bytes() {
            buffer.writer = memory.writer_index();
            buffer.reader = memory.reader_index();
        } else {
            buffer.writer = buffer.written.min(memory.writer_index());
            buffer.reader = buffer.reader.min(buffer.writer);
        }
        buffer
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Keeps the backing file when the buffer is dropped.
    pub fn retain(&mut self) -> &mut Self {
        self.retain = true;
        self
    }

    pub fn is_retained(&self) -> bool { self.retain }

    /// Whether the backing file exists on disk.
    pub fn exists(&self) -> bool { self.path.exists() }

    pub fn reader_index(&self) -> usize { self.reader }

    pub fn writer_index(&self) -> usize { self.writer }

    pub fn written_bytes(&self) -> usize { self.written }

    pub fn readable_bytes(&self) -> usize { self.writer - self.reader }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        if bytes.is_empty() {
            return self;
        }

        let at = self.writer;
        let result = self.with_handle(true, |file| {
            file.seek(SeekFrom::Start(at as u64))?;
            file.write_all(bytes)
        });

        match result {
            Ok(()) => {
                self.created = true;
                self.writer += bytes.len();
                self.written = self.written.max(self.writer);
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "buffer write failed");
            }
        }
        self
    }

    /// Up to `length` bytes from the reader index, advancing it. `None` when
    /// nothing would be returned or the file could not be read.
    pub fn read(&mut self, length: usize) -> Option<Bytes> {
        let bytes = self.get_bytes(self.reader, length)?;
        self.reader += bytes.len();
        Some(bytes)
    }

    /// Up to `length` bytes starting at `at`, bounded by the writer index.
    /// Cursors do not move.
    pub fn get_bytes(&self, at: usize, length: usize) -> Option<Bytes> {
        self.read_range(at, length, self.writer)
    }

    fn read_range(&self, at: usize, length: usize, bound: usize) -> Option<Bytes> {
        if at >= bound || length == 0 {
            return None;
        }
        let len = (bound - at).min(length);

        let result = self.with_handle(false, |file| {
            file.seek(SeekFrom::Start(at as u64))?;
            let mut chunk = vec![0u8; len];
            let mut filled = 0;
            while filled < len {
                match file.read(&mut chunk[filled..])? {
                    0 => break,
                    n => filled += n,
                }
            }
            chunk.truncate(filled);
            Ok(chunk)
        });

        match result {
            Ok(chunk) if !chunk.is_empty() => Some(Bytes::from(chunk)),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "buffer read failed");
                None
            }
        }
    }

    pub fn move_reader_index(&mut self, to: usize) -> Result<(), BufferError> {
        check_reader(to, self.writer)?;
        self.reader = to;
        Ok(())
    }

    pub fn move_writer_index(&mut self, to: usize) -> Result<(), BufferError> {
        check_writer(to, self.reader, self.written)?;
        self.writer = to;
        Ok(())
    }

    fn with_handle<T>(
        &self,
        write: bool,
        op: impl FnOnce(&mut File) -> std::io::Result<T>,
    ) -> std::io::Result<T> {
        let mut slot = self.handle.lock();

        let reopen = match slot.as_ref() {
            None => true,
            Some(handle) => write && !handle.writable,
        };
        if reopen {
            let file = if write {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(!self.created)
                    .open(&self.path)?
            } else {
                File::open(&self.path)?
            };
            *slot = Some(Handle {
                file,
                writable: write,
            });
        }

        match slot.as_mut() {
            Some(handle) => op(&mut handle.file),
            None => Err(std::io::Error::other("buffer file handle unavailable")),
        }
    }
}

impl Drop for FileBuffer {
    fn drop(&mut self) {
        self.handle.get_mut().take();
        if self.created && !self.retain {
            if let Err(err) = fs::remove_file(&self.path) {
                tracing::debug!(path = %self.path.display(), %err, "failed to remove buffer file");
            }
        }
    }
}

/// A buffer over either storage medium.
///
/// # Examples
///
/// ```
/// use pulith_transport::Buffer;
///
/// let mut buffer = Buffer::memory();
/// buffer.write(b"hello ").write(b"world");
/// assert_eq!(buffer.read(5).unwrap(), "hello");
/// assert_eq!(buffer.readable_bytes(), 6);
/// ```
#[derive(Debug)]
pub enum Buffer {
    Memory(MemoryBuffer),
    File(FileBuffer),
}

impl Buffer {
    pub fn memory() -> Self { Buffer::Memory(MemoryBuffer::new()) }

    pub fn file(path: impl Into<PathBuf>) -> Self { Buffer::File(FileBuffer::new(path)) }

    pub fn is_file(&self) -> bool { matches!(self, Buffer::File(_)) }

    pub fn reader_index(&self) -> usize {
        match self {
            Buffer::Memory(b) => b.reader_index(),
            Buffer::File(b) => b.reader_index(),
        }
    }

    pub fn writer_index(&self) -> usize {
        match self {
            Buffer::Memory(b) => b.writer_index(),
            Buffer::File(b) => b.writer_index(),
        }
    }

    pub fn written_bytes(&self) -> usize {
        match self {
            Buffer::Memory(b) => b.written_bytes(),
            Buffer::File(b) => b.written_bytes(),
        }
    }

    pub fn readable_bytes(&self) -> usize {
        match self {
            Buffer::Memory(b) => b.readable_bytes(),
            Buffer::File(b) => b.readable_bytes(),
        }
    }

    pub fn is_empty(&self) -> bool { self.readable_bytes() == 0 }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        match self {
            Buffer::Memory(b) => {
                b.write(bytes);
            }
            Buffer::File(b) => {
                b.write(bytes);
            }
        }
        self
    }

    pub fn read(&mut self, length: usize) -> Option<Bytes> {
        match self {
            Buffer::Memory(b) => b.read(length),
            Buffer::File(b) => b.read(length),
        }
    }

    pub fn get_bytes(&self, at: usize, length: usize) -> Option<Bytes> {
        match self {
            Buffer::Memory(b) => b.get_bytes(at, length),
            Buffer::File(b) => b.get_bytes(at, length),
        }
    }

    pub fn move_reader_index(&mut self, to: usize) -> Result<(), BufferError> {
        match self {
            Buffer::Memory(b) => b.move_reader_index(to),
            Buffer::File(b) => b.move_reader_index(to),
        }
    }

    pub fn move_writer_index(&mut self, to: usize) -> Result<(), BufferError> {
        match self {
            Buffer::Memory(b) => b.move_writer_index(to),
            Buffer::File(b) => b.move_writer_index(to),
        }
    }

    /// Same bytes and cursors, backed by a file at `path`.
    pub fn into_file(self, path: impl Into<PathBuf>) -> Buffer {
        match self {
            Buffer::Memory(b) => Buffer::File(FileBuffer::from_memory(&b, path)),
            Buffer::File(b) => Buffer::File(b),
        }
    }

    /// Same bytes and cursors, held in memory.
    pub fn into_memory(self) -> Buffer {
        match self {
            Buffer::Memory(b) => Buffer::Memory(b),
            Buffer::File(b) => Buffer::Memory(MemoryBuffer::from_file(&b)),
        }
    }
}

impl From<MemoryBuffer> for Buffer {
    fn from(buffer: MemoryBuffer) -> Self { Buffer::Memory(buffer) }
}

impl From<FileBuffer> for Buffer {
    fn from(buffer: FileBuffer) -> Self { Buffer::File(buffer) }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self { Buffer::Memory(MemoryBuffer::from(data)) }
}

impl From<&[u8]> for Buffer {
    fn from(data: &[u8]) -> Self { Buffer::from(data.to_vec()) }
}

impl From<&str> for Buffer {
    fn from(data: &str) -> Self { Buffer::from(data.as_bytes()) }
}

impl From<Bytes> for Buffer {
    fn from(data: Bytes) -> Self { Buffer::from(Vec::from(data)) }
}
