use crate::error::{BgenError, Result};
use log::debug;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A trait that abstracts positioned reads over the bytes of a BGEN file,
/// regardless of where those bytes live.
///
/// Implementations must be safe to share between threads. A read that would run
/// past the end of the data fails with [`BgenError::UnexpectedEof`] and fills
/// nothing.
pub trait ByteRangeSource: Send + Sync {
    fn len(&self) -> u64;
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ByteRangeSource + ?Sized> ByteRangeSource for Arc<T> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, dst)
    }
}

/// How a local file should be accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Memory-map the whole file.
    #[default]
    Mmap,
    /// Seek and read through a shared file handle.
    Buffered,
}

/// Opens `path` as a shareable byte source.
pub fn open_byte_source(path: &Path, mode: SourceMode) -> Result<Arc<dyn ByteRangeSource>> {
    let file = File::open(path).map_err(|e| {
        BgenError::Io(io::Error::new(
            e.kind(),
            format!("Opening {}: {e}", path.display()),
        ))
    })?;
    let source: Arc<dyn ByteRangeSource> = match mode {
        SourceMode::Mmap => Arc::new(MmapByteRangeSource::new(&file)?),
        SourceMode::Buffered => Arc::new(LocalFileByteRangeSource::new(file)?),
    };
    debug!(
        "Opened {} ({} bytes, {:?})",
        path.display(),
        source.len(),
        mode
    );
    Ok(source)
}

#[inline]
fn check_range(offset: u64, requested: usize, len: u64) -> Result<()> {
    let requested = requested as u64;
    let end = offset.checked_add(requested);
    if end.is_none_or(|end| end > len) {
        return Err(BgenError::UnexpectedEof {
            offset,
            requested,
            available: len.saturating_sub(offset),
        });
    }
    Ok(())
}

pub struct MmapByteRangeSource {
    mmap: Mmap,
}

impl MmapByteRangeSource {
    pub fn new(file: &File) -> Result<Self> {
        let mmap = unsafe { Mmap::map(file)? };
        #[cfg(unix)]
        mmap.advise(memmap2::Advice::Sequential)?;
        Ok(Self { mmap })
    }
}

impl ByteRangeSource for MmapByteRangeSource {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        check_range(offset, dst.len(), self.len())?;
        let start = offset as usize;
        dst.copy_from_slice(&self.mmap[start..start + dst.len()]);
        Ok(())
    }
}

/// Reads through one file handle guarded by a mutex. Slower than a mapping but
/// usable where mapping the file is not an option.
pub struct LocalFileByteRangeSource {
    file: Mutex<File>,
    len: u64,
}

impl LocalFileByteRangeSource {
    pub fn new(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ByteRangeSource for LocalFileByteRangeSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        check_range(offset, dst.len(), self.len)?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("file handle lock poisoned"))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(dst)?;
        Ok(())
    }
}

/// Owned bytes held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    bytes: Arc<[u8]>,
}

impl InMemorySource {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl ByteRangeSource for InMemorySource {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        check_range(offset, dst.len(), self.len())?;
        let start = offset as usize;
        dst.copy_from_slice(&self.bytes[start..start + dst.len()]);
        Ok(())
    }
}

/// Reads a little-endian `u32` at `offset`.
pub fn read_le_u32(source: &dyn ByteRangeSource, offset: u64) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read_at(offset, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file_with(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(bytes).expect("failed to write temp file");
        file.flush().expect("failed to flush temp file");
        file
    }

    fn assert_reads_match(source: &dyn ByteRangeSource, bytes: &[u8]) -> Result<()> {
        assert_eq!(source.len(), bytes.len() as u64);
        let mut buf = [0u8; 3];
        source.read_at(2, &mut buf)?;
        assert_eq!(&buf, &bytes[2..5]);
        source.read_at(0, &mut [])?;
        assert_eq!(read_le_u32(source, 0)?, u32::from_le_bytes([1, 2, 3, 4]));
        Ok(())
    }

    #[test]
    fn every_source_reads_the_same_bytes() -> Result<()> {
        let bytes = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let file = temp_file_with(&bytes);

        assert_reads_match(&InMemorySource::new(bytes.to_vec()), &bytes)?;
        for mode in [SourceMode::Mmap, SourceMode::Buffered] {
            let source = open_byte_source(file.path(), mode)?;
            assert_reads_match(source.as_ref(), &bytes)?;
        }
        Ok(())
    }

    #[test]
    fn reads_past_the_end_report_what_was_available() -> Result<()> {
        let bytes = [0u8; 10];
        let file = temp_file_with(&bytes);
        for mode in [SourceMode::Mmap, SourceMode::Buffered] {
            let source = open_byte_source(file.path(), mode)?;
            let mut buf = [0u8; 4];
            match source.read_at(8, &mut buf) {
                Err(BgenError::UnexpectedEof {
                    offset,
                    requested,
                    available,
                }) => {
                    assert_eq!((offset, requested, available), (8, 4, 2));
                }
                other => panic!("expected UnexpectedEof, got {other:?}"),
            }
            assert!(source.read_at(u64::MAX, &mut buf).is_err());
            assert!(source.read_at(20, &mut buf).unwrap_err().is_unexpected_eof());
        }
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let result = open_byte_source(&dir.path().join("absent.bgen"), SourceMode::Mmap);
        assert!(matches!(result, Err(BgenError::Io(_))));
    }
}
