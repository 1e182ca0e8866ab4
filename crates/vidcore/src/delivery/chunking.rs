//! Byte-range splitting of oversized artifacts
//!
//! Parts are plain byte ranges of the original file: every part but the last
//! is exactly `max_chunk` bytes, and concatenating them in order gives the
//! file back.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

/// Half-open byte range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One part of a split artifact, staged as its own file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position
    pub index: usize,
    pub total: usize,
    pub range: ByteRange,
    pub path: PathBuf,
}

impl Chunk {
    /// Deletes the staged part file
    pub async fn remove(&self) {
        remove_quietly(&self.path).await;
    }
}

/// Number of parts needed for `total_size` bytes with parts of at most `max_chunk`
pub fn part_count(total_size: u64, max_chunk: u64) -> usize {
    let max_chunk = max_chunk.max(1);
    usize::try_from(total_size.div_ceil(max_chunk)).unwrap_or(usize::MAX)
}

/// Splits `[0, total_size)` into consecutive ranges of at most `max_chunk` bytes.
///
/// `max_chunk` is clamped to at least one byte. An empty file has no ranges.
pub fn chunk_ranges(total_size: u64, max_chunk: u64) -> Vec<ByteRange> {
    let max_chunk = max_chunk.max(1);
    let mut ranges = Vec::with_capacity(part_count(total_size, max_chunk));
    let mut start = 0;
    while start < total_size {
        let end = start.saturating_add(max_chunk).min(total_size);
        ranges.push(ByteRange { start, end });
        start = end;
    }
    ranges
}

/// Where part `index` of `artifact` is staged: `clip.mp4` -> `clip.mp4.001`
pub fn part_path(artifact: &Path, index: usize) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(format!(".{:03}", index + 1));
    PathBuf::from(name)
}

/// Copies exactly the bytes of `range` from `reader` to `writer`.
///
/// Memory use is bounded by the copy buffer, not by the range length.
pub async fn copy_range<R, W>(reader: &mut R, range: ByteRange, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + AsyncSeek + Unpin,
    W: AsyncWrite + Unpin,
{
    reader.seek(SeekFrom::Start(range.start)).await?;
    let mut limited = (&mut *reader).take(range.len());
    let copied = tokio::io::copy(&mut limited, writer).await?;
    if copied < range.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("range {}..{} ends after {} bytes", range.start, range.end, copied),
        ));
    }
    writer.flush().await?;
    Ok(copied)
}

/// Writes `range` of `source` to the part file of `artifact`.
///
/// A half-written part file is removed on error.
pub async fn stage_chunk<R>(
    source: &mut R,
    artifact: &Path,
    index: usize,
    total: usize,
    range: ByteRange,
) -> io::Result<Chunk>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    let path = part_path(artifact, index);
    let written = async {
        let mut out = fs_err::tokio::File::create(&path).await?;
        copy_range(source, range, &mut out).await
    }
    .await;

    match written {
        Ok(_) => Ok(Chunk {
            index,
            total,
            range,
            path,
        }),
        Err(e) => {
            remove_quietly(&path).await;
            Err(e)
        }
    }
}

async fn remove_quietly(path: &Path) {
    match fs_err::tokio::remove_file(path).await {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
