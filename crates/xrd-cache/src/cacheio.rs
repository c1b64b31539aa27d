//! The seam between a cached [`crate::file::File`] and wherever its bytes
//! actually come from.
//!
//! [`UpstreamSource`] is the narrow, transport-agnostic trait a caller
//! implements once per open remote file (typically backed by an
//! `xrd-client` file handle, though nothing here depends on that crate —
//! same decoupling the `xrd-msghandler` state machine keeps from the
//! transport stack). [`CacheIo`] is what [`crate::file::File`] actually
//! calls: it adds the block-ownership identity ([`crate::block::IoId`])
//! that lets a block recover from a stale owner's failure, and is
//! implemented by [`IoEntireFile`] (one upstream object per cache file)
//! and [`IoFileBlock`] (hdfs-style fixed-size chunked storage, each chunk
//! its own lazily-created cache file).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;

use crate::block::IoId;
use crate::file::File;
use crate::CacheError;

/// Fetches a byte range from wherever a cached file's data ultimately
/// comes from (a remote XRootD file, in the intended deployment).
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes, CacheError>;
}

/// What [`crate::file::File::read`] calls to fill a block it doesn't
/// already have: a byte-range fetch tagged with the owning [`IoId`].
#[async_trait]
pub trait CacheIo: Send + Sync {
    /// Identifies this IO instance for block-ownership bookkeeping.
    fn io_id(&self) -> IoId;

    /// Fetches `len` bytes starting at `offset`.
    async fn fetch(&self, offset: u64, len: usize) -> Result<Bytes, CacheError>;
}

/// A `CacheIo` backed by one upstream object per cache file: fetches
/// translate directly to a `read_range` call on the wrapped
/// [`UpstreamSource`].
pub struct IoEntireFile {
    io_id: IoId,
    upstream: Arc<dyn UpstreamSource>,
}

impl IoEntireFile {
    /// Wraps `upstream` as a `CacheIo` identified by `io_id`.
    #[must_use]
    pub fn new(io_id: IoId, upstream: Arc<dyn UpstreamSource>) -> Self {
        Self { io_id, upstream }
    }
}

#[async_trait]
impl CacheIo for IoEntireFile {
    fn io_id(&self) -> IoId {
        self.io_id
    }

    async fn fetch(&self, offset: u64, len: usize) -> Result<Bytes, CacheError> {
        self.upstream.read_range(offset, len).await
    }
}

struct OffsetUpstream {
    inner: Arc<dyn UpstreamSource>,
    base: u64,
}

#[async_trait]
impl UpstreamSource for OffsetUpstream {
    async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes, CacheError> {
        self.inner.read_range(self.base + offset, len).await
    }
}

/// A `CacheIo` that splits a file into fixed-size (`hdfsbsize`) chunks,
/// each persisted as its own cache file named
/// `<origpath>___<hdfsbsize>_<chunkoffset>` with its own `.cinfo`
/// sidecar, created lazily the first time a fetch touches it. Mirrors
/// the HDFS block-file layout `hdfsbsize=N` cache configurations use.
pub struct IoFileBlock {
    io_id: IoId,
    upstream: Arc<dyn UpstreamSource>,
    cache_root: PathBuf,
    orig_path: PathBuf,
    hdfsbsize: u64,
    file_size: u64,
    ram_block_size: u64,
    subfiles: Mutex<FxHashMap<u64, Arc<File>>>,
}

impl IoFileBlock {
    /// Configures a chunked `CacheIo` for a file of `file_size` bytes,
    /// stored under `cache_root` using `orig_path` as the logical name,
    /// split into `hdfsbsize`-byte chunk files each internally cached in
    /// `ram_block_size`-byte blocks.
    #[must_use]
    pub fn new(
        io_id: IoId,
        upstream: Arc<dyn UpstreamSource>,
        cache_root: impl Into<PathBuf>,
        orig_path: impl Into<PathBuf>,
        file_size: u64,
        hdfsbsize: u64,
        ram_block_size: u64,
    ) -> Self {
        Self {
            io_id,
            upstream,
            cache_root: cache_root.into(),
            orig_path: orig_path.into(),
            hdfsbsize: hdfsbsize.max(1),
            file_size,
            ram_block_size: ram_block_size.max(1),
            subfiles: Mutex::new(FxHashMap::default()),
        }
    }

    fn subfile_name(&self, chunk_offset: u64) -> String {
        format!(
            "{}___{}_{chunk_offset}",
            self.orig_path.display(),
            self.hdfsbsize
        )
    }

    async fn subfile_for(&self, chunk_offset: u64) -> Result<Arc<File>, CacheError> {
        let mut guard = self.subfiles.lock().await;
        if let Some(existing) = guard.get(&chunk_offset) {
            return Ok(Arc::clone(existing));
        }
        let name = self.subfile_name(chunk_offset);
        let data_path = self.cache_root.join(format!("{name}.data"));
        let info_path = self.cache_root.join(format!("{name}.cinfo"));
        let chunk_len = self.hdfsbsize.min(self.file_size.saturating_sub(chunk_offset));
        let file = Arc::new(File::open_or_create(data_path, info_path, chunk_len, self.ram_block_size).await?);
        guard.insert(chunk_offset, Arc::clone(&file));
        Ok(file)
    }
}

#[async_trait]
impl CacheIo for IoFileBlock {
    fn io_id(&self) -> IoId {
        self.io_id
    }

    async fn fetch(&self, offset: u64, len: usize) -> Result<Bytes, CacheError> {
        let mut out = BytesMut::with_capacity(len);
        let mut cursor = offset;
        let mut remaining = len;

        while remaining > 0 {
            let chunk_index = cursor / self.hdfsbsize;
            let chunk_offset = chunk_index * self.hdfsbsize;
            let within_chunk = cursor - chunk_offset;
            let chunk_capacity = self.hdfsbsize - within_chunk;
            let take = (remaining as u64).min(chunk_capacity) as usize;

            let subfile = self.subfile_for(chunk_offset).await?;
            let windowed_upstream: Arc<dyn UpstreamSource> = Arc::new(OffsetUpstream {
                inner: Arc::clone(&self.upstream),
                base: chunk_offset,
            });
            let sub_io = IoEntireFile::new(self.io_id, windowed_upstream);

            let bytes = subfile.read(&sub_io, within_chunk, take).await?;
            out.extend_from_slice(&bytes);
            cursor += take as u64;
            remaining -= take;
        }

        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticUpstream(Bytes);

    #[async_trait]
    impl UpstreamSource for StaticUpstream {
        async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes, CacheError> {
            Ok(self.0.slice(offset as usize..offset as usize + len))
        }
    }

    #[tokio::test]
    async fn io_entire_file_delegates_straight_through() {
        let upstream: Arc<dyn UpstreamSource> = Arc::new(StaticUpstream(Bytes::from_static(b"0123456789")));
        let io = IoEntireFile::new(1, upstream);
        let bytes = io.fetch(3, 4).await.unwrap();
        assert_eq!(&bytes[..], b"3456");
    }

    #[tokio::test]
    async fn io_file_block_fetch_spanning_two_chunks_assembles_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"ABCDEFGHIJKLMNOP"; // 16 bytes
        let upstream: Arc<dyn UpstreamSource> = Arc::new(StaticUpstream(Bytes::from_static(data)));
        let io = IoFileBlock::new(1, upstream, dir.path(), "remote/file.dat", data.len() as u64, 8, 4);

        // Spans chunk 0 (bytes 0..8) and chunk 1 (bytes 8..16).
        let bytes = io.fetch(4, 8).await.unwrap();
        assert_eq!(&bytes[..], &data[4..12]);
    }

    #[tokio::test]
    async fn io_file_block_reuses_subfile_across_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"0123456789abcdef";
        let upstream: Arc<dyn UpstreamSource> = Arc::new(StaticUpstream(Bytes::from_static(data)));
        let io = IoFileBlock::new(1, upstream, dir.path(), "remote/file.dat", data.len() as u64, 8, 4);

        io.fetch(0, 4).await.unwrap();
        io.fetch(4, 4).await.unwrap();
        assert_eq!(io.subfiles.lock().await.len(), 1);
    }
}
