//! A single cached file: its `.cinfo` sidecar, in-flight block map, and
//! the classify/issue/wait read algorithm.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use rustc_hash::FxHashMap;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, Notify};

use crate::block::{Block, BlockState};
use crate::cacheio::CacheIo;
use crate::info::Info;
use crate::CacheError;

struct Inner {
    info: Info,
    blocks: FxHashMap<usize, Block>,
}

/// One byte range within a `readv` request.
#[derive(Debug, Clone, Copy)]
pub struct ReadVChunk {
    /// Start offset within the file.
    pub offset: u64,
    /// Number of bytes requested.
    pub len: usize,
}

/// A cache file: the `.cinfo` sidecar plus whatever blocks are currently
/// allocated in RAM, guarded by one lock and one download notifier.
///
/// `read` runs the six-step algorithm this cache is built around: clamp
/// the request to the file's bounds, partition it into block indices,
/// classify each block under the lock (already written, already being
/// fetched by someone else, or needs a fresh fetch claimed by this call),
/// issue new fetches outside the lock, wait on [`Notify`] for any block
/// someone else is fetching and reclassify when woken, and release this
/// call's reference on every block it touched whether the read succeeded
/// or failed.
pub struct File {
    data_path: PathBuf,
    info_path: PathBuf,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl File {
    /// Opens an existing cache file's sidecar, or creates a fresh one for
    /// a file of `file_size` bytes cached in `block_size`-byte blocks.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the sidecar exists but can't be read,
    /// or [`CacheError::CorruptSidecar`] if it's malformed.
    pub async fn open_or_create(
        data_path: impl Into<PathBuf>,
        info_path: impl Into<PathBuf>,
        file_size: u64,
        block_size: u64,
    ) -> Result<Self, CacheError> {
        let data_path = data_path.into();
        let info_path = info_path.into();
        let existing = info_path.clone();
        let info = tokio::task::spawn_blocking(move || {
            if existing.exists() {
                Info::read_from(&existing)
            } else {
                Ok(Info::new(file_size, block_size))
            }
        })
        .await
        .map_err(|err| CacheError::CorruptSidecar(err.to_string()))??;

        OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .open(&data_path)
            .await?;

        Ok(Self {
            data_path,
            info_path,
            inner: Mutex::new(Inner {
                info,
                blocks: FxHashMap::default(),
            }),
            notify: Notify::new(),
        })
    }

    /// Path to the underlying cached data file.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Path to the `.cinfo` sidecar.
    #[must_use]
    pub fn info_path(&self) -> &Path {
        &self.info_path
    }

    /// Whether every block of the file has been fetched and written.
    pub async fn is_complete(&self) -> bool {
        self.inner.lock().await.info.is_complete()
    }

    /// Reads `len` bytes starting at `offset`, fetching through `io`
    /// whatever blocks aren't already on disk.
    ///
    /// The range is clamped to the file's actual size; a request
    /// starting at or past end-of-file returns an empty buffer rather
    /// than an error.
    pub async fn read(&self, io: &dyn CacheIo, offset: u64, len: usize) -> Result<Bytes, CacheError> {
        let (file_size, block_size) = {
            let inner = self.inner.lock().await;
            (inner.info.file_size(), inner.info.block_size())
        };
        if offset >= file_size || len == 0 {
            return Ok(Bytes::new());
        }
        let end = offset.saturating_add(len as u64).min(file_size);
        let first_block = (offset / block_size) as usize;
        let last_block = ((end - 1) / block_size) as usize;

        let mut out = BytesMut::with_capacity((end - offset) as usize);
        for block_index in first_block..=last_block {
            let block_offset = block_index as u64 * block_size;
            let block_len = block_size.min(file_size - block_offset) as usize;

            if let Err(err) = self.ensure_block(io, block_index, block_offset, block_len).await {
                return Err(err);
            }

            let slice_start = offset.max(block_offset) - block_offset;
            let slice_end = (end.min(block_offset + block_len as u64)) - block_offset;
            let bytes = self
                .read_block_range(block_index, block_offset, slice_start as usize, slice_end as usize)
                .await?;
            out.extend_from_slice(&bytes);
        }
        Ok(out.freeze())
    }

    /// Runs [`Self::read`] over several ranges at once. Ranges sharing a
    /// block coalesce onto a single fetch through the same classify/wait
    /// path `read` uses internally, whether or not their chunks are
    /// issued concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first chunk's error if any chunk fails; prior
    /// successful chunks' bytes are discarded, matching the whole-request
    /// failure semantics of `pgread`.
    pub async fn read_v(self: &Arc<Self>, io: Arc<dyn CacheIo>, chunks: Vec<ReadVChunk>) -> Result<Vec<Bytes>, CacheError> {
        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let file = Arc::clone(self);
            let io = Arc::clone(&io);
            handles.push(tokio::spawn(async move { file.read(io.as_ref(), chunk.offset, chunk.len).await }));
        }
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let bytes = handle.await.map_err(|err| CacheError::TaskPanicked(err.to_string()))??;
            results.push(bytes);
        }
        Ok(results)
    }

    async fn ensure_block(&self, io: &dyn CacheIo, index: usize, block_offset: u64, block_len: usize) -> Result<(), CacheError> {
        enum Step {
            Done,
            Wait,
            Fetch,
        }

        loop {
            let step;
            {
                let mut inner = self.inner.lock().await;
                if inner.info.test_bit(index) {
                    step = Step::Done;
                } else {
                    let owner_io = io.io_id();
                    let entry = inner
                        .blocks
                        .entry(index)
                        .or_insert_with(|| Block::allocate(index, owner_io));
                    step = match entry.state() {
                        BlockState::Written | BlockState::Ok => Step::Done,
                        BlockState::Pending => {
                            entry.add_ref();
                            Step::Wait
                        }
                        BlockState::Failed if entry.owner_io() == Some(owner_io) => {
                            let message = entry.error().unwrap_or("unknown failure").to_string();
                            return Err(CacheError::UpstreamFailed { block_index: index, message });
                        }
                        BlockState::Failed => {
                            entry.reset_error_and_set_io(owner_io);
                            entry.start_pending();
                            entry.add_ref();
                            Step::Fetch
                        }
                        BlockState::Allocated => {
                            entry.start_pending();
                            entry.add_ref();
                            Step::Fetch
                        }
                    };
                }
            }

            match step {
                Step::Done => return Ok(()),
                Step::Wait => {
                    self.notify.notified().await;
                    continue;
                }
                Step::Fetch => return self.fetch_and_store(io, index, block_offset, block_len).await,
            }
        }
    }

    async fn fetch_and_store(&self, io: &dyn CacheIo, index: usize, block_offset: u64, block_len: usize) -> Result<(), CacheError> {
        let fetched = io.fetch(block_offset, block_len).await;

        let data = match fetched {
            Ok(data) => data,
            Err(err) => {
                let mut inner = self.inner.lock().await;
                if let Some(block) = inner.blocks.get_mut(&index) {
                    block.fail(err.to_string());
                    block.release();
                }
                drop(inner);
                self.notify.notify_waiters();
                return Err(err);
            }
        };

        if let Err(err) = self.write_bytes(block_offset, &data).await {
            let mut inner = self.inner.lock().await;
            if let Some(block) = inner.blocks.get_mut(&index) {
                block.fail(err.to_string());
                block.release();
            }
            drop(inner);
            self.notify.notify_waiters();
            return Err(err);
        }

        let info_snapshot = {
            let mut inner = self.inner.lock().await;
            if let Some(block) = inner.blocks.get_mut(&index) {
                block.complete_ok(data);
                block.mark_written();
                block.release();
            }
            inner.info.set_bit(index);
            inner.info.clone()
        };

        let info_path = self.info_path.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || info_snapshot.write_to(&info_path)).await {
            tracing::warn!(error = %err, "sidecar persistence task panicked");
        }

        self.notify.notify_waiters();
        Ok(())
    }

    async fn read_block_range(&self, index: usize, block_offset: u64, start: usize, end: usize) -> Result<Bytes, CacheError> {
        let cached = {
            let inner = self.inner.lock().await;
            inner.blocks.get(&index).and_then(|block| block.data().cloned())
        };
        if let Some(data) = cached {
            return Ok(data.slice(start..end));
        }

        let mut file = OpenOptions::new().read(true).open(&self.data_path).await?;
        file.seek(std::io::SeekFrom::Start(block_offset + start as u64)).await?;
        let mut buf = vec![0u8; end - start];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn write_bytes(&self, offset: u64, data: &Bytes) -> Result<(), CacheError> {
        let mut file = OpenOptions::new().write(true).open(&self.data_path).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cacheio::{CacheIo, IoEntireFile};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingUpstream {
        data: Bytes,
        fetch_count: AtomicU64,
    }

    #[async_trait]
    impl crate::cacheio::UpstreamSource for CountingUpstream {
        async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes, CacheError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.data.slice(offset as usize..offset as usize + len))
        }
    }

    fn upstream(data: &'static [u8]) -> Arc<CountingUpstream> {
        Arc::new(CountingUpstream {
            data: Bytes::from_static(data),
            fetch_count: AtomicU64::new(0),
        })
    }

    #[tokio::test]
    async fn read_fetches_once_and_serves_from_disk_on_second_read() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"0123456789abcdef";
        let upstream = upstream(data);
        let io = IoEntireFile::new(1, upstream.clone());

        let file = File::open_or_create(dir.path().join("f.data"), dir.path().join("f.cinfo"), data.len() as u64, 4)
            .await
            .unwrap();

        let first = file.read(&io, 0, 8).await.unwrap();
        assert_eq!(&first[..], &data[0..8]);
        assert_eq!(upstream.fetch_count.load(Ordering::SeqCst), 2);

        let second = file.read(&io, 0, 8).await.unwrap();
        assert_eq!(&second[..], &data[0..8]);
        assert_eq!(upstream.fetch_count.load(Ordering::SeqCst), 2, "second read must hit cached blocks, not refetch");
    }

    #[tokio::test]
    async fn read_clamps_to_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"hello";
        let upstream = upstream(data);
        let io = IoEntireFile::new(1, upstream);
        let file = File::open_or_create(dir.path().join("f.data"), dir.path().join("f.cinfo"), data.len() as u64, 4)
            .await
            .unwrap();

        let result = file.read(&io, 2, 100).await.unwrap();
        assert_eq!(&result[..], &data[2..5]);
    }

    #[tokio::test]
    async fn failed_fetch_from_same_owner_is_not_silently_retried() {
        struct FailingUpstream;
        #[async_trait]
        impl crate::cacheio::UpstreamSource for FailingUpstream {
            async fn read_range(&self, _offset: u64, _len: usize) -> Result<Bytes, CacheError> {
                Err(CacheError::UpstreamFailed { block_index: 0, message: "boom".into() })
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let io = IoEntireFile::new(7, Arc::new(FailingUpstream));
        let file = File::open_or_create(dir.path().join("f.data"), dir.path().join("f.cinfo"), 16, 4)
            .await
            .unwrap();

        assert!(file.read(&io, 0, 4).await.is_err());
        assert!(file.read(&io, 0, 4).await.is_err(), "same owner retrying a failed block must fail fast");
    }

    #[tokio::test]
    async fn a_different_owner_recovers_a_block_failed_by_a_stale_owner() {
        struct FailingUpstream;
        #[async_trait]
        impl crate::cacheio::UpstreamSource for FailingUpstream {
            async fn read_range(&self, _offset: u64, _len: usize) -> Result<Bytes, CacheError> {
                Err(CacheError::UpstreamFailed { block_index: 0, message: "boom".into() })
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let failing_io = IoEntireFile::new(1, Arc::new(FailingUpstream));
        let file = File::open_or_create(dir.path().join("f.data"), dir.path().join("f.cinfo"), 16, 4)
            .await
            .unwrap();
        assert!(file.read(&failing_io, 0, 4).await.is_err());

        let good = upstream(b"good");
        let good_io = IoEntireFile::new(2, good);
        let result = file.read(&good_io, 0, 4).await.unwrap();
        assert_eq!(&result[..], b"good");
    }
}
