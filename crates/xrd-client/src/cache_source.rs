//! Fronts an open [`File`] as the live upstream the block cache falls
//! back to on a miss: [`xrd_cache::cacheio::UpstreamSource`] is the seam
//! `IoEntireFile`/`IoFileBlock` read through, and here it's just a
//! range-limited read against an already-open file handle.

use async_trait::async_trait;
use bytes::Bytes;
use xrd_cache::cacheio::UpstreamSource;
use xrd_cache::CacheError;
use xrd_transport::{TransportHandler, XrdTransport};

use crate::error::ClientError;
use crate::file::File;

fn to_cache_error(err: ClientError) -> CacheError {
    CacheError::UpstreamFailed {
        block_index: 0,
        message: err.to_string(),
    }
}

#[async_trait]
impl<T: TransportHandler + 'static> UpstreamSource for File<T> {
    async fn read_range(&self, offset: u64, len: usize) -> Result<Bytes, CacheError> {
        let len = u32::try_from(len).map_err(|_| CacheError::OutOfRange {
            offset,
            end: offset,
            file_size: offset,
        })?;
        self.read(offset, len).await.map_err(to_cache_error)
    }
}

/// Convenience alias for the common case: an upstream backed by the
/// production transport.
pub type XrdUpstream = File<XrdTransport>;
