//! `File`: an open handle on one server, tracking the endpoint a redirect
//! during `open` leaves it pinned to.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use xrd_transport::XrdTransport;
use xrd_wire::body::{
    decode_open_response, decode_pgread_response, decode_stat_response, OpenOptions, PgPage, PgReadRequest,
    ReadRequest, ReadVChunk, StatRequest, TruncateRequest, WriteRequest,
};
use xrd_wire::{Opcode, RequestHeader, StreamId};

use xrd_msghandler::HandlerConfig;
use xrd_postmaster::PostMaster;
use xrd_task::TaskManager;
use xrd_transport::TransportHandler;

use crate::error::ClientError;
use crate::request::submit_request;
use crate::sync_api::block_on;
use crate::url::Url;

const READV_SUBHEADER_LEN: usize = 16;

fn decode_readv_response(mut body: BytesMut) -> Result<Vec<Bytes>, ClientError> {
    let mut chunks = Vec::new();
    while !body.is_empty() {
        if body.len() < READV_SUBHEADER_LEN {
            return Err(ClientError::CorruptedHeader("truncated readv sub-header".into()));
        }
        let sub_header = body.split_to(READV_SUBHEADER_LEN);
        let len = u32::from_be_bytes(sub_header[4..8].try_into().unwrap()) as usize;
        if body.len() < len {
            return Err(ClientError::CorruptedHeader("truncated readv chunk data".into()));
        }
        chunks.push(body.split_to(len).freeze());
    }
    Ok(chunks)
}

/// An open file on an XRootD server.
///
/// A redirect that lands `open` on a different host pins every subsequent
/// `read`/`write`/`stat`/`truncate`/`close` to that same host, rather than
/// reconsulting the URL's original host -- the file handle the server gave
/// back is only meaningful at the host that issued it.
pub struct File<T: TransportHandler + 'static = XrdTransport> {
    postmaster: Arc<PostMaster<T>>,
    tasks: Arc<TaskManager>,
    config: HandlerConfig,
    host: Mutex<String>,
    port: u16,
    path: String,
    handle: [u8; 4],
}

impl<T: TransportHandler + 'static> File<T> {
    fn host(&self) -> String {
        self.host.lock().clone()
    }

    async fn call(&self, opcode: Opcode, opaque: [u8; 16], body: BytesMut) -> Result<BytesMut, ClientError> {
        let header = RequestHeader {
            stream_id: StreamId::ANY,
            opcode,
            opaque,
            dlen: body.len() as u32,
        };
        let host = self.host();
        let (body, _status, final_host) =
            submit_request(&self.postmaster, &self.tasks, &host, self.port, header, body, self.config.clone())
                .await?;
        *self.host.lock() = final_host;
        Ok(body)
    }

    /// Opens `url`'s path, returning a handle scoped to wherever the
    /// server (after any redirect) ends up serving it from.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the URL can't be parsed, or
    /// any other [`ClientError`] the `open` request itself fails with.
    pub async fn open(
        url: &str,
        mode: u16,
        options: u16,
        postmaster: Arc<PostMaster<T>>,
        tasks: Arc<TaskManager>,
    ) -> Result<Self, ClientError> {
        Self::open_with_config(url, mode, options, postmaster, tasks, HandlerConfig::default()).await
    }

    /// As [`Self::open`], but with an explicit redirect/deadline/checksum
    /// policy rather than the default.
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub async fn open_with_config(
        url: &str,
        mode: u16,
        options: u16,
        postmaster: Arc<PostMaster<T>>,
        tasks: Arc<TaskManager>,
        config: HandlerConfig,
    ) -> Result<Self, ClientError> {
        let parsed = Url::parse(url)?;
        let opaque = OpenOptions { mode, options }.to_opaque();
        let header = RequestHeader {
            stream_id: StreamId::ANY,
            opcode: Opcode::Open,
            opaque,
            dlen: parsed.path().len() as u32,
        };
        let (body, _status, final_host) = submit_request(
            &postmaster,
            &tasks,
            parsed.host(),
            parsed.port(),
            header,
            BytesMut::from(parsed.path().as_bytes()),
            config.clone(),
        )
        .await?;
        let opened = decode_open_response(&body).map_err(|err| ClientError::CorruptedHeader(err.to_string()))?;
        Ok(Self {
            postmaster,
            tasks,
            config,
            host: Mutex::new(final_host),
            port: parsed.port(),
            path: parsed.path().to_string(),
            handle: opened.file_handle,
        })
    }

    /// Blocking wrapper over [`Self::open`].
    ///
    /// # Errors
    ///
    /// See [`Self::open`].
    pub fn open_sync(
        url: &str,
        mode: u16,
        options: u16,
        postmaster: Arc<PostMaster<T>>,
        tasks: Arc<TaskManager>,
    ) -> Result<Self, ClientError> {
        block_on(Self::open(url, mode, options, postmaster, tasks))
    }

    /// The path this handle was opened against.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reads up to `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn read(&self, offset: u64, len: u32) -> Result<Bytes, ClientError> {
        let opaque = ReadRequest {
            file_handle: self.handle,
            offset,
            len,
        }
        .to_opaque();
        let body = self.call(Opcode::Read, opaque, BytesMut::new()).await?;
        Ok(body.freeze())
    }

    /// Blocking wrapper over [`Self::read`].
    ///
    /// # Errors
    ///
    /// See [`Self::read`].
    pub fn read_sync(&self, offset: u64, len: u32) -> Result<Bytes, ClientError> {
        block_on(self.read(offset, len))
    }

    /// Reads several `(offset, len)` ranges in a single round trip.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn read_v(&self, ranges: &[(u64, u32)]) -> Result<Vec<Bytes>, ClientError> {
        let chunks: Vec<ReadVChunk> = ranges
            .iter()
            .map(|&(offset, len)| ReadVChunk {
                file_handle: self.handle,
                len,
                offset,
            })
            .collect();
        let body = xrd_wire::body::encode_readv_request(&chunks);
        let body = self.call(Opcode::Readv, [0u8; 16], body).await?;
        decode_readv_response(body)
    }

    /// Blocking wrapper over [`Self::read_v`].
    ///
    /// # Errors
    ///
    /// See [`Self::read_v`].
    pub fn read_v_sync(&self, ranges: &[(u64, u32)]) -> Result<Vec<Bytes>, ClientError> {
        block_on(self.read_v(ranges))
    }

    /// Reads `len` bytes starting at `offset` with interleaved per-page
    /// CRC32C checksums, without verifying them -- callers needing
    /// verification should compare [`PgPage::crc32c`] against
    /// `xrd_checksum::Crc32c` themselves.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn pgread(&self, offset: u64, len: u32) -> Result<Vec<PgPage>, ClientError> {
        let opaque = PgReadRequest {
            file_handle: self.handle,
            offset,
            len,
            req_flags: 0,
        }
        .to_opaque();
        let body = self.call(Opcode::Pgread, opaque, BytesMut::new()).await?;
        decode_pgread_response(&body).map_err(|err| ClientError::CorruptedHeader(err.to_string()))
    }

    /// Blocking wrapper over [`Self::pgread`].
    ///
    /// # Errors
    ///
    /// See [`Self::pgread`].
    pub fn pgread_sync(&self, offset: u64, len: u32) -> Result<Vec<PgPage>, ClientError> {
        block_on(self.pgread(offset, len))
    }

    /// Writes `data` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn write(&self, offset: u64, data: &[u8]) -> Result<(), ClientError> {
        let opaque = WriteRequest {
            file_handle: self.handle,
            offset,
            path_id: 0,
        }
        .to_opaque();
        self.call(Opcode::Write, opaque, BytesMut::from(data)).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::write`].
    ///
    /// # Errors
    ///
    /// See [`Self::write`].
    pub fn write_sync(&self, offset: u64, data: &[u8]) -> Result<(), ClientError> {
        block_on(self.write(offset, data))
    }

    /// Truncates (or extends) the file to `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn truncate(&self, size: u64) -> Result<(), ClientError> {
        let opaque = TruncateRequest {
            file_handle: self.handle,
            size,
        }
        .to_opaque();
        self.call(Opcode::Truncate, opaque, BytesMut::new()).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::truncate`].
    ///
    /// # Errors
    ///
    /// See [`Self::truncate`].
    pub fn truncate_sync(&self, size: u64) -> Result<(), ClientError> {
        block_on(self.truncate(size))
    }

    /// Stats the open handle.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn stat(&self) -> Result<xrd_wire::body::StatInfo, ClientError> {
        let opaque = StatRequest {
            options: 0,
            file_handle: self.handle,
        }
        .to_opaque();
        let body = self.call(Opcode::Stat, opaque, BytesMut::new()).await?;
        decode_stat_response(&body).map_err(|err| ClientError::CorruptedHeader(err.to_string()))
    }

    /// Blocking wrapper over [`Self::stat`].
    ///
    /// # Errors
    ///
    /// See [`Self::stat`].
    pub fn stat_sync(&self) -> Result<xrd_wire::body::StatInfo, ClientError> {
        block_on(self.stat())
    }

    /// Closes the handle. Subsequent calls on this `File` will fail at the
    /// server with an invalid-handle error; the type itself doesn't track
    /// closed-ness since the server is the source of truth for handle
    /// validity.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn close(&self) -> Result<(), ClientError> {
        let mut opaque = [0u8; 16];
        opaque[0..4].copy_from_slice(&self.handle);
        self.call(Opcode::Close, opaque, BytesMut::new()).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::close`].
    ///
    /// # Errors
    ///
    /// See [`Self::close`].
    pub fn close_sync(&self) -> Result<(), ClientError> {
        block_on(self.close())
    }
}
