//! `FileSystem`: the path- and server-scoped half of the public API --
//! everything that isn't reading or writing an already-open file.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use xrd_transport::XrdTransport;
use xrd_wire::body::{
    decode_dirlist_response, decode_locate_response, decode_stat_response, decode_statx_response, encode_mv_request,
    encode_statx_request, ChmodRequest, DirlistOptions, FattrOp, FattrRequest, LocateEntry, LocateOptions,
    MkdirRequest, PingRequest, PrepareRequest, ProtocolRequest, QueryRequest, StatInfo, StatRequest,
};
use xrd_wire::{Opcode, RequestHeader, StreamId};

use xrd_msghandler::HandlerConfig;
use xrd_postmaster::PostMaster;
use xrd_task::TaskManager;
use xrd_transport::TransportHandler;

use crate::error::{ClientError, XrdStatus};
use crate::request::submit_request;
use crate::sync_api::block_on;
use crate::url::Url;

fn empty_header(stream_id: StreamId, opcode: Opcode, opaque: [u8; 16], dlen: u32) -> RequestHeader {
    RequestHeader {
        stream_id,
        opcode,
        opaque,
        dlen,
    }
}

/// A connection to one XRootD server's path-scoped and server-scoped
/// operations: `locate`, `stat`, `dirlist`, `mkdir`, `rm`, `mv`, `chmod`,
/// metadata queries, and so on. `File` (opening and reading/writing an
/// individual file) lives next to this in [`crate::file::File`].
///
/// Generic over the transport the same way [`PostMaster`] is, so tests can
/// swap in a fake [`TransportHandler`]; production code uses the default
/// `T = XrdTransport`.
pub struct FileSystem<T: TransportHandler + 'static = XrdTransport> {
    postmaster: Arc<PostMaster<T>>,
    tasks: Arc<TaskManager>,
    host: String,
    port: u16,
    config: HandlerConfig,
}

impl<T: TransportHandler + 'static> Clone for FileSystem<T> {
    fn clone(&self) -> Self {
        Self {
            postmaster: self.postmaster.clone(),
            tasks: self.tasks.clone(),
            host: self.host.clone(),
            port: self.port,
            config: self.config.clone(),
        }
    }
}

impl<T: TransportHandler + 'static> FileSystem<T> {
    /// Builds a `FileSystem` addressed at `url`'s host, sharing the given
    /// Post Master and task manager (both process-wide singletons in
    /// practice, passed in explicitly so tests can scope them per case).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if `url` can't be parsed.
    pub fn connect(url: &str, postmaster: Arc<PostMaster<T>>, tasks: Arc<TaskManager>) -> Result<Self, ClientError> {
        let parsed = Url::parse(url)?;
        Ok(Self {
            postmaster,
            tasks,
            host: parsed.host().to_string(),
            port: parsed.port(),
            config: HandlerConfig::default(),
        })
    }

    /// Overrides the default redirect/deadline/checksum policy new
    /// requests are issued with.
    #[must_use]
    pub fn with_config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    async fn call(&self, opcode: Opcode, opaque: [u8; 16], body: BytesMut) -> Result<(BytesMut, XrdStatus), ClientError> {
        let header = empty_header(StreamId::ANY, opcode, opaque, body.len() as u32);
        let (body, status, _final_host) =
            submit_request(&self.postmaster, &self.tasks, &self.host, self.port, header, body, self.config.clone())
                .await?;
        Ok((body, status))
    }

    /// Locates the server(s) that host `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn locate(&self, path: &str, flags: u16) -> Result<Vec<LocateEntry>, ClientError> {
        let opaque = LocateOptions { flags }.to_opaque();
        let (body, _) = self.call(Opcode::Locate, opaque, BytesMut::from(path.as_bytes())).await?;
        decode_locate_response(&body).map_err(|err| ClientError::CorruptedHeader(err.to_string()))
    }

    /// Blocking wrapper over [`Self::locate`].
    ///
    /// # Errors
    ///
    /// See [`Self::locate`].
    pub fn locate_sync(&self, path: &str, flags: u16) -> Result<Vec<LocateEntry>, ClientError> {
        block_on(self.locate(path, flags))
    }

    /// Stats a path.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn stat(&self, path: &str) -> Result<StatInfo, ClientError> {
        let opaque = StatRequest {
            options: 0,
            file_handle: [0u8; 4],
        }
        .to_opaque();
        let (body, _) = self.call(Opcode::Stat, opaque, BytesMut::from(path.as_bytes())).await?;
        decode_stat_response(&body).map_err(|err| ClientError::CorruptedHeader(err.to_string()))
    }

    /// Blocking wrapper over [`Self::stat`].
    ///
    /// # Errors
    ///
    /// See [`Self::stat`].
    pub fn stat_sync(&self, path: &str) -> Result<StatInfo, ClientError> {
        block_on(self.stat(path))
    }

    /// Bulk-stats `paths`, returning one flags byte per path in order.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn statx(&self, paths: &[&str]) -> Result<Vec<u8>, ClientError> {
        let opaque = StatRequest::default().to_opaque();
        let body = encode_statx_request(paths);
        let (body, _) = self.call(Opcode::Statx, opaque, body).await?;
        Ok(decode_statx_response(&body))
    }

    /// Blocking wrapper over [`Self::statx`].
    ///
    /// # Errors
    ///
    /// See [`Self::statx`].
    pub fn statx_sync(&self, paths: &[&str]) -> Result<Vec<u8>, ClientError> {
        block_on(self.statx(paths))
    }

    /// Lists a directory's entries.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn dirlist(&self, path: &str, with_stat: bool) -> Result<Vec<String>, ClientError> {
        let opaque = DirlistOptions { with_stat }.to_opaque();
        let (body, _) = self.call(Opcode::Dirlist, opaque, BytesMut::from(path.as_bytes())).await?;
        Ok(decode_dirlist_response(&body))
    }

    /// Blocking wrapper over [`Self::dirlist`].
    ///
    /// # Errors
    ///
    /// See [`Self::dirlist`].
    pub fn dirlist_sync(&self, path: &str, with_stat: bool) -> Result<Vec<String>, ClientError> {
        block_on(self.dirlist(path, with_stat))
    }

    /// Creates a directory, optionally creating intermediate path
    /// components (`mkdirpath`).
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn mkdir(&self, path: &str, make_path: bool, mode: u16) -> Result<(), ClientError> {
        let opaque = MkdirRequest { make_path, mode }.to_opaque();
        self.call(Opcode::Mkdir, opaque, BytesMut::from(path.as_bytes())).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::mkdir`].
    ///
    /// # Errors
    ///
    /// See [`Self::mkdir`].
    pub fn mkdir_sync(&self, path: &str, make_path: bool, mode: u16) -> Result<(), ClientError> {
        block_on(self.mkdir(path, make_path, mode))
    }

    /// Removes a directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn rmdir(&self, path: &str) -> Result<(), ClientError> {
        self.call(Opcode::Rmdir, [0u8; 16], BytesMut::from(path.as_bytes())).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::rmdir`].
    ///
    /// # Errors
    ///
    /// See [`Self::rmdir`].
    pub fn rmdir_sync(&self, path: &str) -> Result<(), ClientError> {
        block_on(self.rmdir(path))
    }

    /// Removes a file.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn rm(&self, path: &str) -> Result<(), ClientError> {
        self.call(Opcode::Rm, [0u8; 16], BytesMut::from(path.as_bytes())).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::rm`].
    ///
    /// # Errors
    ///
    /// See [`Self::rm`].
    pub fn rm_sync(&self, path: &str) -> Result<(), ClientError> {
        block_on(self.rm(path))
    }

    /// Renames/moves `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn mv(&self, from: &str, to: &str) -> Result<(), ClientError> {
        self.call(Opcode::Mv, [0u8; 16], encode_mv_request(from, to)).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::mv`].
    ///
    /// # Errors
    ///
    /// See [`Self::mv`].
    pub fn mv_sync(&self, from: &str, to: &str) -> Result<(), ClientError> {
        block_on(self.mv(from, to))
    }

    /// Changes a path's permission bits.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn chmod(&self, path: &str, mode: u16) -> Result<(), ClientError> {
        let opaque = ChmodRequest { mode }.to_opaque();
        self.call(Opcode::Chmod, opaque, BytesMut::from(path.as_bytes())).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::chmod`].
    ///
    /// # Errors
    ///
    /// See [`Self::chmod`].
    pub fn chmod_sync(&self, path: &str, mode: u16) -> Result<(), ClientError> {
        block_on(self.chmod(path, mode))
    }

    /// Asks the server for a fact about itself or a path (free space,
    /// checksum, config value, ...); `path` travels as the body.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn query(&self, info_type: u16, arg: &str) -> Result<BytesMut, ClientError> {
        let opaque = QueryRequest {
            info_type,
            file_handle: [0u8; 4],
        }
        .to_opaque();
        let (body, _) = self.call(Opcode::Query, opaque, BytesMut::from(arg.as_bytes())).await?;
        Ok(body)
    }

    /// Blocking wrapper over [`Self::query`].
    ///
    /// # Errors
    ///
    /// See [`Self::query`].
    pub fn query_sync(&self, info_type: u16, arg: &str) -> Result<BytesMut, ClientError> {
        block_on(self.query(info_type, arg))
    }

    /// Checks that the server is alive and responsive.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection failure.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.call(Opcode::Ping, PingRequest.to_opaque(), BytesMut::new()).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::ping`].
    ///
    /// # Errors
    ///
    /// See [`Self::ping`].
    pub fn ping_sync(&self) -> Result<(), ClientError> {
        block_on(self.ping())
    }

    /// Negotiates protocol version and capability flags with the server.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection failure.
    pub async fn protocol(&self, client_version: u32, flags: u32) -> Result<BytesMut, ClientError> {
        let opaque = ProtocolRequest { client_version, flags }.to_opaque();
        let (body, _) = self.call(Opcode::Protocol, opaque, BytesMut::new()).await?;
        Ok(body)
    }

    /// Blocking wrapper over [`Self::protocol`].
    ///
    /// # Errors
    ///
    /// See [`Self::protocol`].
    pub fn protocol_sync(&self, client_version: u32, flags: u32) -> Result<BytesMut, ClientError> {
        block_on(self.protocol(client_version, flags))
    }

    /// Requests the server stage one or more paths ahead of use.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn prepare(&self, paths: &[&str], options: u16, priority: u8) -> Result<(), ClientError> {
        let opaque = PrepareRequest { options, priority }.to_opaque();
        let mut body = BytesMut::new();
        for (idx, path) in paths.iter().enumerate() {
            if idx > 0 {
                body.put_u8(b'\n');
            }
            body.put_slice(path.as_bytes());
        }
        self.call(Opcode::Prepare, opaque, body).await?;
        Ok(())
    }

    /// Blocking wrapper over [`Self::prepare`].
    ///
    /// # Errors
    ///
    /// See [`Self::prepare`].
    pub fn prepare_sync(&self, paths: &[&str], options: u16, priority: u8) -> Result<(), ClientError> {
        block_on(self.prepare(paths, options, priority))
    }

    /// Fetches the value of a path-scoped extended attribute (a handle-less
    /// `fattr get`, per the external-interfaces body table -- the handle
    /// field is all-zero and the attribute name travels in the body).
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection, protocol, or server-side
    /// failure.
    pub async fn fattr_get(&self, path: &str, name: &str) -> Result<BytesMut, ClientError> {
        let opaque = FattrRequest {
            file_handle: [0u8; 4],
            sub_op: FattrOp::Get,
            num_attr: 1,
        }
        .to_opaque();
        let mut body = BytesMut::from(path.as_bytes());
        body.put_u8(0);
        body.put_slice(name.as_bytes());
        let (body, _) = self.call(Opcode::Fattr, opaque, body).await?;
        Ok(body)
    }

    /// Blocking wrapper over [`Self::fattr_get`].
    ///
    /// # Errors
    ///
    /// See [`Self::fattr_get`].
    pub fn fattr_get_sync(&self, path: &str, name: &str) -> Result<BytesMut, ClientError> {
        block_on(self.fattr_get(path, name))
    }
}
