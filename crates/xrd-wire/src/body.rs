//! Per-opcode request/response body layouts.
//!
//! [`crate::header::RequestHeader`] carries a fixed 16-byte
//! opcode-specific field ahead of the variable-length `dlen` payload; the
//! types here give that opaque field and the payload a name per opcode,
//! following the external-interfaces body table. Only the opcodes a
//! client actually needs to construct or parse bodies for are modeled in
//! full; opcodes whose bodies are pure pass-through (`ping`, `protocol`
//! negotiation flags, `sigver` envelopes) get a minimal fixed-field
//! struct and no response decoder.

use bytes::{BufMut, BytesMut};

use crate::WireError;

fn require(buf: &[u8], len: usize) -> Result<(), WireError> {
    if buf.len() < len {
        return Err(WireError::Truncated {
            expected: len,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// `locate` request: `options[2], reserved[14]`, path carried as the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocateOptions {
    /// Bitmask of `kXR_refresh` / `kXR_nowait` / prefer-name style flags.
    pub flags: u16,
}

impl LocateOptions {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.flags.to_be_bytes());
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        Self {
            flags: u16::from_be_bytes([opaque[0], opaque[1]]),
        }
    }
}

/// One server location returned by `locate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateEntry {
    /// `host[:port]` the path can be reached at.
    pub address: String,
    /// Server role/type flags as reported by the response text.
    pub flags: u8,
}

/// Decodes a `locate` response body: a space-separated list of
/// `flags-digit address` tokens.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] if a token is malformed.
pub fn decode_locate_response(body: &[u8]) -> Result<Vec<LocateEntry>, WireError> {
    let text = String::from_utf8_lossy(body);
    let mut entries = Vec::new();
    for token in text.split_whitespace() {
        let mut chars = token.chars();
        let flag_char = chars.next().ok_or(WireError::Truncated {
            expected: 1,
            actual: 0,
        })?;
        let flags = flag_char.to_digit(10).unwrap_or(0) as u8;
        let address = chars.as_str().to_string();
        entries.push(LocateEntry { address, flags });
    }
    Ok(entries)
}

/// `open` request: `mode[2], options[2], reserved[12]`, path as the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenOptions {
    /// POSIX-style permission bits applied when `options` requests
    /// creation.
    pub mode: u16,
    /// Bitmask of `kXR_open_read` / `kXR_open_updt` / `kXR_new` / ... flags.
    pub options: u16,
}

impl OpenOptions {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.mode.to_be_bytes());
        out[2..4].copy_from_slice(&self.options.to_be_bytes());
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        Self {
            mode: u16::from_be_bytes([opaque[0], opaque[1]]),
            options: u16::from_be_bytes([opaque[2], opaque[3]]),
        }
    }
}

/// `open` response body: a four-byte file handle, optionally followed by
/// compact `stat` info when `kXR_retstat` was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenResponse {
    /// Server-assigned handle used by subsequent `read`/`write`/`close`.
    pub file_handle: [u8; 4],
    /// Compact stat text, present only if the server echoed it back.
    pub compact_stat: Option<String>,
}

/// Decodes an `open` response.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] if fewer than four bytes are present.
pub fn decode_open_response(body: &[u8]) -> Result<OpenResponse, WireError> {
    require(body, 4)?;
    let mut file_handle = [0u8; 4];
    file_handle.copy_from_slice(&body[0..4]);
    let compact_stat = if body.len() > 4 {
        Some(String::from_utf8_lossy(&body[4..]).into_owned())
    } else {
        None
    };
    Ok(OpenResponse {
        file_handle,
        compact_stat,
    })
}

/// `read` request: `fhandle[4], offset[8], rlen[4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Handle from a prior `open`.
    pub file_handle: [u8; 4],
    /// Byte offset to read from.
    pub offset: u64,
    /// Number of bytes requested.
    pub len: u32,
}

impl ReadRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.file_handle);
        out[4..12].copy_from_slice(&self.offset.to_be_bytes());
        out[12..16].copy_from_slice(&self.len.to_be_bytes());
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        let mut file_handle = [0u8; 4];
        file_handle.copy_from_slice(&opaque[0..4]);
        Self {
            file_handle,
            offset: u64::from_be_bytes(opaque[4..12].try_into().unwrap()),
            len: u32::from_be_bytes(opaque[12..16].try_into().unwrap()),
        }
    }
}

/// One `readv` chunk request: `(fhandle[4], rlen[4], offset[8])`, repeated
/// for the whole vectored request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadVChunk {
    /// Handle the chunk reads from.
    pub file_handle: [u8; 4],
    /// Number of bytes requested for this chunk.
    pub len: u32,
    /// Byte offset within the file.
    pub offset: u64,
}

const READV_CHUNK_LEN: usize = 16;

/// Encodes a list of `readv` chunks into a request body.
#[must_use]
pub fn encode_readv_request(chunks: &[ReadVChunk]) -> BytesMut {
    let mut out = BytesMut::with_capacity(chunks.len() * READV_CHUNK_LEN);
    for chunk in chunks {
        out.put_slice(&chunk.file_handle);
        out.put_u32(chunk.len);
        out.put_u64(chunk.offset);
    }
    out
}

/// Decodes a `readv` request body into its chunk list.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] if the body isn't an exact multiple of
/// the sixteen-byte chunk layout.
pub fn decode_readv_request(mut body: &[u8]) -> Result<Vec<ReadVChunk>, WireError> {
    if body.len() % READV_CHUNK_LEN != 0 {
        return Err(WireError::Truncated {
            expected: READV_CHUNK_LEN,
            actual: body.len() % READV_CHUNK_LEN,
        });
    }
    let mut chunks = Vec::with_capacity(body.len() / READV_CHUNK_LEN);
    while !body.is_empty() {
        let mut file_handle = [0u8; 4];
        file_handle.copy_from_slice(&body[0..4]);
        let len = u32::from_be_bytes(body[4..8].try_into().unwrap());
        let offset = u64::from_be_bytes(body[8..16].try_into().unwrap());
        chunks.push(ReadVChunk {
            file_handle,
            len,
            offset,
        });
        body = &body[READV_CHUNK_LEN..];
    }
    Ok(chunks)
}

/// `pgread` request: `fhandle[4], offset[8], rlen[4], reqflags[4]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgReadRequest {
    /// Handle from a prior `open`.
    pub file_handle: [u8; 4],
    /// Byte offset to read from.
    pub offset: u64,
    /// Number of bytes requested.
    pub len: u32,
    /// Request-time flags (e.g. skip per-page verification).
    pub req_flags: u32,
}

impl PgReadRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.file_handle);
        out[4..12].copy_from_slice(&self.offset.to_be_bytes());
        out[12..16].copy_from_slice(&self.len.to_be_bytes());
        out
    }

    /// Unpacks from the 16-byte opaque field. `req_flags` travels in the
    /// body rather than the opaque field, since the legacy layout has no
    /// room left for it; callers read it from the first four body bytes.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16], req_flags: u32) -> Self {
        let mut file_handle = [0u8; 4];
        file_handle.copy_from_slice(&opaque[0..4]);
        Self {
            file_handle,
            offset: u64::from_be_bytes(opaque[4..12].try_into().unwrap()),
            len: u32::from_be_bytes(opaque[12..16].try_into().unwrap()),
            req_flags,
        }
    }
}

const PGREAD_PAGE_LEN: usize = 4096;

/// One decoded `pgread` response page: the payload bytes and the CRC32C
/// the server interleaved after them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgPage {
    /// Page payload, `PGREAD_PAGE_LEN` bytes except possibly the last page
    /// of a response.
    pub data: Vec<u8>,
    /// CRC32C of `data` as reported by the server.
    pub crc32c: u32,
}

/// Splits a `pgread` response body into its interleaved `(page, crc32c)`
/// sequence.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] if a trailing checksum is cut short.
pub fn decode_pgread_response(mut body: &[u8]) -> Result<Vec<PgPage>, WireError> {
    let mut pages = Vec::new();
    while !body.is_empty() {
        let page_len = body.len().min(PGREAD_PAGE_LEN);
        require(body, page_len + 4)?;
        let data = body[..page_len].to_vec();
        let crc_offset = page_len;
        let crc32c = u32::from_be_bytes(body[crc_offset..crc_offset + 4].try_into().unwrap());
        pages.push(PgPage { data, crc32c });
        body = &body[page_len + 4..];
    }
    Ok(pages)
}

/// `write` request: `fhandle[4], offset[8], pathid[1], reserved[3]`,
/// followed by `dlen` payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    /// Handle from a prior `open`.
    pub file_handle: [u8; 4],
    /// Byte offset to write at.
    pub offset: u64,
    /// Sub-stream path id the payload should travel on.
    pub path_id: u8,
}

impl WriteRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.file_handle);
        out[4..12].copy_from_slice(&self.offset.to_be_bytes());
        out[12] = self.path_id;
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        let mut file_handle = [0u8; 4];
        file_handle.copy_from_slice(&opaque[0..4]);
        Self {
            file_handle,
            offset: u64::from_be_bytes(opaque[4..12].try_into().unwrap()),
            path_id: opaque[12],
        }
    }
}

/// `mv` request body: `path-from <SP> path-to`.
#[must_use]
pub fn encode_mv_request(from: &str, to: &str) -> BytesMut {
    let mut out = BytesMut::with_capacity(from.len() + to.len() + 1);
    out.put_slice(from.as_bytes());
    out.put_u8(b' ');
    out.put_slice(to.as_bytes());
    out
}

/// Decodes an `mv` request body.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] if no separating space is present.
pub fn decode_mv_request(body: &[u8]) -> Result<(String, String), WireError> {
    let text = String::from_utf8_lossy(body);
    let (from, to) = text.split_once(' ').ok_or(WireError::Truncated {
        expected: 1,
        actual: 0,
    })?;
    Ok((from.to_string(), to.to_string()))
}

/// `query` request: `infotype[2], reserved[2], fhandle[4], reserved[8]`,
/// followed by an opcode-defined `arg` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRequest {
    /// Which server-side fact is being asked for (space, checksum, config,
    /// ...).
    pub info_type: u16,
    /// Handle the query applies to, or all-zero for path-scoped queries.
    pub file_handle: [u8; 4],
}

impl QueryRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.info_type.to_be_bytes());
        out[4..8].copy_from_slice(&self.file_handle);
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        let mut file_handle = [0u8; 4];
        file_handle.copy_from_slice(&opaque[4..8]);
        Self {
            info_type: u16::from_be_bytes([opaque[0], opaque[1]]),
            file_handle,
        }
    }
}

/// `ping` request: no meaningful fields, a liveness check against the
/// current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingRequest;

impl PingRequest {
    /// Packs into the 16-byte opaque field (always zero).
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        [0u8; 16]
    }
}

/// `protocol` request: the client's supported version and capability
/// flags, used during `HandShake` negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolRequest {
    /// Client protocol version, e.g. `0x0005_0002` for 5.2.
    pub client_version: u32,
    /// Capability request flags (TLS, async, ...).
    pub flags: u32,
}

impl ProtocolRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.client_version.to_be_bytes());
        out[4..8].copy_from_slice(&self.flags.to_be_bytes());
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        Self {
            client_version: u32::from_be_bytes(opaque[0..4].try_into().unwrap()),
            flags: u32::from_be_bytes(opaque[4..8].try_into().unwrap()),
        }
    }
}

/// `truncate` request: `fhandle[4], reserved[4], size[8]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncateRequest {
    /// Handle from a prior `open`, or all-zero for a path-scoped truncate
    /// (path then travels in the body).
    pub file_handle: [u8; 4],
    /// New size in bytes.
    pub size: u64,
}

impl TruncateRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.file_handle);
        out[8..16].copy_from_slice(&self.size.to_be_bytes());
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        let mut file_handle = [0u8; 4];
        file_handle.copy_from_slice(&opaque[0..4]);
        Self {
            file_handle,
            size: u64::from_be_bytes(opaque[8..16].try_into().unwrap()),
        }
    }
}

/// `chmod` request: `mode[2], reserved[14]`, path as the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChmodRequest {
    /// POSIX-style permission bits to apply.
    pub mode: u16,
}

impl ChmodRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.mode.to_be_bytes());
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        Self {
            mode: u16::from_be_bytes([opaque[0], opaque[1]]),
        }
    }
}

/// `prepare` request: `options[2], prty[1], reserved[9], port[2], reserved[2]`,
/// path list as the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrepareRequest {
    /// Stage-ahead option flags.
    pub options: u16,
    /// Relative priority, 0-3.
    pub priority: u8,
}

impl PrepareRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.options.to_be_bytes());
        out[2] = self.priority;
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        Self {
            options: u16::from_be_bytes([opaque[0], opaque[1]]),
            priority: opaque[2],
        }
    }
}

/// `fattr` sub-operation: get, set, list, or delete an extended attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FattrOp {
    /// Fetch the value of one or more named attributes.
    Get,
    /// Set the value of a named attribute.
    Set,
    /// List attribute names.
    List,
    /// Remove a named attribute.
    Delete,
}

impl FattrOp {
    /// Decodes the sub-op byte.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Truncated`] for any value not named above,
    /// reusing `Truncated` since this is a malformed-frame condition
    /// rather than a distinct opcode.
    pub fn from_u8(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            1 => Self::Get,
            2 => Self::Set,
            3 => Self::List,
            4 => Self::Delete,
            _ => {
                return Err(WireError::Truncated {
                    expected: 1,
                    actual: 0,
                })
            }
        })
    }
}

/// `fattr` request: `fhandle[4], subop[1], numattr[1], reserved[10]`,
/// attribute name/value pairs as the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FattrRequest {
    /// Handle the attributes are scoped to.
    pub file_handle: [u8; 4],
    /// Which attribute operation this request performs.
    pub sub_op: FattrOp,
    /// Number of attribute entries in the body.
    pub num_attr: u8,
}

impl FattrRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.file_handle);
        out[4] = match self.sub_op {
            FattrOp::Get => 1,
            FattrOp::Set => 2,
            FattrOp::List => 3,
            FattrOp::Delete => 4,
        };
        out[5] = self.num_attr;
        out
    }
}

/// `sigver` envelope: wraps another request's header with a signing
/// sequence number and hash; this crate models only the fixed fields a
/// transport needs to strip before re-dispatching the inner request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigverRequest {
    /// Monotonically increasing per-stream signing sequence number.
    pub seq_no: u64,
}

impl SigverRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&self.seq_no.to_be_bytes());
        out
    }
}

/// `stat`/`statx` request: `options[2], reserved[10], fhandle[4]` for a
/// handle-scoped stat, or all-zero `fhandle` with the path carried in the
/// body for a path-scoped one. `statx` reuses the same opaque shape but
/// carries a newline-separated path list in the body instead of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatRequest {
    /// Bitmask of `kXR_vfs` / compression-info request flags.
    pub options: u16,
    /// Handle from a prior `open`, or all-zero for a path-scoped stat.
    pub file_handle: [u8; 4],
}

impl StatRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.options.to_be_bytes());
        out[12..16].copy_from_slice(&self.file_handle);
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        let mut file_handle = [0u8; 4];
        file_handle.copy_from_slice(&opaque[12..16]);
        Self {
            options: u16::from_be_bytes([opaque[0], opaque[1]]),
            file_handle,
        }
    }
}

/// A decoded `stat` response: the compact ASCII line
/// `id size flags mtime` the server reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatInfo {
    /// Server-internal inode-like identifier.
    pub id: u64,
    /// File size in bytes.
    pub size: u64,
    /// Bitmask of `kXR_isDir` / `kXR_other` / `kXR_offline` / ... flags.
    pub flags: u32,
    /// Last modification time, Unix seconds.
    pub mtime: i64,
}

/// Decodes a `stat` response body.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] if fewer than four whitespace-separated
/// fields are present.
pub fn decode_stat_response(body: &[u8]) -> Result<StatInfo, WireError> {
    let text = String::from_utf8_lossy(body);
    let mut fields = text.split_whitespace();
    let mut next_u64 = || -> Result<u64, WireError> {
        fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or(WireError::Truncated { expected: 1, actual: 0 })
    };
    let id = next_u64()?;
    let size = next_u64()?;
    let flags = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or(WireError::Truncated { expected: 1, actual: 0 })?;
    let mtime = fields
        .next()
        .and_then(|f| f.parse().ok())
        .ok_or(WireError::Truncated { expected: 1, actual: 0 })?;
    Ok(StatInfo { id, size, flags, mtime })
}

/// Encodes a `statx` request body: one path per line.
#[must_use]
pub fn encode_statx_request(paths: &[&str]) -> BytesMut {
    let mut out = BytesMut::new();
    for (idx, path) in paths.iter().enumerate() {
        if idx > 0 {
            out.put_u8(b'\n');
        }
        out.put_slice(path.as_bytes());
    }
    out
}

/// Decodes a `statx` response body: one flags byte per requested path, in
/// request order.
#[must_use]
pub fn decode_statx_response(body: &[u8]) -> Vec<u8> {
    body.to_vec()
}

/// `mkdir` request: `options[1], mode[2], reserved[13]`, path as the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MkdirRequest {
    /// Whether intermediate path components should be created too
    /// (`kXR_mkdirpath`).
    pub make_path: bool,
    /// POSIX-style permission bits applied to the new directory.
    pub mode: u16,
}

impl MkdirRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0] = u8::from(self.make_path);
        out[1..3].copy_from_slice(&self.mode.to_be_bytes());
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        Self {
            make_path: opaque[0] != 0,
            mode: u16::from_be_bytes([opaque[1], opaque[2]]),
        }
    }
}

/// `dirlist` request: `options[2], reserved[14]`, path as the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirlistOptions {
    /// Whether the response should interleave a `stat` line after each
    /// entry name (`kXR_dstat`).
    pub with_stat: bool,
}

impl DirlistOptions {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[1] = u8::from(self.with_stat);
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        Self {
            with_stat: opaque[1] != 0,
        }
    }
}

/// Decodes a `dirlist` response body: newline-separated entry names, each
/// optionally followed by a space and its compact `stat` line when
/// [`DirlistOptions::with_stat`] was requested (the stat suffix, if
/// present, is discarded — callers that need it issue a separate `stat`).
#[must_use]
pub fn decode_dirlist_response(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| line.split(' ').next().unwrap_or(line).to_string())
        .collect()
}

/// `bind` request: announces a sub-stream's path id against an existing
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindRequest {
    /// Session id of the primary stream being bound to.
    pub session_id: u64,
}

impl BindRequest {
    /// Packs into the 16-byte opaque field.
    #[must_use]
    pub fn to_opaque(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&self.session_id.to_be_bytes());
        out
    }

    /// Unpacks from the 16-byte opaque field.
    #[must_use]
    pub fn from_opaque(opaque: [u8; 16]) -> Self {
        Self {
            session_id: u64::from_be_bytes(opaque[0..8].try_into().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_options_round_trip() {
        let opts = OpenOptions {
            mode: 0o644,
            options: 0x0003,
        };
        assert_eq!(OpenOptions::from_opaque(opts.to_opaque()), opts);
    }

    #[test]
    fn read_request_round_trip() {
        let req = ReadRequest {
            file_handle: [1, 2, 3, 4],
            offset: 1 << 40,
            len: 65536,
        };
        assert_eq!(ReadRequest::from_opaque(req.to_opaque()), req);
    }

    #[test]
    fn write_request_round_trip() {
        let req = WriteRequest {
            file_handle: [9, 9, 9, 9],
            offset: 12345,
            path_id: 2,
        };
        assert_eq!(WriteRequest::from_opaque(req.to_opaque()), req);
    }

    #[test]
    fn readv_chunks_round_trip() {
        let chunks = vec![
            ReadVChunk {
                file_handle: [1, 0, 0, 0],
                len: 100,
                offset: 0,
            },
            ReadVChunk {
                file_handle: [2, 0, 0, 0],
                len: 200,
                offset: 4096,
            },
        ];
        let encoded = encode_readv_request(&chunks);
        assert_eq!(decode_readv_request(&encoded).unwrap(), chunks);
    }

    #[test]
    fn readv_rejects_misaligned_body() {
        assert!(decode_readv_request(&[0u8; 17]).is_err());
    }

    #[test]
    fn mv_request_round_trip() {
        let encoded = encode_mv_request("/a/b", "/a/c");
        assert_eq!(
            decode_mv_request(&encoded).unwrap(),
            ("/a/b".to_string(), "/a/c".to_string())
        );
    }

    #[test]
    fn open_response_with_and_without_stat() {
        let handle_only = decode_open_response(&[1, 2, 3, 4]).unwrap();
        assert_eq!(handle_only.file_handle, [1, 2, 3, 4]);
        assert!(handle_only.compact_stat.is_none());

        let mut with_stat = vec![1, 2, 3, 4];
        with_stat.extend_from_slice(b"0 1024 0 0");
        let decoded = decode_open_response(&with_stat).unwrap();
        assert_eq!(decoded.compact_stat.as_deref(), Some("0 1024 0 0"));
    }

    #[test]
    fn locate_response_parses_tokens() {
        let body = b"0 host1.example.org:1094 1 host2.example.org:1094";
        let entries = decode_locate_response(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].address, "host1.example.org:1094");
        assert_eq!(entries[0].flags, 0);
        assert_eq!(entries[1].flags, 1);
    }

    #[test]
    fn pgread_response_splits_pages_and_crc() {
        let mut body = vec![0xABu8; PGREAD_PAGE_LEN];
        body.extend_from_slice(&42u32.to_be_bytes());
        body.extend_from_slice(&[0xCDu8; 10]);
        body.extend_from_slice(&7u32.to_be_bytes());

        let pages = decode_pgread_response(&body).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].data.len(), PGREAD_PAGE_LEN);
        assert_eq!(pages[0].crc32c, 42);
        assert_eq!(pages[1].data, vec![0xCDu8; 10]);
        assert_eq!(pages[1].crc32c, 7);
    }

    #[test]
    fn bind_request_round_trip() {
        let req = BindRequest { session_id: 0xDEAD_BEEF };
        assert_eq!(BindRequest::from_opaque(req.to_opaque()), req);
    }

    #[test]
    fn truncate_request_round_trip() {
        let req = TruncateRequest {
            file_handle: [0, 0, 0, 1],
            size: 1 << 30,
        };
        assert_eq!(TruncateRequest::from_opaque(req.to_opaque()), req);
    }
}
