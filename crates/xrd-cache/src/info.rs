//! The `.cinfo` sidecar: a block-completion bitmap plus an access-record
//! history, persisted next to each cached file.
//!
//! Layout (all integers big-endian): a fixed header (`magic[4],
//! version[2], block_size[8], file_size[8], bitmap_len[4], access_cnt[4]`)
//! followed by `bitmap_len` bitmap bytes, followed by `access_cnt`
//! fixed-size [`AStat`] records. One set bit means the corresponding
//! on-disk block range is fully written — partial progress is never
//! represented as a set bit (§3's completion invariant).

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use fs2::FileExt;

use crate::CacheError;

const MAGIC: [u8; 4] = *b"XRDC";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 8 + 8 + 4 + 4;
const ASTAT_LEN: usize = 8 + 8 + 8 + 4 + 4;

/// One access-record entry: when a cache handle attached and detached,
/// how many bytes it read, and its block hit/miss counts. Appended, never
/// overwritten, matching `XrdFileCacheInfo`'s `AppendIOStat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AStat {
    /// Unix timestamp the access started.
    pub append_time: i64,
    /// Unix timestamp the access ended, or `0` while still attached.
    pub detach_time: i64,
    /// Total bytes read during this access.
    pub bytes_read: i64,
    /// Number of block reads satisfied from disk.
    pub hits: i32,
    /// Number of block reads that had to go upstream.
    pub miss: i32,
}

impl AStat {
    fn encode(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.append_time.to_be_bytes());
        out.extend_from_slice(&self.detach_time.to_be_bytes());
        out.extend_from_slice(&self.bytes_read.to_be_bytes());
        out.extend_from_slice(&self.hits.to_be_bytes());
        out.extend_from_slice(&self.miss.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            append_time: i64::from_be_bytes(bytes[0..8].try_into().unwrap()),
            detach_time: i64::from_be_bytes(bytes[8..16].try_into().unwrap()),
            bytes_read: i64::from_be_bytes(bytes[16..24].try_into().unwrap()),
            hits: i32::from_be_bytes(bytes[24..28].try_into().unwrap()),
            miss: i32::from_be_bytes(bytes[28..32].try_into().unwrap()),
        }
    }
}

/// The `.cinfo` sidecar for one cached file: a block-completion bitmap
/// and the access-record history appended across every attach/detach.
#[derive(Debug, Clone)]
pub struct Info {
    block_size: u64,
    file_size: u64,
    bitmap: Vec<u8>,
    block_count: usize,
    access_records: Vec<AStat>,
}

impl Info {
    /// Starts a fresh, fully-empty sidecar for a file of `file_size`
    /// bytes cached in `block_size`-byte blocks.
    ///
    /// `block_count = ceil(file_size / block_size)`, per §3's invariant.
    #[must_use]
    pub fn new(file_size: u64, block_size: u64) -> Self {
        let block_size = block_size.max(1);
        let block_count = file_size.div_ceil(block_size) as usize;
        let bitmap_bytes = block_count.div_ceil(8).max(1);
        Self {
            block_size,
            file_size,
            bitmap: vec![0u8; bitmap_bytes],
            block_count,
            access_records: Vec::new(),
        }
    }

    /// The configured block size, in bytes.
    #[must_use]
    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    /// The file size this sidecar was created for.
    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of blocks the bitmap tracks.
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.block_count
    }

    /// Size of the bitmap, in bytes.
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.bitmap.len()
    }

    /// Marks block `i` as fully written.
    pub fn set_bit(&mut self, i: usize) {
        let (byte, mask) = Self::bit_location(i);
        self.bitmap[byte] |= mask;
    }

    /// Whether block `i` is marked complete.
    #[must_use]
    pub fn test_bit(&self, i: usize) -> bool {
        let (byte, mask) = Self::bit_location(i);
        self.bitmap[byte] & mask == mask
    }

    fn bit_location(i: usize) -> (usize, u8) {
        (i / 8, 1u8 << (i % 8))
    }

    /// Whether any block in `first..=last` is still incomplete.
    #[must_use]
    pub fn is_anything_empty_in_range(&self, first: usize, last: usize) -> bool {
        (first..=last.min(self.block_count.saturating_sub(1))).any(|i| !self.test_bit(i))
    }

    /// Whether every block is marked complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.is_anything_empty_in_range(0, self.block_count.saturating_sub(1))
    }

    /// Appends an access record.
    pub fn append_access(&mut self, stat: AStat) {
        self.access_records.push(stat);
    }

    /// The access-record history, oldest first.
    #[must_use]
    pub fn access_records(&self) -> &[AStat] {
        &self.access_records
    }

    /// The most recent access record's append time, if any exist.
    #[must_use]
    pub fn latest_attach_time(&self) -> Option<i64> {
        self.access_records.last().map(|a| a.append_time)
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.bitmap.len() + self.access_records.len() * ASTAT_LEN);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&self.block_size.to_be_bytes());
        out.extend_from_slice(&self.file_size.to_be_bytes());
        out.extend_from_slice(&(self.bitmap.len() as u32).to_be_bytes());
        out.extend_from_slice(&(self.access_records.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.bitmap);
        for record in &self.access_records {
            record.encode(&mut out);
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        if bytes.len() < HEADER_LEN || bytes[0..4] != MAGIC {
            return Err(CacheError::CorruptSidecar("bad magic or truncated header".into()));
        }
        let version = u16::from_be_bytes(bytes[4..6].try_into().unwrap());
        if version != VERSION {
            return Err(CacheError::CorruptSidecar(format!("unsupported version {version}")));
        }
        let block_size = u64::from_be_bytes(bytes[6..14].try_into().unwrap());
        let file_size = u64::from_be_bytes(bytes[14..22].try_into().unwrap());
        let bitmap_len = u32::from_be_bytes(bytes[22..26].try_into().unwrap()) as usize;
        let access_cnt = u32::from_be_bytes(bytes[26..30].try_into().unwrap()) as usize;

        let bitmap_end = HEADER_LEN + bitmap_len;
        if bytes.len() < bitmap_end + access_cnt * ASTAT_LEN {
            return Err(CacheError::CorruptSidecar("truncated body".into()));
        }
        let bitmap = bytes[HEADER_LEN..bitmap_end].to_vec();
        let mut access_records = Vec::with_capacity(access_cnt);
        for i in 0..access_cnt {
            let start = bitmap_end + i * ASTAT_LEN;
            access_records.push(AStat::decode(&bytes[start..start + ASTAT_LEN]));
        }
        let block_count = file_size.div_ceil(block_size.max(1)) as usize;
        Ok(Self {
            block_size,
            file_size,
            bitmap,
            block_count,
            access_records,
        })
    }

    /// Reads and decodes a sidecar from `path`, taking a shared advisory
    /// lock for the duration of the read.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] on any I/O failure, or
    /// [`CacheError::CorruptSidecar`] if the file isn't a valid `.cinfo`.
    pub fn read_from(path: &Path) -> Result<Self, CacheError> {
        let mut file = File::open(path)?;
        file.lock_shared()?;
        let mut buf = Vec::new();
        let result = file.read_to_end(&mut buf);
        let _ = file.unlock();
        result?;
        Self::decode(&buf)
    }

    /// Writes this sidecar to `path`, taking an exclusive advisory lock
    /// for the duration of the write and replacing any prior contents.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] on any I/O failure.
    pub fn write_to(&self, path: &Path) -> Result<(), CacheError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.lock_exclusive()?;
        let result = file.write_all(&self.encode());
        let _ = file.unlock();
        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_count_matches_ceiling_division() {
        let info = Info::new(1000, 300);
        assert_eq!(info.block_count(), 4);
    }

    #[test]
    fn set_and_test_bit_round_trip() {
        let mut info = Info::new(1000, 300);
        assert!(!info.test_bit(2));
        info.set_bit(2);
        assert!(info.test_bit(2));
    }

    #[test]
    fn is_complete_requires_every_block() {
        let mut info = Info::new(1000, 300);
        assert!(!info.is_complete());
        for i in 0..info.block_count() {
            info.set_bit(i);
        }
        assert!(info.is_complete());
    }

    #[test]
    fn is_anything_empty_in_range_checks_only_requested_blocks() {
        let mut info = Info::new(1000, 300);
        info.set_bit(0);
        info.set_bit(1);
        assert!(!info.is_anything_empty_in_range(0, 1));
        assert!(info.is_anything_empty_in_range(0, 3));
    }

    #[test]
    fn encode_decode_round_trip_preserves_bitmap_and_access_records() {
        let mut info = Info::new(50_000, 16_384);
        info.set_bit(0);
        info.set_bit(2);
        info.append_access(AStat {
            append_time: 1000,
            detach_time: 1100,
            bytes_read: 4096,
            hits: 3,
            miss: 1,
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.cinfo");
        info.write_to(&path).unwrap();
        let restored = Info::read_from(&path).unwrap();

        assert_eq!(restored.block_size(), info.block_size());
        assert_eq!(restored.file_size(), info.file_size());
        assert!(restored.test_bit(0));
        assert!(restored.test_bit(2));
        assert!(!restored.test_bit(1));
        assert_eq!(restored.access_records(), info.access_records());
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let bytes = vec![0u8; HEADER_LEN];
        assert!(matches!(Info::decode(&bytes), Err(CacheError::CorruptSidecar(_))));
    }
}
