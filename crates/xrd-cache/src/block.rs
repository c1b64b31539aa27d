//! One fixed-size block of a cached file and its fetch lifecycle.

use bytes::Bytes;

/// Identifies which [`crate::cacheio::CacheIo`] instance is (or was) the
/// one fetching a block. Readers observing a [`BlockState::Failed`] block
/// owned by an IO instance other than their own know the failure belongs
/// to a stale attempt and can safely retry rather than propagate someone
/// else's error.
pub type IoId = u64;

/// Where a block sits in its fetch-and-writeback lifecycle:
/// `Allocated -> Pending -> {Ok, Failed} -> Written`. A block becomes
/// evictable once it reaches `Written` and its reference count drops to
/// zero; eviction itself is tracked by [`Block::ref_count`] rather than a
/// separate state so that a block can't be purged while a reader still
/// holds a reference to its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Reserved in the block map but no fetch has been issued yet.
    Allocated,
    /// A fetch is in flight; readers joining now wait on the owning
    /// `File`'s download notifier instead of issuing a second fetch.
    Pending,
    /// The fetch completed and the bytes are held in RAM, not yet
    /// persisted to the data file.
    Ok,
    /// The fetch failed; [`Block::error`] holds the upstream message.
    Failed,
    /// The bytes have been written to the data file and the `.cinfo` bit
    /// set; the in-RAM copy may be dropped once no reader still holds it.
    Written,
}

/// One block's RAM buffer and lifecycle state, keyed by block index in
/// the owning `File`'s block map.
#[derive(Debug, Clone)]
pub struct Block {
    index: usize,
    state: BlockState,
    data: Option<Bytes>,
    error: Option<String>,
    owner_io: Option<IoId>,
    ref_count: usize,
}

impl Block {
    /// Allocates a fresh, empty block entry for `index`, owned by
    /// `owner_io` (the `CacheIo` instance about to fetch it).
    #[must_use]
    pub fn allocate(index: usize, owner_io: IoId) -> Self {
        Self {
            index,
            state: BlockState::Allocated,
            data: None,
            error: None,
            owner_io: Some(owner_io),
            ref_count: 0,
        }
    }

    /// The block's index within the file.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The block's current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> BlockState {
        self.state
    }

    /// The IO instance currently responsible for this block's fetch, if
    /// any.
    #[must_use]
    pub const fn owner_io(&self) -> Option<IoId> {
        self.owner_io
    }

    /// The failure detail recorded by [`Self::fail`], if the block is
    /// currently [`BlockState::Failed`].
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The fetched bytes, once [`BlockState::Ok`] or [`BlockState::Written`].
    #[must_use]
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    /// Number of readers currently holding a reference to this block
    /// (either waiting on its fetch or holding its bytes).
    #[must_use]
    pub const fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Registers a new reader, returning the updated count.
    pub fn add_ref(&mut self) -> usize {
        self.ref_count += 1;
        self.ref_count
    }

    /// Releases a reader's hold, returning the updated count. A count
    /// that reaches zero on a [`BlockState::Written`] block marks it
    /// evictable.
    pub fn release(&mut self) -> usize {
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count
    }

    /// Whether this block can be purged: written to disk and held by no
    /// in-flight reader.
    #[must_use]
    pub fn is_evictable(&self) -> bool {
        self.state == BlockState::Written && self.ref_count == 0
    }

    /// Marks the fetch as started.
    pub fn start_pending(&mut self) {
        self.state = BlockState::Pending;
    }

    /// Records a successful fetch.
    pub fn complete_ok(&mut self, data: Bytes) {
        self.data = Some(data);
        self.error = None;
        self.state = BlockState::Ok;
    }

    /// Records a failed fetch.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.state = BlockState::Failed;
    }

    /// Marks the block as persisted to the data file.
    pub fn mark_written(&mut self) {
        self.state = BlockState::Written;
    }

    /// Hands a failed block off to a new owning IO instance, clearing the
    /// prior error so it can be retried.
    ///
    /// This is the cross-IO recovery path: a block can outlive the
    /// `CacheIo` instance that was fetching it (e.g. a redirect swapped
    /// in a new upstream source), so a reader that observes
    /// [`BlockState::Failed`] under a *different* `owner_io` than its own
    /// calls this instead of propagating the stale error.
    pub fn reset_error_and_set_io(&mut self, new_owner: IoId) {
        self.error = None;
        self.state = BlockState::Allocated;
        self.owner_io = Some(new_owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_block_is_allocated_and_unowned_by_default_ref_count() {
        let block = Block::allocate(3, 1);
        assert_eq!(block.state(), BlockState::Allocated);
        assert_eq!(block.owner_io(), Some(1));
        assert_eq!(block.ref_count(), 0);
    }

    #[test]
    fn written_block_with_no_readers_is_evictable() {
        let mut block = Block::allocate(0, 1);
        block.start_pending();
        block.complete_ok(Bytes::from_static(b"data"));
        block.mark_written();
        assert!(block.is_evictable());

        block.add_ref();
        assert!(!block.is_evictable());
        block.release();
        assert!(block.is_evictable());
    }

    #[test]
    fn failed_block_carries_its_error() {
        let mut block = Block::allocate(0, 1);
        block.start_pending();
        block.fail("connection reset");
        assert_eq!(block.state(), BlockState::Failed);
        assert_eq!(block.error(), Some("connection reset"));
    }

    #[test]
    fn reset_error_and_set_io_clears_failure_and_reassigns_owner() {
        let mut block = Block::allocate(0, 1);
        block.start_pending();
        block.fail("stale redirect target");
        block.reset_error_and_set_io(2);
        assert_eq!(block.state(), BlockState::Allocated);
        assert_eq!(block.error(), None);
        assert_eq!(block.owner_io(), Some(2));
    }
}
