//! Per-buffer hash state.
//!
//! A [`HashContext`] carries everything that has to survive between
//! submissions of one logical buffer: the running digest words, the byte
//! count for the final length field, and up to one block of input that did not
//! yet fill a whole block. The same buffer doubles as scratch space for the
//! padded tail, so finishing a digest never allocates.

use std::fmt;

use crate::Digest;
use crate::error::ContextError;
use crate::job::Job;
use crate::kernel::{BLOCK_LEN, DigestWords, INIT_STATE};

/// Where a context is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Never submitted.
    Idle,
    /// Started and not yet finished. A context handed back in this state has
    /// consumed its last chunk and waits for UPDATE or LAST.
    Processing,
    /// The digest is final.
    Completed,
}

/// Which part of a buffer a submission carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Opens a new digest; more chunks follow.
    First,
    /// A middle chunk.
    Update,
    /// The closing chunk.
    Last,
    /// The whole buffer in one submission.
    Entire,
}

impl Flag {
    /// Starts a new digest.
    #[must_use]
    pub const fn is_first(self) -> bool {
        matches!(self, Self::First | Self::Entire)
    }

    /// Closes the digest.
    #[must_use]
    pub const fn is_last(self) -> bool {
        matches!(self, Self::Last | Self::Entire)
    }

    /// Numeric encoding: UPDATE=0, FIRST=1, LAST=2, ENTIRE=3.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Update => 0,
            Self::First => 1,
            Self::Last => 2,
            Self::Entire => 3,
        }
    }
}

impl TryFrom<u32> for Flag {
    type Error = ContextError;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        match bits {
            0 => Ok(Self::Update),
            1 => Ok(Self::First),
            2 => Ok(Self::Last),
            3 => Ok(Self::Entire),
            other => Err(ContextError::InvalidFlag(other)),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::First => "FIRST",
            Self::Update => "UPDATE",
            Self::Last => "LAST",
            Self::Entire => "ENTIRE",
        })
    }
}

/// State of one buffer being hashed, plus a caller-chosen tag.
///
/// The context is always owned by the caller. A
/// [`ContextManager`](crate::ContextManager) only borrows it between
/// submission and hand-back.
pub struct HashContext<T = ()> {
    digest: DigestWords,
    total_length: u64,
    status: Status,
    /// Partial block while streaming, padded tail while finishing.
    extra: [u8; 2 * BLOCK_LEN],
    partial_len: usize,
    last_requested: bool,
    padded: bool,
    user_tag: T,
}

impl<T> HashContext<T> {
    /// Creates an idle context carrying `user_tag`.
    pub const fn new(user_tag: T) -> Self {
        Self {
            digest: INIT_STATE,
            total_length: 0,
            status: Status::Idle,
            extra: [0; 2 * BLOCK_LEN],
            partial_len: 0,
            last_requested: false,
            padded: false,
            user_tag,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Returns `true` once the digest is final.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.status, Status::Completed)
    }

    /// Returns `true` if the context was never submitted.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.status, Status::Idle)
    }

    /// Running digest words. Final only once [`is_complete`](Self::is_complete).
    #[must_use]
    pub const fn digest_words(&self) -> &DigestWords {
        &self.digest
    }

    /// The digest as 16 little-endian bytes, once complete.
    #[must_use]
    pub fn result(&self) -> Option<Digest> {
        if !self.is_complete() {
            return None;
        }
        let mut out = [0u8; 16];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.digest) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Some(out)
    }

    /// Bytes submitted since the last FIRST or ENTIRE.
    #[must_use]
    pub const fn total_length(&self) -> u64 {
        self.total_length
    }

    /// The caller's tag.
    pub const fn user_tag(&self) -> &T {
        &self.user_tag
    }

    /// Mutable access to the caller's tag.
    pub const fn user_tag_mut(&mut self) -> &mut T {
        &mut self.user_tag
    }

    /// Consumes the context and returns its tag.
    pub fn into_user_tag(self) -> T {
        self.user_tag
    }

    /// Checks that `flag` is allowed in the current state.
    pub(crate) const fn check(&self, flag: Flag) -> Result<(), ContextError> {
        if flag.is_first() {
            return Ok(());
        }
        match self.status {
            Status::Idle => Err(ContextError::NotStarted { flag }),
            Status::Completed => Err(ContextError::AlreadyCompleted),
            Status::Processing => Ok(()),
        }
    }

    /// Records a new submission of `len` bytes.
    pub(crate) fn begin(&mut self, flag: Flag, len: usize) {
        if flag.is_first() {
            self.digest = INIT_STATE;
            self.total_length = 0;
            self.partial_len = 0;
            self.padded = false;
        }
        self.status = Status::Processing;
        self.last_requested = flag.is_last();
        self.total_length = self.total_length.wrapping_add(len as u64);
    }

    /// Tops up the partial block from `data`.
    ///
    /// Returns a one-block job when the partial block fills, and the input
    /// left over after the top-up.
    pub(crate) fn absorb<'d>(&mut self, data: &'d [u8]) -> (Option<Job<'d>>, &'d [u8]) {
        if self.partial_len == 0 {
            return (None, data);
        }

        let take = (BLOCK_LEN - self.partial_len).min(data.len());
        let (head, rest) = data.split_at(take);
        self.extra[self.partial_len..self.partial_len + take].copy_from_slice(head);
        self.partial_len += take;

        if self.partial_len == BLOCK_LEN {
            self.partial_len = 0;
            (Some(Job::extra(1)), rest)
        } else {
            (None, rest)
        }
    }

    /// Produces the next job for this context, consuming `pending`.
    ///
    /// Whole blocks are hashed straight from the caller's buffer and the tail
    /// is stashed in the partial block. Once the input is used up and LAST was
    /// requested, the padded tail follows. `None` means this submission is
    /// fully processed.
    pub(crate) fn next_job<'d>(&mut self, pending: &mut &'d [u8]) -> Option<Job<'d>> {
        if !pending.is_empty() {
            debug_assert_eq!(self.partial_len, 0);
            let data = std::mem::take(pending);
            let whole = data.len() - data.len() % BLOCK_LEN;
            let (blocks, tail) = data.split_at(whole);
            self.extra[..tail.len()].copy_from_slice(tail);
            self.partial_len = tail.len();
            if !blocks.is_empty() {
                return Some(Job::caller(blocks));
            }
        }

        if self.last_requested && !self.padded {
            return Some(Job::extra(self.pad()));
        }
        None
    }

    /// Writes the final padding after the partial block and returns its
    /// length in blocks.
    fn pad(&mut self) -> usize {
        let used = self.partial_len;
        let blocks = if used + 9 <= BLOCK_LEN { 1 } else { 2 };
        let end = blocks * BLOCK_LEN;

        self.extra[used] = 0x80;
        self.extra[used + 1..end - 8].fill(0);
        self.extra[end - 8..end].copy_from_slice(&self.total_length.wrapping_mul(8).to_le_bytes());

        self.partial_len = 0;
        self.padded = true;
        blocks
    }

    /// Returns a context cut off mid-job to the never-submitted state, so only
    /// FIRST or ENTIRE is accepted next.
    pub(crate) fn abandon(&mut self) {
        self.digest = INIT_STATE;
        self.total_length = 0;
        self.status = Status::Idle;
        self.partial_len = 0;
        self.last_requested = false;
        self.padded = false;
    }

    /// Marks the digest final if the padded tail has been hashed.
    pub(crate) fn settle(&mut self) {
        if self.padded {
            self.status = Status::Completed;
        }
    }

    pub(crate) const fn extra(&self) -> &[u8] {
        &self.extra
    }

    pub(crate) const fn set_digest(&mut self, digest: DigestWords) {
        self.digest = digest;
    }

    #[cfg(test)]
    pub(crate) const fn partial_len(&self) -> usize {
        self.partial_len
    }
}

impl<T: Default> Default for HashContext<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for HashContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashContext")
            .field("status", &self.status)
            .field("digest", &self.digest)
            .field("total_length", &self.total_length)
            .field("partial_len", &self.partial_len)
            .field("user_tag", &self.user_tag)
            .finish_non_exhaustive()
    }
}
