//! Lane jobs: a run of whole blocks waiting for the kernel.

use crate::kernel::{BLOCK_LEN, Block};

/// Where a job's blocks live.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Source<'a> {
    /// Straight from the caller's buffer.
    Caller(&'a [u8]),
    /// The context's own partial/padding buffer, starting at `offset`.
    Extra { offset: usize },
}

/// Blocks still to be compressed for one context.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Job<'a> {
    source: Source<'a>,
    blocks: usize,
}

impl<'a> Job<'a> {
    /// Hashes `data`, which must be a whole number of blocks.
    pub(crate) fn caller(data: &'a [u8]) -> Self {
        debug_assert_eq!(data.len() % BLOCK_LEN, 0);
        Self {
            source: Source::Caller(data),
            blocks: data.len() / BLOCK_LEN,
        }
    }

    /// Hashes the first `blocks` blocks of the context's extra buffer.
    pub(crate) const fn extra(blocks: usize) -> Self {
        Self {
            source: Source::Extra { offset: 0 },
            blocks,
        }
    }

    pub(crate) const fn blocks(&self) -> usize {
        self.blocks
    }

    /// The next block, or `None` once the job is done.
    ///
    /// `extra` is the owning context's extra buffer.
    pub(crate) fn block<'s>(&'s self, extra: &'s [u8]) -> Option<&'s Block> {
        if self.blocks == 0 {
            return None;
        }
        match self.source {
            Source::Caller(data) => data.first_chunk(),
            Source::Extra { offset } => extra.get(offset..)?.first_chunk(),
        }
    }

    /// Moves past the block just compressed.
    pub(crate) fn advance(&mut self) {
        if self.blocks == 0 {
            return;
        }
        self.blocks -= 1;
        match &mut self.source {
            Source::Caller(data) => *data = data.get(BLOCK_LEN..).unwrap_or_default(),
            Source::Extra { offset } => *offset += BLOCK_LEN,
        }
    }
}
