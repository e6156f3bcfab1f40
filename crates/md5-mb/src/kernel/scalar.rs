//! Portable MD5 block transform.
//!
//! The reference every vector kernel is checked against. It has no lane
//! limit of its own, so the same code backs managers of any width.

use super::{Block, DigestWords, K, Kernel, MAX_LANES, MSG_INDEX, SHIFT, load_words};
use crate::dispatcher::Backend;

/// Scalar kernel that walks its lanes one after another.
///
/// `LANES` is the width the scheduler packs contexts into. Widths outside
/// `1..=MAX_LANES` are refused when a manager is bound to the kernel.
///
/// ```
/// use md5_mb::{ContextManager, ScalarKernel};
///
/// let manager = ContextManager::<()>::with_kernel(&ScalarKernel::<4>).unwrap();
/// assert_eq!(manager.lanes(), 4);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarKernel<const LANES: usize>;

impl<const LANES: usize> Kernel for ScalarKernel<LANES> {
    fn backend(&self) -> Backend {
        Backend::Scalar
    }

    fn lanes(&self) -> usize {
        LANES
    }

    fn compress(&self, state: &mut [DigestWords], blocks: &[Option<&Block>]) {
        debug_assert!(state.len() <= LANES.min(MAX_LANES));
        for (words, block) in state.iter_mut().zip(blocks) {
            if let Some(block) = block {
                compress_block(words, block);
            }
        }
    }
}

/// Compresses one block into `state` (RFC 1321, section 3.4).
pub fn compress_block(state: &mut DigestWords, block: &Block) {
    let m = load_words(block);
    let [mut a, mut b, mut c, mut d] = *state;

    for step in 0..64 {
        let f = match step / 16 {
            0 => (b & c) | (!b & d),
            1 => (b & d) | (c & !d),
            2 => b ^ c ^ d,
            _ => c ^ (b | !d),
        };
        let sum = a
            .wrapping_add(f)
            .wrapping_add(K[step])
            .wrapping_add(m[MSG_INDEX[step]]);
        a = d;
        d = c;
        c = b;
        b = b.wrapping_add(sum.rotate_left(SHIFT[step]));
    }

    state[0] = state[0].wrapping_add(a);
    state[1] = state[1].wrapping_add(b);
    state[2] = state[2].wrapping_add(c);
    state[3] = state[3].wrapping_add(d);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{BLOCK_LEN, INIT_STATE};

    /// Single padded block holding `"abc"`.
    fn abc_block() -> Block {
        let mut block = [0u8; BLOCK_LEN];
        block[..3].copy_from_slice(b"abc");
        block[3] = 0x80;
        block[56..].copy_from_slice(&24u64.to_le_bytes());
        block
    }

    #[test]
    fn compress_block_matches_rfc1321_abc() {
        let mut state = INIT_STATE;
        compress_block(&mut state, &abc_block());

        let bytes: Vec<u8> = state.iter().flat_map(|w| w.to_le_bytes()).collect();
        let expected = [
            0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1,
            0x7f, 0x72,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn idle_lanes_keep_their_state() {
        let block = abc_block();
        let mut state = [INIT_STATE; 4];
        let blocks = [None, Some(&block), None, Some(&block)];

        ScalarKernel::<4>.compress(&mut state, &blocks);

        assert_eq!(state[0], INIT_STATE);
        assert_eq!(state[2], INIT_STATE);
        assert_ne!(state[1], INIT_STATE);
        assert_eq!(state[1], state[3]);
    }
}
