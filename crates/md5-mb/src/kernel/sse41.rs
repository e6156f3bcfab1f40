//! SSE4.1 4-lane MD5 kernel.
//!
//! Advances 4 independent MD5 states by one block using 128-bit XMM registers.
//!
//! # CPU Feature Requirements
//!
//! - **SSE4.1**: Intel Penryn (2007+), AMD Bulldozer (2011+) or newer
//! - Verified at runtime by the dispatcher before this kernel is handed out
//!
//! # SIMD Strategy
//!
//! SSE4.1 adds `blendv`, so restoring the state of idle lanes after a round
//! is a single instruction per state word instead of the AND/ANDNOT/OR triple
//! that plain SSE2 needs.

#![allow(unsafe_code)]
#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::x86_64::*;

use super::{Block, DigestWords, K, Kernel, Lanes};
use crate::dispatcher::Backend;

const LANES: usize = 4;

/// The 4-lane SSE4.1 kernel.
pub(crate) struct Sse41Kernel {
    _detected: (),
}

/// Only reachable through [`super::table`] once SSE4.1 has been detected.
pub(crate) static SSE41: Sse41Kernel = Sse41Kernel { _detected: () };

impl Kernel for Sse41Kernel {
    fn backend(&self) -> Backend {
        Backend::Sse41
    }

    fn lanes(&self) -> usize {
        LANES
    }

    fn compress(&self, state: &mut [DigestWords], blocks: &[Option<&Block>]) {
        let mut lanes = Lanes::<LANES>::gather(state, blocks);
        // SAFETY: this kernel is only bound after `sse4.1` was detected.
        unsafe { compress_x4(&mut lanes) };
        lanes.scatter(state);
    }
}

/// Rotate left by a compile-time amount.
macro_rules! rotl {
    ($x:expr, $s:literal) => {
        _mm_or_si128(_mm_slli_epi32::<$s>($x), _mm_srli_epi32::<{ 32 - $s }>($x))
    };
}

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn load(row: &[u32; LANES]) -> __m128i {
    _mm_loadu_si128(row.as_ptr().cast::<__m128i>())
}

#[inline]
#[target_feature(enable = "sse4.1")]
unsafe fn store(row: &mut [u32; LANES], value: __m128i) {
    _mm_storeu_si128(row.as_mut_ptr().cast::<__m128i>(), value);
}

/// Runs the 64 MD5 steps over all four lanes at once.
///
/// # Safety
///
/// Caller must ensure SSE4.1 is available.
#[target_feature(enable = "sse4.1")]
unsafe fn compress_x4(lanes: &mut Lanes<LANES>) {
    let mut a = load(&lanes.state[0]);
    let mut b = load(&lanes.state[1]);
    let mut c = load(&lanes.state[2]);
    let mut d = load(&lanes.state[3]);
    let mask = load(&lanes.active);

    let mut m = [_mm_setzero_si128(); 16];
    for (word, row) in m.iter_mut().zip(&lanes.words) {
        *word = load(row);
    }

    let aa = a;
    let bb = b;
    let cc = c;
    let dd = d;

    // Round 1
    macro_rules! round1 {
        ($a:ident, $b:ident, $c:ident, $d:ident, $mi:expr, $ki:expr, $s:literal) => {{
            let f = _mm_or_si128(_mm_and_si128($b, $c), _mm_andnot_si128($b, $d));
            let k = _mm_set1_epi32(K[$ki] as i32);
            let temp = _mm_add_epi32(_mm_add_epi32($a, f), _mm_add_epi32(k, m[$mi]));
            $a = _mm_add_epi32($b, rotl!(temp, $s));
        }};
    }

    round1!(a, b, c, d,  0,  0,  7); round1!(d, a, b, c,  1,  1, 12);
    round1!(c, d, a, b,  2,  2, 17); round1!(b, c, d, a,  3,  3, 22);
    round1!(a, b, c, d,  4,  4,  7); round1!(d, a, b, c,  5,  5, 12);
    round1!(c, d, a, b,  6,  6, 17); round1!(b, c, d, a,  7,  7, 22);
    round1!(a, b, c, d,  8,  8,  7); round1!(d, a, b, c,  9,  9, 12);
    round1!(c, d, a, b, 10, 10, 17); round1!(b, c, d, a, 11, 11, 22);
    round1!(a, b, c, d, 12, 12,  7); round1!(d, a, b, c, 13, 13, 12);
    round1!(c, d, a, b, 14, 14, 17); round1!(b, c, d, a, 15, 15, 22);

    // Round 2
    macro_rules! round2 {
        ($a:ident, $b:ident, $c:ident, $d:ident, $mi:expr, $ki:expr, $s:literal) => {{
            let g = _mm_or_si128(_mm_and_si128($b, $d), _mm_andnot_si128($d, $c));
            let k = _mm_set1_epi32(K[$ki] as i32);
            let temp = _mm_add_epi32(_mm_add_epi32($a, g), _mm_add_epi32(k, m[$mi]));
            $a = _mm_add_epi32($b, rotl!(temp, $s));
        }};
    }

    round2!(a, b, c, d,  1, 16,  5); round2!(d, a, b, c,  6, 17,  9);
    round2!(c, d, a, b, 11, 18, 14); round2!(b, c, d, a,  0, 19, 20);
    round2!(a, b, c, d,  5, 20,  5); round2!(d, a, b, c, 10, 21,  9);
    round2!(c, d, a, b, 15, 22, 14); round2!(b, c, d, a,  4, 23, 20);
    round2!(a, b, c, d,  9, 24,  5); round2!(d, a, b, c, 14, 25,  9);
    round2!(c, d, a, b,  3, 26, 14); round2!(b, c, d, a,  8, 27, 20);
    round2!(a, b, c, d, 13, 28,  5); round2!(d, a, b, c,  2, 29,  9);
    round2!(c, d, a, b,  7, 30, 14); round2!(b, c, d, a, 12, 31, 20);

    // Round 3
    macro_rules! round3 {
        ($a:ident, $b:ident, $c:ident, $d:ident, $mi:expr, $ki:expr, $s:literal) => {{
            let h = _mm_xor_si128(_mm_xor_si128($b, $c), $d);
            let k = _mm_set1_epi32(K[$ki] as i32);
            let temp = _mm_add_epi32(_mm_add_epi32($a, h), _mm_add_epi32(k, m[$mi]));
            $a = _mm_add_epi32($b, rotl!(temp, $s));
        }};
    }

    round3!(a, b, c, d,  5, 32,  4); round3!(d, a, b, c,  8, 33, 11);
    round3!(c, d, a, b, 11, 34, 16); round3!(b, c, d, a, 14, 35, 23);
    round3!(a, b, c, d,  1, 36,  4); round3!(d, a, b, c,  4, 37, 11);
    round3!(c, d, a, b,  7, 38, 16); round3!(b, c, d, a, 10, 39, 23);
    round3!(a, b, c, d, 13, 40,  4); round3!(d, a, b, c,  0, 41, 11);
    round3!(c, d, a, b,  3, 42, 16); round3!(b, c, d, a,  6, 43, 23);
    round3!(a, b, c, d,  9, 44,  4); round3!(d, a, b, c, 12, 45, 11);
    round3!(c, d, a, b, 15, 46, 16); round3!(b, c, d, a,  2, 47, 23);

    // Round 4
    macro_rules! round4 {
        ($a:ident, $b:ident, $c:ident, $d:ident, $mi:expr, $ki:expr, $s:literal) => {{
            let not_d = _mm_xor_si128($d, _mm_set1_epi32(-1));
            let i_val = _mm_xor_si128($c, _mm_or_si128($b, not_d));
            let k = _mm_set1_epi32(K[$ki] as i32);
            let temp = _mm_add_epi32(_mm_add_epi32($a, i_val), _mm_add_epi32(k, m[$mi]));
            $a = _mm_add_epi32($b, rotl!(temp, $s));
        }};
    }

    round4!(a, b, c, d,  0, 48,  6); round4!(d, a, b, c,  7, 49, 10);
    round4!(c, d, a, b, 14, 50, 15); round4!(b, c, d, a,  5, 51, 21);
    round4!(a, b, c, d, 12, 52,  6); round4!(d, a, b, c,  3, 53, 10);
    round4!(c, d, a, b, 10, 54, 15); round4!(b, c, d, a,  1, 55, 21);
    round4!(a, b, c, d,  8, 56,  6); round4!(d, a, b, c, 15, 57, 10);
    round4!(c, d, a, b,  6, 58, 15); round4!(b, c, d, a, 13, 59, 21);
    round4!(a, b, c, d,  4, 60,  6); round4!(d, a, b, c, 11, 61, 10);
    round4!(c, d, a, b,  2, 62, 15); round4!(b, c, d, a,  9, 63, 21);

    // Idle lanes keep the state they came in with.
    a = _mm_blendv_epi8(aa, _mm_add_epi32(a, aa), mask);
    b = _mm_blendv_epi8(bb, _mm_add_epi32(b, bb), mask);
    c = _mm_blendv_epi8(cc, _mm_add_epi32(c, cc), mask);
    d = _mm_blendv_epi8(dd, _mm_add_epi32(d, dd), mask);

    store(&mut lanes.state[0], a);
    store(&mut lanes.state[1], b);
    store(&mut lanes.state[2], c);
    store(&mut lanes.state[3], d);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::scalar::compress_block;
    use crate::kernel::{BLOCK_LEN, INIT_STATE};

    #[test]
    fn sse41_matches_scalar_on_mixed_lanes() {
        if !is_x86_feature_detected!("sse4.1") {
            return;
        }

        let blocks: Vec<Block> = (0..LANES as u8)
            .map(|lane| std::array::from_fn(|i| (i as u8).wrapping_mul(31) ^ lane))
            .collect();
        let refs = [Some(&blocks[0]), None, Some(&blocks[2]), Some(&blocks[3])];

        let mut state = [INIT_STATE, [1, 2, 3, 4], [5, 6, 7, 8], INIT_STATE];
        let mut expected = state;
        for (words, block) in expected.iter_mut().zip(&refs) {
            if let Some(block) = block {
                compress_block(words, block);
            }
        }

        SSE41.compress(&mut state, &refs);
        assert_eq!(state, expected);
    }

    #[test]
    fn sse41_handles_partial_width() {
        if !is_x86_feature_detected!("sse4.1") {
            return;
        }

        let block = [0x5a_u8; BLOCK_LEN];
        let mut state = [INIT_STATE; 2];
        let mut expected = INIT_STATE;
        compress_block(&mut expected, &block);

        SSE41.compress(&mut state, &[Some(&block), None]);
        assert_eq!(state[0], expected);
        assert_eq!(state[1], INIT_STATE);
    }
}
