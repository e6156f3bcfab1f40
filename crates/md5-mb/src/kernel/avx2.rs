//! AVX2 8-lane MD5 kernel.
//!
//! Advances 8 independent MD5 states by one block using 256-bit YMM registers.
//! AVX2 has no vector rotate, so rotations are a shift pair joined by OR.

#![allow(unsafe_code)]
#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::x86_64::*;

use super::{Block, DigestWords, K, Kernel, Lanes};
use crate::dispatcher::Backend;

const LANES: usize = 8;

/// The 8-lane AVX2 kernel.
pub(crate) struct Avx2Kernel {
    _detected: (),
}

/// Only reachable through [`super::table`] once AVX2 has been detected.
pub(crate) static AVX2: Avx2Kernel = Avx2Kernel { _detected: () };

impl Kernel for Avx2Kernel {
    fn backend(&self) -> Backend {
        Backend::Avx2
    }

    fn lanes(&self) -> usize {
        LANES
    }

    fn compress(&self, state: &mut [DigestWords], blocks: &[Option<&Block>]) {
        let mut lanes = Lanes::<LANES>::gather(state, blocks);
        // SAFETY: this kernel is only bound after `avx2` was detected.
        unsafe { compress_x8(&mut lanes) };
        lanes.scatter(state);
    }
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn rotl<const L: i32, const R: i32>(x: __m256i) -> __m256i {
    _mm256_or_si256(_mm256_slli_epi32::<L>(x), _mm256_srli_epi32::<R>(x))
}

/// `(b & c) | (!b & d)`
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn f(b: __m256i, c: __m256i, d: __m256i) -> __m256i {
    _mm256_or_si256(_mm256_and_si256(b, c), _mm256_andnot_si256(b, d))
}

/// `(b & d) | (c & !d)`
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn g(b: __m256i, c: __m256i, d: __m256i) -> __m256i {
    _mm256_or_si256(_mm256_and_si256(b, d), _mm256_andnot_si256(d, c))
}

/// `b ^ c ^ d`
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn h(b: __m256i, c: __m256i, d: __m256i) -> __m256i {
    _mm256_xor_si256(_mm256_xor_si256(b, c), d)
}

/// `c ^ (b | !d)`
#[inline]
#[target_feature(enable = "avx2")]
unsafe fn i(b: __m256i, c: __m256i, d: __m256i) -> __m256i {
    let not_d = _mm256_xor_si256(d, _mm256_set1_epi32(-1));
    _mm256_xor_si256(c, _mm256_or_si256(b, not_d))
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn load(row: &[u32; LANES]) -> __m256i {
    _mm256_loadu_si256(row.as_ptr().cast::<__m256i>())
}

#[inline]
#[target_feature(enable = "avx2")]
unsafe fn store(row: &mut [u32; LANES], value: __m256i) {
    _mm256_storeu_si256(row.as_mut_ptr().cast::<__m256i>(), value);
}

/// Runs the 64 MD5 steps over all eight lanes at once.
///
/// # Safety
///
/// Caller must ensure AVX2 is available.
#[target_feature(enable = "avx2")]
unsafe fn compress_x8(lanes: &mut Lanes<LANES>) {
    let mut a = load(&lanes.state[0]);
    let mut b = load(&lanes.state[1]);
    let mut c = load(&lanes.state[2]);
    let mut d = load(&lanes.state[3]);
    let mask = load(&lanes.active);

    let mut m = [_mm256_setzero_si256(); 16];
    for (word, row) in m.iter_mut().zip(&lanes.words) {
        *word = load(row);
    }

    let aa = a;
    let bb = b;
    let cc = c;
    let dd = d;

    macro_rules! step {
        ($func:ident, $a:ident, $b:ident, $c:ident, $d:ident, $mi:expr, $ki:expr, $s:literal) => {{
            let k = _mm256_set1_epi32(K[$ki] as i32);
            let temp = _mm256_add_epi32(
                _mm256_add_epi32($a, $func($b, $c, $d)),
                _mm256_add_epi32(k, m[$mi]),
            );
            $a = _mm256_add_epi32($b, rotl::<$s, { 32 - $s }>(temp));
        }};
    }

    step!(f, a, b, c, d,  0,  0,  7); step!(f, d, a, b, c,  1,  1, 12);
    step!(f, c, d, a, b,  2,  2, 17); step!(f, b, c, d, a,  3,  3, 22);
    step!(f, a, b, c, d,  4,  4,  7); step!(f, d, a, b, c,  5,  5, 12);
    step!(f, c, d, a, b,  6,  6, 17); step!(f, b, c, d, a,  7,  7, 22);
    step!(f, a, b, c, d,  8,  8,  7); step!(f, d, a, b, c,  9,  9, 12);
    step!(f, c, d, a, b, 10, 10, 17); step!(f, b, c, d, a, 11, 11, 22);
    step!(f, a, b, c, d, 12, 12,  7); step!(f, d, a, b, c, 13, 13, 12);
    step!(f, c, d, a, b, 14, 14, 17); step!(f, b, c, d, a, 15, 15, 22);

    step!(g, a, b, c, d,  1, 16,  5); step!(g, d, a, b, c,  6, 17,  9);
    step!(g, c, d, a, b, 11, 18, 14); step!(g, b, c, d, a,  0, 19, 20);
    step!(g, a, b, c, d,  5, 20,  5); step!(g, d, a, b, c, 10, 21,  9);
    step!(g, c, d, a, b, 15, 22, 14); step!(g, b, c, d, a,  4, 23, 20);
    step!(g, a, b, c, d,  9, 24,  5); step!(g, d, a, b, c, 14, 25,  9);
    step!(g, c, d, a, b,  3, 26, 14); step!(g, b, c, d, a,  8, 27, 20);
    step!(g, a, b, c, d, 13, 28,  5); step!(g, d, a, b, c,  2, 29,  9);
    step!(g, c, d, a, b,  7, 30, 14); step!(g, b, c, d, a, 12, 31, 20);

    step!(h, a, b, c, d,  5, 32,  4); step!(h, d, a, b, c,  8, 33, 11);
    step!(h, c, d, a, b, 11, 34, 16); step!(h, b, c, d, a, 14, 35, 23);
    step!(h, a, b, c, d,  1, 36,  4); step!(h, d, a, b, c,  4, 37, 11);
    step!(h, c, d, a, b,  7, 38, 16); step!(h, b, c, d, a, 10, 39, 23);
    step!(h, a, b, c, d, 13, 40,  4); step!(h, d, a, b, c,  0, 41, 11);
    step!(h, c, d, a, b,  3, 42, 16); step!(h, b, c, d, a,  6, 43, 23);
    step!(h, a, b, c, d,  9, 44,  4); step!(h, d, a, b, c, 12, 45, 11);
    step!(h, c, d, a, b, 15, 46, 16); step!(h, b, c, d, a,  2, 47, 23);

    step!(i, a, b, c, d,  0, 48,  6); step!(i, d, a, b, c,  7, 49, 10);
    step!(i, c, d, a, b, 14, 50, 15); step!(i, b, c, d, a,  5, 51, 21);
    step!(i, a, b, c, d, 12, 52,  6); step!(i, d, a, b, c,  3, 53, 10);
    step!(i, c, d, a, b, 10, 54, 15); step!(i, b, c, d, a,  1, 55, 21);
    step!(i, a, b, c, d,  8, 56,  6); step!(i, d, a, b, c, 15, 57, 10);
    step!(i, c, d, a, b,  6, 58, 15); step!(i, b, c, d, a, 13, 59, 21);
    step!(i, a, b, c, d,  4, 60,  6); step!(i, d, a, b, c, 11, 61, 10);
    step!(i, c, d, a, b,  2, 62, 15); step!(i, b, c, d, a,  9, 63, 21);

    a = _mm256_blendv_epi8(aa, _mm256_add_epi32(a, aa), mask);
    b = _mm256_blendv_epi8(bb, _mm256_add_epi32(b, bb), mask);
    c = _mm256_blendv_epi8(cc, _mm256_add_epi32(c, cc), mask);
    d = _mm256_blendv_epi8(dd, _mm256_add_epi32(d, dd), mask);

    store(&mut lanes.state[0], a);
    store(&mut lanes.state[1], b);
    store(&mut lanes.state[2], c);
    store(&mut lanes.state[3], d);
}
