//! ARM NEON 4-lane MD5 kernel.
//!
//! # Safety
//!
//! NEON is part of the aarch64 baseline, but the dispatcher still confirms it
//! with `is_aarch64_feature_detected!("neon")` before binding this kernel.
//! Loads and stores go through `vld1q_u32`/`vst1q_u32`, which have no
//! alignment requirement.
//!
//! The MD5 round functions map onto single instructions: `vbslq_u32` is a
//! bitwise select, which is exactly F and G, and `vornq_u32` gives the
//! `b | !d` term of I.

#![allow(unsafe_code)]
#![allow(unsafe_op_in_unsafe_fn)]

use core::arch::aarch64::{
    uint32x4_t, vaddq_u32, vbslq_u32, vdupq_n_u32, veorq_u32, vld1q_u32, vornq_u32, vorrq_u32,
    vshlq_n_u32, vshrq_n_u32, vst1q_u32,
};

use super::{Block, DigestWords, K, Kernel, Lanes};
use crate::dispatcher::Backend;

const LANES: usize = 4;

/// The 4-lane NEON kernel.
pub(crate) struct NeonKernel {
    _detected: (),
}

/// Only reachable through [`super::table`] once NEON has been detected.
pub(crate) static NEON: NeonKernel = NeonKernel { _detected: () };

impl Kernel for NeonKernel {
    fn backend(&self) -> Backend {
        Backend::Neon
    }

    fn lanes(&self) -> usize {
        LANES
    }

    fn compress(&self, state: &mut [DigestWords], blocks: &[Option<&Block>]) {
        let mut lanes = Lanes::<LANES>::gather(state, blocks);
        // SAFETY: this kernel is only bound after `neon` was detected.
        unsafe { compress_x4(&mut lanes) };
        lanes.scatter(state);
    }
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn rotl<const L: i32, const R: i32>(x: uint32x4_t) -> uint32x4_t {
    vorrq_u32(vshlq_n_u32::<L>(x), vshrq_n_u32::<R>(x))
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn f(b: uint32x4_t, c: uint32x4_t, d: uint32x4_t) -> uint32x4_t {
    vbslq_u32(b, c, d)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn g(b: uint32x4_t, c: uint32x4_t, d: uint32x4_t) -> uint32x4_t {
    vbslq_u32(d, b, c)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn h(b: uint32x4_t, c: uint32x4_t, d: uint32x4_t) -> uint32x4_t {
    veorq_u32(veorq_u32(b, c), d)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn i(b: uint32x4_t, c: uint32x4_t, d: uint32x4_t) -> uint32x4_t {
    veorq_u32(c, vornq_u32(b, d))
}

/// Runs the 64 MD5 steps over all four lanes at once.
///
/// # Safety
///
/// Caller must ensure NEON is available.
#[target_feature(enable = "neon")]
unsafe fn compress_x4(lanes: &mut Lanes<LANES>) {
    let mut a = vld1q_u32(lanes.state[0].as_ptr());
    let mut b = vld1q_u32(lanes.state[1].as_ptr());
    let mut c = vld1q_u32(lanes.state[2].as_ptr());
    let mut d = vld1q_u32(lanes.state[3].as_ptr());
    let mask = vld1q_u32(lanes.active.as_ptr());

    let mut m = [vdupq_n_u32(0); 16];
    for (word, row) in m.iter_mut().zip(&lanes.words) {
        *word = vld1q_u32(row.as_ptr());
    }

    let aa = a;
    let bb = b;
    let cc = c;
    let dd = d;

    macro_rules! step {
        ($func:ident, $a:ident, $b:ident, $c:ident, $d:ident, $mi:expr, $ki:expr, $s:literal) => {{
            let temp = vaddq_u32(
                vaddq_u32($a, $func($b, $c, $d)),
                vaddq_u32(vdupq_n_u32(K[$ki]), m[$mi]),
            );
            $a = vaddq_u32($b, rotl::<$s, { 32 - $s }>(temp));
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

    a = vbslq_u32(mask, vaddq_u32(a, aa), aa);
    b = vbslq_u32(mask, vaddq_u32(b, bb), bb);
    c = vbslq_u32(mask, vaddq_u32(c, cc), cc);
    d = vbslq_u32(mask, vaddq_u32(d, dd), dd);

    vst1q_u32(lanes.state[0].as_mut_ptr(), a);
    vst1q_u32(lanes.state[1].as_mut_ptr(), b);
    vst1q_u32(lanes.state[2].as_mut_ptr(), c);
    vst1q_u32(lanes.state[3].as_mut_ptr(), d);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::INIT_STATE;
    use crate::kernel::scalar::compress_block;

    #[test]
    fn neon_matches_scalar_on_mixed_lanes() {
        if !std::arch::is_aarch64_feature_detected!("neon") {
            return;
        }

        let first = [0x11_u8; 64];
        let second: Block = std::array::from_fn(|n| n as u8);
        let refs = [Some(&first), None, Some(&second), None];

        let mut state = [INIT_STATE; LANES];
        let mut expected = state;
        compress_block(&mut expected[0], &first);
        compress_block(&mut expected[2], &second);

        NEON.compress(&mut state, &refs);
        assert_eq!(state, expected);
    }
}
