//! Block-compression kernels for MD5.
//!
//! A kernel advances several independent MD5 states by exactly one 64-byte
//! block per call. The lane scheduler owns the states and decides which lanes
//! have a block ready; the kernel only runs the 64 rounds.
//!
//! # Available Kernels
//!
//! ## x86_64
//!
//! - **SSE4.1**: 4 lanes, `blendv` keeps idle lanes unchanged
//! - **AVX2**: 8 lanes, 256-bit operations
//!
//! ## ARM
//!
//! - **NEON**: 4 lanes, bit-select keeps idle lanes unchanged
//!
//! ## Portable
//!
//! - **Scalar**: any width up to [`MAX_LANES`], always available
//!
//! # Data Layout
//!
//! Vector kernels work on a transposed copy of the lanes: one register holds
//! the same state word (A, B, C or D) of every lane, and message word `i` of
//! every lane's block sits in register `m[i]`. Lanes without a block get a
//! zero block and their old state is blended back afterwards.
//!
//! # Safety
//!
//! Vector kernels are crate-private statics. The only way to reach one from
//! outside the crate is [`Backend::kernel`](crate::Backend::kernel), which
//! checks the probed CPU features first.

use std::fmt;

use crate::dispatcher::Backend;

pub mod scalar;

#[cfg(target_arch = "x86_64")]
mod sse41;

#[cfg(target_arch = "x86_64")]
mod avx2;

#[cfg(target_arch = "aarch64")]
mod neon;

pub use scalar::ScalarKernel;

/// Bytes consumed by one compression round.
pub const BLOCK_LEN: usize = 64;

/// Number of 32-bit words in the MD5 state.
pub const DIGEST_WORDS: usize = 4;

/// Upper bound on the lane count of any kernel.
pub const MAX_LANES: usize = 16;

/// Lane width of the portable kernel bound on hosts without vector support.
pub const SCALAR_LANES: usize = 8;

/// One input block.
pub type Block = [u8; BLOCK_LEN];

/// Running MD5 state: A, B, C, D.
pub type DigestWords = [u32; DIGEST_WORDS];

/// MD5 initial state (RFC 1321).
pub const INIT_STATE: DigestWords = [0x6745_2301, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476];

/// Additive round constants, `K[i] = floor(2^32 * abs(sin(i + 1)))`.
pub(crate) const K: [u32; 64] = [
    0xd76a_a478, 0xe8c7_b756, 0x2420_70db, 0xc1bd_ceee, 0xf57c_0faf, 0x4787_c62a, 0xa830_4613, 0xfd46_9501,
    0x6980_98d8, 0x8b44_f7af, 0xffff_5bb1, 0x895c_d7be, 0x6b90_1122, 0xfd98_7193, 0xa679_438e, 0x49b4_0821,
    0xf61e_2562, 0xc040_b340, 0x265e_5a51, 0xe9b6_c7aa, 0xd62f_105d, 0x0244_1453, 0xd8a1_e681, 0xe7d3_fbc8,
    0x21e1_cde6, 0xc337_07d6, 0xf4d5_0d87, 0x455a_14ed, 0xa9e3_e905, 0xfcef_a3f8, 0x676f_02d9, 0x8d2a_4c8a,
    0xfffa_3942, 0x8771_f681, 0x6d9d_6122, 0xfde5_380c, 0xa4be_ea44, 0x4bde_cfa9, 0xf6bb_4b60, 0xbebf_bc70,
    0x289b_7ec6, 0xeaa1_27fa, 0xd4ef_3085, 0x0488_1d05, 0xd9d4_d039, 0xe6db_99e5, 0x1fa2_7cf8, 0xc4ac_5665,
    0xf429_2244, 0x432a_ff97, 0xab94_23a7, 0xfc93_a039, 0x655b_59c3, 0x8f0c_cc92, 0xffef_f47d, 0x8584_5dd1,
    0x6fa8_7e4f, 0xfe2c_e6e0, 0xa301_4314, 0x4e08_11a1, 0xf753_7e82, 0xbd3a_f235, 0x2ad7_d2bb, 0xeb86_d391,
];

/// Message word read by each step.
pub(crate) const MSG_INDEX: [usize; 64] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
    1, 6, 11, 0, 5, 10, 15, 4, 9, 14, 3, 8, 13, 2, 7, 12,
    5, 8, 11, 14, 1, 4, 7, 10, 13, 0, 3, 6, 9, 12, 15, 2,
    0, 7, 14, 5, 12, 3, 10, 1, 8, 15, 6, 13, 4, 11, 2, 9,
];

/// Left rotation applied by each step.
pub(crate) const SHIFT: [u32; 64] = [
    7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22,
    5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20,
    4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 4, 11, 16, 23,
    6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
];

/// A multi-lane MD5 block transform.
///
/// `state` and `blocks` always have the same length, at most [`lanes`](Self::lanes).
/// For every index with `Some(block)` the kernel compresses that block into
/// `state[index]`; entries with `None` are idle passengers and must come back
/// unchanged. Results must be bit-identical to the RFC 1321 transform no matter
/// how many lanes are active.
pub trait Kernel: Send + Sync {
    /// Backend this kernel implements.
    fn backend(&self) -> Backend;

    /// Number of lanes advanced per call.
    fn lanes(&self) -> usize;

    /// Advances every lane that has a block by one compression round.
    fn compress(&self, state: &mut [DigestWords], blocks: &[Option<&Block>]);
}

impl fmt::Debug for dyn Kernel + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("backend", &self.backend())
            .field("lanes", &self.lanes())
            .finish()
    }
}

/// Returns the kernel for `backend` without checking CPU support.
///
/// Callers must have confirmed the backend against the probed features.
pub(crate) fn table(backend: Backend) -> &'static dyn Kernel {
    match backend {
        #[cfg(target_arch = "x86_64")]
        Backend::Avx2 => &avx2::AVX2,
        #[cfg(target_arch = "x86_64")]
        Backend::Sse41 => &sse41::SSE41,
        #[cfg(target_arch = "aarch64")]
        Backend::Neon => &neon::NEON,
        _ => &ScalarKernel::<SCALAR_LANES>,
    }
}

/// Decodes the sixteen little-endian message words of a block.
#[inline]
pub(crate) fn load_words(block: &Block) -> [u32; 16] {
    std::array::from_fn(|i| {
        let at = i * 4;
        u32::from_le_bytes([block[at], block[at + 1], block[at + 2], block[at + 3]])
    })
}

/// Transposed copy of up to `N` lanes, laid out for vector loads.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
#[repr(C, align(32))]
pub(crate) struct Lanes<const N: usize> {
    /// `state[w][lane]` is word `w` of that lane's state.
    pub(crate) state: [[u32; N]; DIGEST_WORDS],
    /// `words[i][lane]` is message word `i` of that lane's block.
    pub(crate) words: [[u32; N]; 16],
    /// All ones for lanes that have a block, zero for passengers.
    pub(crate) active: [u32; N],
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
impl<const N: usize> Lanes<N> {
    pub(crate) fn gather(state: &[DigestWords], blocks: &[Option<&Block>]) -> Self {
        debug_assert!(state.len() <= N && blocks.len() == state.len());

        let mut lanes = Self {
            state: [[0; N]; DIGEST_WORDS],
            words: [[0; N]; 16],
            active: [0; N],
        };

        for (lane, (words, block)) in state.iter().zip(blocks).take(N).enumerate() {
            for (row, &word) in lanes.state.iter_mut().zip(words) {
                row[lane] = word;
            }
            if let Some(block) = block {
                lanes.active[lane] = u32::MAX;
                for (row, word) in lanes.words.iter_mut().zip(load_words(block)) {
                    row[lane] = word;
                }
            }
        }

        lanes
    }

    pub(crate) fn scatter(&self, state: &mut [DigestWords]) {
        for (lane, words) in state.iter_mut().take(N).enumerate() {
            for (word, row) in words.iter_mut().zip(&self.state) {
                *word = row[lane];
            }
        }
    }
}
