//! Multi-buffer MD5 hashing.
//!
//! This crate hashes many independent buffers at once by packing them onto the
//! lanes of a SIMD kernel. The best kernel for the running CPU is picked on
//! first use and cached for the life of the process.
//!
//! # Overview
//!
//! - [`ContextManager`] is the lane scheduler. Callers submit
//!   [`HashContext`]s with a buffer and a [`Flag`], and get finished contexts
//!   back from [`submit`](ContextManager::submit) and
//!   [`flush`](ContextManager::flush), one per call.
//! - [`Dispatcher`] probes the CPU once and binds a [`Kernel`]; see
//!   [`global`] and [`active_backend`].
//! - [`digest`] and [`digest_batch`] wrap the scheduler for the common case of
//!   hashing whole buffers.
//!
//! Digests are identical whichever kernel is bound, in whatever order buffers
//! are submitted and however they are split into chunks.
//!
//! # Example
//!
//! ```
//! use md5_mb::{digest, digest_batch};
//!
//! // Single hash
//! let hash = digest(b"hello world");
//!
//! // Batch hash, one lane per input
//! let inputs = [b"input1".as_slice(), b"input2", b"input3"];
//! let hashes = digest_batch(&inputs);
//! assert_eq!(hashes.len(), 3);
//! # let _ = hash;
//! ```
//!
//! # Streaming
//!
//! A context comes back from the manager between chunks; the reference it
//! hands back is the one to submit next.
//!
//! ```
//! use md5_mb::{ContextManager, Flag, HashContext};
//!
//! let mut ctx = HashContext::new("log");
//! let mut manager = ContextManager::new();
//!
//! let mut held = Some(&mut ctx);
//! for (chunk, flag) in [(&b"hello "[..], Flag::First), (&b"world"[..], Flag::Last)] {
//!     let ctx = held.take().expect("context is back between chunks");
//!     let mut done = manager.submit(ctx, chunk, flag).unwrap();
//!     if done.is_none() {
//!         done = manager.flush();
//!     }
//!     held = done;
//! }
//!
//! let ctx = held.expect("finished");
//! assert!(ctx.is_complete());
//! assert_eq!(ctx.result(), Some(md5_mb::digest(b"hello world")));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod batch;
mod context;
mod dispatcher;
mod error;
mod job;
pub mod kernel;
mod manager;
mod trace;

pub use batch::{digest, digest_batch};
pub use context::{Flag, HashContext, Status};
pub use dispatcher::{Backend, CpuFeatures, Dispatcher, Tier, global};
pub use error::{ContextError, ManagerError, ParseBackendError, Rejected};
pub use kernel::{Kernel, ScalarKernel};
pub use manager::ContextManager;

/// MD5 digest type (16 bytes / 128 bits).
pub type Digest = [u8; 16];

/// Get the currently active SIMD backend.
///
/// Useful for logging or diagnostics.
pub fn active_backend() -> Backend {
    dispatcher::global().backend()
}
