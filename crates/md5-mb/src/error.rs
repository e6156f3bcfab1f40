//! Error types for context submission and manager binding.

use std::fmt;

use crate::context::{Flag, HashContext};
use crate::dispatcher::Backend;
use crate::kernel::MAX_LANES;

/// A submission the context's current state does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// UPDATE or LAST on a context that has already produced its digest.
    #[error("context already completed; submit FIRST or ENTIRE to reuse it")]
    AlreadyCompleted,

    /// UPDATE or LAST on a context that was never started.
    #[error("{flag} submitted to a context that was never started")]
    NotStarted {
        /// The flag that was refused.
        flag: Flag,
    },

    /// A numeric flag outside the FIRST/UPDATE/LAST/ENTIRE encoding.
    #[error("invalid submission flag {0:#x}")]
    InvalidFlag(u32),
}

/// A refused submission, handing the caller's context back untouched.
#[derive(thiserror::Error)]
#[error("submission rejected: {error}")]
pub struct Rejected<'a, T> {
    context: &'a mut HashContext<T>,
    #[source]
    error: ContextError,
}

impl<'a, T> Rejected<'a, T> {
    pub(crate) fn new(context: &'a mut HashContext<T>, error: ContextError) -> Self {
        Self { context, error }
    }

    /// Why the submission was refused.
    #[must_use]
    pub const fn error(&self) -> ContextError {
        self.error
    }

    /// Returns the context that was submitted.
    #[must_use]
    pub fn into_context(self) -> &'a mut HashContext<T> {
        self.context
    }
}

impl<T> fmt::Debug for Rejected<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("status", &self.context.status())
            .finish_non_exhaustive()
    }
}

/// Failure to bind or reinitialize a [`ContextManager`](crate::ContextManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// The requested backend needs CPU features this host lacks.
    #[error("{backend} backend is not supported on this CPU")]
    UnsupportedBackend {
        /// The backend that was requested.
        backend: Backend,
    },

    /// The kernel reports a width the lane table cannot hold.
    #[error("kernel lane count {lanes} outside 1..={max}", max = MAX_LANES)]
    InvalidLaneCount {
        /// Width reported by the kernel.
        lanes: usize,
    },

    /// Reset attempted while contexts still occupy lanes.
    #[error("cannot reset manager with {occupied} occupied lanes")]
    LanesOccupied {
        /// Lanes still holding a context.
        occupied: usize,
    },
}

/// An unrecognised backend name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend `{name}` (expected avx2, sse41, neon or scalar)")]
pub struct ParseBackendError {
    name: String,
}

impl ParseBackendError {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The name that failed to parse.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
