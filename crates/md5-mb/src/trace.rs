//! Scheduler and dispatch tracing.
//!
//! Every event the crate emits goes through these helpers. Without the
//! `tracing` feature they compile to empty inline functions.

#[cfg(feature = "tracing")]
use tracing::{debug, trace, warn};

use crate::dispatcher::{Backend, CpuFeatures};
use crate::error::ContextError;

/// Trace the one-time kernel binding.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn backend_selected(features: &CpuFeatures, backend: Backend, lanes: usize) {
    debug!(
        target: "md5_mb::dispatch",
        avx2 = features.avx2,
        sse41 = features.sse41,
        neon = features.neon,
        backend = backend.name(),
        tier = ?backend.tier(),
        lanes = lanes,
        "bound {} kernel ({} lanes)",
        backend,
        lanes
    );
}

/// Trace the one-time kernel binding - no-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn backend_selected(_features: &CpuFeatures, _backend: Backend, _lanes: usize) {}

/// Trace a job entering a lane.
///
/// # Arguments
///
/// * `lane` - Index of the lane the job was placed in
/// * `blocks` - Whole blocks the job carries
/// * `occupied` - Occupied lanes after the assignment
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn lane_assigned(lane: usize, blocks: usize, occupied: usize) {
    trace!(
        target: "md5_mb::lanes",
        lane = lane,
        blocks = blocks,
        occupied = occupied,
        "lane {} <- {} blocks",
        lane,
        blocks
    );
}

/// Trace a job entering a lane - no-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn lane_assigned(_lane: usize, _blocks: usize, _occupied: usize) {}

/// Trace a run of lockstep kernel calls.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn lockstep(rounds: usize, occupied: usize) {
    trace!(
        target: "md5_mb::lanes",
        rounds = rounds,
        occupied = occupied,
        "lockstep x{} over {} lanes",
        rounds,
        occupied
    );
}

/// Trace a run of lockstep kernel calls - no-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn lockstep(_rounds: usize, _occupied: usize) {}

/// Trace a lane giving its job back.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn lane_retired(lane: usize, total_length: u64) {
    trace!(
        target: "md5_mb::lanes",
        lane = lane,
        total_length = total_length,
        "lane {} retired",
        lane
    );
}

/// Trace a lane giving its job back - no-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn lane_retired(_lane: usize, _total_length: u64) {}

/// Trace a submission refused before it reached a lane.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn submission_rejected(error: &ContextError) {
    debug!(
        target: "md5_mb::lanes",
        error = %error,
        "submission rejected: {}",
        error
    );
}

/// Trace a submission refused before it reached a lane - no-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn submission_rejected(_error: &ContextError) {}

/// Warn about a manager dropped with contexts still in its lanes.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn busy_manager_dropped(occupied: usize) {
    warn!(
        target: "md5_mb::lanes",
        occupied = occupied,
        "context manager dropped with {} occupied lanes; their contexts are reset to idle",
        occupied
    );
}

/// Warn about a busy manager drop - no-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn busy_manager_dropped(_occupied: usize) {}
