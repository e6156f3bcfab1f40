//! Lane scheduler.
//!
//! [`ContextManager`] packs submitted contexts onto the lanes of its kernel
//! and drives them in lockstep. It follows the job-manager model of
//! multi-buffer hashing:
//!
//! - A new job goes into the lowest free lane.
//! - While a lane is free, `submit` returns without compressing anything.
//! - Once every lane is occupied, the scheduler runs as many lockstep rounds as
//!   the shortest job needs. The lane that reaches zero first (lowest index on
//!   ties) retires.
//! - A retired context gets its next job (remaining whole blocks, then the
//!   padded tail) until it has nothing left. Only then is it handed back.
//!
//! After every call at least one lane is free, so there is no pending queue
//! and no submission is ever refused for capacity. [`ContextManager::flush`]
//! runs the same retirement over a partly filled lane table, with the empty
//! lanes riding along as idle passengers.

use std::fmt;

use crate::context::{Flag, HashContext};
use crate::dispatcher::{self, Backend};
use crate::error::{ManagerError, Rejected};
use crate::job::Job;
use crate::kernel::{Block, DigestWords, INIT_STATE, Kernel, MAX_LANES};
use crate::trace;

/// A context bound to a lane, with the input it has not yet handed to a job.
struct Lane<'a, T> {
    ctx: &'a mut HashContext<T>,
    job: Job<'a>,
    pending: &'a [u8],
}

/// Schedules hash contexts onto the lanes of one kernel.
///
/// The manager borrows each submitted context and its buffer until it hands
/// the context back from [`submit`](Self::submit) or [`flush`](Self::flush).
/// Dropping a manager with occupied lanes resets those contexts to
/// [`Status::Idle`](crate::Status::Idle); they must be restarted with FIRST or
/// ENTIRE.
///
/// ```
/// use md5_mb::{ContextManager, Flag, HashContext};
///
/// let inputs: [&[u8]; 3] = [b"", b"a", b"abc"];
/// let mut contexts: Vec<HashContext<usize>> = (0..3).map(HashContext::new).collect();
/// let mut finished = Vec::new();
///
/// {
///     let mut manager = ContextManager::new();
///     for (ctx, input) in contexts.iter_mut().zip(inputs) {
///         if let Some(done) = manager.submit(ctx, input, Flag::Entire).unwrap() {
///             finished.push(*done.user_tag());
///         }
///     }
///     while let Some(done) = manager.flush() {
///         finished.push(*done.user_tag());
///     }
/// }
///
/// finished.sort_unstable();
/// assert_eq!(finished, [0, 1, 2]);
/// assert!(contexts.iter().all(HashContext::is_complete));
/// ```
pub struct ContextManager<'a, T = ()> {
    kernel: &'static dyn Kernel,
    width: usize,
    occupied: usize,
    state: [DigestWords; MAX_LANES],
    lanes: [Option<Lane<'a, T>>; MAX_LANES],
}

impl<'a, T> ContextManager<'a, T> {
    /// Creates a manager bound to the process-wide dispatcher's kernel.
    #[must_use]
    pub fn new() -> Self {
        Self::bind(dispatcher::global().kernel())
    }

    /// Creates a manager on a specific backend.
    ///
    /// # Errors
    ///
    /// [`ManagerError::UnsupportedBackend`] if the CPU lacks the backend.
    pub fn with_backend(backend: Backend) -> Result<Self, ManagerError> {
        let kernel = backend
            .kernel()
            .ok_or(ManagerError::UnsupportedBackend { backend })?;
        Self::with_kernel(kernel)
    }

    /// Creates a manager on an explicit kernel.
    ///
    /// # Errors
    ///
    /// [`ManagerError::InvalidLaneCount`] if the kernel width is outside
    /// `1..=MAX_LANES`.
    pub fn with_kernel(kernel: &'static dyn Kernel) -> Result<Self, ManagerError> {
        let lanes = kernel.lanes();
        if !(1..=MAX_LANES).contains(&lanes) {
            return Err(ManagerError::InvalidLaneCount { lanes });
        }
        Ok(Self::bind(kernel))
    }

    fn bind(kernel: &'static dyn Kernel) -> Self {
        Self {
            kernel,
            width: kernel.lanes().clamp(1, MAX_LANES),
            occupied: 0,
            state: [INIT_STATE; MAX_LANES],
            lanes: std::array::from_fn(|_| None),
        }
    }

    /// Returns every lane to empty.
    ///
    /// # Errors
    ///
    /// [`ManagerError::LanesOccupied`] while any lane still holds a context;
    /// drain with [`flush`](Self::flush) first.
    pub fn reset(&mut self) -> Result<(), ManagerError> {
        if self.occupied > 0 {
            return Err(ManagerError::LanesOccupied {
                occupied: self.occupied,
            });
        }
        self.state = [INIT_STATE; MAX_LANES];
        self.lanes = std::array::from_fn(|_| None);
        Ok(())
    }

    /// Submits one chunk of `ctx`'s buffer.
    ///
    /// Returns the context that finished during this call, if any. That may
    /// be `ctx` itself or one submitted earlier. A context handed back with
    /// [`Status::Processing`](crate::Status::Processing) has consumed its
    /// chunk and waits for UPDATE or LAST.
    ///
    /// # Errors
    ///
    /// A [`Rejected`] carrying `ctx` back when UPDATE or LAST is submitted to
    /// a context that was never started or has already completed.
    pub fn submit(
        &mut self,
        ctx: &'a mut HashContext<T>,
        data: &'a [u8],
        flag: Flag,
    ) -> Result<Option<&'a mut HashContext<T>>, Rejected<'a, T>> {
        if let Err(error) = ctx.check(flag) {
            trace::submission_rejected(&error);
            return Err(Rejected::new(ctx, error));
        }

        ctx.begin(flag, data.len());
        let (job, mut pending) = ctx.absorb(data);
        let Some(job) = job.or_else(|| ctx.next_job(&mut pending)) else {
            ctx.settle();
            return Ok(Some(ctx));
        };
        self.submit_job(Lane { ctx, job, pending });

        while self.occupied == self.width {
            let Some(lane) = self.retire_next() else {
                break;
            };
            if let Some(done) = self.resubmit(lane) {
                return Ok(Some(done));
            }
        }
        Ok(None)
    }

    /// Forces the next occupied lane to completion.
    ///
    /// Returns `None` once every lane is empty, so
    /// `while let Some(ctx) = manager.flush()` drains the manager.
    pub fn flush(&mut self) -> Option<&'a mut HashContext<T>> {
        while let Some(lane) = self.retire_next() {
            if let Some(done) = self.resubmit(lane) {
                return Some(done);
            }
        }
        None
    }

    /// Number of lanes.
    #[must_use]
    pub const fn lanes(&self) -> usize {
        self.width
    }

    /// Lanes currently holding a context.
    #[must_use]
    pub const fn occupied(&self) -> usize {
        self.occupied
    }

    /// Returns `true` when no lane is occupied.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.occupied == 0
    }

    /// Backend of the bound kernel.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.kernel.backend()
    }

    /// Places `lane` into the lowest free slot.
    fn submit_job(&mut self, lane: Lane<'a, T>) {
        let Some(index) = self.lanes[..self.width].iter().position(Option::is_none) else {
            unreachable!("no free lane with {} of {} occupied", self.occupied, self.width);
        };
        self.state[index] = *lane.ctx.digest_words();
        self.occupied += 1;
        trace::lane_assigned(index, lane.job.blocks(), self.occupied);
        self.lanes[index] = Some(lane);
    }

    /// Runs the occupied lanes until the shortest job is done and frees its
    /// lane. Returns `None` when every lane is empty.
    fn retire_next(&mut self) -> Option<Lane<'a, T>> {
        let (index, rounds) = self.lanes[..self.width]
            .iter()
            .enumerate()
            .filter_map(|(index, lane)| lane.as_ref().map(|lane| (index, lane.job.blocks())))
            .min_by_key(|&(_, blocks)| blocks)?;

        if rounds > 0 {
            trace::lockstep(rounds, self.occupied);
            self.step(rounds);
        }

        let lane = self.lanes[index].take()?;
        lane.ctx.set_digest(self.state[index]);
        self.occupied -= 1;
        trace::lane_retired(index, lane.ctx.total_length());
        Some(lane)
    }

    /// Advances every occupied lane by `rounds` blocks.
    fn step(&mut self, rounds: usize) {
        let width = self.width;
        for _ in 0..rounds {
            let mut blocks: [Option<&Block>; MAX_LANES] = [None; MAX_LANES];
            for (slot, lane) in blocks.iter_mut().zip(&self.lanes[..width]) {
                *slot = lane
                    .as_ref()
                    .and_then(|lane| lane.job.block(lane.ctx.extra()));
            }
            self.kernel.compress(&mut self.state[..width], &blocks[..width]);

            for lane in self.lanes[..width].iter_mut().flatten() {
                lane.job.advance();
            }
        }
    }

    /// Queues the retired context's next job, or hands it back when it has
    /// none.
    fn resubmit(&mut self, lane: Lane<'a, T>) -> Option<&'a mut HashContext<T>> {
        let Lane {
            ctx, mut pending, ..
        } = lane;
        if let Some(job) = ctx.next_job(&mut pending) {
            self.submit_job(Lane { ctx, job, pending });
            return None;
        }
        ctx.settle();
        Some(ctx)
    }
}

impl<T> Default for ContextManager<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ContextManager<'_, T> {
    fn drop(&mut self) {
        if self.occupied == 0 {
            return;
        }
        trace::busy_manager_dropped(self.occupied);
        for lane in self.lanes.iter_mut().filter_map(Option::take) {
            lane.ctx.abandon();
        }
        self.occupied = 0;
    }
}

impl<T> fmt::Debug for ContextManager<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupancy: Vec<bool> = self.lanes[..self.width]
            .iter()
            .map(Option::is_some)
            .collect();
        f.debug_struct("ContextManager")
            .field("kernel", &self.kernel)
            .field("occupied", &self.occupied)
            .field("lanes", &occupancy)
            .finish()
    }
}
