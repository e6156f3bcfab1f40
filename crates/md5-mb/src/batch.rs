//! One-call hashing on top of the lane scheduler.

use crate::Digest;
use crate::context::{Flag, HashContext};
use crate::manager::ContextManager;

/// Compute MD5 digests for multiple inputs in parallel.
///
/// Every input becomes one ENTIRE submission on a manager bound to the
/// global dispatcher. Returns digests in the same order as inputs.
pub fn digest_batch<T: AsRef<[u8]>>(inputs: &[T]) -> Vec<Digest> {
    let mut out = vec![[0u8; 16]; inputs.len()];
    digest_into(inputs, &mut out);
    out
}

/// Compute MD5 digest for a single input.
#[must_use]
pub fn digest(input: &[u8]) -> Digest {
    let mut out = [[0u8; 16]];
    digest_into(&[input], &mut out);
    out[0]
}

fn digest_into<T: AsRef<[u8]>>(inputs: &[T], out: &mut [Digest]) {
    let mut contexts: Vec<HashContext<usize>> = (0..inputs.len()).map(HashContext::new).collect();
    let mut manager = ContextManager::new();
    let mut collect = |ctx: &mut HashContext<usize>| {
        if let Some(digest) = ctx.result() {
            out[*ctx.user_tag()] = digest;
        }
    };

    for (ctx, input) in contexts.iter_mut().zip(inputs) {
        match manager.submit(ctx, input.as_ref(), Flag::Entire) {
            Ok(Some(done)) => collect(done),
            Ok(None) => {}
            Err(rejected) => unreachable!("ENTIRE submission refused: {rejected}"),
        }
    }
    while let Some(done) = manager.flush() {
        collect(done);
    }
}
