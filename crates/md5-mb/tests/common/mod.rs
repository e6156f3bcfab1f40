//! Shared drivers for the integration tests.

#![allow(dead_code)]

use md5::{Digest as _, Md5};
use md5_mb::{Backend, ContextManager, Digest, Flag, HashContext, Kernel, ScalarKernel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Digest from the `md-5` crate.
pub fn reference(data: &[u8]) -> Digest {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md5::digest(data));
    out
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Every kernel this host can run, plus scalar kernels of odd widths.
pub fn kernels() -> Vec<&'static dyn Kernel> {
    let extra: [&'static dyn Kernel; 3] = [&ScalarKernel::<1>, &ScalarKernel::<3>, &ScalarKernel::<16>];
    Backend::PRIORITY
        .into_iter()
        .filter_map(Backend::kernel)
        .chain(extra)
        .collect()
}

/// Deterministic pseudo-random buffer.
pub fn buffer(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.r#gen()).collect()
}

/// Hashes each input with one ENTIRE submission, in input order.
pub fn hash_entire(kernel: &'static dyn Kernel, inputs: &[Vec<u8>]) -> Vec<Digest> {
    hash_chunked(kernel, inputs, usize::MAX, None)
}

/// Hashes `inputs` in pieces of at most `chunk` bytes.
///
/// With a `seed`, the next context to feed is picked at random among those
/// the manager has handed back, so chunks of different buffers interleave.
/// Returns the digests indexed by input.
pub fn hash_chunked(
    kernel: &'static dyn Kernel,
    inputs: &[Vec<u8>],
    chunk: usize,
    seed: Option<u64>,
) -> Vec<Digest> {
    assert!(chunk > 0);
    let mut contexts: Vec<HashContext<usize>> = (0..inputs.len()).map(HashContext::new).collect();
    let mut offsets = vec![0usize; inputs.len()];
    let mut digests: Vec<Option<Digest>> = vec![None; inputs.len()];
    let mut rng = seed.map(StdRng::seed_from_u64);

    let mut manager = ContextManager::with_kernel(kernel).expect("kernel width");
    let mut ready: Vec<&mut HashContext<usize>> = contexts.iter_mut().rev().collect();

    while !ready.is_empty() || !manager.is_idle() {
        if ready.is_empty() {
            let done = manager.flush();
            route(done, &mut ready, &mut digests);
            continue;
        }

        let pick = rng.as_mut().map_or(ready.len() - 1, |rng| rng.gen_range(0..ready.len()));
        let ctx = ready.swap_remove(pick);
        let tag = *ctx.user_tag();
        let input = &inputs[tag];
        let start = offsets[tag];
        let end = start.saturating_add(chunk).min(input.len());
        offsets[tag] = end;

        let flag = match (ctx.is_idle(), end == input.len()) {
            (true, true) => Flag::Entire,
            (true, false) => Flag::First,
            (false, false) => Flag::Update,
            (false, true) => Flag::Last,
        };
        let done = manager
            .submit(ctx, &input[start..end], flag)
            .expect("valid submission");
        route(done, &mut ready, &mut digests);
    }

    digests
        .into_iter()
        .map(|digest| digest.expect("every context completes"))
        .collect()
}

fn route<'a>(
    done: Option<&'a mut HashContext<usize>>,
    ready: &mut Vec<&'a mut HashContext<usize>>,
    digests: &mut [Option<Digest>],
) {
    let Some(ctx) = done else {
        return;
    };
    if let Some(digest) = ctx.result() {
        let slot = &mut digests[*ctx.user_tag()];
        assert!(slot.is_none(), "context {} completed twice", ctx.user_tag());
        *slot = Some(digest);
    } else {
        ready.push(ctx);
    }
}
