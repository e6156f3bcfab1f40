#![deny(unsafe_code)]

use mimalloc::MiMalloc;

/// High-performance memory allocator for the buffer set.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[path = "perf.rs"]
mod perf;

use std::{env, io, process::ExitCode};

fn main() -> ExitCode {
    perf::init_tracing();

    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    perf::run_with(env::args_os(), &mut stdout, &mut stderr)
}
