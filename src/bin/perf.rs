//! `md5-mb-perf`: multi-buffer MD5 throughput against the `md-5` reference.
//!
//! Hashes a set of zeroed buffers repeatedly, first one at a time with the
//! reference implementation and then through a [`ContextManager`], prints the
//! throughput of both and checks every engine digest word against the
//! reference. The exit status is the number of mismatched words, clamped to
//! 255.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Arg, ArgAction, ArgMatches, Command};
use md5::{Digest as _, Md5};
use md5_mb::{Backend, ContextError, ContextManager, Digest, Flag, HashContext, Kernel, ManagerError};
use tracing::{debug, info};

const PROGRAM_NAME: &str = "md5-mb-perf";

/// Total footprint of the cold profile, larger than a last-level cache.
const COLD_FOOTPRINT: usize = 32 * 1024 * 1024;

const DEFAULT_BUFFERS: usize = 32;
const DEFAULT_LEN: usize = 4 * 1024;
const DEFAULT_LOOPS: usize = 100;

/// Failures that stop a run before the digests are compared.
#[derive(Debug, thiserror::Error)]
enum PerfError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Options {
    buffers: usize,
    len: usize,
    loops: usize,
    cold: bool,
    backend: Option<Backend>,
}

impl Options {
    fn from_matches(matches: &ArgMatches) -> Self {
        let buffers = matches
            .get_one::<usize>("buffers")
            .copied()
            .unwrap_or(DEFAULT_BUFFERS);
        let cold = matches.get_flag("cold");
        let len = if cold {
            COLD_FOOTPRINT / buffers
        } else {
            matches.get_one::<usize>("len").copied().unwrap_or(DEFAULT_LEN)
        };

        Self {
            buffers,
            len,
            loops: matches
                .get_one::<usize>("loops")
                .copied()
                .unwrap_or(DEFAULT_LOOPS),
            cold,
            backend: matches.get_one::<Backend>("backend").copied(),
        }
    }

    /// Kernel for this run: the requested backend, or the dispatcher's choice.
    fn kernel(&self) -> Result<&'static dyn Kernel, ManagerError> {
        match self.backend {
            Some(backend) => backend
                .kernel()
                .ok_or(ManagerError::UnsupportedBackend { backend }),
            None => Ok(md5_mb::global().kernel()),
        }
    }

    const fn profile(&self) -> &'static str {
        if self.cold { "_cold" } else { "_warm" }
    }

    fn total_bytes(&self) -> u64 {
        (self.len as u64)
            .saturating_mul(self.buffers as u64)
            .saturating_mul(self.loops as u64)
    }
}

fn positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_owned()),
        Ok(n) => Ok(n),
        Err(error) => Err(error.to_string()),
    }
}

fn parse_backend(value: &str) -> Result<Backend, md5_mb::ParseBackendError> {
    value.parse()
}

/// Builds the `clap` command used for parsing.
fn clap_command() -> Command {
    Command::new(PROGRAM_NAME)
        .about("Multi-buffer MD5 throughput and correctness check")
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("help")
                .long("help")
                .help("Show this help message and exit.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .short('V')
                .help("Print version information and exit.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("buffers")
                .long("buffers")
                .value_name("N")
                .help("Number of independent buffers in flight.")
                .value_parser(positive)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("len")
                .long("len")
                .value_name("BYTES")
                .help("Length of every buffer.")
                .value_parser(clap::value_parser!(usize))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("loops")
                .long("loops")
                .value_name("N")
                .help("Passes over the whole buffer set.")
                .value_parser(positive)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("cold")
                .long("cold")
                .help("Spread 32 MiB over the buffers so every pass misses the cache.")
                .conflicts_with("len")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("backend")
                .long("backend")
                .value_name("NAME")
                .help("Run on avx2, sse41, neon or scalar instead of the detected kernel.")
                .value_parser(parse_backend)
                .action(ArgAction::Set),
        )
}

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`, `warn` by default.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Parses `args`, runs the benchmark and maps the outcome to an exit status.
#[must_use]
pub fn run_with<I, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let matches = match clap_command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(error) => {
            let _ = write!(stderr, "{error}");
            return ExitCode::FAILURE;
        }
    };

    if matches.get_flag("help") {
        let _ = write!(stdout, "{}", clap_command().render_help());
        return ExitCode::SUCCESS;
    }
    if matches.get_flag("version") {
        let _ = writeln!(stdout, "{PROGRAM_NAME} {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let options = Options::from_matches(&matches);
    debug!(?options, "parsed options");

    match run(&options, stdout) {
        Ok(mismatches) => exit_code(mismatches),
        Err(error) => {
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
            ExitCode::FAILURE
        }
    }
}

fn exit_code(mismatches: usize) -> ExitCode {
    ExitCode::from(u8::try_from(mismatches).unwrap_or(u8::MAX))
}

/// Runs both passes and the comparison. Returns the mismatched word count.
fn run<W: Write>(options: &Options, out: &mut W) -> Result<usize, PerfError> {
    let kernel = options.kernel()?;
    let suffix = options.profile();
    let buffers: Vec<Vec<u8>> = (0..options.buffers).map(|_| vec![0u8; options.len]).collect();
    info!(
        backend = %kernel.backend(),
        lanes = kernel.lanes(),
        buffers = options.buffers,
        len = options.len,
        loops = options.loops,
        "starting run"
    );

    let mut expected = vec![[0u8; 16]; options.buffers];
    let start = Instant::now();
    for _ in 0..options.loops {
        for (slot, data) in expected.iter_mut().zip(&buffers) {
            slot.copy_from_slice(&Md5::digest(data));
        }
    }
    write_rate(
        out,
        &format!("md5_reference{suffix}"),
        start.elapsed(),
        options.total_bytes(),
    )?;

    let mut contexts: Vec<HashContext<usize>> = (0..options.buffers).map(HashContext::new).collect();
    let start = Instant::now();
    for _ in 0..options.loops {
        hash_pass(kernel, &mut contexts, &buffers)?;
    }
    write_rate(
        out,
        &format!("multibuffer_md5{suffix} ({})", kernel.backend()),
        start.elapsed(),
        options.total_bytes(),
    )?;

    let mismatches = compare(&contexts, &expected, out)?;
    writeln!(
        out,
        "Multi-buffer md5 test complete {} buffers of {} B with {} iterations",
        options.buffers, options.len, options.loops
    )?;
    if mismatches == 0 {
        writeln!(out, " {PROGRAM_NAME}: Pass")?;
    } else {
        writeln!(out, "Test failed function check {mismatches}")?;
    }
    Ok(mismatches)
}

/// Submits every buffer once with ENTIRE, then drains the manager.
fn hash_pass(
    kernel: &'static dyn Kernel,
    contexts: &mut [HashContext<usize>],
    buffers: &[Vec<u8>],
) -> Result<(), PerfError> {
    let mut manager = ContextManager::with_kernel(kernel)?;
    for (ctx, data) in contexts.iter_mut().zip(buffers) {
        manager
            .submit(ctx, data, Flag::Entire)
            .map_err(|rejected| rejected.error())?;
    }
    while manager.flush().is_some() {}
    Ok(())
}

/// Prints every digest word that differs from the reference.
fn compare<W: Write>(
    contexts: &[HashContext<usize>],
    expected: &[Digest],
    out: &mut W,
) -> io::Result<usize> {
    let mut mismatches = 0;
    for (i, (ctx, want)) in contexts.iter().zip(expected).enumerate() {
        for (j, (&got, bytes)) in ctx.digest_words().iter().zip(want.chunks_exact(4)).enumerate() {
            let want = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if got != want || !ctx.is_complete() {
                mismatches += 1;
                writeln!(out, "Test{i}, digest{j} fail {got:08X} <=> {want:08X}")?;
            }
        }
    }
    Ok(mismatches)
}

fn write_rate<W: Write>(out: &mut W, label: &str, elapsed: Duration, bytes: u64) -> io::Result<()> {
    let secs = elapsed.as_secs_f64();
    let megabytes = bytes as f64 / 1_000_000.0;
    let rate = if secs > 0.0 { megabytes / secs } else { f64::INFINITY };
    writeln!(
        out,
        "{label}: runtime = {:>10} usecs, bandwidth {} MB in {secs:.4} sec = {rate:.2} MB/s",
        elapsed.as_micros(),
        bytes / 1_000_000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(args: &[&str]) -> (ExitCode, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let argv = std::iter::once(PROGRAM_NAME).chain(args.iter().copied());
        let exit = run_with(argv, &mut stdout, &mut stderr);
        (
            exit,
            String::from_utf8(stdout).expect("stdout is UTF-8"),
            String::from_utf8(stderr).expect("stderr is UTF-8"),
        )
    }

    fn parse(args: &[&str]) -> Options {
        let argv = std::iter::once(PROGRAM_NAME).chain(args.iter().copied());
        let matches = clap_command().try_get_matches_from(argv).expect("valid arguments");
        Options::from_matches(&matches)
    }

    #[test]
    fn defaults_follow_warm_profile() {
        let options = parse(&[]);
        assert_eq!(
            options,
            Options {
                buffers: 32,
                len: 4096,
                loops: 100,
                cold: false,
                backend: None,
            }
        );
        assert_eq!(options.profile(), "_warm");
    }

    #[test]
    fn cold_spreads_footprint_over_buffers() {
        let options = parse(&["--cold", "--buffers", "16"]);
        assert_eq!(options.len, 2 * 1024 * 1024);
        assert_eq!(options.profile(), "_cold");
    }

    #[test]
    fn backend_flag_parses_names() {
        assert_eq!(parse(&["--backend", "scalar"]).backend, Some(Backend::Scalar));
        assert_eq!(parse(&["--backend", "SSE4.1"]).backend, Some(Backend::Sse41));
    }

    #[test]
    fn help_goes_to_stdout() {
        let (exit, stdout, stderr) = run_args(&["--help"]);
        assert_eq!(exit, ExitCode::SUCCESS);
        assert!(stdout.contains("Usage:"));
        assert!(stdout.contains("--buffers"));
        assert!(stderr.is_empty());
    }

    #[test]
    fn version_reports_package_version() {
        let (exit, stdout, _) = run_args(&["--version"]);
        assert_eq!(exit, ExitCode::SUCCESS);
        assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn small_run_passes() {
        let (exit, stdout, stderr) =
            run_args(&["--buffers", "5", "--len", "100", "--loops", "2", "--backend", "scalar"]);
        assert_eq!(exit, ExitCode::SUCCESS, "stderr: {stderr}");
        assert!(stdout.contains("md5_reference_warm"));
        assert!(stdout.contains("multibuffer_md5_warm (scalar)"));
        assert!(stdout.contains("5 buffers of 100 B with 2 iterations"));
        assert!(stdout.contains("Pass"));
    }

    #[test]
    fn zero_buffers_rejected() {
        let (exit, stdout, stderr) = run_args(&["--buffers", "0"]);
        assert_eq!(exit, ExitCode::FAILURE);
        assert!(stdout.is_empty());
        assert!(stderr.contains("at least 1"));
    }

    #[test]
    fn unknown_backend_rejected() {
        let (exit, _, stderr) = run_args(&["--backend", "mmx"]);
        assert_eq!(exit, ExitCode::FAILURE);
        assert!(stderr.contains("unknown backend"));
    }

    #[test]
    fn cold_conflicts_with_len() {
        let (exit, _, stderr) = run_args(&["--cold", "--len", "64"]);
        assert_eq!(exit, ExitCode::FAILURE);
        assert!(!stderr.is_empty());
    }

    #[test]
    fn compare_reports_each_bad_word() {
        let mut contexts: Vec<HashContext<usize>> = (0..2).map(HashContext::new).collect();
        let buffers = [b"abc".to_vec(), Vec::new()];
        hash_pass(md5_mb::global().kernel(), &mut contexts, &buffers).expect("pass");

        let mut expected = [md5_mb::digest(b"abc"), md5_mb::digest(b"")];
        expected[1][0] ^= 0xff;
        expected[1][15] ^= 0xff;

        let mut out = Vec::new();
        let mismatches = compare(&contexts, &expected, &mut out).expect("write to vec");
        assert_eq!(mismatches, 2);
        let text = String::from_utf8(out).expect("UTF-8");
        assert!(text.contains("Test1, digest0 fail"));
        assert!(text.contains("Test1, digest3 fail"));
    }

    #[test]
    fn exit_code_clamps_mismatch_count() {
        assert_eq!(exit_code(0), ExitCode::SUCCESS);
        assert_eq!(exit_code(3), ExitCode::from(3));
        assert_eq!(exit_code(300), ExitCode::from(255));
    }
}
