//! Runtime CPU detection and backend dispatch.
//!
//! The host is probed once per process. [`global`] caches the outcome in a
//! [`OnceLock`], so every later caller reads the bound kernel without touching
//! the feature bits again.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::ParseBackendError;
use crate::kernel::{self, Kernel, SCALAR_LANES};
use crate::trace;

/// CPU feature bits relevant to kernel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuFeatures {
    /// x86_64 AVX2.
    pub avx2: bool,
    /// x86_64 SSE4.1.
    pub sse41: bool,
    /// aarch64 Advanced SIMD.
    pub neon: bool,
}

impl CpuFeatures {
    /// Reads the feature bits of the running CPU.
    #[must_use]
    pub fn probe() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            Self {
                avx2: is_x86_feature_detected!("avx2"),
                sse41: is_x86_feature_detected!("sse4.1"),
                neon: false,
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            Self {
                avx2: false,
                sse41: false,
                neon: std::arch::is_aarch64_feature_detected!("neon"),
            }
        }

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            Self::default()
        }
    }

    /// Returns `true` when `backend` can run with these features.
    #[must_use]
    pub const fn supports(self, backend: Backend) -> bool {
        match backend {
            Backend::Avx2 => self.avx2,
            Backend::Sse41 => self.sse41,
            Backend::Neon => self.neon,
            Backend::Scalar => true,
        }
    }
}

/// Capability class of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// 256-bit vectors.
    Wide,
    /// 128-bit vectors.
    Narrow,
    /// No vector unit.
    Scalar,
}

/// Available kernel backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// AVX2 with 8 parallel lanes.
    Avx2,
    /// SSE4.1 with 4 parallel lanes.
    Sse41,
    /// ARM NEON with 4 parallel lanes.
    Neon,
    /// Portable fallback, always available.
    Scalar,
}

impl Backend {
    /// Selection order, widest tier first.
    pub const PRIORITY: [Self; 4] = [Self::Avx2, Self::Sse41, Self::Neon, Self::Scalar];

    /// Picks the highest-priority backend `features` can run.
    #[must_use]
    pub fn select(features: &CpuFeatures) -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|&backend| features.supports(backend))
            .unwrap_or(Self::Scalar)
    }

    /// Number of parallel lanes for this backend.
    #[must_use]
    pub const fn lanes(self) -> usize {
        match self {
            Self::Avx2 => 8,
            Self::Sse41 | Self::Neon => 4,
            Self::Scalar => SCALAR_LANES,
        }
    }

    /// Capability tier of this backend.
    #[must_use]
    pub const fn tier(self) -> Tier {
        match self {
            Self::Avx2 => Tier::Wide,
            Self::Sse41 | Self::Neon => Tier::Narrow,
            Self::Scalar => Tier::Scalar,
        }
    }

    /// Lower-case name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Avx2 => "avx2",
            Self::Sse41 => "sse41",
            Self::Neon => "neon",
            Self::Scalar => "scalar",
        }
    }

    /// Returns `true` when the running CPU supports this backend.
    #[must_use]
    pub fn is_available(self) -> bool {
        global().features().supports(self)
    }

    /// Returns this backend's kernel, or `None` when the CPU lacks it.
    #[must_use]
    pub fn kernel(self) -> Option<&'static dyn Kernel> {
        self.is_available().then(|| kernel::table(self))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "avx2" => Ok(Self::Avx2),
            "sse41" | "sse4.1" => Ok(Self::Sse41),
            "neon" => Ok(Self::Neon),
            "scalar" => Ok(Self::Scalar),
            _ => Err(ParseBackendError::new(s)),
        }
    }
}

/// Probe result plus the kernel bound for it.
#[derive(Debug)]
pub struct Dispatcher {
    features: CpuFeatures,
    backend: Backend,
    kernel: &'static dyn Kernel,
}

impl Dispatcher {
    /// Detect CPU features and select the best available backend.
    #[must_use]
    pub fn detect() -> Self {
        let features = CpuFeatures::probe();
        let backend = Backend::select(&features);
        let kernel = kernel::table(backend);
        trace::backend_selected(&features, backend, kernel.lanes());
        Self {
            features,
            backend,
            kernel,
        }
    }

    /// Get the selected backend.
    #[must_use]
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    /// Feature bits read at detection time.
    #[must_use]
    pub const fn features(&self) -> CpuFeatures {
        self.features
    }

    /// Tier of the selected backend.
    #[must_use]
    pub const fn tier(&self) -> Tier {
        self.backend.tier()
    }

    /// The bound kernel.
    #[must_use]
    pub fn kernel(&self) -> &'static dyn Kernel {
        self.kernel
    }
}

/// Global dispatcher instance, initialized on first use.
pub fn global() -> &'static Dispatcher {
    static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();
    DISPATCHER.get_or_init(Dispatcher::detect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_matches_probe() {
        let dispatcher = Dispatcher::detect();
        assert_eq!(dispatcher.backend(), Backend::select(&CpuFeatures::probe()));
        assert_eq!(dispatcher.kernel().backend(), dispatcher.backend());
        assert_eq!(dispatcher.kernel().lanes(), dispatcher.backend().lanes());
    }

    #[test]
    fn global_dispatcher_is_consistent() {
        let d1 = global();
        let d2 = global();
        assert!(std::ptr::eq(d1, d2));
        assert_eq!(d1.backend(), d2.backend());
        assert_eq!(d1.backend(), Dispatcher::detect().backend());
    }

    #[test]
    fn select_falls_back_to_scalar() {
        assert_eq!(Backend::select(&CpuFeatures::default()), Backend::Scalar);
    }

    #[test]
    fn select_prefers_widest_tier() {
        let all = CpuFeatures {
            avx2: true,
            sse41: true,
            neon: true,
        };
        assert_eq!(Backend::select(&all), Backend::Avx2);

        let narrow = CpuFeatures {
            sse41: true,
            ..CpuFeatures::default()
        };
        assert_eq!(Backend::select(&narrow), Backend::Sse41);

        let arm = CpuFeatures {
            neon: true,
            ..CpuFeatures::default()
        };
        assert_eq!(Backend::select(&arm), Backend::Neon);
    }

    #[test]
    fn priority_is_ordered_by_width() {
        let widths: Vec<usize> = Backend::PRIORITY[..3].iter().map(|b| b.lanes()).collect();
        assert!(widths.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(Backend::PRIORITY.last(), Some(&Backend::Scalar));
    }

    #[test]
    fn tiers() {
        assert_eq!(Backend::Avx2.tier(), Tier::Wide);
        assert_eq!(Backend::Sse41.tier(), Tier::Narrow);
        assert_eq!(Backend::Neon.tier(), Tier::Narrow);
        assert_eq!(Backend::Scalar.tier(), Tier::Scalar);
    }

    #[test]
    fn scalar_kernel_is_always_available() {
        assert!(Backend::Scalar.is_available());
        let kernel = Backend::Scalar.kernel().expect("scalar kernel");
        assert_eq!(kernel.lanes(), SCALAR_LANES);
    }

    #[test]
    fn unavailable_backends_have_no_kernel() {
        let features = global().features();
        for backend in Backend::PRIORITY {
            assert_eq!(backend.kernel().is_some(), features.supports(backend));
        }
    }

    #[test]
    fn names_parse_back() {
        for backend in Backend::PRIORITY {
            assert_eq!(backend.to_string().parse::<Backend>(), Ok(backend));
        }
        assert_eq!("SSE4.1".parse::<Backend>(), Ok(Backend::Sse41));
        assert!("avx512".parse::<Backend>().is_err());
    }
}
