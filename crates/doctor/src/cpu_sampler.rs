//! pprof-rs CPU sampler
//!
//! Only one sampler can run per process: pprof-rs drives a single SIGPROF
//! timer. Starting a second one fails with a `Sampler` error.

use crate::error::DoctorError;
use pprof::protos::Message as _;

/// Frames from these libraries are dropped while unwinding
const BLOCKLIST: &[&str] = &["libc", "libgcc", "pthread", "vdso"];

pub(crate) const AVAILABLE: bool = true;

pub(crate) struct CpuSampler {
    guard: pprof::ProfilerGuard<'static>,
}

impl CpuSampler {
    pub(crate) fn start(frequency: i32) -> Result<Self, DoctorError> {
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(frequency)
            .blocklist(BLOCKLIST)
            .build()
            .map_err(|e| DoctorError::Sampler(e.to_string()))?;
        Ok(Self { guard })
    }

    /// Stop sampling and encode everything collected as pprof protobuf
    pub(crate) fn finish(self) -> Result<Vec<u8>, DoctorError> {
        let report = self
            .guard
            .report()
            .build()
            .map_err(|e| DoctorError::Sampler(e.to_string()))?;
        let profile = report
            .pprof()
            .map_err(|e| DoctorError::Sampler(e.to_string()))?;
        Ok(profile.encode_to_vec())
    }
}
