//! Stub CPU sampler when the "cpu-profile" feature is disabled (or off Unix).
//!
//! Segment files are still created and rotated so the naming stays the same;
//! they are simply left empty.

use crate::error::DoctorError;

const FEATURE_MSG: &str =
    "CPU sampling not available. Rebuild on Unix with: cargo build --features cpu-profile";

pub(crate) const AVAILABLE: bool = false;

pub(crate) struct CpuSampler;

impl CpuSampler {
    pub(crate) fn start(_frequency: i32) -> Result<Self, DoctorError> {
        Err(DoctorError::Sampler(FEATURE_MSG.to_string()))
    }

    pub(crate) fn finish(self) -> Result<Vec<u8>, DoctorError> {
        Ok(Vec::new())
    }
}
