//! CPU profile rotation
//!
//! Each rotation closes the active segment (its samples are encoded and
//! written to the segment file) and opens `<base>_<n>` for the next one,
//! where `n` is the running write count. Files are never reused, so a run
//! that dumped K times leaves `<base>_1` .. `<base>_K` behind.
//!
//! If a segment file cannot be created, the base path is cleared and CPU
//! profiling stays off for the rest of the process.

use crate::cpu_sampler::{self, CpuSampler};
use crate::error::DoctorError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

pub struct CpuProfile {
    base: Option<PathBuf>,
    writes: u64,
    frequency: i32,
    active: Option<Segment>,
}

struct Segment {
    path: PathBuf,
    file: File,
    /// None when sampling could not start; the file then stays empty
    sampler: Option<CpuSampler>,
}

impl CpuProfile {
    pub fn new(base: Option<PathBuf>, frequency: i32) -> Self {
        Self {
            base,
            writes: 0,
            frequency,
            active: None,
        }
    }

    /// Base path, or None once profiling is disabled
    pub fn base(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    /// Number of rotations so far, including failed ones
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// File currently receiving samples
    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|s| s.path.as_path())
    }

    /// Close the active segment and open the next one
    pub fn rotate(&mut self) {
        let Some(base) = self.base.clone() else {
            return;
        };

        self.flush();
        self.writes += 1;
        let path = segment_path(&base, self.writes);

        let file = match File::create(&path) {
            Ok(file) => file,
            Err(e) => {
                self.base = None;
                error!(
                    "{}; cpu profiling disabled",
                    DoctorError::create(&path, e)
                );
                return;
            }
        };

        let sampler = if cpu_sampler::AVAILABLE {
            match CpuSampler::start(self.frequency) {
                Ok(sampler) => Some(sampler),
                Err(e) => {
                    warn!("{}; {} will stay empty", e, path.display());
                    None
                }
            }
        } else {
            None
        };

        debug!("cpu profile segment started: {}", path.display());
        self.active = Some(Segment {
            path,
            file,
            sampler,
        });
    }

    /// Stop the active segment, writing its samples, without opening another
    pub fn flush(&mut self) {
        if let Some(segment) = self.active.take() {
            let path = segment.path.clone();
            match segment.finish() {
                Ok(()) => debug!("cpu profile segment closed: {}", path.display()),
                Err(e) => error!("{}", e),
            }
        }
    }
}

impl Segment {
    fn finish(self) -> Result<(), DoctorError> {
        let Segment {
            path,
            mut file,
            sampler,
        } = self;

        let Some(sampler) = sampler else {
            return Ok(());
        };
        let encoded = sampler.finish()?;
        file.write_all(&encoded)
            .and_then(|_| file.sync_all())
            .map_err(|e| DoctorError::write(&path, e))
    }
}

/// `<base>_<n>`, appended to the file name rather than the extension
pub fn segment_path(base: &Path, n: u64) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!("_{}", n));
    PathBuf::from(name)
}
