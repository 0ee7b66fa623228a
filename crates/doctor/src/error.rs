//! Doctor error type
//!
//! Nothing in this crate hands a `DoctorError` back to the host: the
//! controller logs every failure and carries on. The type exists so the
//! profile writers can use `?` internally and the controller can decide
//! what a failure means (skip the heap snapshot, or disable CPU rotation).

use std::path::PathBuf;

/// Failure while producing a profile file
#[derive(Debug)]
pub enum DoctorError {
    /// The output file could not be created
    CreateProfile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The output file was created but writing to it failed
    WriteProfile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Heap snapshot could not be serialized
    Encode(serde_json::Error),
    /// The CPU sampler refused to start or to build a report
    Sampler(String),
}

impl DoctorError {
    pub(crate) fn create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DoctorError::CreateProfile {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DoctorError::WriteProfile {
            path: path.into(),
            source,
        }
    }
}

impl std::fmt::Display for DoctorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoctorError::CreateProfile { path, source } => {
                write!(f, "couldn't create {}: {}", path.display(), source)
            }
            DoctorError::WriteProfile { path, source } => {
                write!(f, "couldn't write to {}: {}", path.display(), source)
            }
            DoctorError::Encode(e) => write!(f, "heap snapshot encoding failed: {}", e),
            DoctorError::Sampler(msg) => write!(f, "cpu sampler: {}", msg),
        }
    }
}

impl std::error::Error for DoctorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DoctorError::CreateProfile { source, .. } | DoctorError::WriteProfile { source, .. } => {
                Some(source)
            }
            DoctorError::Encode(e) => Some(e),
            DoctorError::Sampler(_) => None,
        }
    }
}

impl From<serde_json::Error> for DoctorError {
    fn from(e: serde_json::Error) -> Self {
        DoctorError::Encode(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_names_the_path() {
        let err = DoctorError::create(
            "/nope/prof.mprof",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/nope/prof.mprof"));
        assert!(msg.contains("no such directory"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_sampler_error_has_no_source() {
        let err = DoctorError::Sampler("already running".to_string());
        assert_eq!(err.to_string(), "cpu sampler: already running");
        assert!(err.source().is_none());
    }
}
