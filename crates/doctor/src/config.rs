//! Doctor configuration
//!
//! Three ways to build a [`DoctorConfig`]:
//!
//! - [`DoctorConfig::default`]: doctor disabled, profiles at `prof.cprof` /
//!   `prof.mprof`, every stats category shown.
//! - [`DoctorConfig::from_env`]: the same defaults overridden by environment
//!   variables, for hosts that don't want to touch their CLI.
//! - [`DoctorArgs`]: clap flags a host flattens into its own `Parser`.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DOCTOR_ENABLE` | `false` | Master switch |
//! | `DOCTOR_CPU_PROFILE` | `prof.cprof` | CPU profile base path (empty disables) |
//! | `DOCTOR_HEAP_PROFILE` | `prof.mprof` | Heap snapshot path (empty disables) |
//! | `DOCTOR_STATS_GC` | `true` | Log collection stats |
//! | `DOCTOR_STATS_MEM` | `true` | Log memory stats |
//! | `DOCTOR_STATS_THREADS` | `true` | Log thread/task counts |
//! | `DOCTOR_CPU_FREQ` | `100` | CPU sampling frequency in Hz |
//!
//! ## Example
//!
//! ```bash
//! DOCTOR_ENABLE=1 DOCTOR_CPU_PROFILE=/tmp/svc.cprof ./my-service
//! ```

use clap::{ArgAction, Args};
use std::path::PathBuf;

pub const DEFAULT_CPU_PROFILE: &str = "prof.cprof";
pub const DEFAULT_HEAP_PROFILE: &str = "prof.mprof";
pub const DEFAULT_CPU_FREQ: i32 = 100;

/// Doctor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorConfig {
    /// Master switch; a disabled doctor is built but never started
    pub enable: bool,
    /// Base path for CPU profile segments (`<base>_1`, `<base>_2`, ...)
    pub cpu_profile: Option<PathBuf>,
    /// Heap snapshot path, overwritten on every update
    pub heap_profile: Option<PathBuf>,
    pub show_gc_stats: bool,
    pub show_mem_stats: bool,
    pub show_thread_stats: bool,
    /// CPU sampling frequency in Hz
    pub cpu_frequency: i32,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            enable: false,
            cpu_profile: Some(PathBuf::from(DEFAULT_CPU_PROFILE)),
            heap_profile: Some(PathBuf::from(DEFAULT_HEAP_PROFILE)),
            show_gc_stats: true,
            show_mem_stats: true,
            show_thread_stats: true,
            cpu_frequency: DEFAULT_CPU_FREQ,
        }
    }
}

impl DoctorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            enable: env_bool("DOCTOR_ENABLE").unwrap_or(defaults.enable),
            cpu_profile: env_path("DOCTOR_CPU_PROFILE").unwrap_or(defaults.cpu_profile),
            heap_profile: env_path("DOCTOR_HEAP_PROFILE").unwrap_or(defaults.heap_profile),
            show_gc_stats: env_bool("DOCTOR_STATS_GC").unwrap_or(defaults.show_gc_stats),
            show_mem_stats: env_bool("DOCTOR_STATS_MEM").unwrap_or(defaults.show_mem_stats),
            show_thread_stats: env_bool("DOCTOR_STATS_THREADS")
                .unwrap_or(defaults.show_thread_stats),
            cpu_frequency: std::env::var("DOCTOR_CPU_FREQ")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&v| v > 0)
                .unwrap_or(defaults.cpu_frequency),
        }
    }

    pub fn enabled(mut self) -> Self {
        self.enable = true;
        self
    }

    pub fn with_cpu_profile(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.cpu_profile = path.map(Into::into);
        self
    }

    pub fn with_heap_profile(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.heap_profile = path.map(Into::into);
        self
    }

    /// Turn all three stats categories on or off at once
    pub fn with_stats(mut self, show: bool) -> Self {
        self.show_gc_stats = show;
        self.show_mem_stats = show;
        self.show_thread_stats = show;
        self
    }
}

/// Empty string means "disabled"
fn non_empty_path(s: &str) -> Option<PathBuf> {
    if s.is_empty() {
        None
    } else {
        Some(PathBuf::from(s))
    }
}

fn env_path(key: &str) -> Option<Option<PathBuf>> {
    std::env::var(key).ok().map(|s| non_empty_path(&s))
}

fn env_bool(key: &str) -> Option<bool> {
    let val = std::env::var(key).ok()?;
    match val.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("{}='{}' not recognized, using default", key, val);
            None
        }
    }
}

/// Doctor flags, meant to be `#[command(flatten)]`ed into a host CLI
#[derive(Debug, Clone, Args)]
pub struct DoctorArgs {
    /// Enable doctor mode (SIGINT dumps stats, twice within a second exits)
    #[arg(long = "doctor")]
    pub enable: bool,

    /// Write CPU profile segments to <PATH>_1, <PATH>_2, ... (empty disables)
    #[arg(long = "cpu", value_name = "PATH", default_value = DEFAULT_CPU_PROFILE)]
    pub cpu_profile: String,

    /// Write the heap snapshot to this file (empty disables)
    #[arg(long = "mem", value_name = "PATH", default_value = DEFAULT_HEAP_PROFILE)]
    pub heap_profile: String,

    /// Show collection stats
    #[arg(long = "statsgc", value_name = "BOOL", action = ArgAction::Set, default_value_t = true)]
    pub show_gc_stats: bool,

    /// Show memory stats
    #[arg(long = "statsmem", value_name = "BOOL", action = ArgAction::Set, default_value_t = true)]
    pub show_mem_stats: bool,

    /// Show thread and task counts
    #[arg(long = "statsthreads", value_name = "BOOL", action = ArgAction::Set, default_value_t = true)]
    pub show_thread_stats: bool,

    /// CPU sampling frequency in Hz
    #[arg(long = "cpu-freq", value_name = "HZ", default_value_t = DEFAULT_CPU_FREQ,
          value_parser = clap::value_parser!(i32).range(1..))]
    pub cpu_frequency: i32,
}

impl From<DoctorArgs> for DoctorConfig {
    fn from(args: DoctorArgs) -> Self {
        Self {
            enable: args.enable,
            cpu_profile: non_empty_path(&args.cpu_profile),
            heap_profile: non_empty_path(&args.heap_profile),
            show_gc_stats: args.show_gc_stats,
            show_mem_stats: args.show_mem_stats,
            show_thread_stats: args.show_thread_stats,
            cpu_frequency: args.cpu_frequency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        doctor: DoctorArgs,
    }

    fn parse(args: &[&str]) -> DoctorConfig {
        let argv = std::iter::once("svc").chain(args.iter().copied());
        TestCli::parse_from(argv).doctor.into()
    }

    const VARS: [&str; 7] = [
        "DOCTOR_ENABLE",
        "DOCTOR_CPU_PROFILE",
        "DOCTOR_HEAP_PROFILE",
        "DOCTOR_STATS_GC",
        "DOCTOR_STATS_MEM",
        "DOCTOR_STATS_THREADS",
        "DOCTOR_CPU_FREQ",
    ];

    // Runs `f` with the given vars set and every other DOCTOR_* var removed,
    // restoring the originals afterwards. Tests using it are #[serial].
    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let saved: Vec<_> = VARS.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        // SAFETY: env-touching tests are serialized
        unsafe {
            for k in VARS {
                std::env::remove_var(k);
            }
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }

        let result = f();

        // SAFETY: env-touching tests are serialized
        unsafe {
            for (k, orig) in saved {
                match orig {
                    Some(v) => std::env::set_var(k, v),
                    None => std::env::remove_var(k),
                }
            }
        }
        result
    }

    #[test]
    fn test_config_defaults() {
        let config = DoctorConfig::default();
        assert!(!config.enable);
        assert_eq!(config.cpu_profile, Some(PathBuf::from("prof.cprof")));
        assert_eq!(config.heap_profile, Some(PathBuf::from("prof.mprof")));
        assert!(config.show_gc_stats);
        assert!(config.show_mem_stats);
        assert!(config.show_thread_stats);
        assert_eq!(config.cpu_frequency, 100);
    }

    #[test]
    fn test_args_defaults_match_config_defaults() {
        assert_eq!(parse(&[]), DoctorConfig::default());
    }

    #[test]
    fn test_args_all_values() {
        let config = parse(&[
            "--doctor",
            "--cpu",
            "/tmp/x",
            "--mem",
            "/tmp/y",
            "--statsgc",
            "false",
            "--statsmem=false",
            "--statsthreads",
            "false",
            "--cpu-freq",
            "250",
        ]);
        assert!(config.enable);
        assert_eq!(config.cpu_profile, Some(PathBuf::from("/tmp/x")));
        assert_eq!(config.heap_profile, Some(PathBuf::from("/tmp/y")));
        assert!(!config.show_gc_stats);
        assert!(!config.show_mem_stats);
        assert!(!config.show_thread_stats);
        assert_eq!(config.cpu_frequency, 250);
    }

    #[test]
    fn test_args_empty_path_disables_profile() {
        let config = parse(&["--cpu=", "--mem="]);
        assert_eq!(config.cpu_profile, None);
        assert_eq!(config.heap_profile, None);
    }

    #[test]
    fn test_args_reject_zero_frequency() {
        let argv = ["svc", "--cpu-freq", "0"];
        assert!(TestCli::try_parse_from(argv).is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_all_values() {
        let config = with_env(
            &[
                ("DOCTOR_ENABLE", "1"),
                ("DOCTOR_CPU_PROFILE", "/var/tmp/svc.cprof"),
                ("DOCTOR_HEAP_PROFILE", ""),
                ("DOCTOR_STATS_GC", "false"),
                ("DOCTOR_STATS_MEM", "off"),
                ("DOCTOR_STATS_THREADS", "yes"),
                ("DOCTOR_CPU_FREQ", "49"),
            ],
            DoctorConfig::from_env,
        );
        assert!(config.enable);
        assert_eq!(config.cpu_profile, Some(PathBuf::from("/var/tmp/svc.cprof")));
        assert_eq!(config.heap_profile, None);
        assert!(!config.show_gc_stats);
        assert!(!config.show_mem_stats);
        assert!(config.show_thread_stats);
        assert_eq!(config.cpu_frequency, 49);
    }

    #[test]
    #[serial]
    fn test_from_env_unset_is_default() {
        let config = with_env(&[], DoctorConfig::from_env);
        assert_eq!(config, DoctorConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_values() {
        let config = with_env(
            &[
                ("DOCTOR_ENABLE", "maybe"),
                ("DOCTOR_CPU_FREQ", "0"), // 0 should use default
            ],
            DoctorConfig::from_env,
        );
        assert!(!config.enable);
        assert_eq!(config.cpu_frequency, DEFAULT_CPU_FREQ);
    }

    #[test]
    fn test_builders() {
        let config = DoctorConfig::default()
            .enabled()
            .with_cpu_profile(Some("x"))
            .with_heap_profile(None::<PathBuf>)
            .with_stats(false);
        assert!(config.enable);
        assert_eq!(config.cpu_profile, Some(PathBuf::from("x")));
        assert_eq!(config.heap_profile, None);
        assert!(!config.show_gc_stats && !config.show_mem_stats && !config.show_thread_stats);
    }
}
