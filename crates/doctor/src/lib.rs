//! Doctor: on-demand diagnostics for long-running services
//!
//! Attach a [`Doctor`] at startup and a running process can be asked, with a
//! plain Ctrl-C (SIGINT), to dump what it is doing:
//!
//! - collection stats reported by the host ([`gc_stats`])
//! - thread and async task counts ([`threads`])
//! - allocator and process memory stats ([`memory_stats`])
//! - a heap snapshot file, overwritten on every dump
//! - a rotating CPU profile: `<base>_1`, `<base>_2`, ... one file per dump
//!
//! A second Ctrl-C within one second of a dump exits the process with
//! status 2.
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOC: doctor::TrackingAllocator = doctor::TrackingAllocator::new();
//!
//! #[derive(clap::Parser)]
//! struct Cli {
//!     #[command(flatten)]
//!     doctor: doctor::DoctorArgs,
//! }
//!
//! let cli = Cli::parse();
//! let doctor = doctor::Doctor::start_with_args(cli.doctor);
//! run_service();
//! doctor.stop(); // keep the last CPU segment
//! ```
//!
//! # Modules
//!
//! - `config`: defaults, `DOCTOR_*` environment variables and clap flags
//! - `debounce`: dump-or-exit decision for repeated interrupts
//! - `doctor`: the controller
//! - `dump`: log formatting of the stats blocks
//! - `error`: `DoctorError`
//! - `gc_stats`: host-reported collection pauses
//! - `memory_stats`: tracking allocator and process memory
//! - `threads`: OS thread and tokio task counts
//! - `cpu_profile`: CPU segment rotation over pprof-rs
//! - `heap_profile`: heap snapshot writer
//! - `signal`: SIGINT listener thread

pub mod config;
pub mod cpu_profile;
pub mod debounce;
pub mod doctor;
pub mod dump;
pub mod error;
pub mod gc_stats;
pub mod heap_profile;
pub mod memory_stats;
pub mod signal;
pub mod threads;

#[cfg(all(unix, feature = "cpu-profile"))]
mod cpu_sampler;
#[cfg(not(all(unix, feature = "cpu-profile")))]
#[path = "cpu_sampler_stub.rs"]
mod cpu_sampler;

pub use config::{DoctorArgs, DoctorConfig};
pub use debounce::{DEBOUNCE_WINDOW, DOUBLE_SIGNAL_EXIT_CODE, LastTrigger, TriggerDecision};
pub use doctor::Doctor;
pub use error::DoctorError;
pub use gc_stats::{GcStats, record_collection, time_collection};
pub use memory_stats::{MemStats, TrackingAllocator};
pub use threads::ThreadStats;
