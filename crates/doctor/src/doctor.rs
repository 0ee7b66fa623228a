//! The doctor controller
//!
//! Owns all mutable diagnostics state behind one mutex, so a signal-driven
//! dump and a direct [`Doctor::update`] call from the host never interleave.
//!
//! ## Trigger handling
//!
//! ```text
//!   SIGINT ──▶ handle_trigger ──┬─ armed ─────────────▶ update, record time
//!                               └─ within 1s of last ─▶ exit(2)
//! ```
//!
//! ## Shutdown
//!
//! Dropping the last handle does not flush the CPU segment in progress.
//! Call [`Doctor::stop`] before exiting to keep the final segment.

use crate::config::{DoctorArgs, DoctorConfig};
use crate::cpu_profile::CpuProfile;
use crate::cpu_sampler;
use crate::debounce::{DEBOUNCE_WINDOW, DOUBLE_SIGNAL_EXIT_CODE, LastTrigger, TriggerDecision};
use crate::dump;
use crate::gc_stats::gc_snapshot;
use crate::heap_profile::write_heap_profile;
use crate::memory_stats::memory_snapshot;
use crate::signal::{SignalListener, listen_for_interrupts};
use crate::threads::thread_snapshot;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Handle to the diagnostics controller; clones share the same state
#[derive(Clone)]
pub struct Doctor {
    state: Arc<Mutex<ControllerState>>,
    listener: Arc<Mutex<Option<SignalListener>>>,
}

struct ControllerState {
    config: DoctorConfig,
    started_at: Option<Instant>,
    last_trigger: LastTrigger,
    cpu: CpuProfile,
    runtime: Option<Handle>,
    updates: u64,
}

impl Doctor {
    /// Build a doctor without starting it
    pub fn new(config: DoctorConfig) -> Self {
        let cpu = CpuProfile::new(config.cpu_profile.clone(), config.cpu_frequency);
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                config,
                started_at: None,
                last_trigger: LastTrigger::Unset,
                cpu,
                runtime: None,
                updates: 0,
            })),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Build a doctor and start it if the config enables it
    pub fn start_with_config(config: DoctorConfig) -> Self {
        let enable = config.enable;
        let doctor = Self::new(config);
        if enable {
            doctor.start();
        }
        doctor
    }

    /// Same as [`Doctor::start_with_config`] for parsed command-line flags
    pub fn start_with_args(args: DoctorArgs) -> Self {
        Self::start_with_config(args.into())
    }

    /// Same as [`Doctor::start_with_config`] for `DOCTOR_*` environment variables
    pub fn start_from_env() -> Self {
        Self::start_with_config(DoctorConfig::from_env())
    }

    /// Report task counts from this runtime
    pub fn with_runtime(self, handle: Handle) -> Self {
        self.lock().runtime = Some(handle);
        self
    }

    /// Start the clock, listen for SIGINT and open the first CPU segment
    ///
    /// Starting twice is a no-op.
    pub fn start(&self) {
        let mut state = self.lock();
        if state.started_at.is_some() {
            debug!("doctor already started");
            return;
        }

        info!("calling the doctor...");
        state.started_at = Some(Instant::now());
        if state.runtime.is_none() {
            state.runtime = Handle::try_current().ok();
        }

        let doctor = self.clone();
        match listen_for_interrupts(move || {
            if doctor.handle_trigger() == TriggerDecision::Exit {
                std::process::exit(DOUBLE_SIGNAL_EXIT_CODE);
            }
        }) {
            Ok(listener) => {
                *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
            }
            Err(e) => warn!("interrupt listener not installed: {}", e),
        }

        if state.cpu.base().is_some() && !cpu_sampler::AVAILABLE {
            warn!("cpu sampling not compiled in; cpu profile segments will be empty");
        }
        state.cpu.rotate();
    }

    /// Dump stats, write the heap snapshot and rotate the CPU profile
    pub fn update(&self) {
        self.lock().update();
    }

    /// React to an interrupt arriving now
    pub fn handle_trigger(&self) -> TriggerDecision {
        self.handle_trigger_at(Instant::now())
    }

    /// React to an interrupt arriving at `now`
    ///
    /// Returns [`TriggerDecision::Exit`] without running an update when the
    /// previous dump finished less than a second before `now`. Acting on the
    /// exit is up to the caller; the signal listener exits with status 2.
    pub fn handle_trigger_at(&self, now: Instant) -> TriggerDecision {
        let mut state = self.lock();
        info!("runtime: {:?}", state.uptime_at(now));

        match state.last_trigger.decide(now) {
            TriggerDecision::Exit => {
                info!("second interrupt within {:?}, exiting", DEBOUNCE_WINDOW);
                TriggerDecision::Exit
            }
            TriggerDecision::Dump => {
                state.update();
                info!("hit Ctrl-C again within a second to exit");
                // The window opens once the dump is done
                state.last_trigger.record(Instant::now().max(now));
                TriggerDecision::Dump
            }
        }
    }

    /// Stop listening for SIGINT and flush the CPU segment in progress
    ///
    /// A later [`Doctor::update`] resumes rotation with the next file number.
    pub fn stop(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.close();
        }

        let mut state = self.lock();
        state.cpu.flush();
        info!("doctor stopped after {:?}", state.uptime_at(Instant::now()));
    }

    pub fn is_started(&self) -> bool {
        self.lock().started_at.is_some()
    }

    /// Time since [`Doctor::start`], None before it
    pub fn uptime(&self) -> Option<Duration> {
        self.lock().started_at.map(|at| at.elapsed())
    }

    /// CPU profile rotations so far
    pub fn write_count(&self) -> u64 {
        self.lock().cpu.writes()
    }

    /// Updates run so far, from any trigger
    pub fn update_count(&self) -> u64 {
        self.lock().updates
    }

    /// CPU profile base path, None once profiling has been disabled
    pub fn cpu_profile_base(&self) -> Option<PathBuf> {
        self.lock().cpu.base().map(PathBuf::from)
    }

    /// Segment file currently receiving CPU samples
    pub fn active_cpu_segment(&self) -> Option<PathBuf> {
        self.lock().cpu.active_path().map(PathBuf::from)
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        // A panic mid-update leaves nothing half-written that matters here
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ControllerState {
    fn uptime_at(&self, now: Instant) -> Duration {
        self.started_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(Duration::ZERO)
    }

    fn update(&mut self) {
        self.updates += 1;

        if self.config.show_gc_stats {
            dump::log_gc_stats(&gc_snapshot());
        }
        if self.config.show_thread_stats {
            dump::log_thread_stats(&thread_snapshot(self.runtime.as_ref()));
        }
        if self.config.show_mem_stats {
            dump::log_memory_stats(&memory_snapshot());
        }

        if let Some(path) = &self.config.heap_profile {
            match write_heap_profile(path, self.uptime_at(Instant::now())) {
                Ok(()) => info!(">> writing heap profile to {}", path.display()),
                Err(e) => error!("{}", e),
            }
        }

        if let Some(base) = self.cpu.base() {
            info!(">> writing cpu samples to {}", base.display());
            self.cpu.rotate();
        }
    }
}
