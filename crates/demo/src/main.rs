//! doctor-demo
//!
//! A small service with doctor mode attached: a few tokio tasks fill and
//! sweep caches so the stats and profiles have something to show.
//!
//! ```bash
//! doctor-demo --doctor --cpu /tmp/demo.cprof --mem /tmp/demo.mprof
//! # Ctrl-C dumps stats and rotates /tmp/demo.cprof_N
//! # Ctrl-C twice within a second exits with status 2
//! ```

use clap::Parser;
use doctor::{Doctor, DoctorArgs, TrackingAllocator};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static ALLOC: TrackingAllocator = TrackingAllocator::new();

#[derive(Parser)]
#[command(name = "doctor-demo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sample service with doctor mode attached", long_about = None)]
struct Cli {
    /// Number of workload tasks
    #[arg(long, default_value_t = 4)]
    tasks: usize,

    /// Stop after this many seconds (runs until interrupted when omitted)
    #[arg(long, value_name = "SECS")]
    run_for: Option<u64>,

    /// Keep the workload running this many seconds after the doctor stops
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    drain: u64,

    #[command(flatten)]
    doctor: DoctorArgs,
}

/// Entries kept per cache before a sweep
const CACHE_LIMIT: usize = 2048;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("doctor=info".parse().expect("valid directive"))
                .add_directive("doctor_demo=info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let doctor = Doctor::start_with_args(cli.doctor);

    for id in 0..cli.tasks {
        tokio::spawn(workload(id));
    }
    info!("serving {} workload tasks", cli.tasks);

    match cli.run_for {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending::<()>().await,
    }

    if doctor.is_started() {
        doctor.stop();
    }
    if cli.drain > 0 {
        info!("draining for {}s", cli.drain);
        tokio::time::sleep(Duration::from_secs(cli.drain)).await;
    }
    info!("demo finished");
}

/// Fill a cache with hashed payloads and sweep it when it grows too large
async fn workload(id: usize) {
    let mut cache: HashMap<u64, Vec<u8>> = HashMap::new();
    let mut key: u64 = id as u64;

    loop {
        for _ in 0..64 {
            key = key.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let len = 64 + (key % 4096) as usize;
            let payload: Vec<u8> = (0..len).map(|i| (key >> (i % 56)) as u8).collect();
            cache.insert(key, payload);
        }

        if cache.len() > CACHE_LIMIT {
            let _pause = doctor::time_collection();
            let parity = key % 2;
            cache.retain(|k, _| k % 2 == parity);
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
