//! Thread and task counts
//!
//! OS threads come from `/proc/self/status` (Linux only). Task counts come
//! from the tokio runtime metrics when the doctor was given a runtime handle,
//! either captured at start or set through [`crate::Doctor::with_runtime`].

use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStats {
    pub workers: usize,
    pub alive_tasks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadStats {
    pub os_threads: Option<usize>,
    pub runtime: Option<RuntimeStats>,
}

pub fn thread_snapshot(runtime: Option<&Handle>) -> ThreadStats {
    ThreadStats {
        os_threads: os_thread_count(),
        runtime: runtime.map(|handle| {
            let metrics = handle.metrics();
            RuntimeStats {
                workers: metrics.num_workers(),
                alive_tasks: metrics.num_alive_tasks(),
            }
        }),
    }
}

#[cfg(target_os = "linux")]
fn os_thread_count() -> Option<usize> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|n| n.trim().parse().ok())
}

#[cfg(not(target_os = "linux"))]
fn os_thread_count() -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_runtime() {
        let stats = thread_snapshot(None);
        assert_eq!(stats.runtime, None);
        #[cfg(target_os = "linux")]
        assert!(stats.os_threads.unwrap() >= 1);
    }

    #[test]
    fn test_counts_runtime_tasks() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let (_release, wait) = tokio::sync::oneshot::channel::<()>();
        rt.spawn(async move {
            tx.send(()).unwrap();
            let _ = wait.await;
        });
        rx.recv().unwrap();

        let stats = thread_snapshot(Some(rt.handle()));
        let runtime = stats.runtime.unwrap();
        assert_eq!(runtime.workers, 2);
        assert!(runtime.alive_tasks >= 1);
    }
}
