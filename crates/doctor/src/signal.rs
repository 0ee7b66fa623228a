//! SIGINT listener
//!
//! Signal handlers can only safely call async-signal-safe functions, and a
//! doctor dump takes locks, allocates and writes files. So nothing runs in
//! signal context: signal-hook's iterator API queues the signal and a
//! dedicated thread (`doctor-signals`) picks it up and runs the callback.
//!
//! Unlike a fire-and-forget handler thread, the listener can be closed and
//! joined, which lets tests and orderly shutdowns stop it deterministically.
//!
//! Unregistering a signal-hook action leaves its handler installed, so a
//! closed listener would otherwise swallow every later SIGINT. Closing arms
//! a conditional default action instead: SIGINT terminates the process
//! again until the next listener starts.

use std::thread::JoinHandle;

#[cfg(all(unix, feature = "signals"))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(all(unix, feature = "signals"))]
use std::sync::{Arc, OnceLock};

/// Flag of the conditional default SIGINT action, registered on first close
#[cfg(all(unix, feature = "signals"))]
static TERMINATE_ON_INTERRUPT: OnceLock<Option<Arc<AtomicBool>>> = OnceLock::new();

pub struct SignalListener {
    #[cfg(all(unix, feature = "signals"))]
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

/// Spawn the listener thread, calling `on_interrupt` for every SIGINT
#[cfg(all(unix, feature = "signals"))]
pub fn listen_for_interrupts<F>(mut on_interrupt: F) -> std::io::Result<SignalListener>
where
    F: FnMut() + Send + 'static,
{
    use signal_hook::consts::SIGINT;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT])?;
    let handle = signals.handle();
    if let Some(Some(flag)) = TERMINATE_ON_INTERRUPT.get() {
        flag.store(false, Ordering::SeqCst);
    }

    let thread = std::thread::Builder::new()
        .name("doctor-signals".to_string())
        .spawn(move || {
            tracing::debug!("listening for interrupt signals");
            for sig in signals.forever() {
                if sig == SIGINT {
                    on_interrupt();
                }
            }
            tracing::debug!("interrupt listener closed");
        });

    match thread {
        Ok(thread) => Ok(SignalListener {
            handle,
            thread: Some(thread),
        }),
        Err(e) => {
            handle.close();
            restore_default_interrupt();
            Err(e)
        }
    }
}

/// Make SIGINT terminate the process again
#[cfg(all(unix, feature = "signals"))]
fn restore_default_interrupt() {
    let flag = TERMINATE_ON_INTERRUPT.get_or_init(|| {
        let flag = Arc::new(AtomicBool::new(false));
        match signal_hook::flag::register_conditional_default(
            signal_hook::consts::SIGINT,
            Arc::clone(&flag),
        ) {
            Ok(_) => Some(flag),
            Err(e) => {
                tracing::warn!("could not restore default SIGINT handling: {}", e);
                None
            }
        }
    });
    if let Some(flag) = flag {
        flag.store(true, Ordering::SeqCst);
    }
}

/// Whether SIGINT currently falls through to the default action
#[cfg(all(unix, feature = "signals"))]
pub fn interrupt_terminates() -> bool {
    matches!(TERMINATE_ON_INTERRUPT.get(), Some(Some(flag)) if flag.load(Ordering::SeqCst))
}

#[cfg(not(all(unix, feature = "signals")))]
pub fn listen_for_interrupts<F>(_on_interrupt: F) -> std::io::Result<SignalListener>
where
    F: FnMut() + Send + 'static,
{
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "interrupt listener requires Unix and the 'signals' feature",
    ))
}

impl SignalListener {
    /// Stop listening, hand SIGINT back to the default action and wait for
    /// the listener thread to finish
    pub fn close(mut self) {
        #[cfg(all(unix, feature = "signals"))]
        {
            self.handle.close();
            restore_default_interrupt();
        }

        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("interrupt listener thread panicked");
        }
    }
}

#[cfg(all(test, unix, feature = "signals"))]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    #[serial]
    fn test_interrupt_reaches_callback() {
        let (tx, rx) = mpsc::channel();
        let listener = listen_for_interrupts(move || {
            let _ = tx.send(());
        })
        .unwrap();

        // SAFETY: raise has no preconditions; the handler is registered above
        unsafe { libc::raise(libc::SIGINT) };
        rx.recv_timeout(Duration::from_secs(5))
            .expect("callback should run after SIGINT");

        listener.close();
    }

    #[test]
    #[serial]
    fn test_close_hands_interrupt_back_until_next_listener() {
        let listener = listen_for_interrupts(|| {}).unwrap();
        assert!(!interrupt_terminates());

        listener.close();
        assert!(interrupt_terminates());

        let listener = listen_for_interrupts(|| {}).unwrap();
        assert!(!interrupt_terminates());
        listener.close();
    }

    #[test]
    #[serial]
    fn test_close_joins_thread() {
        let listener = listen_for_interrupts(|| {}).unwrap();
        // Returns only once the thread is gone
        listener.close();
    }
}
