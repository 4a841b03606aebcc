//! Thread plumbing: cooperative stop flags and core-pinned worker threads.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

/// Cooperative run flag shared between a component loop and its owner.
///
/// Loops check [`is_running`](Self::is_running) once per iteration, so a
/// [`stop`](Self::stop) is observed within one iteration.
#[derive(Clone, Debug)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// A flag in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a named worker thread, optionally pinned to `core_id`.
///
/// A pinning failure is logged and the thread keeps running unpinned. An
/// `Err` returned by `body` is logged and the thread exits; other threads
/// are unaffected. The join handle yields `None` in that case.
pub fn spawn_pinned<F, T, E>(
    name: &str,
    core_id: Option<usize>,
    body: F,
) -> io::Result<JoinHandle<Option<T>>>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display,
{
    let thread_name = name.to_owned();
    thread::Builder::new().name(name.to_owned()).spawn(move || {
        if let Some(core_id) = core_id {
            pin_current_thread(&thread_name, core_id);
        }
        info!(thread = %thread_name, ?core_id, "thread started");

        match body() {
            Ok(value) => {
                info!(thread = %thread_name, "thread finished");
                Some(value)
            }
            Err(e) => {
                error!(thread = %thread_name, error = %e, "thread exited with error");
                None
            }
        }
    })
}

/// Pin the calling thread to one core.
///
/// Returns `false` (after logging) if the core does not exist or the OS
/// refused the request.
pub fn pin_current_thread(thread_name: &str, core_id: usize) -> bool {
    let Some(core) = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|c| c.id == core_id))
    else {
        warn!(thread = %thread_name, core_id, "core not available; running unpinned");
        return false;
    };

    if core_affinity::set_for_current(core) {
        true
    } else {
        warn!(thread = %thread_name, core_id, "failed to pin thread; running unpinned");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flag_shared_between_clones() {
        let flag = RunFlag::new();
        let other = flag.clone();
        assert!(other.is_running());
        flag.stop();
        assert!(!other.is_running());
    }

    #[test]
    fn test_spawn_returns_body_value() {
        let handle = spawn_pinned("test-ok", None, || Ok::<_, String>(42)).unwrap();
        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn test_spawn_error_yields_none() {
        let handle = spawn_pinned("test-err", None, || Err::<u32, _>("boom")).unwrap();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn test_worker_observes_stop() {
        let flag = RunFlag::new();
        let worker_flag = flag.clone();
        let handle = spawn_pinned("test-loop", None, move || {
            let mut spins = 0u64;
            while worker_flag.is_running() {
                spins += 1;
                std::hint::spin_loop();
            }
            Ok::<_, String>(spins)
        })
        .unwrap();

        flag.stop();
        assert!(handle.join().unwrap().is_some());
    }
}
