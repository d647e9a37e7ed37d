//! Optional memory-sampling thread (spec §2 "Watchdog", §7
//! "memory-limit-exceeded"): wakes on an interval, samples resident
//! memory, and invokes an eviction sweep; if the configured cap is
//! exceeded it raises a fatal condition instead.
//!
//! The watchdog owns no records (spec §3 "Lifecycle"); it only reads
//! memory stats via `sys-info` (already a teacher dependency, though
//! unused by the original core) and calls back into the owning `Odb`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, trace, warn};

use crate::error::Error;

/// What the watchdog does each time its sleep interval elapses.
pub trait WatchdogSweep: Send + Sync {
    /// Run one eviction sweep.
    fn sweep(&self);
}

struct Shared {
    stop: AtomicBool,
}

/// Samples resident memory every `interval` and invokes `sweep.sweep()`
/// on a background thread, until dropped or [`Watchdog::stop`] is
/// called.
pub struct Watchdog {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    /// Start sampling. `limit_kb`, if set, is a resident-memory cap
    /// (kilobytes) past which the watchdog treats the condition as
    /// fatal (spec §7 "memory-limit-exceeded").
    pub fn start<S>(interval: Duration, limit_kb: Option<u64>, sweep: S) -> Watchdog
    where
        S: WatchdogSweep + 'static,
    {
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
        });
        let thread_shared = shared.clone();
        let handle = thread::spawn(move || run(thread_shared, interval, limit_kb, sweep));
        Watchdog {
            shared,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Sample current resident memory, in kilobytes, via `sys-info`.
    pub fn sample_rss_kb() -> Option<u64> {
        sys_info::mem_info().ok().map(|info| info.total - info.avail)
    }

    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<S: WatchdogSweep>(shared: Arc<Shared>, interval: Duration, limit_kb: Option<u64>, sweep: S) {
    trace!("watchdog: starting, interval={:?}", interval);
    while !shared.stop.load(Ordering::SeqCst) {
        thread::sleep(interval);
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        if let Some(limit) = limit_kb {
            match Watchdog::sample_rss_kb() {
                Some(rss) if rss > limit => {
                    error!("watchdog: rss {}kb exceeds limit {}kb", rss, limit);
                    let err = Error::MemoryLimitExceeded { rss, limit };
                    panic!("{}", err);
                }
                Some(_) => {}
                None => warn!("watchdog: failed to sample resident memory"),
            }
        }
        sweep.sweep();
    }
    trace!("watchdog: stopped");
}

#[cfg(test)]
#[path = "watchdog_test.rs"]
mod watchdog_test;
