//! Pinning I/O worker threads to CPU cores.
//!
//! The runtime threads that read sockets, decode messages and rebuild books
//! can be spread over a configured core list to avoid scheduler jitter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

/// Pin the calling thread to core `core_id` (an index into the core list
/// reported by the OS). Returns whether the OS accepted the request.
pub fn pin_current_thread(core_id: usize) -> bool {
    let cores = core_affinity::get_core_ids().unwrap_or_default();
    let Some(&core) = cores.get(core_id) else {
        warn!("cannot pin to CPU core {core_id}: only {} core(s) available", cores.len());
        return false;
    };
    let pinned = core_affinity::set_for_current(core);
    if pinned {
        debug!("pinned {:?} to CPU core {core_id}", std::thread::current().name());
    } else {
        warn!("OS refused to pin thread to CPU core {core_id}");
    }
    pinned
}

/// Thread-start hook for `tokio::runtime::Builder::on_thread_start`: each new
/// thread is pinned to the next entry of `cores`, wrapping around. Negative
/// entries leave that thread unpinned, as does an empty list.
pub fn round_robin(cores: Vec<i32>) -> impl Fn() + Send + Sync + 'static {
    let started = Arc::new(AtomicUsize::new(0));
    move || {
        if cores.is_empty() {
            return;
        }
        let slot = started.fetch_add(1, Ordering::Relaxed) % cores.len();
        if let Ok(core_id) = usize::try_from(cores[slot]) {
            pin_current_thread(core_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_negative_lists_never_pin() {
        round_robin(Vec::new())();
        round_robin(vec![-1, -2])();
    }

    #[test]
    fn out_of_range_core_is_refused() {
        assert!(!pin_current_thread(usize::MAX));
    }
}
