//! Per-job run guards
//!
//! Each job name owns one atomic flag. A trigger that finds the flag set is
//! skipped, never queued: provider windows overlap between runs, so a
//! skipped trigger loses nothing, while queueing would stack identical work
//! behind a slow CRM.

use std::sync::atomic::{AtomicBool, Ordering};

pub struct RunGuard {
    name: &'static str,
    running: AtomicBool,
}

impl RunGuard {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the guard; `None` means the job is already running. The
    /// returned token releases on drop, including on panic or early return.
    pub fn try_acquire(&self) -> Option<RunToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunToken { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

pub struct RunToken<'a> {
    guard: &'a RunGuard,
}

impl Drop for RunToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let guard = RunGuard::new("sync-messages-tigo");
        let token = guard.try_acquire();
        assert!(token.is_some());
        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());

        drop(token);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }
}
