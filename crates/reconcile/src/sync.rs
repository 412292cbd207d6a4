//! Serialization of system mutations
//!
//! A remote sync rewrites shared boot artifacts (DHCP, DNS, TFTP) on the
//! server, and two syncs running at once corrupt them. Every system
//! mutation, from building the entity to the final sync, runs inside an
//! exclusive section. The section is injected into the reconciler so tests
//! can swap in an instrumented or no-op one.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A critical section shared by every reconciliation in the process.
pub trait ExclusiveSection: Send + Sync {
    /// Block until the section is free. It stays held until the guard drops.
    fn acquire(&self) -> SectionGuard<'_>;
}

/// Holds an [`ExclusiveSection`] until dropped.
#[must_use = "the section is released as soon as the guard is dropped"]
pub struct SectionGuard<'a> {
    release: Option<Box<dyn FnOnce() + 'a>>,
    _held: Option<MutexGuard<'a, ()>>,
}

impl<'a> SectionGuard<'a> {
    /// Guard that holds nothing.
    pub fn unguarded() -> Self {
        Self {
            release: None,
            _held: None,
        }
    }

    /// Guard that runs `release` when dropped.
    pub fn with_release(release: impl FnOnce() + 'a) -> Self {
        Self {
            release: Some(Box::new(release)),
            _held: None,
        }
    }

    fn held(guard: MutexGuard<'a, ()>) -> Self {
        Self {
            release: None,
            _held: Some(guard),
        }
    }
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// One lock per process.
///
/// It does not coordinate separate processes or hosts.
#[derive(Debug, Default)]
pub struct ProcessLock {
    inner: Mutex<()>,
}

impl ProcessLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExclusiveSection for ProcessLock {
    fn acquire(&self) -> SectionGuard<'_> {
        // The lock guards no data, so a panic in another holder leaves
        // nothing inconsistent behind
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        SectionGuard::held(guard)
    }
}

/// No serialization at all, for single-threaded callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLock;

impl ExclusiveSection for NoLock {
    fn acquire(&self) -> SectionGuard<'_> {
        SectionGuard::unguarded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_process_lock_serializes_threads() {
        let lock = ProcessLock::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        let _guard = lock.acquire();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let lock = ProcessLock::new();
        let result = thread::scope(|s| {
            s.spawn(|| {
                let _guard = lock.acquire();
                panic!("holder failed");
            })
            .join()
        });
        assert!(result.is_err());

        // Still usable after the panic
        let _guard = lock.acquire();
    }

    #[test]
    fn test_release_hook_runs_on_drop() {
        let released = AtomicUsize::new(0);
        {
            let _guard = SectionGuard::with_release(|| {
                released.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(released.load(Ordering::SeqCst), 0);
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
