//! Maintenance window on the store connection.
//!
//! While open, constraint checks and auto-increment side effects are relaxed
//! for setup-style inserts. `MaintenanceGuard` closes it on drop, so no exit
//! path of apply/revert can leave the store in the relaxed state.

use crate::error::Result;

pub trait MaintenanceWindow: Send + Sync {
    /// Disable foreign key checks and zero-value auto-increment.
    fn begin_maintenance(&self) -> Result<()>;

    /// Restore the connection's normal mode. Must not fail.
    fn end_maintenance(&self);
}

/// Scope guard: the window stays open exactly as long as the guard lives.
#[must_use = "the maintenance window closes as soon as the guard is dropped"]
pub struct MaintenanceGuard<'a> {
    window: &'a dyn MaintenanceWindow,
}

impl<'a> MaintenanceGuard<'a> {
    pub fn acquire(window: &'a dyn MaintenanceWindow) -> Result<Self> {
        window.begin_maintenance()?;
        tracing::debug!(target: "eav_patch.maintenance", "maintenance window opened");
        Ok(Self { window })
    }
}

impl Drop for MaintenanceGuard<'_> {
    fn drop(&mut self) {
        self.window.end_maintenance();
        tracing::debug!(target: "eav_patch.maintenance", "maintenance window closed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::error::ProvisionError;

    #[derive(Default)]
    struct CountingWindow {
        open: AtomicUsize,
        closed: AtomicUsize,
        refuse: AtomicBool,
    }

    impl MaintenanceWindow for CountingWindow {
        fn begin_maintenance(&self) -> Result<()> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(ProvisionError::SchemaEngine(anyhow::anyhow!("connection lost")));
            }
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn end_maintenance(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn run_failing_step(window: &CountingWindow) -> Result<()> {
        let _guard = MaintenanceGuard::acquire(window)?;
        Err(ProvisionError::NotFound("group General".into()))
    }

    #[test]
    fn guard_closes_on_scope_exit() {
        let window = CountingWindow::default();
        {
            let _guard = MaintenanceGuard::acquire(&window).unwrap();
            assert_eq!(window.open.load(Ordering::SeqCst), 1);
            assert_eq!(window.closed.load(Ordering::SeqCst), 0);
        }
        assert_eq!(window.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_closes_on_error_path() {
        let window = CountingWindow::default();
        assert!(run_failing_step(&window).is_err());
        assert_eq!(window.open.load(Ordering::SeqCst), 1);
        assert_eq!(window.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_begin_does_not_end() {
        let window = CountingWindow::default();
        window.refuse.store(true, Ordering::SeqCst);
        assert!(MaintenanceGuard::acquire(&window).is_err());
        assert_eq!(window.closed.load(Ordering::SeqCst), 0);
    }
}
