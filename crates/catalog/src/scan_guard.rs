use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::CatalogError;

/// Process-wide guard keeping scans exclusive. A second start request is
/// rejected, never queued.
#[derive(Debug, Default)]
pub struct ScanCoordinator {
    running: AtomicBool,
}

impl ScanCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the scan slot. Every successful claim must be released with
    /// `finish`, including on scan failure.
    pub fn try_start(&self) -> Result<(), CatalogError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(())
        } else {
            Err(CatalogError::ScanInProgress)
        }
    }

    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::ScanCoordinator;
    use crate::store::CatalogError;

    #[test]
    fn second_start_is_rejected_until_finish() {
        let coordinator = ScanCoordinator::new();
        coordinator.try_start().unwrap();
        assert!(coordinator.is_running());
        assert!(matches!(
            coordinator.try_start(),
            Err(CatalogError::ScanInProgress)
        ));

        coordinator.finish();
        assert!(!coordinator.is_running());
        coordinator.try_start().unwrap();
    }
}
