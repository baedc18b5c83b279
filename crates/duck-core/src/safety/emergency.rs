use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ChaosError, ChaosResult};

/// Process-wide kill switch. Every mutation path checks this before
/// touching external state. Triggering does not undo anything by itself;
/// the caller follows up with a rollback of all active experiments.
#[derive(Debug, Default)]
pub struct EmergencyStop {
    triggered: AtomicBool,
}

impl EmergencyStop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        tracing::warn!("emergency stop triggered");
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.triggered.store(false, Ordering::SeqCst);
        tracing::info!("emergency stop reset");
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> ChaosResult<()> {
        if self.is_triggered() {
            return Err(ChaosError::EmergencyStop);
        }
        Ok(())
    }
}
