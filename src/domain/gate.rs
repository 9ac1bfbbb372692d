use crate::error::ControlError;
use log::warn;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Single process-wide lock serializing every exclusive command. Never queues.
#[derive(Clone, Default)]
pub struct ConcurrencyGate {
    lock: Arc<Mutex<()>>,
}

/// Held for the duration of an exclusive command.
pub struct GatePass {
    _guard: OwnedMutexGuard<()>,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<GatePass, ControlError> {
        match self.lock.clone().try_lock_owned() {
            Ok(guard) => Ok(GatePass { _guard: guard }),
            Err(_) => {
                warn!("rejecting command, another command holds the lock");
                Err(ControlError::SystemBusy)
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
