use crate::error::CoreError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Coarse process lifecycle state, independent of the per-session state
/// machines owned by ShortcutEngine/SessionFramer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessState {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

pub struct StateManager {
    state: Arc<RwLock<ProcessState>>,
    state_tx: Sender<ProcessState>,
    state_rx: Receiver<ProcessState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(ProcessState::Initializing)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: ProcessState) -> Result<(), CoreError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (ProcessState::Initializing, ProcessState::Running)
                | (ProcessState::Running, ProcessState::Stopping)
                | (ProcessState::Stopping, ProcessState::Stopped)
        );

        if !valid {
            return Err(CoreError::Fatal(format!(
                "invalid state transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::info!("state transition: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> ProcessState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<ProcessState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions_succeed() {
        let mgr = StateManager::new();
        mgr.transition(ProcessState::Running).unwrap();
        mgr.transition(ProcessState::Stopping).unwrap();
        mgr.transition(ProcessState::Stopped).unwrap();
        assert_eq!(mgr.current(), ProcessState::Stopped);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mgr = StateManager::new();
        assert!(mgr.transition(ProcessState::Stopped).is_err());
        assert_eq!(mgr.current(), ProcessState::Initializing);
    }
}
