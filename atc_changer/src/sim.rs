//! In-process motion layer.
//!
//! Records every command it accepts so tests and the demo binary can see
//! what the engine asked for. Rejection can be switched on to exercise the
//! motion-failure path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::command::motion::{MotionCommand, MotionError, MotionLayer};

/// Recording motion layer. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMotion {
    issued: Arc<Mutex<Vec<MotionCommand>>>,
    reject: Arc<AtomicBool>,
}

impl SimulatedMotion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands accepted so far, oldest first.
    pub fn commands(&self) -> Vec<MotionCommand> {
        self.issued.lock().clone()
    }

    pub fn last(&self) -> Option<MotionCommand> {
        self.issued.lock().last().copied()
    }

    pub fn clear(&self) {
        self.issued.lock().clear();
    }

    /// Reject every following command until switched off.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::Release);
    }
}

impl MotionLayer for SimulatedMotion {
    fn issue(&mut self, command: MotionCommand) -> Result<(), MotionError> {
        if self.reject.load(Ordering::Acquire) {
            return Err(MotionError::Rejected(format!("{command} refused")));
        }
        trace!(%command, "simulated motion");
        self.issued.lock().push(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_log() {
        let sim = SimulatedMotion::new();
        let mut handle = sim.clone();
        handle.issue(MotionCommand::Home).unwrap();
        assert_eq!(sim.commands(), vec![MotionCommand::Home]);
        assert_eq!(sim.last(), Some(MotionCommand::Home));
    }

    #[test]
    fn rejects_when_switched_on() {
        let mut sim = SimulatedMotion::new();
        sim.set_reject(true);
        assert!(matches!(
            sim.issue(MotionCommand::Home),
            Err(MotionError::Rejected(_))
        ));
        assert!(sim.commands().is_empty());
    }
}
