//! Shared changer handle and step watchdog.
//!
//! [`Atc`] serializes every entry point through one mutex. Each call
//! locks, mutates and publishes the queued notifications before unlocking,
//! then flushes them, so listeners never run under the state lock, may call
//! back in, and see notifications in mutation order across threads.
//!
//! Every handle shares one [`StepWatchdog`] started on construction; it
//! stops when the last handle is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use atc_common::changer::config::ChangerConfig;
use atc_common::changer::error::{AtcError, FaultReason};
use atc_common::changer::safety::{InterlockField, InterlockState};
use atc_common::changer::state::{AtcMode, BootRecord, PocketId, SensorSweep, ToolNumber};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::command::motion::MotionLayer;
use crate::notify::{AtcListener, ListenerId, Notifier};
use crate::safety::recovery::RecoverySession;
use crate::state::machine::{AtcSnapshot, AtcStateMachine, StepOutcome, StepResult};

#[derive(Debug)]
struct Shared {
    machine: Mutex<AtcStateMachine>,
    notifier: Notifier,
}

impl Shared {
    fn with_machine<R>(&self, f: impl FnOnce(&mut AtcStateMachine) -> R) -> R {
        let result = {
            let mut machine = self.machine.lock();
            let result = f(&mut *machine);
            self.notifier.publish(machine.drain_events());
            result
        };
        self.notifier.flush();
        result
    }

    fn check_timeouts(&self, now: Instant) -> Option<AtcError> {
        self.with_machine(|m| m.check_timeouts(now))
    }
}

/// Cloneable, thread-safe changer handle.
#[derive(Debug, Clone)]
pub struct Atc {
    shared: Arc<Shared>,
    watchdog: Arc<StepWatchdog>,
}

impl Atc {
    /// Wrap `machine` and start its watchdog at the configured poll rate.
    ///
    /// Fails only if the watchdog thread cannot be spawned.
    pub fn new(machine: AtcStateMachine) -> std::io::Result<Self> {
        let poll = machine.config().watchdog_poll();
        let shared = Arc::new(Shared {
            machine: Mutex::new(machine),
            notifier: Notifier::new(),
        });
        let watchdog = StepWatchdog::spawn(Arc::downgrade(&shared), poll)?;
        Ok(Self {
            shared,
            watchdog: Arc::new(watchdog),
        })
    }

    /// Default interlocks, empty registry sized from `config`.
    pub fn from_config(
        config: ChangerConfig,
        motion: impl MotionLayer + 'static,
    ) -> std::io::Result<Self> {
        Self::new(AtcStateMachine::from_config(config, Box::new(motion)))
    }

    pub fn subscribe(&self, listener: impl AtcListener + 'static) -> ListenerId {
        self.shared.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.notifier.unsubscribe(id)
    }

    /// Run `f` under the lock, then deliver what it queued.
    pub(crate) fn with_machine<R>(&self, f: impl FnOnce(&mut AtcStateMachine) -> R) -> R {
        self.shared.with_machine(f)
    }

    /// Read-only access under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&AtcStateMachine) -> R) -> R {
        f(&*self.shared.machine.lock())
    }

    pub fn mode(&self) -> AtcMode {
        self.read(AtcStateMachine::mode)
    }

    pub fn query_state(&self) -> AtcSnapshot {
        self.read(AtcStateMachine::query_state)
    }

    pub fn boot_record(&self) -> BootRecord {
        self.read(AtcStateMachine::boot_record)
    }

    pub fn watchdog_running(&self) -> bool {
        self.watchdog.is_running()
    }

    // ─── Cycle ──────────────────────────────────────────────────────

    pub fn start_cycle(&self, target: PocketId) -> Result<(), AtcError> {
        self.with_machine(|m| m.start_cycle(target, Instant::now()))
    }

    pub fn advance_step(&self, result: StepResult) -> Result<StepOutcome, AtcError> {
        self.with_machine(|m| m.advance_step(result, Instant::now()))
    }

    pub fn report_fault(&self, reason: FaultReason) {
        self.with_machine(|m| m.report_fault(reason));
    }

    /// Operator abort. Only meaningful while Busy; returns false otherwise.
    pub fn abort(&self) -> bool {
        self.with_machine(|m| {
            if m.mode() != AtcMode::Busy {
                debug!(mode = %m.mode(), "abort ignored, no cycle running");
                return false;
            }
            m.report_fault(FaultReason::OperatorAbort);
            true
        })
    }

    /// Check the running step against `now`. The watchdog calls this on
    /// every poll.
    pub fn check_timeouts(&self, now: Instant) -> Option<AtcError> {
        self.shared.check_timeouts(now)
    }

    // ─── Sensor / Confirmed Events ──────────────────────────────────

    pub fn update_interlock(&self, field: InterlockField, value: bool) -> bool {
        self.with_machine(|m| m.update_interlock(field, value))
    }

    pub fn set_interlocks(&self, state: InterlockState) -> bool {
        self.with_machine(|m| m.set_interlocks(state))
    }

    pub fn confirm_occupancy(
        &self,
        pocket: PocketId,
        occupant: Option<ToolNumber>,
    ) -> Result<(), AtcError> {
        self.with_machine(|m| m.confirm_occupancy(pocket, occupant))
    }

    pub fn confirm_spindle(&self, tool: Option<ToolNumber>) -> Result<(), AtcError> {
        self.with_machine(|m| m.confirm_spindle(tool))
    }

    pub fn activate(&self, boot: &BootRecord, sweep: &SensorSweep) -> Result<AtcMode, AtcError> {
        self.with_machine(|m| m.activate(boot, sweep))
    }

    pub fn pocket_notifications(&self) {
        self.with_machine(AtcStateMachine::pocket_notifications);
    }

    pub fn message(&self, text: impl Into<String>) {
        let text = text.into();
        self.with_machine(|m| m.message(text));
    }

    // ─── Recovery ───────────────────────────────────────────────────

    /// Open the recovery session. Requires Fault; one session at a time.
    pub fn start_recovery(&self) -> Result<RecoverySession, AtcError> {
        RecoverySession::start(self)
    }
}

/// Background thread that faults the changer when a step acknowledgement
/// is overdue. Holds only a weak reference, exits once the changer is
/// gone, and is stopped and joined on drop.
#[derive(Debug)]
pub struct StepWatchdog {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StepWatchdog {
    fn spawn(shared: Weak<Shared>, poll: Duration) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("atc-watchdog".into())
            .spawn(move || {
                debug!(poll_ms = poll.as_millis() as u64, "step watchdog started");
                while flag.load(Ordering::Acquire) {
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };
                    if let Some(err) = shared.check_timeouts(Instant::now()) {
                        warn!(%err, "watchdog faulted the changer");
                    }
                    drop(shared);
                    thread::park_timeout(poll);
                }
                debug!("step watchdog stopped");
            })?;
        info!(poll_ms = poll.as_millis() as u64, "step watchdog running");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signal the thread and wait for it.
    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        // The last handle can be released from a listener on this thread.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        handle.thread().unpark();
        if handle.join().is_err() {
            error!("step watchdog thread panicked");
        }
    }
}

impl Drop for StepWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
