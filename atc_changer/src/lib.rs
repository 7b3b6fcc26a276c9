//! # ATC Changer Library
//!
//! State tracking, safety gating and guided recovery for an automatic tool
//! changer. The engine never moves anything itself: it issues discrete
//! commands to an external motion layer and advances on the completion,
//! sensor and fault events that layer reports back.
//!
//! ## Components (leaves first)
//!
//! 1. **InterlockMonitor**: door / air / encoder gate for every command
//! 2. **PocketRegistry**: authoritative pocket → tool mapping
//! 3. **AtcStateMachine**: Ready / Busy / Fault, owns 1 and 2
//! 4. **ToolChangeCycle**: single-flight step sequence run by 3
//! 5. **RecoverySession**: the only path from Fault back to Ready
//!
//! All entry points are serialized through [`runtime::Atc`], a
//! mutex-guarded handle that delivers notifications in mutation order
//! after releasing the lock and runs its own step watchdog.

pub mod command;
pub mod config;
pub mod notify;
pub mod runtime;
pub mod safety;
pub mod sim;
pub mod state;
