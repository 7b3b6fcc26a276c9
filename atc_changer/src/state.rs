//! State module root.
//!
//! Pocket registry, the tool-change cycle and the top-level state machine.

pub mod cycle;
pub mod machine;
pub mod pockets;
