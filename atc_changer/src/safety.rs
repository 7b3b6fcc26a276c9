//! Safety module root.
//!
//! Interlock gating and the operator-driven recovery session.

pub mod interlock;
pub mod recovery;
