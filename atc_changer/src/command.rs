//! Command module root.
//!
//! Outbound command contract toward the external motion layer.

pub mod motion;
