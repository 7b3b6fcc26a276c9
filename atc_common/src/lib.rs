//! ATC Common Library
//!
//! This crate provides shared types, constants and configuration loading
//! utilities for all ATC workspace crates.
//!
//! # Module Structure
//!
//! - [`changer`] - Tool changer state, safety, error and notification types
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - System-wide limits and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use atc_common::prelude::*;
//!
//! let mode = AtcMode::default();
//! assert_eq!(mode, AtcMode::Ready);
//! ```

pub mod changer;
pub mod config;
pub mod consts;
pub mod prelude;
