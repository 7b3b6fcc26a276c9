//! Tool changer shared types.
//!
//! All types shared between the changer engine, its binary and the display
//! layer live here. Organized by domain: state enums, interlock types,
//! errors, outbound notifications and configuration.

pub mod config;
pub mod error;
pub mod event;
pub mod safety;
pub mod state;
