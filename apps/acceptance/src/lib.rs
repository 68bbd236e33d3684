//! # Acceptance Library
//!
//! This library exposes the acceptance application modules for testing and
//! integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;

// Re-export acceptance_core for convenience
pub use acceptance_core;
