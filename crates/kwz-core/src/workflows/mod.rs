//! # Workflows Module
//!
//! High-level entry points that tie the cycle machinery of [`crate::engine`]
//! to the models of [`crate::core`].
//!
//! ## Architecture
//!
//! - **Kawska-Zahn Workflow** ([`kawska_zahn`]) - The full aggregation protocol:
//!   resume discovery followed by one controlled cycle per added molecule.
//! - **NPT Workflow** ([`npt`]) - A single standalone dynamics run through the
//!   same executor, gate and wall-time handling.
//!
//! Every workflow reports through a [`crate::engine::progress::ProgressReporter`]
//! and returns [`crate::engine::error::EngineError`], whose exit code callers
//! hand to the operating system unchanged.

pub mod kawska_zahn;
pub mod npt;
