//! # Engine Module
//!
//! This module implements the cycle machinery of the aggregation protocol:
//! deciding which stage runs next, launching it through the simulation
//! executor, and recovering from failures without corrupting the working tree.
//!
//! ## Overview
//!
//! A cycle walks sysprep → quench → anneal → requench. Every stage is gated on
//! its canonical output file, so an interrupted run resumes exactly where it
//! stopped. Failed stage directories are renamed aside rather than deleted,
//! and retry budgets bound how often a stage is attempted before the run
//! ends with a distinct exit code.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Protocol parameters, retry budgets and engine launch settings
//! - **Cycle State** ([`state`]) - Per-cycle stage, attempt counters and retry policies
//! - **Stage Planning** ([`plan`]) - Stage descriptors derived from the cycle layout
//! - **Gates and Quarantine** ([`gate`], [`quarantine`]) - Completion checks and failed-directory handling
//! - **Worker Group** ([`comm`], [`coordinator`]) - Barriers, broadcasts and the coordinator capability
//! - **Execution** ([`executor`], [`inspect`]) - Engine invocation and structural checks of its output
//! - **Frame Selection** ([`frames`]) - Best annealing frame and equilibration tests
//! - **Sequencing** ([`sequencer`], [`controller`]) - Resume point discovery and the cycle state machine
//! - **Error Handling** ([`error`]) - Engine errors and their process exit codes

pub mod comm;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod frames;
pub mod gate;
pub mod inspect;
pub(crate) mod plan;
pub mod progress;
pub mod quarantine;
pub mod sequencer;
pub mod state;
#[cfg(test)]
pub(crate) mod testing;
