//! # kwzflow
//!
//! Automation of Kawska-Zahn crystallization protocols. A growing molecular
//! aggregate is built one molecule per cycle by driving an external
//! molecular-dynamics engine through system preparation, quenching, annealing
//! and requenching, with optional solvent handling.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer layout:
//!
//! - **[`core`]: The Foundation.** Stateless stage models, the canonical
//!   on-disk layout of a cycle, and readers for the engine's text outputs.
//!
//! - **[`engine`]: The Logic Core.** The cycle state machine, idempotent stage
//!   gates, failure quarantine, the worker-group coordination primitives and
//!   the simulation executor seam.
//!
//! - **[`workflows`]: The Public API.** Complete procedures tying `engine` and
//!   `core` together, such as running the full aggregation protocol.

pub mod core;
pub mod engine;
pub mod workflows;
