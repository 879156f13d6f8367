//! Stateless building blocks: stage descriptions, the per-cycle directory
//! layout, and parsers for the files the simulation engine produces.

pub mod io;
pub mod models;
