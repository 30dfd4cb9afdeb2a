//! Kyma Core - Shared types
//!
//! This crate defines the records exchanged between:
//! - workload loaders (which produce [`Task`] sequences)
//! - the simulation engine (which consumes tasks and produces results)
//! - downstream comparison / plotting tools (which read [`SimulationResult`])
//!
//! Key types:
//! - Task (immutable unit of work replayed from a trace)
//! - TickSnapshot (fleet state sampled at each control tick)
//! - SimulationResult / ResultSummary (per-run output records)

pub mod types;

pub use types::*;
