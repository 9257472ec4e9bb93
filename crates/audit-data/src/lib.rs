//! Ingestion, attribution and reporting over the declaration audit trail.
//!
//! Reads exported history rows, normalises them into an indexed event log,
//! classifies each declaration per identity and rolls the results into
//! per-user and per-team reports.

pub mod aggregator;
pub mod analysis;
pub mod classifier;
pub mod history;
pub mod lifecycle;
pub mod normalizer;
pub mod reader;
pub mod reports;

pub use audit_core as core;
