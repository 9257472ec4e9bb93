//! Domain core for the declaration audit metrics.
//!
//! Holds the event model and its closed vocabularies, the shared error type,
//! configuration, timestamp parsing and the calendar / arithmetic helpers the
//! report builders rely on.

pub mod calculations;
pub mod data_processors;
pub mod error;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{AuditError, Result};
