//! Core types and logic for the Tally billing-anomaly triage pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Detection, scoring, case construction, and feedback rules are pure
//! functions; persistence is abstracted behind [`store::TriageStore`].

pub mod anomaly;
pub mod case;
pub mod data;
pub mod detect;
pub mod error;
pub mod feedback;
pub mod memory;
pub mod pipeline;
pub mod score;
pub mod sentiment;
pub mod store;

pub use error::{Error, Result};
