//! Residential society management backend.
//!
//! The poll and survey participation workflow lives in [`polls`]; the thinner
//! CRUD registries (societies, residents, vehicles, bills, complaints, FAQs)
//! live in [`registry`].

pub mod actors;
pub mod config;
pub mod error;
pub mod ids;
pub mod polls;
pub mod registry;
pub mod telemetry;
