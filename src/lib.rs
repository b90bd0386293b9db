//! brandstage: staged branding content generation
//!
//! Orchestrates a fixed pipeline of generation steps where each step may depend on the
//! content of earlier steps. Missing prerequisites are detected, confirmed and generated
//! in dependency order; every remote call is admission-checked, deduplicated while in
//! flight, and charged only after it succeeds.

pub mod admission;
pub mod cli;
pub mod config;
pub mod confirmation;
pub mod content;
pub mod error;
pub mod generator;
pub mod logging;
pub mod orchestrator;
pub mod persistence;
pub mod progress;
pub mod provider;
pub mod resolver;
pub mod step;
