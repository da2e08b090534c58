//! herald-core
//!
//! A scheduled publication engine: items are published at (or shortly after)
//! their scheduled time, and never more than once, regardless of which
//! trigger gets there first.
//!
//! # Modules
//! - **domain**: items, jobs, outcomes, error classification
//! - **ports**: item store, delay queue, publish API, credentials, activity log, clock
//! - **app**: engine wiring, claim guard, publisher, sweeps, introspection, triggers
//! - **queue**: in-memory delay queue and the retry policy
//! - **impls**: SQLite stores, HTTP and scripted publish APIs, in-memory stores
//! - **config**: figment-based configuration
//! - **observability**: queue counts and stats views

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{EngineBuilder, EngineSettings, PublicationEngine};
pub use error::{HeraldError, Result};
