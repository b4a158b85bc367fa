//! Litmus core: templates, test runs, missions, evaluation and the durable store behind them.
//!
//! The [`engine::Engine`] is the public entry point. It accepts run submissions, drives runs
//! (static test cases or goal-directed missions) against an HTTP target, evaluates replies and
//! persists every result so an interrupted run can resume where it stopped.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod json_path;
pub mod judge;
pub mod metrics_api;
pub mod mission;
pub mod model;
pub mod providers;
pub mod report;
pub mod resolve;
pub mod storage;

pub use engine::{Engine, EngineSettings};
pub use errors::{EngineError, ErrorKind, ErrorRecord};
pub use storage::Store;
