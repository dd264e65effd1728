//! Semantic audit: dimension policies, the deterministic comparator, the judge seam,
//! the engine that wraps it, and the commands built on the engine.

pub mod baseline;
pub mod compare;
pub mod engine;
pub mod form;
pub mod judge;
pub mod policy;
pub mod prompts;
pub mod runner;

pub use baseline::{run_baseline, DEFAULT_SAMPLE_PER_CATEGORY};
pub use form::run_form_audit;
pub use runner::audit_run;
