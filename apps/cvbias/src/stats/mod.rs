//! Aggregation / statistics layer: a pure batch reducer over persisted verdicts.

pub mod aggregate;
pub mod chi_square;
pub mod compare;
pub mod corpus;
pub mod correction;
pub mod effect;
pub mod fisher;
pub mod intervals;
pub mod report;

pub use aggregate::{AnalysisOptions, EmptyListPolicy};
pub use compare::{compare_runs, comparison_path};
pub use corpus::{load_run_verdicts, Exclusions, VerdictCorpus, EXCLUSIONS_FILE};
pub use report::{build_report, write_errors, StatsReport};
