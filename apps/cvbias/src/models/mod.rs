pub mod extraction;
pub mod verdict;

pub use extraction::{Category, CategoryTable, Entry, VariantLabel, VariantSet, NOT_FOUND};
pub use verdict::{AuditVerdict, Dimension, ErrorType};
