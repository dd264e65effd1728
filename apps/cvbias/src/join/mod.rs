//! Join/Normalize Layer. Turns raw per-(variant, category) extraction outputs into
//! per-category tables keyed by canonical CV id, then variant.

pub mod cv_id;
pub mod layer;
pub mod normalize;
pub mod text;

pub use cv_id::canonical_cv_id;
pub use layer::run_join;
pub use normalize::normalize_payload;
pub use text::parse_extraction_text;
