//! Unit transforms for expression matrices.
//!
//! - **normalizer**: reindexing against a reference gene universe and
//!   RPKM/counts/TPM/CLR/ALR/z-score conversions
//! - **ordinal**: bucketing continuous values into ordinal levels

pub mod normalizer;
pub mod ordinal;

pub use normalizer::{Normalizer, ReindexResult, TPM_SCALE};
pub use ordinal::ordinalize;
