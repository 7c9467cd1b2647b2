//! Expression normalization and batch correction.
//!
//! This library converts gene-expression measurements into comparable units
//! and removes unwanted technical (batch) variation while preserving
//! biological signal.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (ExpressionMatrix, GeneLengthTable)
//! - **convert**: External collaborator traits (identifier conversion,
//!   per-tissue reference statistics)
//! - **impute**: Zero-replacement strategies applied before log transforms
//! - **normalize**: Unit transforms (RPKM/counts → TPM → CLR/ALR/z-score,
//!   ordinal bucketing)
//! - **svd**: Truncated SVD with a cumulative-variance cutoff
//! - **ruv**: RUV-2 batch correction with out-of-sample transform
//!
//! # Example
//!
//! ```no_run
//! use ruvnorm::prelude::*;
//!
//! // Load the reference gene-length table and raw counts
//! let lengths = GeneLengthTable::from_tsv("gene_info.tsv").unwrap();
//! let counts = ExpressionMatrix::from_tsv("counts.tsv").unwrap();
//!
//! // counts -> TPM -> CLR
//! let normalizer = Normalizer::new(lengths);
//! let clr = normalizer
//!     .clr_from_tpm(&counts, None, &DetectionLimit::new(0.5))
//!     .unwrap();
//!
//! // Remove batch variation estimated from housekeeping genes
//! let hk_genes = vec!["ACTB".to_string(), "GAPDH".to_string()];
//! let mut model = Ruv2::new(true);
//! let corrected = model
//!     .fit_transform(&clr, &hk_genes, 1e-3, 0.9, None)
//!     .unwrap();
//!
//! // Back to TPM if needed
//! let tpm = normalizer.tpm_from_clr(&corrected, None).unwrap();
//! # let _ = tpm;
//! ```

pub mod convert;
pub mod data;
pub mod error;
pub mod impute;
pub mod normalize;
pub mod ruv;
pub mod svd;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::convert::{IdConverter, TissueStats, TissueStatsProvider};
    pub use crate::data::{ExpressionMatrix, GeneLengthTable};
    pub use crate::error::{NormError, Result};
    pub use crate::impute::{deduplicate, DetectionLimit, DoNothing, ImputationStrategy};
    pub use crate::normalize::{ordinalize, Normalizer, ReindexResult, TPM_SCALE};
    pub use crate::ruv::Ruv2;
    pub use crate::svd::{cutoff_svd, TruncatedSvd};
}
