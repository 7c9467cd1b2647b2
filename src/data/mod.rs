//! Core data structures.

pub mod expression;
pub mod gene_lengths;

pub use expression::ExpressionMatrix;
pub use gene_lengths::GeneLengthTable;
