//! Bucketing of continuous expression values into ordinal levels.

use crate::data::ExpressionMatrix;
use crate::error::{NormError, Result};
use rayon::prelude::*;

/// Bucket each value into an ordinal level defined by `cutoffs`.
///
/// A value `v` falls into bin `i` such that `cutoffs[i-1] <= v < cutoffs[i]`
/// (upper boundaries are exclusive), i.e. the bin index is the number of
/// cutoffs less than or equal to `v`. `min_value` is added to every bin
/// index, so a single cutoff produces a binary indicator shifted by
/// `min_value`. The output stays in the input's numeric representation,
/// holding integral values.
///
/// `cutoffs` must be sorted in ascending order.
pub fn ordinalize(
    data: &ExpressionMatrix,
    cutoffs: &[f64],
    min_value: f64,
) -> Result<ExpressionMatrix> {
    if cutoffs.windows(2).any(|w| w[0] > w[1]) {
        return Err(NormError::InvalidParameter(
            "ordinalize cutoffs must be sorted in ascending order".to_string(),
        ));
    }

    let m = data.matrix();
    let (nrows, ncols) = m.shape();
    let rows: Vec<Vec<f64>> = (0..nrows)
        .into_par_iter()
        .map(|i| {
            m.row(i)
                .iter()
                .map(|&v| cutoffs.iter().take_while(|&&c| c <= v).count() as f64 + min_value)
                .collect()
        })
        .collect();

    data.with_values(nalgebra::DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j]))
}
