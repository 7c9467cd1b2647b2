//! Zero-replacement strategies applied before log transformations.

use crate::data::ExpressionMatrix;
use nalgebra::DMatrix;
use rayon::prelude::*;

/// A pluggable zero-replacement policy over a sample × gene matrix.
///
/// Strategies are pure: they never mutate their input and never fail.
pub trait ImputationStrategy {
    fn impute(&self, data: &ExpressionMatrix) -> ExpressionMatrix;
}

/// Identity strategy: leaves the data unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoNothing;

impl ImputationStrategy for DoNothing {
    fn impute(&self, data: &ExpressionMatrix) -> ExpressionMatrix {
        data.clone()
    }
}

/// Replace zeros with a fraction of the smallest positive value in the
/// same sample.
///
/// This models "below detection limit" handling: zeros become a small
/// positive value so the subsequent log transform stays finite, without
/// inventing large artificial signal. A sample with no positive values is
/// left unchanged (no fill value is computable).
#[derive(Debug, Clone, Copy)]
pub struct DetectionLimit {
    /// Fraction of the per-sample minimum positive value used as fill.
    pub scale: f64,
}

impl DetectionLimit {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }
}

impl Default for DetectionLimit {
    fn default() -> Self {
        Self { scale: 0.5 }
    }
}

impl ImputationStrategy for DetectionLimit {
    fn impute(&self, data: &ExpressionMatrix) -> ExpressionMatrix {
        let m = data.matrix();
        let (nrows, ncols) = m.shape();

        let rows: Vec<Vec<f64>> = (0..nrows)
            .into_par_iter()
            .map(|i| {
                let min_positive = m
                    .row(i)
                    .iter()
                    .filter(|&&v| v > 0.0)
                    .cloned()
                    .fold(f64::INFINITY, f64::min);
                if min_positive.is_infinite() {
                    // no positive values in this sample; nothing to fill
                    return m.row(i).iter().cloned().collect();
                }
                let fill = self.scale * min_positive;
                m.row(i)
                    .iter()
                    .map(|&v| if v == 0.0 { fill } else { v })
                    .collect()
            })
            .collect();

        let out = DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j]);
        data.with_values(out)
            .expect("imputed matrix keeps the input shape")
    }
}

/// Collapse duplicate gene columns by summing their values.
///
/// The output keeps the column position of each identifier's first
/// occurrence.
pub fn deduplicate(data: &ExpressionMatrix) -> ExpressionMatrix {
    let nrows = data.n_samples();
    let mut unique: Vec<String> = Vec::new();
    let mut target: Vec<usize> = Vec::with_capacity(data.n_genes());
    {
        let mut positions = std::collections::HashMap::new();
        for id in data.gene_ids() {
            let next = unique.len();
            let k = *positions.entry(id.clone()).or_insert_with(|| {
                unique.push(id.clone());
                next
            });
            target.push(k);
        }
    }

    let mut out = DMatrix::zeros(nrows, unique.len());
    for (j, &k) in target.iter().enumerate() {
        for i in 0..nrows {
            out[(i, k)] += data.get(i, j);
        }
    }

    ExpressionMatrix::new(out, data.sample_ids().to_vec(), unique)
        .expect("deduplicated matrix keeps the sample dimension")
}
