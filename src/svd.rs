//! Truncated singular value decomposition with a cumulative-variance cutoff.

use crate::error::{NormError, Result};
use nalgebra::{DMatrix, DVector};

/// Singular values at or below this magnitude are treated as zero.
const SINGULAR_VALUE_TOL: f64 = 1e-8;

/// Rank-truncated SVD factors, `M ≈ U · diag(L) · Vt`.
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    /// Left singular vectors (rows × rank).
    pub u: DMatrix<f64>,
    /// Retained singular values, descending (rank).
    pub singular_values: DVector<f64>,
    /// Right singular vectors (rank × cols).
    pub vt: DMatrix<f64>,
}

impl TruncatedSvd {
    /// Number of retained components.
    #[inline]
    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }
}

/// Compute the SVD of `matrix` and truncate it to the smallest rank whose
/// cumulative fractional variance reaches `variance_cutoff`.
///
/// Singular values indistinguishable from zero are discarded first
/// (the values are sorted descending, so this trims the tail). The retained
/// rank `K` is one plus the first index where
/// `cumsum(L²)/sum(L²) >= variance_cutoff`, additionally capped by
/// `num_components` and by the number of non-zero singular values. `K >= 1`
/// whenever any non-zero singular value exists; an all-zero matrix yields a
/// rank-0 result.
///
/// # Arguments
/// * `matrix` - The data to decompose
/// * `variance_cutoff` - Cumulative fractional variance to retain (e.g. 0.9)
/// * `num_components` - Optional hard cap on the retained rank
pub fn cutoff_svd(
    matrix: &DMatrix<f64>,
    variance_cutoff: f64,
    num_components: Option<usize>,
) -> Result<TruncatedSvd> {
    if num_components == Some(0) {
        return Err(NormError::InvalidParameter(
            "num_components must be at least 1 when given".to_string(),
        ));
    }

    // nalgebra returns singular values sorted in descending order
    let svd = matrix.clone().svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| NormError::Numerical("SVD did not produce U".to_string()))?;
    let vt = svd
        .v_t
        .ok_or_else(|| NormError::Numerical("SVD did not produce Vt".to_string()))?;
    let l = svd.singular_values;

    let n_nonzero = l.iter().take_while(|&&s| s > SINGULAR_VALUE_TOL).count();
    if n_nonzero == 0 {
        return Ok(TruncatedSvd {
            u: u.columns(0, 0).into_owned(),
            singular_values: DVector::zeros(0),
            vt: vt.rows(0, 0).into_owned(),
        });
    }

    let total: f64 = l.iter().take(n_nonzero).map(|s| s * s).sum();
    let mut rank = n_nonzero;
    let mut cumulative = 0.0;
    for (i, s) in l.iter().take(n_nonzero).enumerate() {
        cumulative += s * s;
        if cumulative / total >= variance_cutoff {
            rank = i + 1;
            break;
        }
    }
    if let Some(cap) = num_components {
        rank = rank.min(cap);
    }

    Ok(TruncatedSvd {
        u: u.columns(0, rank).into_owned(),
        singular_values: DVector::from_iterator(rank, l.iter().take(rank).cloned()),
        vt: vt.rows(0, rank).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rank_two_matrix() -> DMatrix<f64> {
        // two orthogonal patterns with very different magnitudes
        let strong = DVector::from_vec(vec![1.0, 1.0, -1.0, -1.0]);
        let weak = DVector::from_vec(vec![1.0, -1.0, 1.0, -1.0]);
        let a = DVector::from_vec(vec![10.0, 10.0]);
        let b = DVector::from_vec(vec![0.1, -0.1]);
        &strong * a.transpose() + &weak * b.transpose()
    }

    #[test]
    fn test_full_rank_at_cutoff_one() {
        let m = rank_two_matrix();
        let svd = cutoff_svd(&m, 1.0, None).unwrap();
        assert_eq!(svd.rank(), 2);
    }

    #[test]
    fn test_small_cutoff_keeps_one_component() {
        let m = rank_two_matrix();
        let svd = cutoff_svd(&m, 1e-9, None).unwrap();
        assert_eq!(svd.rank(), 1);
        // the dominant pattern carries almost all the variance
        assert!(svd.singular_values[0] > 10.0);
    }

    #[test]
    fn test_first_crossing_is_inclusive() {
        let m = rank_two_matrix();
        // the dominant component holds ~99.99% of the variance, so a 0.9
        // cutoff is crossed at the first component
        let svd = cutoff_svd(&m, 0.9, None).unwrap();
        assert_eq!(svd.rank(), 1);
    }

    #[test]
    fn test_hard_cap() {
        let m = rank_two_matrix();
        let svd = cutoff_svd(&m, 1.0, Some(1)).unwrap();
        assert_eq!(svd.rank(), 1);
    }

    #[test]
    fn test_zero_cap_rejected() {
        let m = rank_two_matrix();
        assert!(cutoff_svd(&m, 1.0, Some(0)).is_err());
    }

    #[test]
    fn test_zero_matrix_has_rank_zero() {
        let m = DMatrix::zeros(3, 2);
        let svd = cutoff_svd(&m, 0.9, None).unwrap();
        assert_eq!(svd.rank(), 0);
    }

    #[test]
    fn test_truncation_reconstructs_dominant_pattern() {
        let m = rank_two_matrix();
        let svd = cutoff_svd(&m, 1.0, None).unwrap();
        let reconstructed =
            &svd.u * DMatrix::from_diagonal(&svd.singular_values) * &svd.vt;
        for i in 0..m.nrows() {
            for j in 0..m.ncols() {
                assert_relative_eq!(reconstructed[(i, j)], m[(i, j)], epsilon = 1e-9);
            }
        }
    }
}
