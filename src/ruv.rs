//! Remove Unwanted Variation (RUV-2) batch correction.
//!
//! Implements the two-step RUV algorithm of Jacob, Gagnon-Bartsch and Speed
//! ("Correcting gene expression data when neither the unwanted variation nor
//! the factor of interest are observed", Biostatistics 17.1, 2015), modified
//! so that the correction can be applied out-of-sample.
//!
//! The model is `Y = X·B + W·A + noise` with both `X` (interesting factors)
//! and `W` (nuisance factors) unobserved. A housekeeping gene subset `Y_c` is
//! assumed uncoupled to the interesting factors (`B_c = 0`), so
//! `Y_c = W·A_c + noise` and a truncated SVD of `Y_c` estimates the nuisance
//! subspace. At correction time, the factor activities and the gene couplings
//! are re-estimated from the data being corrected, reusing only the trained
//! right singular vectors; this keeps the correction valid on new cohorts
//! whose loading magnitudes differ from the training data, as long as the
//! factor directions transfer.

use crate::data::ExpressionMatrix;
use crate::error::{NormError, Result};
use crate::svd::cutoff_svd;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Version of the persisted model record.
const MODEL_FORMAT_VERSION: u32 = 1;

/// The RUV-2 batch-correction model.
///
/// The centering policy is fixed at construction; the fitted state is a
/// tagged variant, so a partially fit model is unrepresentable. `fit`
/// installs a complete new state atomically and `transform` only reads it,
/// which makes concurrent `transform` calls on a fitted model safe.
#[derive(Debug, Clone)]
pub struct Ruv2 {
    center: bool,
    state: Ruv2State,
}

#[derive(Debug, Clone)]
enum Ruv2State {
    Unfit,
    Fit(Box<FittedRuv2>),
}

/// The complete fitted state: all fields are produced by a single `fit`.
#[derive(Debug, Clone)]
pub struct FittedRuv2 {
    /// Housekeeping genes used for the factor estimate, in fit order
    /// (the subset of the requested genes present in the training data).
    hk_genes: Vec<String>,
    /// Training gene order for the mean vector.
    genes: Vec<String>,
    /// Per-gene training means, stored regardless of the centering policy.
    means: DVector<f64>,
    /// Left singular vectors of the housekeeping submatrix.
    u: DMatrix<f64>,
    /// Retained singular values, descending.
    singular_values: DVector<f64>,
    /// Right singular vectors; the nuisance directions reused at
    /// correction time.
    vt: DMatrix<f64>,
}

impl FittedRuv2 {
    /// Housekeeping genes used by the fit.
    pub fn hk_genes(&self) -> &[String] {
        &self.hk_genes
    }

    /// Number of retained nuisance factors.
    pub fn rank(&self) -> usize {
        self.singular_values.len()
    }

    /// Retained singular values, descending.
    pub fn singular_values(&self) -> &DVector<f64> {
        &self.singular_values
    }
}

impl Ruv2 {
    /// Create an unfit model. `center` controls whether data is centered by
    /// the per-gene training means during both `fit` and `transform`.
    pub fn new(center: bool) -> Self {
        Self {
            center,
            state: Ruv2State::Unfit,
        }
    }

    /// Whether the model centers data by training means.
    pub fn center(&self) -> bool {
        self.center
    }

    /// Whether the model has been fit.
    pub fn is_fit(&self) -> bool {
        matches!(self.state, Ruv2State::Fit(_))
    }

    /// The fitted state, if any.
    pub fn fitted(&self) -> Option<&FittedRuv2> {
        match &self.state {
            Ruv2State::Fit(fitted) => Some(fitted),
            Ruv2State::Unfit => None,
        }
    }

    /// Estimate the nuisance subspace from the housekeeping genes.
    ///
    /// Stores the per-gene training means (always, since `transform` needs
    /// them for out-of-sample centering), restricts `hk_genes` to the genes
    /// present in `data` (absent ones are silently dropped), and runs a
    /// variance-truncated SVD of the (optionally centered) housekeeping
    /// submatrix. The new state replaces any previous fit in one step.
    ///
    /// `data` is expected to be CLR-transformed expression, samples × genes.
    pub fn fit(
        &mut self,
        data: &ExpressionMatrix,
        hk_genes: &[String],
        variance_cutoff: f64,
        num_components: Option<usize>,
    ) -> Result<()> {
        let index = data.gene_index();
        let hk_in_data: Vec<String> = hk_genes
            .iter()
            .filter(|gene| index.contains_key(gene.as_str()))
            .cloned()
            .collect();
        if hk_in_data.is_empty() {
            return Err(NormError::EmptyData(
                "none of the housekeeping genes are present in the data".to_string(),
            ));
        }

        let m = data.matrix();
        let (nrows, ncols) = m.shape();
        if nrows == 0 {
            return Err(NormError::EmptyData(
                "cannot fit on a matrix with no samples".to_string(),
            ));
        }

        let means = DVector::from_iterator(
            ncols,
            (0..ncols).map(|j| m.column(j).sum() / nrows as f64),
        );

        let mut housekeeping = DMatrix::zeros(nrows, hk_in_data.len());
        for (k, gene) in hk_in_data.iter().enumerate() {
            let j = index[gene.as_str()];
            let center = if self.center { means[j] } else { 0.0 };
            for i in 0..nrows {
                housekeeping[(i, k)] = m[(i, j)] - center;
            }
        }

        let svd = cutoff_svd(&housekeeping, variance_cutoff, num_components)?;

        self.state = Ruv2State::Fit(Box::new(FittedRuv2 {
            hk_genes: hk_in_data,
            genes: data.gene_ids().to_vec(),
            means,
            u: svd.u,
            singular_values: svd.singular_values,
            vt: svd.vt,
        }));
        Ok(())
    }

    /// Remove the nuisance components from `data`.
    ///
    /// Projects the data's housekeeping columns onto the trained right
    /// singular vectors to estimate per-sample factor activities
    /// `W = Y_c · Vtᵀ`, re-solves a ridge regression for the gene couplings
    /// on the data itself, `A = (WᵀW + penalty·I)⁻¹ Wᵀ Y`, and returns
    /// `data − W·A`. Requires a fitted model; every trained housekeeping
    /// gene must be present in `data`, and (when centering) every gene of
    /// `data` must have a stored training mean.
    pub fn transform(&self, data: &ExpressionMatrix, penalty: f64) -> Result<ExpressionMatrix> {
        let fitted = match &self.state {
            Ruv2State::Fit(fitted) => fitted,
            Ruv2State::Unfit => return Err(NormError::NotFitted),
        };
        if penalty < 0.0 {
            return Err(NormError::InvalidParameter(
                "ridge penalty must be non-negative".to_string(),
            ));
        }

        let rank = fitted.rank();
        if rank == 0 {
            // degenerate fit on all-zero controls; nothing to remove
            return Ok(data.clone());
        }

        let index = data.gene_index();
        let (nrows, _ncols) = data.matrix().shape();

        let mut centered = data.matrix().clone();
        if self.center {
            let train_index: HashMap<&str, usize> = fitted
                .genes
                .iter()
                .enumerate()
                .map(|(j, id)| (id.as_str(), j))
                .collect();
            for (j, gene) in data.gene_ids().iter().enumerate() {
                let tj = *train_index
                    .get(gene.as_str())
                    .ok_or_else(|| NormError::MissingGene(gene.clone()))?;
                let mean = fitted.means[tj];
                for i in 0..nrows {
                    centered[(i, j)] -= mean;
                }
            }
        }

        let mut housekeeping = DMatrix::zeros(nrows, fitted.hk_genes.len());
        for (k, gene) in fitted.hk_genes.iter().enumerate() {
            let j = *index
                .get(gene.as_str())
                .ok_or_else(|| NormError::MissingGene(gene.clone()))?;
            for i in 0..nrows {
                housekeeping[(i, k)] = centered[(i, j)];
            }
        }

        // factor activities of the new samples along the trained directions
        let w = housekeeping * fitted.vt.transpose();

        let gram = w.transpose() * &w + DMatrix::identity(rank, rank) * penalty;
        let gram_inv = gram.try_inverse().ok_or_else(|| {
            NormError::Numerical(
                "ridge system (W'W + penalty·I) is singular; \
                 raise the penalty or lower the variance cutoff"
                    .to_string(),
            )
        })?;

        let coefficients = gram_inv * w.transpose() * &centered;
        let delta = w * coefficients;

        data.with_values(data.matrix() - delta)
    }

    /// `fit` followed by `transform` on the same data.
    pub fn fit_transform(
        &mut self,
        data: &ExpressionMatrix,
        hk_genes: &[String],
        penalty: f64,
        variance_cutoff: f64,
        num_components: Option<usize>,
    ) -> Result<ExpressionMatrix> {
        self.fit(data, hk_genes, variance_cutoff, num_components)?;
        self.transform(data, penalty)
    }

    /// Save the model to `path` as a versioned JSON record.
    ///
    /// Refuses to overwrite an existing file unless `overwrite_existing` is
    /// set, leaving the file untouched in that case.
    pub fn save<P: AsRef<Path>>(&self, path: P, overwrite_existing: bool) -> Result<()> {
        let path = path.as_ref();
        if !overwrite_existing && path.exists() {
            return Err(NormError::OverwriteRefused(path.to_path_buf()));
        }
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, &ModelRecord::from(self))?;
        Ok(())
    }

    /// Load a model previously written by [`save`](Self::save).
    ///
    /// Restores numerically identical state: JSON floating-point printing
    /// round-trips f64 exactly, so a loaded model reproduces `transform`
    /// output bit for bit.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let record: ModelRecord = serde_json::from_reader(reader)?;
        Ruv2::try_from(record)
    }
}

/// Persisted form of a [`Ruv2`] model.
///
/// Dense arrays are stored as row-major value vectors with explicit
/// dimensions so the record stays readable across implementations.
#[derive(Debug, Serialize, Deserialize)]
struct ModelRecord {
    version: u32,
    center: bool,
    state: StateRecord,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "fitted", rename_all = "snake_case")]
enum StateRecord {
    Unfit,
    Fit {
        hk_genes: Vec<String>,
        genes: Vec<String>,
        means: Vec<f64>,
        u: MatrixRecord,
        singular_values: Vec<f64>,
        vt: MatrixRecord,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct MatrixRecord {
    nrows: usize,
    ncols: usize,
    /// Row-major values, `nrows * ncols` entries.
    values: Vec<f64>,
}

impl From<&DMatrix<f64>> for MatrixRecord {
    fn from(m: &DMatrix<f64>) -> Self {
        let (nrows, ncols) = m.shape();
        let mut values = Vec::with_capacity(nrows * ncols);
        for i in 0..nrows {
            for j in 0..ncols {
                values.push(m[(i, j)]);
            }
        }
        Self {
            nrows,
            ncols,
            values,
        }
    }
}

impl TryFrom<MatrixRecord> for DMatrix<f64> {
    type Error = NormError;

    fn try_from(record: MatrixRecord) -> Result<Self> {
        if record.values.len() != record.nrows * record.ncols {
            return Err(NormError::DimensionMismatch {
                expected: record.nrows * record.ncols,
                actual: record.values.len(),
            });
        }
        Ok(DMatrix::from_row_slice(
            record.nrows,
            record.ncols,
            &record.values,
        ))
    }
}

impl From<&Ruv2> for ModelRecord {
    fn from(model: &Ruv2) -> Self {
        let state = match &model.state {
            Ruv2State::Unfit => StateRecord::Unfit,
            Ruv2State::Fit(fitted) => StateRecord::Fit {
                hk_genes: fitted.hk_genes.clone(),
                genes: fitted.genes.clone(),
                means: fitted.means.iter().cloned().collect(),
                u: MatrixRecord::from(&fitted.u),
                singular_values: fitted.singular_values.iter().cloned().collect(),
                vt: MatrixRecord::from(&fitted.vt),
            },
        };
        ModelRecord {
            version: MODEL_FORMAT_VERSION,
            center: model.center,
            state,
        }
    }
}

impl TryFrom<ModelRecord> for Ruv2 {
    type Error = NormError;

    fn try_from(record: ModelRecord) -> Result<Self> {
        if record.version != MODEL_FORMAT_VERSION {
            return Err(NormError::InvalidParameter(format!(
                "unsupported model record version {} (expected {})",
                record.version, MODEL_FORMAT_VERSION
            )));
        }
        let state = match record.state {
            StateRecord::Unfit => Ruv2State::Unfit,
            StateRecord::Fit {
                hk_genes,
                genes,
                means,
                u,
                singular_values,
                vt,
            } => {
                if means.len() != genes.len() {
                    return Err(NormError::DimensionMismatch {
                        expected: genes.len(),
                        actual: means.len(),
                    });
                }
                Ruv2State::Fit(Box::new(FittedRuv2 {
                    hk_genes,
                    genes,
                    means: DVector::from_vec(means),
                    u: DMatrix::try_from(u)?,
                    singular_values: DVector::from_vec(singular_values),
                    vt: DMatrix::try_from(vt)?,
                }))
            }
        };
        Ok(Ruv2 {
            center: record.center,
            state,
        })
    }
}
