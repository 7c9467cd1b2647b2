//! Unit transforms for expression data: reindexing against a reference gene
//! universe and conversion between RPKM/counts/TPM/CLR/ALR/z-score
//! representations.

use crate::convert::{IdConverter, TissueStats, TissueStatsProvider};
use crate::data::{ExpressionMatrix, GeneLengthTable};
use crate::error::{NormError, Result};
use crate::impute::ImputationStrategy;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Row-sum target of TPM-normalized data.
pub const TPM_SCALE: f64 = 1_000_000.0;

/// Result of reindexing a matrix against the reference gene universe.
#[derive(Debug, Clone)]
pub struct ReindexResult {
    /// The reindexed data (requested genes that exist in the reference
    /// table; genes absent from the input are zero-filled).
    pub data: ExpressionMatrix,
    /// Requested genes dropped because the reference table does not know
    /// them.
    pub missing: Vec<String>,
}

/// Tools to change units of expression data, primarily to convert to TPM.
///
/// Holds the reference gene-length table, supplied by the caller at
/// construction.
#[derive(Debug, Clone)]
pub struct Normalizer {
    gene_lengths: GeneLengthTable,
}

impl Normalizer {
    pub fn new(gene_lengths: GeneLengthTable) -> Self {
        Self { gene_lengths }
    }

    /// The reference gene-length table.
    pub fn gene_lengths(&self) -> &GeneLengthTable {
        &self.gene_lengths
    }

    /// Align `data` to the reference gene universe.
    ///
    /// The output columns are the requested genes (all reference genes when
    /// `gene_list` is `None`) that exist in the reference table, in request
    /// order. Genes absent from `data` are filled with 0. Requested genes
    /// unknown to the table are dropped, listed in
    /// [`ReindexResult::missing`], and reported through a `log` warning.
    /// An empty intersection yields a well-formed matrix with no columns.
    pub fn reindex(&self, data: &ExpressionMatrix, gene_list: Option<&[String]>) -> ReindexResult {
        let requested: &[String] = match gene_list {
            Some(genes) => genes,
            None => self.gene_lengths.ids(),
        };

        let mut common = Vec::with_capacity(requested.len());
        let mut missing = Vec::new();
        for gene in requested {
            if self.gene_lengths.contains(gene) {
                common.push(gene.clone());
            } else {
                missing.push(gene.clone());
            }
        }

        if !missing.is_empty() {
            log::warn!(
                "dropping {} gene(s) absent from the reference length table: {:?}",
                missing.len(),
                missing
            );
        }

        ReindexResult {
            data: data.select_genes(&common),
            missing,
        }
    }

    /// Transform data from RPKM to TPM.
    ///
    /// Reindexes against the reference universe, applies the imputer, then
    /// rescales each sample so its values sum to 1,000,000. Samples whose
    /// values sum to zero are left as zeros.
    pub fn tpm_from_rpkm(
        &self,
        data: &ExpressionMatrix,
        gene_list: Option<&[String]>,
        imputer: &dyn ImputationStrategy,
    ) -> Result<ExpressionMatrix> {
        let reindexed = self.reindex(data, gene_list).data;
        let imputed = imputer.impute(&reindexed);
        imputed.with_values(rescale_rows(imputed.matrix(), TPM_SCALE))
    }

    /// Transform data from read counts to TPM.
    ///
    /// Each gene's column is divided by its reference base-pair length before
    /// the per-sample rescale; genes with unknown length were already dropped
    /// by reindexing.
    pub fn tpm_from_counts(
        &self,
        data: &ExpressionMatrix,
        gene_list: Option<&[String]>,
        imputer: &dyn ImputationStrategy,
    ) -> Result<ExpressionMatrix> {
        let reindexed = self.reindex(data, gene_list).data;
        let imputed = imputer.impute(&reindexed);

        let mut scaled = imputed.matrix().clone();
        for (j, gene) in imputed.gene_ids().iter().enumerate() {
            let length = self
                .gene_lengths
                .length(gene)
                .ok_or_else(|| NormError::MissingGene(gene.clone()))?;
            for i in 0..scaled.nrows() {
                scaled[(i, j)] /= length;
            }
        }

        imputed.with_values(rescale_rows(&scaled, TPM_SCALE))
    }

    /// Renormalize a subset of genes already in TPM.
    ///
    /// Restricting TPM data to a gene subset breaks the 1,000,000 row-sum
    /// invariant; this re-establishes it. Same computation as
    /// [`tpm_from_rpkm`](Self::tpm_from_rpkm).
    pub fn tpm_from_subset(
        &self,
        data: &ExpressionMatrix,
        gene_list: Option<&[String]>,
        imputer: &dyn ImputationStrategy,
    ) -> Result<ExpressionMatrix> {
        self.tpm_from_rpkm(data, gene_list, imputer)
    }

    /// Compute the centered log ratio transform of data in TPM format.
    ///
    /// TPM-normalizes, takes the natural log, and subtracts each sample's
    /// own mean log value. Zeros surviving the imputer produce `-inf` after
    /// the log; pick an imputer accordingly.
    pub fn clr_from_tpm(
        &self,
        data: &ExpressionMatrix,
        gene_list: Option<&[String]>,
        imputer: &dyn ImputationStrategy,
    ) -> Result<ExpressionMatrix> {
        let tpm = self.tpm_from_subset(data, gene_list, imputer)?;
        let log = tpm.map(f64::ln);
        let m = log.matrix();
        let (nrows, ncols) = m.shape();

        let row_means: Vec<f64> = (0..nrows)
            .into_par_iter()
            .map(|i| m.row(i).sum() / ncols as f64)
            .collect();

        log.with_values(DMatrix::from_fn(nrows, ncols, |i, j| {
            m[(i, j)] - row_means[i]
        }))
    }

    /// Compute data in TPM format from centered log ratio transformed data.
    pub fn tpm_from_clr(
        &self,
        data: &ExpressionMatrix,
        gene_list: Option<&[String]>,
    ) -> Result<ExpressionMatrix> {
        self.tpm_from_rpkm(&data.map(f64::exp), gene_list, &crate::impute::DoNothing)
    }

    /// Compute the additive log ratio transform of data in TPM format.
    ///
    /// TPM-normalizes over the union of the requested genes and
    /// `reference_genes` (restricted to the reference length table), takes
    /// the natural log, subtracts each sample's mean log value over the
    /// reference subset, and drops the reference genes from the output.
    pub fn alr_from_tpm(
        &self,
        data: &ExpressionMatrix,
        reference_genes: &[String],
        gene_list: Option<&[String]>,
        imputer: &dyn ImputationStrategy,
    ) -> Result<ExpressionMatrix> {
        let requested: &[String] = match gene_list {
            Some(genes) => genes,
            None => data.gene_ids(),
        };
        let mut universe: Vec<String> = requested.to_vec();
        let mut seen: HashSet<String> = requested.iter().cloned().collect();
        for gene in reference_genes {
            if seen.insert(gene.clone()) {
                universe.push(gene.clone());
            }
        }

        let tpm = self.tpm_from_subset(data, Some(&universe), imputer)?;
        let log = tpm.map(f64::ln);
        let index = log.gene_index();

        let mut ref_cols: Vec<usize> = Vec::new();
        for gene in reference_genes {
            if let Some(&j) = index.get(gene.as_str()) {
                if !ref_cols.contains(&j) {
                    ref_cols.push(j);
                }
            }
        }
        if ref_cols.is_empty() {
            return Err(NormError::EmptyData(
                "none of the ALR reference genes exist in the reference length table".to_string(),
            ));
        }
        let ref_set: HashSet<usize> = ref_cols.iter().copied().collect();
        let keep: Vec<usize> = (0..log.n_genes()).filter(|j| !ref_set.contains(j)).collect();

        let m = log.matrix();
        let nrows = log.n_samples();
        let ref_means: Vec<f64> = (0..nrows)
            .into_par_iter()
            .map(|i| ref_cols.iter().map(|&j| m[(i, j)]).sum::<f64>() / ref_cols.len() as f64)
            .collect();

        let out = DMatrix::from_fn(nrows, keep.len(), |i, k| m[(i, keep[k])] - ref_means[i]);
        let gene_ids: Vec<String> = keep.iter().map(|&j| log.gene_ids()[j].clone()).collect();
        ExpressionMatrix::new(out, log.sample_ids().to_vec(), gene_ids)
    }

    /// Standardize CLR data against per-tissue reference statistics.
    ///
    /// For each sample, looks up the mean and standard-deviation CLR vectors
    /// of its tissue label, reindexes the data to `gene_list`, and computes
    /// `(x - mean) / std` elementwise. Statistics identifiers may be
    /// remapped through `converter` first (unmapped or duplicate converted
    /// identifiers are dropped, first occurrence wins). Genes with no
    /// statistics entry yield NaN.
    ///
    /// Errors if `tissues` does not match the sample count or a tissue label
    /// is unknown to the provider.
    pub fn z_score_from_clr(
        &self,
        data: &ExpressionMatrix,
        tissues: &[String],
        gene_list: Option<&[String]>,
        provider: &dyn TissueStatsProvider,
        converter: Option<&dyn IdConverter>,
    ) -> Result<ExpressionMatrix> {
        if tissues.len() != data.n_samples() {
            return Err(NormError::DimensionMismatch {
                expected: data.n_samples(),
                actual: tissues.len(),
            });
        }

        let reindexed = self.reindex(data, gene_list).data;

        let mut stats_cache: HashMap<&str, TissueStats> = HashMap::new();
        for tissue in tissues {
            if !stats_cache.contains_key(tissue.as_str()) {
                let stats = provider.stats(tissue).ok_or_else(|| {
                    NormError::InvalidParameter(format!("unknown tissue label '{}'", tissue))
                })?;
                let stats = match converter {
                    Some(c) => stats.remap(c),
                    None => stats,
                };
                stats_cache.insert(tissue.as_str(), stats);
            }
        }

        let (nrows, ncols) = reindexed.matrix().shape();
        let mut out = DMatrix::zeros(nrows, ncols);
        for i in 0..nrows {
            let lookup = stats_cache[tissues[i].as_str()].by_gene();
            for (j, gene) in reindexed.gene_ids().iter().enumerate() {
                out[(i, j)] = match lookup.get(gene.as_str()) {
                    Some(&(mean, std_dev)) => (reindexed.get(i, j) - mean) / std_dev,
                    None => f64::NAN,
                };
            }
        }

        reindexed.with_values(out)
    }
}

/// Rescale each row so its values sum to `target`. Rows with a zero sum are
/// left unchanged.
fn rescale_rows(m: &DMatrix<f64>, target: f64) -> DMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let sums: Vec<f64> = (0..nrows).into_par_iter().map(|i| m.row(i).sum()).collect();
    DMatrix::from_fn(nrows, ncols, |i, j| {
        if sums[i] == 0.0 {
            m[(i, j)]
        } else {
            m[(i, j)] / sums[i] * target
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impute::{DetectionLimit, DoNothing};
    use approx::assert_relative_eq;

    fn reference_table() -> GeneLengthTable {
        GeneLengthTable::from_pairs(vec![
            ("A".to_string(), 1000.0),
            ("B".to_string(), 2000.0),
            ("C".to_string(), 500.0),
            ("D".to_string(), 1500.0),
        ])
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(reference_table())
    }

    fn matrix(sample_count: usize, genes: &[&str], values: &[f64]) -> ExpressionMatrix {
        ExpressionMatrix::from_rows(
            (0..sample_count).map(|i| format!("S{}", i)).collect(),
            genes.iter().map(|g| g.to_string()).collect(),
            values,
        )
        .unwrap()
    }

    #[test]
    fn test_reindex_drops_unknown_and_zero_fills() {
        let norm = normalizer();
        let data = matrix(1, &["A", "B"], &[1.0, 2.0]);

        let result = norm.reindex(
            &data,
            Some(&["B".into(), "X".into(), "C".into()]),
        );

        assert_eq!(result.missing, vec!["X"]);
        assert_eq!(result.data.gene_ids(), &["B", "C"]);
        assert_eq!(result.data.row(0), vec![2.0, 0.0]);
    }

    #[test]
    fn test_reindex_default_universe_is_reference_table() {
        let norm = normalizer();
        let data = matrix(1, &["C"], &[5.0]);

        let result = norm.reindex(&data, None);
        assert_eq!(result.data.gene_ids(), &["A", "B", "C", "D"]);
        assert!(result.missing.is_empty());
        assert_eq!(result.data.row(0), vec![0.0, 0.0, 5.0, 0.0]);
    }

    #[test]
    fn test_reindex_empty_intersection() {
        let norm = normalizer();
        let data = matrix(2, &["A"], &[1.0, 2.0]);

        let result = norm.reindex(&data, Some(&["X".into(), "Y".into()]));
        assert_eq!(result.data.n_samples(), 2);
        assert_eq!(result.data.n_genes(), 0);
        assert_eq!(result.missing, vec!["X", "Y"]);
    }

    #[test]
    fn test_tpm_from_rpkm_row_sums() {
        let norm = normalizer();
        let data = matrix(
            2,
            &["A", "B", "C"],
            &[
                10.0, 30.0, 60.0, //
                1.0, 1.0, 2.0,
            ],
        );

        let tpm = norm
            .tpm_from_rpkm(&data, Some(&["A".into(), "B".into(), "C".into()]), &DoNothing)
            .unwrap();

        for i in 0..2 {
            let sum: f64 = tpm.row(i).iter().sum();
            assert_relative_eq!(sum, TPM_SCALE, epsilon = 1e-6);
        }
        // proportions preserved
        assert_relative_eq!(tpm.get(0, 0), 100_000.0, epsilon = 1e-6);
        assert_relative_eq!(tpm.get(0, 2), 600_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_tpm_from_counts_divides_by_length() {
        let norm = normalizer();
        // lengths: A=1000, C=500; equal counts mean C gets twice the weight
        let data = matrix(1, &["A", "C"], &[100.0, 100.0]);

        let tpm = norm
            .tpm_from_counts(&data, Some(&["A".into(), "C".into()]), &DoNothing)
            .unwrap();

        let sum: f64 = tpm.row(0).iter().sum();
        assert_relative_eq!(sum, TPM_SCALE, epsilon = 1e-6);
        assert_relative_eq!(tpm.get(0, 1), 2.0 * tpm.get(0, 0), epsilon = 1e-6);
    }

    #[test]
    fn test_tpm_zero_sum_row_left_as_zeros() {
        let norm = normalizer();
        let data = matrix(
            2,
            &["A", "B"],
            &[
                0.0, 0.0, //
                3.0, 1.0,
            ],
        );

        let tpm = norm
            .tpm_from_rpkm(&data, Some(&["A".into(), "B".into()]), &DoNothing)
            .unwrap();

        assert_eq!(tpm.row(0), vec![0.0, 0.0]);
        let sum: f64 = tpm.row(1).iter().sum();
        assert_relative_eq!(sum, TPM_SCALE, epsilon = 1e-6);
    }

    #[test]
    fn test_clr_rows_are_centered() {
        let norm = normalizer();
        let data = matrix(2, &["A", "B", "C"], &[10.0, 20.0, 70.0, 5.0, 90.0, 5.0]);

        let clr = norm
            .clr_from_tpm(&data, Some(&["A".into(), "B".into(), "C".into()]), &DoNothing)
            .unwrap();

        for i in 0..clr.n_samples() {
            let mean: f64 = clr.row(i).iter().sum::<f64>() / clr.n_genes() as f64;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_clr_manual_values() {
        let norm = normalizer();
        // single sample, two genes: CLR is ±log(x1/x2)/2
        let data = matrix(1, &["A", "B"], &[1.0, 4.0]);
        let clr = norm
            .clr_from_tpm(&data, Some(&["A".into(), "B".into()]), &DoNothing)
            .unwrap();

        let expected = (1.0_f64 / 4.0).ln() / 2.0;
        assert_relative_eq!(clr.get(0, 0), expected, epsilon = 1e-10);
        assert_relative_eq!(clr.get(0, 1), -expected, epsilon = 1e-10);
    }

    #[test]
    fn test_clr_tpm_round_trip() {
        let norm = normalizer();
        let genes: Vec<String> = vec!["A".into(), "B".into(), "C".into(), "D".into()];
        // already TPM-valid over the reference universe
        let data = matrix(
            2,
            &["A", "B", "C", "D"],
            &[
                100_000.0, 200_000.0, 300_000.0, 400_000.0, //
                250_000.0, 250_000.0, 250_000.0, 250_000.0,
            ],
        );

        let clr = norm.clr_from_tpm(&data, Some(&genes), &DoNothing).unwrap();
        let back = norm.tpm_from_clr(&clr, Some(&genes)).unwrap();

        for i in 0..data.n_samples() {
            for j in 0..data.n_genes() {
                assert_relative_eq!(back.get(i, j), data.get(i, j), max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn test_clr_with_imputer_stays_finite() {
        let norm = normalizer();
        let data = matrix(1, &["A", "B", "C"], &[0.0, 10.0, 30.0]);

        let clr = norm
            .clr_from_tpm(
                &data,
                Some(&["A".into(), "B".into(), "C".into()]),
                &DetectionLimit::new(0.5),
            )
            .unwrap();

        assert!(clr.row(0).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_alr_reference_dropped_and_centered() {
        let norm = normalizer();
        let data = matrix(1, &["A", "B", "C"], &[10.0, 20.0, 40.0]);

        let alr = norm
            .alr_from_tpm(
                &data,
                &["C".into()],
                Some(&["A".into(), "B".into()]),
                &DoNothing,
            )
            .unwrap();

        assert_eq!(alr.gene_ids(), &["A", "B"]);
        // single reference gene: ALR is log(x / x_ref), scale-invariant
        assert_relative_eq!(alr.get(0, 0), (10.0_f64 / 40.0).ln(), epsilon = 1e-10);
        assert_relative_eq!(alr.get(0, 1), (20.0_f64 / 40.0).ln(), epsilon = 1e-10);
    }

    #[test]
    fn test_alr_without_reference_in_table_errors() {
        let norm = normalizer();
        let data = matrix(1, &["A", "B"], &[1.0, 2.0]);

        let result = norm.alr_from_tpm(
            &data,
            &["X".into()],
            Some(&["A".into(), "B".into()]),
            &DoNothing,
        );
        assert!(matches!(result, Err(NormError::EmptyData(_))));
    }

    #[test]
    fn test_z_score_from_clr() {
        let norm = normalizer();
        let data = matrix(
            2,
            &["A", "B"],
            &[
                1.0, 2.0, //
                3.0, 4.0,
            ],
        );

        let stats = TissueStats {
            gene_ids: vec!["A".into(), "B".into()],
            mean: vec![1.0, 1.0],
            std_dev: vec![0.5, 2.0],
        };
        let mut provider: HashMap<String, TissueStats> = HashMap::new();
        provider.insert("liver".to_string(), stats);

        let z = norm
            .z_score_from_clr(
                &data,
                &["liver".into(), "liver".into()],
                Some(&["A".into(), "B".into()]),
                &provider,
                None,
            )
            .unwrap();

        assert_relative_eq!(z.get(0, 0), 0.0, epsilon = 1e-10);
        assert_relative_eq!(z.get(0, 1), 0.5, epsilon = 1e-10);
        assert_relative_eq!(z.get(1, 0), 4.0, epsilon = 1e-10);
        assert_relative_eq!(z.get(1, 1), 1.5, epsilon = 1e-10);
    }

    #[test]
    fn test_z_score_unknown_tissue_errors() {
        let norm = normalizer();
        let data = matrix(1, &["A"], &[1.0]);
        let provider: HashMap<String, TissueStats> = HashMap::new();

        let result = norm.z_score_from_clr(&data, &["brain".into()], None, &provider, None);
        assert!(matches!(result, Err(NormError::InvalidParameter(_))));
    }

    #[test]
    fn test_z_score_tissue_count_mismatch() {
        let norm = normalizer();
        let data = matrix(2, &["A"], &[1.0, 2.0]);
        let provider: HashMap<String, TissueStats> = HashMap::new();

        let result = norm.z_score_from_clr(&data, &["liver".into()], None, &provider, None);
        assert!(matches!(result, Err(NormError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_z_score_missing_stats_gene_is_nan() {
        let norm = normalizer();
        let data = matrix(1, &["A", "B"], &[1.0, 2.0]);

        let stats = TissueStats {
            gene_ids: vec!["A".into()],
            mean: vec![0.0],
            std_dev: vec![1.0],
        };
        let mut provider: HashMap<String, TissueStats> = HashMap::new();
        provider.insert("liver".to_string(), stats);

        let z = norm
            .z_score_from_clr(
                &data,
                &["liver".into()],
                Some(&["A".into(), "B".into()]),
                &provider,
                None,
            )
            .unwrap();

        assert_relative_eq!(z.get(0, 0), 1.0, epsilon = 1e-10);
        assert!(z.get(0, 1).is_nan());
    }

    #[test]
    fn test_z_score_with_converter_remap() {
        let norm = normalizer();
        let data = matrix(1, &["A"], &[2.0]);

        // provider speaks Ensembl; data speaks symbols
        let stats = TissueStats {
            gene_ids: vec!["ENSG_A".into()],
            mean: vec![1.0],
            std_dev: vec![0.5],
        };
        let mut provider: HashMap<String, TissueStats> = HashMap::new();
        provider.insert("liver".to_string(), stats);

        let mut mapping: HashMap<String, String> = HashMap::new();
        mapping.insert("ENSG_A".to_string(), "A".to_string());

        let z = norm
            .z_score_from_clr(
                &data,
                &["liver".into()],
                Some(&["A".into()]),
                &provider,
                Some(&mapping),
            )
            .unwrap();

        assert_relative_eq!(z.get(0, 0), 2.0, epsilon = 1e-10);
    }
}
