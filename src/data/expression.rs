//! Dense expression matrix with sample and gene identifiers.

use crate::error::{NormError, Result};
use nalgebra::DMatrix;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A dense expression matrix.
///
/// Rows are samples, columns are genes. The unit semantics of the values
/// (counts, RPKM, TPM, CLR, ...) are contextual: each operation in this
/// crate documents which representation it expects and produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    /// Dense values (samples × genes).
    data: DMatrix<f64>,
    /// Sample identifiers (row names).
    sample_ids: Vec<String>,
    /// Gene identifiers (column names).
    gene_ids: Vec<String>,
}

impl ExpressionMatrix {
    /// Create a new ExpressionMatrix from a dense matrix and identifiers.
    pub fn new(
        data: DMatrix<f64>,
        sample_ids: Vec<String>,
        gene_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != sample_ids.len() {
            return Err(NormError::DimensionMismatch {
                expected: nrows,
                actual: sample_ids.len(),
            });
        }
        if ncols != gene_ids.len() {
            return Err(NormError::DimensionMismatch {
                expected: ncols,
                actual: gene_ids.len(),
            });
        }
        Ok(Self {
            data,
            sample_ids,
            gene_ids,
        })
    }

    /// Build a matrix from row-major values.
    pub fn from_rows(
        sample_ids: Vec<String>,
        gene_ids: Vec<String>,
        values: &[f64],
    ) -> Result<Self> {
        let nrows = sample_ids.len();
        let ncols = gene_ids.len();
        if values.len() != nrows * ncols {
            return Err(NormError::DimensionMismatch {
                expected: nrows * ncols,
                actual: values.len(),
            });
        }
        Self::new(
            DMatrix::from_row_slice(nrows, ncols, values),
            sample_ids,
            gene_ids,
        )
    }

    /// Load an expression matrix from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with gene IDs (first column is the sample ID header)
    /// - Subsequent rows: sample ID followed by values
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| NormError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.is_empty() {
            return Err(NormError::EmptyData("TSV header is empty".to_string()));
        }
        let gene_ids: Vec<String> = header[1..].iter().map(|s| s.to_string()).collect();
        let n_genes = gene_ids.len();

        let mut sample_ids: Vec<String> = Vec::new();
        let mut values: Vec<f64> = Vec::new();

        for (row_idx, line_result) in lines.enumerate() {
            let line = line_result?;
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            sample_ids.push(fields[0].to_string());

            if fields.len() - 1 != n_genes {
                return Err(NormError::DimensionMismatch {
                    expected: n_genes,
                    actual: fields.len() - 1,
                });
            }
            for (col_idx, value_str) in fields[1..].iter().enumerate() {
                let value: f64 =
                    value_str
                        .trim()
                        .parse()
                        .map_err(|_| NormError::InvalidValue {
                            value: value_str.to_string(),
                            row: row_idx,
                            col: col_idx,
                        })?;
                values.push(value);
            }
        }

        Self::from_rows(sample_ids, gene_ids, &values)
    }

    /// Write the expression matrix to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "sample_id")?;
        for gene_id in &self.gene_ids {
            write!(writer, "\t{}", gene_id)?;
        }
        writeln!(writer)?;

        for (row_idx, sample_id) in self.sample_ids.iter().enumerate() {
            write!(writer, "{}", sample_id)?;
            for col_idx in 0..self.n_genes() {
                write!(writer, "\t{}", self.data[(row_idx, col_idx)])?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Get the value for a sample and gene.
    #[inline]
    pub fn get(&self, sample: usize, gene: usize) -> f64 {
        self.data[(sample, gene)]
    }

    /// Number of samples (rows).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Number of genes (columns).
    #[inline]
    pub fn n_genes(&self) -> usize {
        self.data.ncols()
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Gene identifiers.
    #[inline]
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Get reference to the underlying matrix.
    #[inline]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Map gene identifier to column index. Duplicate identifiers keep the
    /// first occurrence.
    pub fn gene_index(&self) -> HashMap<&str, usize> {
        let mut index = HashMap::with_capacity(self.gene_ids.len());
        for (j, id) in self.gene_ids.iter().enumerate() {
            index.entry(id.as_str()).or_insert(j);
        }
        index
    }

    /// Get a sample (row) as a vector.
    pub fn row(&self, sample: usize) -> Vec<f64> {
        self.data.row(sample).iter().cloned().collect()
    }

    /// Get a gene (column) as a vector.
    pub fn col(&self, gene: usize) -> Vec<f64> {
        self.data.column(gene).iter().cloned().collect()
    }

    /// Reorder columns to the given gene list.
    ///
    /// Genes absent from this matrix are filled with 0. The output columns
    /// follow the order of `genes` exactly, including any duplicates.
    pub fn select_genes(&self, genes: &[String]) -> ExpressionMatrix {
        let index = self.gene_index();
        let nrows = self.n_samples();
        let mut out = DMatrix::zeros(nrows, genes.len());
        for (k, gene) in genes.iter().enumerate() {
            if let Some(&j) = index.get(gene.as_str()) {
                for i in 0..nrows {
                    out[(i, k)] = self.data[(i, j)];
                }
            }
        }
        ExpressionMatrix {
            data: out,
            sample_ids: self.sample_ids.clone(),
            gene_ids: genes.to_vec(),
        }
    }

    /// Apply a function elementwise, keeping identifiers.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> ExpressionMatrix {
        ExpressionMatrix {
            data: self.data.map(f),
            sample_ids: self.sample_ids.clone(),
            gene_ids: self.gene_ids.clone(),
        }
    }

    /// Replace the values, keeping identifiers. The new matrix must have the
    /// same shape.
    pub fn with_values(&self, data: DMatrix<f64>) -> Result<ExpressionMatrix> {
        ExpressionMatrix::new(data, self.sample_ids.clone(), self.gene_ids.clone())
    }
}
