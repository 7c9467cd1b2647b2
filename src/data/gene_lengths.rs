//! Reference table of gene lengths in base pairs.

use crate::convert::IdConverter;
use crate::error::{NormError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Header name of the identifier column in the reference table.
const GENE_ID_COLUMN: &str = "gene_id";
/// Header name of the length column in the reference table.
const BP_LENGTH_COLUMN: &str = "bp_length";

/// Ordered mapping from gene identifier to base-pair length.
///
/// Identifiers are unique: empty identifiers are removed and duplicates keep
/// the first occurrence. The table is loaded once and injected into
/// [`Normalizer`](crate::normalize::Normalizer) at construction.
#[derive(Debug, Clone)]
pub struct GeneLengthTable {
    ids: Vec<String>,
    lengths: Vec<f64>,
    index: HashMap<String, usize>,
}

impl GeneLengthTable {
    /// Build a table from (identifier, length) pairs.
    ///
    /// Empty identifiers are dropped; duplicate identifiers keep the first
    /// occurrence.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut ids = Vec::new();
        let mut lengths = Vec::new();
        let mut index = HashMap::new();
        for (id, length) in pairs {
            if id.is_empty() || index.contains_key(&id) {
                continue;
            }
            index.insert(id.clone(), ids.len());
            ids.push(id);
            lengths.push(length);
        }
        Self {
            ids,
            lengths,
            index,
        }
    }

    /// Load the table from a tab-separated file with `gene_id` and
    /// `bp_length` columns.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_reader(file);

        let headers = reader.headers()?.clone();
        let id_col = headers
            .iter()
            .position(|h| h == GENE_ID_COLUMN)
            .ok_or_else(|| NormError::MissingColumn(GENE_ID_COLUMN.to_string()))?;
        let len_col = headers
            .iter()
            .position(|h| h == BP_LENGTH_COLUMN)
            .ok_or_else(|| NormError::MissingColumn(BP_LENGTH_COLUMN.to_string()))?;

        let mut pairs = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let id = record.get(id_col).unwrap_or("").to_string();
            let length_str = record.get(len_col).unwrap_or("");
            let length: f64 = length_str
                .trim()
                .parse()
                .map_err(|_| NormError::InvalidValue {
                    value: length_str.to_string(),
                    row,
                    col: len_col,
                })?;
            pairs.push((id, length));
        }

        Ok(Self::from_pairs(pairs))
    }

    /// Remap identifiers through a converter.
    ///
    /// Identifiers converting to `None` are dropped; duplicate converted
    /// identifiers keep the first occurrence.
    pub fn convert_ids(&self, converter: &dyn IdConverter) -> GeneLengthTable {
        let converted = converter.convert(&self.ids);
        let pairs = converted
            .into_iter()
            .zip(self.lengths.iter())
            .filter_map(|(id, &length)| id.map(|id| (id, length)));
        Self::from_pairs(pairs)
    }

    /// Whether the table holds the given identifier.
    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Base-pair length of the given gene, if known.
    #[inline]
    pub fn length(&self, id: &str) -> Option<f64> {
        self.index.get(id).map(|&i| self.lengths[i])
    }

    /// Gene identifiers in table order.
    #[inline]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Number of genes in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
