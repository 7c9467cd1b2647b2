//! External collaborator interfaces: identifier conversion and per-tissue
//! reference statistics.
//!
//! Both are consumed through narrow traits so that callers can plug in any
//! backing service (a lookup table, a database client, a fixture in tests)
//! without this crate knowing about it.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Maps gene identifiers from one namespace to another.
///
/// A `None` entry means the identifier has no mapping; callers drop such
/// entries, and duplicate converted identifiers keep the first occurrence.
pub trait IdConverter {
    fn convert(&self, ids: &[String]) -> Vec<Option<String>>;
}

impl IdConverter for HashMap<String, String> {
    fn convert(&self, ids: &[String]) -> Vec<Option<String>> {
        ids.iter().map(|id| self.get(id).cloned()).collect()
    }
}

/// Per-tissue mean and standard deviation of CLR-transformed reference
/// expression, indexed by gene identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TissueStats {
    /// Gene identifiers.
    pub gene_ids: Vec<String>,
    /// Per-gene mean CLR value.
    pub mean: Vec<f64>,
    /// Per-gene standard deviation of CLR values.
    pub std_dev: Vec<f64>,
}

impl TissueStats {
    /// Remap gene identifiers through a converter, dropping unmapped
    /// identifiers and keeping the first occurrence on duplicates.
    pub fn remap(&self, converter: &dyn IdConverter) -> TissueStats {
        let converted = converter.convert(&self.gene_ids);
        let mut seen: HashSet<String> = HashSet::new();
        let mut gene_ids = Vec::new();
        let mut mean = Vec::new();
        let mut std_dev = Vec::new();
        for (k, id) in converted.into_iter().enumerate() {
            if let Some(id) = id {
                if seen.insert(id.clone()) {
                    gene_ids.push(id);
                    mean.push(self.mean[k]);
                    std_dev.push(self.std_dev[k]);
                }
            }
        }
        TissueStats {
            gene_ids,
            mean,
            std_dev,
        }
    }

    /// Build a lookup from gene identifier to (mean, std_dev).
    pub fn by_gene(&self) -> HashMap<&str, (f64, f64)> {
        self.gene_ids
            .iter()
            .zip(self.mean.iter().zip(self.std_dev.iter()))
            .map(|(id, (&m, &s))| (id.as_str(), (m, s)))
            .collect()
    }
}

/// Supplies per-tissue CLR summary statistics by tissue label.
pub trait TissueStatsProvider {
    fn stats(&self, tissue: &str) -> Option<TissueStats>;
}

impl TissueStatsProvider for HashMap<String, TissueStats> {
    fn stats(&self, tissue: &str) -> Option<TissueStats> {
        self.get(tissue).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_converter() {
        let mut mapping = HashMap::new();
        mapping.insert("ENSG1".to_string(), "TP53".to_string());

        let out = mapping.convert(&["ENSG1".to_string(), "ENSG2".to_string()]);
        assert_eq!(out, vec![Some("TP53".to_string()), None]);
    }

    #[test]
    fn test_tissue_stats_remap() {
        let stats = TissueStats {
            gene_ids: vec!["E1".into(), "E2".into(), "E3".into(), "E4".into()],
            mean: vec![1.0, 2.0, 3.0, 4.0],
            std_dev: vec![0.1, 0.2, 0.3, 0.4],
        };

        // E2 unmapped; E3 and E4 collide.
        let mut mapping = HashMap::new();
        mapping.insert("E1".to_string(), "A".to_string());
        mapping.insert("E3".to_string(), "B".to_string());
        mapping.insert("E4".to_string(), "B".to_string());

        let remapped = stats.remap(&mapping);
        assert_eq!(remapped.gene_ids, vec!["A", "B"]);
        assert_eq!(remapped.mean, vec![1.0, 3.0]);
        assert_eq!(remapped.std_dev, vec![0.1, 0.3]);
    }
}
