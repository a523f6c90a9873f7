//! Per-gene copy number estimates from an external generative model
//!

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use ndarray::Array2;
use thousands::Separable;

use crate::errors::{CnvError, CnvResult};
use crate::gene_binning::BinnedGenes;
use crate::tsv_utils::{get_tsv_reader, map_csv_error, parse_field};

/// Source of per-cell, per-gene copy number estimates for binned expression data
///
pub trait CopyNumberModel {
    /// Return a cells x genes copy number matrix
    ///
    /// Rows follow the cell order of `binned_genes` and columns follow its gene bin order.
    ///
    fn estimate_gene_copy_number(&self, binned_genes: &BinnedGenes) -> CnvResult<Array2<f64>>;

    fn describe(&self) -> String;
}

/// Copy number estimates computed ahead of time and stored in a tab-delimited cells x genes table
///
/// The header line lists a cell column label followed by the gene names, which must match the
/// binned genes exactly and in order. Cell rows may be in any order, but every binned cell must
/// be present.
///
pub struct PrecomputedCopyNumberTable {
    filename: Utf8PathBuf,
}

impl PrecomputedCopyNumberTable {
    pub fn new(filename: &Utf8Path) -> Self {
        Self {
            filename: filename.to_owned(),
        }
    }
}

impl CopyNumberModel for PrecomputedCopyNumberTable {
    fn estimate_gene_copy_number(&self, binned_genes: &BinnedGenes) -> CnvResult<Array2<f64>> {
        let filename = self.filename.as_path();
        info!("Reading gene copy number estimates from file: '{filename}'");

        let mut reader = get_tsv_reader(filename, "gene copy number")?;
        let gene_names = reader
            .headers()
            .map_err(|e| map_csv_error(filename, e))?
            .iter()
            .skip(1)
            .map(|x| x.to_string())
            .collect::<Vec<_>>();

        let expected_gene_names = binned_genes.gene_names();
        if gene_names.len() != expected_gene_names.len() {
            return Err(CnvError::validation(format!(
                "Gene copy number table '{filename}' has {} genes, but {} genes were binned",
                gene_names.len(),
                expected_gene_names.len()
            )));
        }
        if let Some((gene_index, (found, expected))) = gene_names
            .iter()
            .zip(expected_gene_names.iter())
            .enumerate()
            .find(|(_, (a, b))| a.as_str() != **b)
        {
            return Err(CnvError::validation(format!(
                "Gene copy number table '{filename}' column {} is gene '{found}', expected binned gene '{expected}'",
                gene_index + 1
            )));
        }

        let cell_to_row = binned_genes
            .cell_names
            .iter()
            .enumerate()
            .map(|(i, x)| (x.as_str(), i))
            .collect::<HashMap<_, _>>();

        let gene_count = gene_names.len();
        let mut gene_cn = Array2::zeros((binned_genes.cell_names.len(), gene_count));
        let mut is_row_found = vec![false; binned_genes.cell_names.len()];
        for record in reader.records() {
            let record = record.map_err(|e| map_csv_error(filename, e))?;
            let cell_name = parse_field::<String>(filename, &record, 0, "cell name")?;
            let Some(&row_index) = cell_to_row.get(cell_name.as_str()) else {
                return Err(CnvError::validation(format!(
                    "Gene copy number table '{filename}' includes unknown cell '{cell_name}'"
                )));
            };
            if is_row_found[row_index] {
                return Err(CnvError::validation(format!(
                    "Gene copy number table '{filename}' lists cell '{cell_name}' more than once"
                )));
            }
            is_row_found[row_index] = true;

            for (gene_index, value) in gene_cn.row_mut(row_index).iter_mut().enumerate() {
                *value = parse_field::<f64>(filename, &record, gene_index + 1, "copy number")?;
            }
        }

        if let Some(row_index) = is_row_found.iter().position(|x| !x) {
            return Err(CnvError::validation(format!(
                "Gene copy number table '{filename}' is missing cell '{}'",
                binned_genes.cell_names[row_index]
            )));
        }

        info!(
            "Read copy number estimates for {} genes in {} cells",
            gene_count.separate_with_commas(),
            binned_genes.cell_names.len().separate_with_commas()
        );
        Ok(gene_cn)
    }

    fn describe(&self) -> String {
        format!("precomputed gene copy number table '{}'", self.filename)
    }
}
