//! Group genes into equal-size bins along each chromosome
//!

use std::cmp::Ordering;
use std::collections::HashSet;

use log::{debug, info, warn};
use ndarray::{Array2, Axis, Zip};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thousands::Separable;

use crate::chrom_bounds::ChromosomeBoundaryTable;
use crate::errors::{CnvError, CnvResult};
use crate::expression::ExpressionMatrix;
use crate::gene_map::{CHROM_COUNT, GeneMap, GeneRecord, get_chrom_label};
use crate::stats_utils::get_median;

pub struct BinningSettings {
    /// Number of genes per bin
    pub bin_size: usize,

    /// Genes detected in fewer cells than this are removed before binning
    pub min_detection: u32,

    /// Genes with names matching this pattern are removed before binning
    pub excluded_gene_regex: Option<Regex>,
}

impl BinningSettings {
    pub fn new(bin_size: usize) -> Self {
        Self {
            bin_size,
            min_detection: 1,
            excluded_gene_regex: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ChromBinningStats {
    pub chrom: String,

    /// Gene map entries on this chromosome
    pub annotated_gene_count: usize,

    /// Genes joined to the gene map on this chromosome
    pub mapped_gene_count: usize,

    /// Mapped genes passing the detection threshold
    pub expressed_gene_count: usize,

    /// Expressed genes removed so that the retained count is a multiple of the bin size
    pub dropped_gene_count: usize,

    pub retained_gene_count: usize,
    pub bin_count: usize,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BinningStats {
    pub bin_size: usize,
    pub cell_count: usize,
    pub gene_map_gene_count: usize,
    pub input_gene_count: usize,
    pub regex_excluded_gene_count: usize,
    pub duplicate_gene_count: usize,
    pub unmapped_gene_count: usize,
    pub total_bin_count: usize,
    pub chroms: Vec<ChromBinningStats>,
}

/// Expression data restricted to binned genes
///
/// Gene columns are ordered by chromosome, then by absolute position within each chromosome, so
/// that every consecutive block of `bin_size` columns forms one bin.
///
#[derive(Deserialize, Serialize)]
pub struct BinnedGenes {
    pub bin_size: usize,
    pub cell_names: Vec<String>,

    /// Retained gene records in bin order
    pub genes: Vec<GeneRecord>,

    /// Detection score of each retained gene
    pub detection: Vec<u32>,

    /// Cells x retained genes expression matrix
    pub expression: Array2<f64>,

    pub chrom_bounds: ChromosomeBoundaryTable,
}

impl BinnedGenes {
    pub fn bin_count(&self) -> usize {
        self.chrom_bounds.total_bin_count()
    }

    pub fn gene_names(&self) -> Vec<&str> {
        self.genes.iter().map(|x| x.gene_name.as_str()).collect()
    }

    /// Check consistency between the gene list, matrix shape and chromosome boundaries
    ///
    pub fn validate(&self) -> CnvResult<()> {
        self.chrom_bounds.validate()?;
        if self.chrom_bounds.chrom_count() != CHROM_COUNT {
            return Err(CnvError::validation(format!(
                "Chromosome boundary table has {} entries, expected {CHROM_COUNT}",
                self.chrom_bounds.chrom_count()
            )));
        }
        let gene_count = self.genes.len();
        if self.bin_size == 0 || self.bin_count() * self.bin_size != gene_count {
            return Err(CnvError::validation(format!(
                "Binned gene count {gene_count} does not match {} bins of size {}",
                self.bin_count(),
                self.bin_size
            )));
        }
        if self.expression.dim() != (self.cell_names.len(), gene_count)
            || self.detection.len() != gene_count
        {
            return Err(CnvError::validation(
                "Binned expression matrix shape does not match cell and gene lists",
            ));
        }
        for chrom_index in 0..self.chrom_bounds.chrom_count() {
            let range = self.chrom_bounds.get_chrom_range(chrom_index);
            let gene_range = range.start * self.bin_size..range.end * self.bin_size;
            if let Some(gene) = self.genes[gene_range]
                .iter()
                .find(|x| x.chrom_index != chrom_index)
            {
                return Err(CnvError::validation(format!(
                    "Gene '{}' is binned outside of its chromosome {}",
                    gene.gene_name,
                    get_chrom_label(gene.chrom_index)
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct CandidateGene<'a> {
    column_index: usize,
    record: &'a GeneRecord,
    detection: u32,
}

/// Order in which genes are selected for removal when a chromosome's gene count is not a
/// multiple of the bin size
///
/// Lowest detection is removed first, ties are broken by lowest start position.
///
fn exclusion_order(a: &CandidateGene, b: &CandidateGene) -> Ordering {
    (a.detection, a.record.start, a.record.abs_pos, &a.record.gene_name).cmp(&(
        b.detection,
        b.record.start,
        b.record.abs_pos,
        &b.record.gene_name,
    ))
}

fn genome_order(a: &CandidateGene, b: &CandidateGene) -> Ordering {
    (a.record.abs_pos, &a.record.gene_name).cmp(&(b.record.abs_pos, &b.record.gene_name))
}

/// Split the expressed genes of one chromosome into retained and dropped sets
///
/// Exactly `gene_count mod bin_size` genes are dropped. Retained genes are returned in genome
/// order, so that consecutive blocks of `bin_size` genes form the chromosome's bins.
///
fn select_chrom_bin_genes(
    mut genes: Vec<CandidateGene>,
    bin_size: usize,
) -> (Vec<CandidateGene>, Vec<CandidateGene>) {
    assert!(bin_size > 0);
    let excess = genes.len() % bin_size;
    genes.sort_by(exclusion_order);
    let mut retained = genes.split_off(excess);
    retained.sort_by(genome_order);
    (retained, genes)
}

/// Bin genes using the count of cells with non-zero expression as the detection score
///
pub fn bin_genes(
    expression: &ExpressionMatrix,
    gene_map: &GeneMap,
    settings: &BinningSettings,
) -> CnvResult<(BinnedGenes, BinningStats)> {
    let detection = expression.get_gene_detection_counts();
    bin_genes_with_detection(expression, gene_map, &detection, settings)
}

/// Bin genes given an externally supplied detection score for each expression matrix gene
///
/// Returns the binned expression data together with a summary of the genes removed at each step.
///
pub fn bin_genes_with_detection(
    expression: &ExpressionMatrix,
    gene_map: &GeneMap,
    detection: &[u32],
    settings: &BinningSettings,
) -> CnvResult<(BinnedGenes, BinningStats)> {
    let bin_size = settings.bin_size;
    if bin_size == 0 {
        return Err(CnvError::configuration("Bin size must be greater than 0"));
    }
    if detection.len() != expression.gene_count() {
        return Err(CnvError::validation(format!(
            "Detection score count {} does not match expression gene count {}",
            detection.len(),
            expression.gene_count()
        )));
    }

    info!(
        "Binning genes from {} cells with bin size {bin_size}",
        expression.cell_count().separate_with_commas()
    );

    let mut stats = BinningStats {
        bin_size,
        cell_count: expression.cell_count(),
        gene_map_gene_count: gene_map.len(),
        input_gene_count: expression.gene_count(),
        ..Default::default()
    };

    let mut annotated_gene_counts = vec![0; CHROM_COUNT];
    for record in gene_map.records() {
        annotated_gene_counts[record.chrom_index] += 1;
    }

    // Join expression genes to the gene map by name
    let mut chrom_genes: Vec<Vec<CandidateGene>> = vec![Vec::new(); CHROM_COUNT];
    let mut observed_names = HashSet::new();
    for (column_index, gene_name) in expression.gene_names.iter().enumerate() {
        if let Some(regex) = &settings.excluded_gene_regex {
            if regex.is_match(gene_name) {
                stats.regex_excluded_gene_count += 1;
                continue;
            }
        }
        if !observed_names.insert(gene_name.as_str()) {
            debug!("Skipping repeated expression entry for gene '{gene_name}'");
            stats.duplicate_gene_count += 1;
            continue;
        }
        match gene_map.get(gene_name) {
            Some(record) => chrom_genes[record.chrom_index].push(CandidateGene {
                column_index,
                record,
                detection: detection[column_index],
            }),
            None => {
                stats.unmapped_gene_count += 1;
            }
        }
    }

    let mapped_gene_count = chrom_genes.iter().map(|x| x.len()).sum::<usize>();
    if mapped_gene_count == 0 {
        return Err(CnvError::validation(format!(
            "None of the {} expression genes could be joined to the gene map",
            expression.gene_count()
        )));
    }
    if stats.unmapped_gene_count > 0 {
        debug!(
            "{} expression genes have no gene map entry",
            stats.unmapped_gene_count.separate_with_commas()
        );
    }

    let mut column_indices = Vec::new();
    let mut genes = Vec::new();
    let mut retained_detection = Vec::new();
    let mut chrom_bin_counts = Vec::with_capacity(CHROM_COUNT);
    for (chrom_index, candidates) in chrom_genes.into_iter().enumerate() {
        let mapped_gene_count = candidates.len();
        let expressed = candidates
            .into_iter()
            .filter(|x| x.detection >= settings.min_detection)
            .collect::<Vec<_>>();
        let expressed_gene_count = expressed.len();

        let (retained, dropped) = select_chrom_bin_genes(expressed, bin_size);
        let bin_count = retained.len() / bin_size;

        let chrom_stats = ChromBinningStats {
            chrom: get_chrom_label(chrom_index),
            annotated_gene_count: annotated_gene_counts[chrom_index],
            mapped_gene_count,
            expressed_gene_count,
            dropped_gene_count: dropped.len(),
            retained_gene_count: retained.len(),
            bin_count,
        };
        debug!(
            "Chromosome {}: {} expressed genes, {} dropped, {} bins",
            chrom_stats.chrom,
            chrom_stats.expressed_gene_count,
            chrom_stats.dropped_gene_count,
            chrom_stats.bin_count
        );
        if expressed_gene_count > 0 && bin_count == 0 {
            warn!(
                "Chromosome {} has {expressed_gene_count} expressed genes, fewer than the bin size {bin_size}, so it will not be binned",
                chrom_stats.chrom
            );
        }
        stats.chroms.push(chrom_stats);

        for gene in retained {
            column_indices.push(gene.column_index);
            genes.push(gene.record.clone());
            retained_detection.push(gene.detection);
        }
        chrom_bin_counts.push(bin_count);
    }

    let chrom_bounds = ChromosomeBoundaryTable::from_bin_counts(&chrom_bin_counts);
    stats.total_bin_count = chrom_bounds.total_bin_count();
    if stats.total_bin_count == 0 {
        let max_expressed = stats
            .chroms
            .iter()
            .map(|x| x.expressed_gene_count)
            .max()
            .unwrap_or(0);
        return Err(CnvError::configuration(format!(
            "Bin size {bin_size} produces no bins on any chromosome, the largest expressed chromosome gene count is {max_expressed}"
        )));
    }

    info!(
        "Binned {} genes into {} bins",
        genes.len().separate_with_commas(),
        stats.total_bin_count.separate_with_commas()
    );

    let binned_genes = BinnedGenes {
        bin_size,
        cell_names: expression.cell_names.clone(),
        genes,
        detection: retained_detection,
        expression: expression.counts.select(Axis(1), &column_indices),
        chrom_bounds,
    };
    Ok((binned_genes, stats))
}

/// Summarize each consecutive block of `bin_size` gene columns by its median
///
/// Rows are processed in parallel on the current rayon pool, output row order matches the input.
///
pub fn get_bin_medians(gene_matrix: &Array2<f64>, bin_size: usize) -> CnvResult<Array2<f64>> {
    let gene_count = gene_matrix.ncols();
    if bin_size == 0 || gene_count % bin_size != 0 {
        return Err(CnvError::validation(format!(
            "Gene column count {gene_count} is not a multiple of bin size {bin_size}"
        )));
    }
    let mut bin_medians = Array2::zeros((gene_matrix.nrows(), gene_count / bin_size));
    Zip::from(bin_medians.rows_mut())
        .and(gene_matrix.rows())
        .par_for_each(|mut median_row, gene_row| {
            for (median, bin_values) in median_row
                .iter_mut()
                .zip(gene_row.axis_chunks_iter(Axis(0), bin_size))
            {
                *median = get_median(&bin_values.to_vec());
            }
        });
    Ok(bin_medians)
}
