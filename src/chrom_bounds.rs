use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::errors::{CnvError, CnvResult};

/// Bin index range of each chromosome in genome bin order
///
/// Ranges are zero-indexed and half-open. Together they cover `[0, total_bin_count)` with no
/// gaps or overlaps. A chromosome without any bins has a zero-width range.
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChromosomeBoundaryTable {
    bounds: Vec<Range<usize>>,
}

impl ChromosomeBoundaryTable {
    /// Create boundaries from the bin count of each chromosome, in chromosome order
    ///
    pub fn from_bin_counts(chrom_bin_counts: &[usize]) -> Self {
        let mut bounds = Vec::with_capacity(chrom_bin_counts.len());
        let mut start = 0;
        for &bin_count in chrom_bin_counts {
            bounds.push(start..start + bin_count);
            start += bin_count;
        }
        Self { bounds }
    }

    /// Check that the ranges tile the bin range, for tables which were not built from bin counts
    ///
    pub fn validate(&self) -> CnvResult<()> {
        let mut expected_start = 0;
        for (chrom_index, range) in self.bounds.iter().enumerate() {
            if range.start != expected_start || range.end < range.start {
                return Err(CnvError::validation(format!(
                    "Chromosome boundary table entry {chrom_index} ({}-{}) does not continue from the previous entry end {expected_start}",
                    range.start,
                    range.end
                )));
            }
            expected_start = range.end;
        }
        Ok(())
    }

    pub fn chrom_count(&self) -> usize {
        self.bounds.len()
    }

    pub fn total_bin_count(&self) -> usize {
        self.bounds.last().map(|x| x.end).unwrap_or(0)
    }

    pub fn get_chrom_range(&self, chrom_index: usize) -> Range<usize> {
        self.bounds[chrom_index].clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<usize>> {
        self.bounds.iter()
    }

    /// Start bin of every chromosome after the first non-empty chromosome
    ///
    /// These are the chromosome edges which always separate copy number segments. Duplicate
    /// starts from zero-width chromosomes are reported once.
    ///
    pub fn get_interior_chrom_starts(&self) -> Vec<usize> {
        let total_bin_count = self.total_bin_count();
        let mut starts = self
            .bounds
            .iter()
            .map(|x| x.start)
            .filter(|&x| x > 0 && x < total_bin_count)
            .collect::<Vec<_>>();
        starts.dedup();
        starts
    }

    /// Find the chromosome index containing `bin_index`
    pub fn get_bin_chrom_index(&self, bin_index: usize) -> Option<usize> {
        self.bounds.iter().position(|x| x.contains(&bin_index))
    }
}
