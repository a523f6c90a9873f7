mod breakpoints;

use std::collections::BTreeSet;
use std::ops::Range;

use ndarray::{Array2, Zip, s};
use serde::{Deserialize, Serialize};

pub use self::breakpoints::{SegmentationSettings, get_bin_signal, get_genome_breakpoints};
use crate::chrom_bounds::ChromosomeBoundaryTable;
use crate::errors::{CnvError, CnvResult};
use crate::stats_utils::get_median;

/// Copy number over a given bin interval
///
/// Interval defined by begin_bin,end_bin is zero-indexed, half-closed
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CopyNumberSegment {
    pub chrom_index: usize,
    pub begin_bin: usize,
    pub end_bin: usize,
    pub copy_number: f64,
}

impl CopyNumberSegment {
    pub fn bin_count(&self) -> usize {
        self.end_bin - self.begin_bin
    }
}

/// Copy number segments for one clone, listed in genome order
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SegmentProfile {
    pub bin_size: usize,
    pub segments: Vec<CopyNumberSegment>,
}

impl SegmentProfile {
    /// Broadcast each segment copy number back to all bins in the segment
    pub fn get_bin_copy_numbers(&self) -> Vec<f64> {
        self.segments
            .iter()
            .flat_map(|x| std::iter::repeat_n(x.copy_number, x.bin_count()))
            .collect()
    }

    /// Broadcast each segment copy number back to all genes in the segment
    pub fn get_gene_copy_numbers(&self) -> Vec<f64> {
        self.get_bin_copy_numbers()
            .into_iter()
            .flat_map(|x| std::iter::repeat_n(x, self.bin_size))
            .collect()
    }
}

/// Check that breakpoints are strictly increasing and do not exceed `bin_count`
///
fn validate_breakpoints(breakpoints: &[usize], bin_count: usize) -> CnvResult<()> {
    for pair in breakpoints.windows(2) {
        if pair[0] >= pair[1] {
            return Err(CnvError::validation(format!(
                "Breakpoints are not strictly increasing at bins {} and {}",
                pair[0], pair[1]
            )));
        }
    }
    if let Some(&last) = breakpoints.last() {
        if last > bin_count {
            return Err(CnvError::validation(format!(
                "Breakpoint {last} is outside of the bin range [0,{bin_count}]"
            )));
        }
    }
    Ok(())
}

/// Convert breakpoints into segment bin ranges covering `[0, bin_count)`
///
/// A breakpoint at 0 or at `bin_count` produces an empty range at the corresponding end. These
/// are reported here and left for the caller to skip or reject.
///
pub fn get_segment_ranges(breakpoints: &[usize], bin_count: usize) -> CnvResult<Vec<Range<usize>>> {
    validate_breakpoints(breakpoints, bin_count)?;
    let mut ranges = Vec::with_capacity(breakpoints.len() + 1);
    let mut begin = 0;
    for &breakpoint in breakpoints {
        ranges.push(begin..breakpoint);
        begin = breakpoint;
    }
    ranges.push(begin..bin_count);
    Ok(ranges)
}

/// Median of each row over each segment range
///
/// Returns a rows x segments matrix.
///
pub fn get_segment_values(bin_matrix: &Array2<f64>, segment_ranges: &[Range<usize>]) -> Array2<f64> {
    Array2::from_shape_fn(
        (bin_matrix.nrows(), segment_ranges.len()),
        |(row_index, segment_index)| {
            let range = segment_ranges[segment_index].clone();
            get_median(&bin_matrix.slice(s![row_index, range]).to_vec())
        },
    )
}

/// Smooth a bin-level matrix into a segment profile given an external breakpoint list
///
/// Every row is summarized by its median over each segment implied by the breakpoints, and that
/// value is broadcast back to all bins of the segment, so the output has the same shape as the
/// input. An empty breakpoint list treats the full bin range as one segment. Breakpoints at 0 or
/// at the bin count imply empty edge segments, which are skipped.
///
pub fn bin_to_segment(bin_matrix: &Array2<f64>, breakpoints: &[usize]) -> CnvResult<Array2<f64>> {
    let segment_ranges = get_segment_ranges(breakpoints, bin_matrix.ncols())?
        .into_iter()
        .filter(|x| !x.is_empty())
        .collect::<Vec<_>>();
    let segment_values = get_segment_values(bin_matrix, &segment_ranges);

    let mut profile = Array2::zeros(bin_matrix.raw_dim());
    for (segment_index, range) in segment_ranges.iter().enumerate() {
        Zip::from(profile.slice_mut(s![.., range.clone()]).rows_mut())
            .and(segment_values.column(segment_index))
            .for_each(|mut profile_row, &value| profile_row.fill(value));
    }
    Ok(profile)
}

/// Sorted union of several breakpoint lists
///
pub fn merge_breakpoints<'a>(breakpoint_lists: impl IntoIterator<Item = &'a [usize]>) -> Vec<usize> {
    breakpoint_lists
        .into_iter()
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Build the segment profile of a representative bin signal
///
/// Segments are delimited by the breakpoints together with all chromosome boundaries. Each
/// segment's copy number is the median signal over its bins. Any empty segment indicates an
/// inconsistent breakpoint list and is reported as a validation error.
///
pub fn get_segment_profile(
    bin_signal: &[f64],
    breakpoints: &[usize],
    chrom_bounds: &ChromosomeBoundaryTable,
    bin_size: usize,
) -> CnvResult<SegmentProfile> {
    let bin_count = chrom_bounds.total_bin_count();
    if bin_signal.len() != bin_count {
        return Err(CnvError::validation(format!(
            "Bin signal length {} does not match chromosome boundary bin count {bin_count}",
            bin_signal.len()
        )));
    }
    validate_breakpoints(breakpoints, bin_count)?;

    let chrom_starts = chrom_bounds.get_interior_chrom_starts();
    let all_breakpoints = merge_breakpoints([breakpoints, chrom_starts.as_slice()]);

    let mut segments = Vec::new();
    for range in get_segment_ranges(&all_breakpoints, bin_count)? {
        if range.is_empty() {
            return Err(CnvError::validation(format!(
                "Breakpoint list implies an empty segment at bin {}",
                range.start
            )));
        }
        let chrom_index = chrom_bounds
            .get_bin_chrom_index(range.start)
            .ok_or_else(|| {
                CnvError::validation(format!(
                    "Segment at bin {} is outside of all chromosomes",
                    range.start
                ))
            })?;
        segments.push(CopyNumberSegment {
            chrom_index,
            begin_bin: range.start,
            end_bin: range.end,
            copy_number: get_median(&bin_signal[range]),
        });
    }
    Ok(SegmentProfile { bin_size, segments })
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_bin_to_segment() {
        let m = array![
            [1.0, 1.0, 1.0, 3.0, 3.0, 3.0],
            [2.0, 2.0, 2.0, 2.0, 5.0, 5.0]
        ];
        let profile = bin_to_segment(&m, &[3]).unwrap();
        assert_eq!(
            profile,
            array![
                [1.0, 1.0, 1.0, 3.0, 3.0, 3.0],
                [2.0, 2.0, 2.0, 5.0, 5.0, 5.0]
            ]
        );

        let segment_ranges = get_segment_ranges(&[3], 6).unwrap();
        let segment_values = get_segment_values(&m, &segment_ranges);
        assert_eq!(segment_values, array![[1.0, 3.0], [2.0, 5.0]]);
    }

    #[test]
    fn test_bin_to_segment_no_breakpoints() {
        let m = array![[1.0, 4.0, 2.0, 7.0, 3.0], [0.0, 0.0, 1.0, 1.0, 1.0]];
        let profile = bin_to_segment(&m, &[]).unwrap();
        assert_eq!(profile.dim(), (2, 5));
        assert!(profile.row(0).iter().all(|&x| x == 3.0));
        assert!(profile.row(1).iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_bin_to_segment_edge_breakpoints() {
        let m = array![[1.0, 1.0, 4.0, 4.0]];

        // Trailing breakpoint equal to the bin count does not add a segment
        let profile = bin_to_segment(&m, &[2, 4]).unwrap();
        assert_eq!(profile, m);

        let profile = bin_to_segment(&m, &[0, 2]).unwrap();
        assert_eq!(profile, m);
    }

    #[test]
    fn test_bin_to_segment_invalid_breakpoints() {
        let m = array![[1.0, 1.0, 4.0, 4.0]];
        assert!(matches!(
            bin_to_segment(&m, &[3, 2]),
            Err(CnvError::Validation { .. })
        ));
        assert!(matches!(
            bin_to_segment(&m, &[2, 2]),
            Err(CnvError::Validation { .. })
        ));
        assert!(matches!(
            bin_to_segment(&m, &[5]),
            Err(CnvError::Validation { .. })
        ));
    }

    #[test]
    fn test_merge_breakpoints() {
        let a = [3, 9];
        let b = [1, 3, 12];
        assert_eq!(merge_breakpoints([&a[..], &b[..]]), vec![1, 3, 9, 12]);
        assert!(merge_breakpoints(Vec::<&[usize]>::new()).is_empty());
    }

    #[test]
    fn test_get_segment_profile() {
        let chrom_bounds = ChromosomeBoundaryTable::from_bin_counts(&[4, 0, 3]);
        let signal = [2.0, 2.1, 3.0, 2.9, 1.0, 1.2, 0.9];
        let profile = get_segment_profile(&signal, &[2], &chrom_bounds, 10).unwrap();

        let ranges = profile
            .segments
            .iter()
            .map(|x| (x.chrom_index, x.begin_bin, x.end_bin))
            .collect::<Vec<_>>();
        assert_eq!(ranges, vec![(0, 0, 2), (0, 2, 4), (2, 4, 7)]);

        let copy_numbers = profile
            .segments
            .iter()
            .map(|x| x.copy_number)
            .collect::<Vec<_>>();
        approx::assert_abs_diff_eq!(copy_numbers[0], 2.05, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(copy_numbers[1], 2.95, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(copy_numbers[2], 1.0, epsilon = 1e-9);

        let bin_copy_numbers = profile.get_bin_copy_numbers();
        assert_eq!(bin_copy_numbers.len(), 7);
        assert_eq!(bin_copy_numbers[4..], [1.0, 1.0, 1.0]);
        assert_eq!(profile.get_gene_copy_numbers().len(), 70);
    }

    #[test]
    fn test_get_segment_profile_empty_segment() {
        let chrom_bounds = ChromosomeBoundaryTable::from_bin_counts(&[4, 3]);
        let signal = [2.0; 7];
        for breakpoints in [&[0usize][..], &[7][..]] {
            let result = get_segment_profile(&signal, breakpoints, &chrom_bounds, 10);
            assert!(matches!(result, Err(CnvError::Validation { .. })));
        }
        let result = get_segment_profile(&signal[..6], &[], &chrom_bounds, 10);
        assert!(matches!(result, Err(CnvError::Validation { .. })));
    }
}
