//! Breakpoint calling from a clone's bin-level copy number estimates
//!
//! The representative signal of each bin is the median copy number over the clone's cells. Each
//! chromosome is scanned independently: the signal is rounded to an integer copy number level,
//! runs of equal level become candidate segments, and runs shorter than the minimum segment
//! length are merged into a neighbouring run.
//!

use std::collections::BTreeSet;

use log::debug;
use ndarray::{Array2, Axis};

use crate::chrom_bounds::ChromosomeBoundaryTable;
use crate::stats_utils::{get_mean, get_median};

#[derive(Clone, Debug)]
pub struct SegmentationSettings {
    /// Copy number levels are clamped to this value
    pub max_copy_number: u32,

    /// Runs of equal copy number level shorter than this many bins are merged into a neighbour
    pub min_segment_bins: usize,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            max_copy_number: 6,
            min_segment_bins: 1,
        }
    }
}

/// Median copy number of each bin over all rows of the cells x bins matrix
///
pub fn get_bin_signal(cell_bin_cn: &Array2<f64>) -> Vec<f64> {
    cell_bin_cn
        .axis_iter(Axis(1))
        .map(|bin_values| get_median(&bin_values.to_vec()))
        .collect()
}

fn get_copy_number_level(signal: f64, max_copy_number: u32) -> u32 {
    signal.round().clamp(0.0, max_copy_number as f64) as u32
}

/// Run of bins with the same copy number level, in chromosome-local bin coordinates
#[derive(Clone, Debug, PartialEq)]
struct LevelRun {
    begin: usize,
    end: usize,
    level: u32,
}

impl LevelRun {
    fn len(&self) -> usize {
        self.end - self.begin
    }
}

fn get_level_runs(levels: &[u32]) -> Vec<LevelRun> {
    let mut runs: Vec<LevelRun> = Vec::new();
    for (bin_index, &level) in levels.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.level == level => {
                run.end = bin_index + 1;
            }
            _ => runs.push(LevelRun {
                begin: bin_index,
                end: bin_index + 1,
                level,
            }),
        }
    }
    runs
}

/// Join adjacent runs sharing the same level
fn coalesce_runs(runs: Vec<LevelRun>) -> Vec<LevelRun> {
    let mut coalesced: Vec<LevelRun> = Vec::with_capacity(runs.len());
    for run in runs {
        match coalesced.last_mut() {
            Some(last) if last.level == run.level => {
                last.end = run.end;
            }
            _ => coalesced.push(run),
        }
    }
    coalesced
}

/// Merge runs shorter than `min_run_bins` into a neighbouring run
///
/// The leftmost of the shortest runs is merged first, into the neighbour whose level is closest
/// to the run's mean signal. Ties go to the left neighbour. Merging repeats until every run meets
/// the minimum length or only one run remains.
///
fn merge_short_runs(mut runs: Vec<LevelRun>, signal: &[f64], min_run_bins: usize) -> Vec<LevelRun> {
    loop {
        if runs.len() < 2 {
            return runs;
        }
        let Some((run_index, _)) = runs
            .iter()
            .enumerate()
            .filter(|(_, run)| run.len() < min_run_bins)
            .min_by_key(|(run_index, run)| (run.len(), *run_index))
        else {
            return runs;
        };

        let run_mean = get_mean(&signal[runs[run_index].begin..runs[run_index].end]);
        let level_distance = |x: &LevelRun| (x.level as f64 - run_mean).abs();
        let merge_left = if run_index == 0 {
            false
        } else if run_index + 1 == runs.len() {
            true
        } else {
            level_distance(&runs[run_index - 1]) <= level_distance(&runs[run_index + 1])
        };

        let run = runs.remove(run_index);
        if merge_left {
            runs[run_index - 1].end = run.end;
        } else {
            runs[run_index].begin = run.begin;
        }
        runs = coalesce_runs(runs);
    }
}

/// Find copy number level breakpoints within one chromosome
///
/// Returns chromosome-local bin indices marking the start of each segment after the first. Local
/// index 0 is never returned because the chromosome start is always a segment boundary.
///
fn get_chrom_breakpoints(chrom_signal: &[f64], settings: &SegmentationSettings) -> Vec<usize> {
    let levels = chrom_signal
        .iter()
        .map(|&x| get_copy_number_level(x, settings.max_copy_number))
        .collect::<Vec<_>>();
    let runs = merge_short_runs(
        get_level_runs(&levels),
        chrom_signal,
        settings.min_segment_bins,
    );
    runs.iter().skip(1).map(|x| x.begin).collect()
}

/// Find breakpoints over the whole genome from a representative bin signal
///
/// Breakpoints are global bin indices, strictly increasing, and include the start of every
/// chromosome other than the first. They never include 0 or the total bin count.
///
pub fn get_genome_breakpoints(
    bin_signal: &[f64],
    chrom_bounds: &ChromosomeBoundaryTable,
    settings: &SegmentationSettings,
) -> Vec<usize> {
    assert_eq!(bin_signal.len(), chrom_bounds.total_bin_count());

    let mut breakpoints = chrom_bounds
        .get_interior_chrom_starts()
        .into_iter()
        .collect::<BTreeSet<_>>();
    for (chrom_index, range) in chrom_bounds.iter().enumerate() {
        let chrom_breakpoints = get_chrom_breakpoints(&bin_signal[range.clone()], settings);
        debug!(
            "Chromosome index {chrom_index}: {} breakpoints",
            chrom_breakpoints.len()
        );
        breakpoints.extend(chrom_breakpoints.into_iter().map(|x| x + range.start));
    }
    breakpoints.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_get_bin_signal() {
        let m = array![[1.0, 2.0, 3.0], [3.0, 2.0, 1.0], [2.0, 9.0, 2.0]];
        assert_eq!(get_bin_signal(&m), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_get_copy_number_level() {
        assert_eq!(get_copy_number_level(2.4, 6), 2);
        assert_eq!(get_copy_number_level(2.6, 6), 3);
        assert_eq!(get_copy_number_level(-0.3, 6), 0);
        assert_eq!(get_copy_number_level(11.0, 6), 6);
    }

    #[test]
    fn test_get_level_runs() {
        let runs = get_level_runs(&[2, 2, 3, 3, 3, 1]);
        assert_eq!(
            runs,
            vec![
                LevelRun {
                    begin: 0,
                    end: 2,
                    level: 2
                },
                LevelRun {
                    begin: 2,
                    end: 5,
                    level: 3
                },
                LevelRun {
                    begin: 5,
                    end: 6,
                    level: 1
                },
            ]
        );
        assert!(get_level_runs(&[]).is_empty());
    }

    #[test]
    fn test_merge_short_runs() {
        // A single-bin spike between two runs of the same level is absorbed
        let signal = [2.0, 2.0, 2.0, 3.2, 2.0, 2.0];
        let levels = signal.iter().map(|&x| get_copy_number_level(x, 6)).collect::<Vec<_>>();
        let runs = merge_short_runs(get_level_runs(&levels), &signal, 2);
        assert_eq!(runs.len(), 1);
        assert_eq!((runs[0].begin, runs[0].end, runs[0].level), (0, 6, 2));

        // The short run joins the neighbour with the closest level
        let signal = [1.0, 1.0, 1.0, 3.4, 4.0, 4.0, 4.0];
        let levels = signal.iter().map(|&x| get_copy_number_level(x, 6)).collect::<Vec<_>>();
        let runs = merge_short_runs(get_level_runs(&levels), &signal, 2);
        let bounds = runs.iter().map(|x| (x.begin, x.end, x.level)).collect::<Vec<_>>();
        assert_eq!(bounds, vec![(0, 3, 1), (3, 7, 4)]);

        // No merging when the minimum is 1
        let runs = merge_short_runs(get_level_runs(&levels), &signal, 1);
        assert_eq!(runs.len(), 3);
    }

    #[test]
    fn test_get_chrom_breakpoints() {
        let settings = SegmentationSettings::default();
        let signal = [2.1, 1.9, 2.0, 3.1, 2.9, 3.0, 1.2];
        assert_eq!(get_chrom_breakpoints(&signal, &settings), vec![3, 6]);

        // A level change at the first bin is not a breakpoint
        let signal = [4.0, 2.0, 2.0];
        let breakpoints = get_chrom_breakpoints(&signal, &settings);
        assert_eq!(breakpoints, vec![1]);
        assert!(!breakpoints.contains(&0));

        assert!(get_chrom_breakpoints(&[], &settings).is_empty());
    }

    #[test]
    fn test_get_genome_breakpoints() {
        let chrom_bounds = ChromosomeBoundaryTable::from_bin_counts(&[4, 0, 3, 2]);
        let signal = [2.0, 2.0, 4.0, 4.0, 1.0, 1.0, 1.0, 1.0, 3.0];
        let settings = SegmentationSettings::default();
        let breakpoints = get_genome_breakpoints(&signal, &chrom_bounds, &settings);

        // Chromosome starts are always included even when the level doesn't change
        assert_eq!(breakpoints, vec![2, 4, 7, 8]);

        for pair in breakpoints.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(breakpoints.iter().all(|&x| x > 0 && x < signal.len()));
    }

    #[test]
    fn test_get_genome_breakpoints_is_deterministic() {
        let chrom_bounds = ChromosomeBoundaryTable::from_bin_counts(&[5, 5]);
        let signal = [1.0, 1.4, 2.6, 2.5, 0.2, 5.0, 5.1, 4.9, 2.0, 2.0];
        let settings = SegmentationSettings {
            max_copy_number: 6,
            min_segment_bins: 2,
        };
        let first = get_genome_breakpoints(&signal, &chrom_bounds, &settings);
        let second = get_genome_breakpoints(&signal, &chrom_bounds, &settings);
        assert_eq!(first, second);
    }
}
