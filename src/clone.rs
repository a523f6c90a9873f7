//! Tumor clone copy number breakpoints and segment profiles
//!

use log::debug;
use ndarray::Array2;
use rayon::prelude::*;
use strum::IntoStaticStr;

use crate::chrom_bounds::ChromosomeBoundaryTable;
use crate::copy_number_segmentation::{
    SegmentProfile, SegmentationSettings, bin_to_segment, get_bin_signal, get_genome_breakpoints,
    get_segment_profile, merge_breakpoints,
};
use crate::errors::{CnvError, CnvResult};

/// Progress of a clone through the segmentation stages
///
/// Each state carries the results of all completed stages.
///
#[derive(Clone, Debug, IntoStaticStr)]
pub enum CloneState {
    Created,
    BreakpointsReady {
        breakpoints: Vec<usize>,
    },
    ProfileReady {
        breakpoints: Vec<usize>,
        profile: SegmentProfile,
    },
}

/// A group of cells presumed to share one copy number profile
///
pub struct TumorClone {
    pub clone_id: String,
    pub bin_size: usize,

    /// Cells x genes copy number estimates, genes in bin order
    cell_gene_cn: Array2<f64>,

    /// Cells x bins copy number estimates
    cell_bin_cn: Array2<f64>,

    chrom_bounds: ChromosomeBoundaryTable,
    state: CloneState,
}

fn check_finite(clone_id: &str, label: &str, m: &Array2<f64>) -> CnvResult<()> {
    if let Some(x) = m.iter().find(|x| !x.is_finite()) {
        return Err(CnvError::validation(format!(
            "Clone '{clone_id}' {label} copy number matrix contains non-finite value '{x}'"
        )));
    }
    Ok(())
}

impl TumorClone {
    pub fn new(
        clone_id: &str,
        bin_size: usize,
        cell_gene_cn: Array2<f64>,
        cell_bin_cn: Array2<f64>,
        chrom_bounds: ChromosomeBoundaryTable,
    ) -> CnvResult<Self> {
        let bin_count = chrom_bounds.total_bin_count();
        if cell_bin_cn.nrows() == 0 {
            return Err(CnvError::validation(format!(
                "Clone '{clone_id}' has no cells"
            )));
        }
        if cell_gene_cn.nrows() != cell_bin_cn.nrows() {
            return Err(CnvError::validation(format!(
                "Clone '{clone_id}' gene and bin copy number matrices have different cell counts ({} and {})",
                cell_gene_cn.nrows(),
                cell_bin_cn.nrows()
            )));
        }
        if cell_bin_cn.ncols() != bin_count {
            return Err(CnvError::validation(format!(
                "Clone '{clone_id}' bin copy number matrix has {} bins, expected {bin_count}",
                cell_bin_cn.ncols()
            )));
        }
        if cell_gene_cn.ncols() != bin_count * bin_size {
            return Err(CnvError::validation(format!(
                "Clone '{clone_id}' gene copy number matrix has {} genes, expected {} bins of size {bin_size}",
                cell_gene_cn.ncols(),
                bin_count
            )));
        }
        check_finite(clone_id, "gene", &cell_gene_cn)?;
        check_finite(clone_id, "bin", &cell_bin_cn)?;

        Ok(Self {
            clone_id: clone_id.to_string(),
            bin_size,
            cell_gene_cn,
            cell_bin_cn,
            chrom_bounds,
            state: CloneState::Created,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cell_bin_cn.nrows()
    }

    pub fn state_name(&self) -> &'static str {
        (&self.state).into()
    }

    /// Detect breakpoints from the clone's median bin copy number
    ///
    /// Any earlier breakpoints or profile are replaced.
    ///
    pub fn call_breakpoints(&mut self, settings: &SegmentationSettings) {
        let bin_signal = get_bin_signal(&self.cell_bin_cn);
        let breakpoints = get_genome_breakpoints(&bin_signal, &self.chrom_bounds, settings);
        debug!(
            "Clone '{}': {} breakpoints",
            self.clone_id,
            breakpoints.len()
        );
        self.state = CloneState::BreakpointsReady { breakpoints };
    }

    /// Summarize the clone's median bin copy number over each segment
    ///
    /// Fails with a state error if breakpoints have not been called yet.
    ///
    pub fn generate_profile(&mut self) -> CnvResult<()> {
        let breakpoints = match &self.state {
            CloneState::Created => {
                return Err(CnvError::state(format!(
                    "Clone '{}' is in state {}, breakpoints must be called before generating a segment profile",
                    self.clone_id,
                    self.state_name()
                )));
            }
            CloneState::BreakpointsReady { breakpoints }
            | CloneState::ProfileReady { breakpoints, .. } => breakpoints.clone(),
        };

        let bin_signal = get_bin_signal(&self.cell_bin_cn);
        let profile =
            get_segment_profile(&bin_signal, &breakpoints, &self.chrom_bounds, self.bin_size)
                .map_err(|e| {
                    CnvError::validation(format!(
                        "Clone '{}' segment profile: {e}",
                        self.clone_id
                    ))
                })?;
        self.state = CloneState::ProfileReady {
            breakpoints,
            profile,
        };
        Ok(())
    }

    pub fn breakpoints(&self) -> Option<&[usize]> {
        match &self.state {
            CloneState::Created => None,
            CloneState::BreakpointsReady { breakpoints }
            | CloneState::ProfileReady { breakpoints, .. } => Some(breakpoints),
        }
    }

    pub fn segment_profile(&self) -> Option<&SegmentProfile> {
        match &self.state {
            CloneState::ProfileReady { profile, .. } => Some(profile),
            _ => None,
        }
    }

    /// Smooth each cell's gene copy number over the clone's segments
    ///
    /// Each gene is assigned the median of the cell's gene copy number over all genes in the
    /// same segment. Fails with a state error if breakpoints have not been called yet.
    ///
    pub fn get_segmented_cell_gene_cn(&self) -> CnvResult<Array2<f64>> {
        let Some(breakpoints) = self.breakpoints() else {
            return Err(CnvError::state(format!(
                "Clone '{}' is in state {}, breakpoints must be called before segmenting cell gene copy number",
                self.clone_id,
                self.state_name()
            )));
        };
        let gene_breakpoints = breakpoints
            .iter()
            .map(|x| x * self.bin_size)
            .collect::<Vec<_>>();
        bin_to_segment(&self.cell_gene_cn, &gene_breakpoints)
    }
}

/// Call breakpoints and generate segment profiles for all clones
///
/// Clones are processed in parallel on the current rayon pool.
///
pub fn segment_clones(clones: &mut [TumorClone], settings: &SegmentationSettings) -> CnvResult<()> {
    clones.par_iter_mut().try_for_each(|clone| {
        clone.call_breakpoints(settings);
        clone.generate_profile()
    })
}

/// Sorted union of breakpoints over all clones with called breakpoints
///
pub fn get_consensus_breakpoints(clones: &[TumorClone]) -> Vec<usize> {
    merge_breakpoints(clones.iter().filter_map(|x| x.breakpoints()))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    /// Build a clone with bin size 2 where each row of `bin_rows` gives one cell's bin copy number
    fn get_test_clone(clone_id: &str, bin_rows: Vec<Vec<f64>>, chrom_bin_counts: &[usize]) -> TumorClone {
        let bin_size = 2;
        let cell_count = bin_rows.len();
        let bin_count = bin_rows[0].len();
        let cell_bin_cn = Array2::from_shape_fn((cell_count, bin_count), |(i, j)| bin_rows[i][j]);
        let cell_gene_cn = Array2::from_shape_fn((cell_count, bin_count * bin_size), |(i, j)| {
            bin_rows[i][j / bin_size]
        });
        TumorClone::new(
            clone_id,
            bin_size,
            cell_gene_cn,
            cell_bin_cn,
            ChromosomeBoundaryTable::from_bin_counts(chrom_bin_counts),
        )
        .unwrap()
    }

    #[test]
    fn test_generate_profile_before_breakpoints() {
        let mut clone = get_test_clone("1", vec![vec![2.0, 2.0, 3.0]], &[3]);
        assert_eq!(clone.state_name(), "Created");
        let result = clone.generate_profile();
        assert!(matches!(result, Err(CnvError::State { .. })));
        assert!(clone.breakpoints().is_none());
        assert!(clone.segment_profile().is_none());
        assert!(matches!(
            clone.get_segmented_cell_gene_cn(),
            Err(CnvError::State { .. })
        ));
    }

    #[test]
    fn test_clone_segmentation() {
        let mut clone = get_test_clone(
            "A",
            vec![
                vec![2.0, 2.0, 4.0, 4.0, 1.0, 1.0],
                vec![2.2, 1.8, 3.9, 4.2, 1.0, 0.8],
                vec![1.9, 2.1, 4.1, 3.8, 1.1, 1.0],
            ],
            &[4, 2],
        );
        clone.call_breakpoints(&SegmentationSettings::default());
        assert_eq!(clone.state_name(), "BreakpointsReady");
        assert_eq!(clone.breakpoints(), Some(&[2usize, 4][..]));

        clone.generate_profile().unwrap();
        assert_eq!(clone.state_name(), "ProfileReady");
        let profile = clone.segment_profile().unwrap();
        let copy_numbers = profile
            .segments
            .iter()
            .map(|x| x.copy_number)
            .collect::<Vec<_>>();
        assert_eq!(copy_numbers.len(), 3);
        assert_abs_diff_eq!(copy_numbers[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(copy_numbers[1], 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(copy_numbers[2], 1.0, epsilon = 1e-9);
        assert_eq!(profile.get_gene_copy_numbers().len(), 12);

        let cell_gene_cn = clone.get_segmented_cell_gene_cn().unwrap();
        assert_eq!(cell_gene_cn.dim(), (3, 12));
        assert_abs_diff_eq!(cell_gene_cn[[1, 0]], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(cell_gene_cn[[1, 7]], 4.05, epsilon = 1e-9);
        assert_abs_diff_eq!(cell_gene_cn[[1, 11]], 0.9, epsilon = 1e-9);

        // Repeated calls recompute the same result
        clone.call_breakpoints(&SegmentationSettings::default());
        assert!(clone.segment_profile().is_none());
        clone.generate_profile().unwrap();
        clone.generate_profile().unwrap();
        assert_eq!(clone.breakpoints(), Some(&[2usize, 4][..]));
    }

    #[test]
    fn test_invalid_clone() {
        let chrom_bounds = ChromosomeBoundaryTable::from_bin_counts(&[2]);
        let result = TumorClone::new(
            "X",
            2,
            Array2::zeros((1, 3)),
            Array2::zeros((1, 2)),
            chrom_bounds.clone(),
        );
        assert!(matches!(result, Err(CnvError::Validation { .. })));

        let result = TumorClone::new(
            "X",
            2,
            Array2::zeros((0, 4)),
            Array2::zeros((0, 2)),
            chrom_bounds.clone(),
        );
        assert!(matches!(result, Err(CnvError::Validation { .. })));

        let bin_cn = array![[f64::NAN, 1.0]];
        let result = TumorClone::new("X", 2, Array2::zeros((1, 4)), bin_cn, chrom_bounds);
        assert!(matches!(result, Err(CnvError::Validation { .. })));
    }

    #[test]
    fn test_segment_clones() {
        let mut clones = vec![
            get_test_clone("1", vec![vec![2.0, 2.0, 3.0, 3.0]], &[4]),
            get_test_clone("2", vec![vec![1.0, 2.0, 2.0, 2.0]], &[4]),
        ];
        segment_clones(&mut clones, &SegmentationSettings::default()).unwrap();
        assert!(clones.iter().all(|x| x.segment_profile().is_some()));
        assert_eq!(get_consensus_breakpoints(&clones), vec![1, 2]);
    }
}
