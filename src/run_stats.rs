//! Track stats for each clonecn run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

use crate::clone::TumorClone;

#[derive(Default, Deserialize, Serialize)]
pub struct CloneSegmentationStats {
    pub clone_id: String,
    pub cell_count: usize,
    pub breakpoint_count: usize,
    pub segment_count: usize,
}

impl CloneSegmentationStats {
    pub fn new(clone: &TumorClone) -> Self {
        Self {
            clone_id: clone.clone_id.clone(),
            cell_count: clone.cell_count(),
            breakpoint_count: clone.breakpoints().map(|x| x.len()).unwrap_or(0),
            segment_count: clone
                .segment_profile()
                .map(|x| x.segments.len())
                .unwrap_or(0),
        }
    }
}

#[derive(Default, Deserialize, Serialize)]
pub struct SegmentationRunStats {
    pub cell_count: usize,

    /// Cells assigned to any tumor clone
    pub tumor_cell_count: usize,

    pub bin_count: usize,
    pub consensus_breakpoint_count: usize,
    pub clones: Vec<CloneSegmentationStats>,
}

/// Write any run stats structure out in json format
pub fn write_run_stats<T: Serialize>(output_dir: &Utf8Path, filename: &str, stats: &T) {
    let filename = output_dir.join(filename);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, stats).unwrap();
}
