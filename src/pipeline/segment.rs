use std::fs::File;
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use ndarray::{Array1, Axis};
use thousands::Separable;
use unwrap::unwrap;

use super::get_worker_pool;
use super::bin::BINNED_GENES_FILENAME;
use crate::cell_classifier::{AllCellsClassifier, CloneLabelTable, TumorCellClassifier};
use crate::cli::{SegmentSettings, SharedSettings, write_segment_settings};
use crate::clone::{TumorClone, get_consensus_breakpoints, segment_clones};
use crate::copy_number_model::{CopyNumberModel, PrecomputedCopyNumberTable};
use crate::copy_number_segmentation::{SegmentProfile, SegmentationSettings, bin_to_segment};
use crate::errors::{CnvError, CnvResult};
use crate::gene_binning::{BinnedGenes, get_bin_medians};
use crate::gene_map::get_chrom_label;
use crate::mpack_utils::read_mpack_file;
use crate::npy_utils::write_npy_file;
use crate::run_stats::{CloneSegmentationStats, SegmentationRunStats, write_run_stats};

pub const SEGMENT_SETTINGS_FILENAME: &str = "segment.settings.json";
const GENE_COPY_NUMBER_FILENAME: &str = "gene.copy.number.npy";
const BIN_MEDIAN_COPY_NUMBER_FILENAME: &str = "bin.median.copy.number.npy";
const CONSENSUS_SEGMENTS_FILENAME: &str = "consensus.segments.npy";
const CONSENSUS_BREAKPOINTS_FILENAME: &str = "consensus.breakpoints.tsv";
const SEGMENTATION_STATS_FILENAME: &str = "segmentation.stats.json";

fn get_clone_filename(output_dir: &Utf8Path, clone_id: &str, suffix: &str) -> Utf8PathBuf {
    output_dir.join(format!("clone.{clone_id}.{suffix}"))
}

/// Genome start position of the first gene in a bin
fn get_bin_start_pos(binned_genes: &BinnedGenes, bin_index: usize) -> u64 {
    binned_genes.genes[bin_index * binned_genes.bin_size].start
}

/// Genome end position of the last gene in a bin
fn get_bin_end_pos(binned_genes: &BinnedGenes, bin_index: usize) -> u64 {
    binned_genes.genes[(bin_index + 1) * binned_genes.bin_size - 1].end
}

fn write_clone_segments(filename: &Utf8Path, profile: &SegmentProfile, binned_genes: &BinnedGenes) {
    info!("Writing clone copy number segments to file: '{filename}'");

    let f = unwrap!(
        File::create(filename),
        "Unable to create clone copy number segments file: '{filename}'"
    );
    let mut f = BufWriter::new(f);

    writeln!(
        f,
        "chromosome\tstart\tend\tstart_bin\tend_bin\tcopy_number"
    )
    .unwrap();
    for segment in profile.segments.iter() {
        writeln!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{:.3}",
            get_chrom_label(segment.chrom_index),
            get_bin_start_pos(binned_genes, segment.begin_bin),
            get_bin_end_pos(binned_genes, segment.end_bin - 1),
            segment.begin_bin,
            segment.end_bin,
            segment.copy_number
        )
        .unwrap();
    }
}

fn write_breakpoints(filename: &Utf8Path, breakpoints: &[usize], binned_genes: &BinnedGenes) {
    info!("Writing consensus breakpoints to file: '{filename}'");

    let f = unwrap!(
        File::create(filename),
        "Unable to create consensus breakpoints file: '{filename}'"
    );
    let mut f = BufWriter::new(f);

    writeln!(f, "bin\tchromosome\tstart").unwrap();
    for &bin_index in breakpoints {
        let gene = &binned_genes.genes[bin_index * binned_genes.bin_size];
        writeln!(
            f,
            "{bin_index}\t{}\t{}",
            get_chrom_label(gene.chrom_index),
            gene.start
        )
        .unwrap();
    }
}

fn get_classifier(settings: &SegmentSettings) -> Box<dyn TumorCellClassifier> {
    match &settings.clone_labels_filename {
        Some(filename) => Box::new(CloneLabelTable::new(Utf8Path::new(filename))),
        None => Box::new(AllCellsClassifier),
    }
}

/// Segment the copy number profile of each tumor clone, writing all results to the output
/// directory
///
pub fn run_segment(shared_settings: &SharedSettings, settings: &SegmentSettings) -> CnvResult<()> {
    let output_dir = settings.output_dir.as_path();
    write_segment_settings(output_dir, settings);

    let binned_genes: BinnedGenes = read_mpack_file(
        &settings.binned_dir.join(BINNED_GENES_FILENAME),
        "binned genes",
    )?;
    binned_genes.validate()?;
    let bin_size = binned_genes.bin_size;

    let model = PrecomputedCopyNumberTable::new(Utf8Path::new(&settings.gene_copy_number_filename));
    info!("Getting gene copy number estimates from {}", model.describe());
    let gene_cn = model.estimate_gene_copy_number(&binned_genes)?;
    write_npy_file(
        &output_dir.join(GENE_COPY_NUMBER_FILENAME),
        &gene_cn,
        "gene copy number",
    );

    let worker_pool = get_worker_pool(shared_settings.thread_count);

    let bin_cn = worker_pool.install(|| get_bin_medians(&gene_cn, bin_size))?;
    write_npy_file(
        &output_dir.join(BIN_MEDIAN_COPY_NUMBER_FILENAME),
        &bin_cn,
        "bin median copy number",
    );

    let classifier = get_classifier(settings);
    info!("Grouping tumor cells into clones with {}", classifier.describe());
    let mut clones = classifier
        .get_tumor_clones(&binned_genes.cell_names)?
        .iter()
        .map(|group| {
            TumorClone::new(
                &group.clone_id,
                bin_size,
                gene_cn.select(Axis(0), &group.cell_indices),
                bin_cn.select(Axis(0), &group.cell_indices),
                binned_genes.chrom_bounds.clone(),
            )
        })
        .collect::<CnvResult<Vec<_>>>()?;

    let segmentation_settings = SegmentationSettings {
        max_copy_number: settings.max_copy_number,
        min_segment_bins: settings.min_segment_bins,
    };
    info!("Segmenting {} tumor clones", clones.len());
    worker_pool.install(|| segment_clones(&mut clones, &segmentation_settings))?;

    let mut stats = SegmentationRunStats {
        cell_count: binned_genes.cell_names.len(),
        bin_count: binned_genes.bin_count(),
        ..Default::default()
    };
    for clone in clones.iter() {
        let profile = clone.segment_profile().ok_or_else(|| {
            CnvError::state(format!(
                "Clone '{}' has no segment profile after segmentation",
                clone.clone_id
            ))
        })?;
        write_npy_file(
            &get_clone_filename(output_dir, &clone.clone_id, "gene.copy.number.npy"),
            &Array1::from(profile.get_gene_copy_numbers()),
            "clone gene copy number",
        );
        write_npy_file(
            &get_clone_filename(output_dir, &clone.clone_id, "cell.gene.copy.number.npy"),
            &clone.get_segmented_cell_gene_cn()?,
            "clone cell gene copy number",
        );
        write_clone_segments(
            &get_clone_filename(output_dir, &clone.clone_id, "segments.tsv"),
            profile,
            &binned_genes,
        );

        let clone_stats = CloneSegmentationStats::new(clone);
        info!(
            "Clone '{}': {} cells, {} segments",
            clone_stats.clone_id,
            clone_stats.cell_count.separate_with_commas(),
            clone_stats.segment_count
        );
        stats.tumor_cell_count += clone_stats.cell_count;
        stats.clones.push(clone_stats);
    }

    let consensus_breakpoints = get_consensus_breakpoints(&clones);
    let consensus_segments = bin_to_segment(&bin_cn, &consensus_breakpoints)?;
    write_npy_file(
        &output_dir.join(CONSENSUS_SEGMENTS_FILENAME),
        &consensus_segments,
        "consensus segment copy number",
    );
    write_breakpoints(
        &output_dir.join(CONSENSUS_BREAKPOINTS_FILENAME),
        &consensus_breakpoints,
        &binned_genes,
    );
    stats.consensus_breakpoint_count = consensus_breakpoints.len();

    write_run_stats(output_dir, SEGMENTATION_STATS_FILENAME, &stats);

    Ok(())
}
