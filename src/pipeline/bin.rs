use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use log::info;
use regex::Regex;
use unwrap::unwrap;

use crate::chrom_bounds::ChromosomeBoundaryTable;
use crate::cli::{BinSettings, write_bin_settings};
use crate::errors::{CnvError, CnvResult};
use crate::expression::read_umi_count_table;
use crate::feature_matrix::read_feature_barcode_matrix;
use crate::gene_binning::{BinnedGenes, BinningSettings, bin_genes, bin_genes_with_detection};
use crate::gene_map::{ChromosomeLengths, GeneAnnotationTable, build_gene_map, get_chrom_label};
use crate::mpack_utils::write_mpack_file;
use crate::run_stats::write_run_stats;

pub const BIN_SETTINGS_FILENAME: &str = "bin.settings.json";
pub const BINNED_GENES_FILENAME: &str = "binned.genes.mpack";
const GENE_POSITIONS_FILENAME: &str = "gene.positions.tsv";
const CHROM_BOUNDS_FILENAME: &str = "chrom.bounds.tsv";
const BINNING_STATS_FILENAME: &str = "binning.stats.json";

fn get_binning_settings(settings: &BinSettings) -> CnvResult<BinningSettings> {
    let excluded_gene_regex = if settings.exclude_gene_regex.is_empty() {
        None
    } else {
        Some(Regex::new(&settings.exclude_gene_regex).map_err(|e| {
            CnvError::configuration(format!(
                "Invalid gene exclusion regex '{}': {e}",
                settings.exclude_gene_regex
            ))
        })?)
    };
    Ok(BinningSettings {
        bin_size: settings.bin_size,
        min_detection: settings.min_detection,
        excluded_gene_regex,
    })
}

/// Write the position, bin and detection score of every binned gene
///
fn write_gene_positions(filename: &Utf8Path, binned_genes: &BinnedGenes) {
    info!("Writing binned gene positions to file: '{filename}'");

    let f = unwrap!(
        File::create(filename),
        "Unable to create binned gene positions file: '{filename}'"
    );
    let mut f = BufWriter::new(f);

    writeln!(f, "gene_name\tchromosome\tstart\tend\tabs_pos\tbin\tdetection").unwrap();
    for (gene_index, (gene, detection)) in binned_genes
        .genes
        .iter()
        .zip(binned_genes.detection.iter())
        .enumerate()
    {
        writeln!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            gene.gene_name,
            get_chrom_label(gene.chrom_index),
            gene.start,
            gene.end,
            gene.abs_pos,
            gene_index / binned_genes.bin_size,
            detection
        )
        .unwrap();
    }
}

/// Write the half-open bin range of each chromosome
///
fn write_chrom_bounds(filename: &Utf8Path, chrom_bounds: &ChromosomeBoundaryTable) {
    info!("Writing chromosome bin boundaries to file: '{filename}'");

    let f = unwrap!(
        File::create(filename),
        "Unable to create chromosome bin boundaries file: '{filename}'"
    );
    let mut f = BufWriter::new(f);

    writeln!(f, "chromosome\tstart_bin\tend_bin").unwrap();
    for (chrom_index, range) in chrom_bounds.iter().enumerate() {
        writeln!(
            f,
            "{}\t{}\t{}",
            get_chrom_label(chrom_index),
            range.start,
            range.end
        )
        .unwrap();
    }
}

/// Map genes to the genome and group them into bins, writing all results to the output directory
///
pub fn run_bin(settings: &BinSettings) -> CnvResult<()> {
    let output_dir = settings.output_dir.as_path();
    write_bin_settings(output_dir, settings);

    let chrom_lengths = match &settings.chrom_lengths_filename {
        Some(filename) => ChromosomeLengths::from_file(Utf8Path::new(filename))?,
        None => ChromosomeLengths::default(),
    };
    let annotation_source = GeneAnnotationTable::new(Utf8Path::new(&settings.annotation_filename));
    let gene_map = build_gene_map(&annotation_source, &chrom_lengths)?;

    let binning_settings = get_binning_settings(settings)?;
    let (binned_genes, binning_stats) = match (&settings.matrix_dir, &settings.counts_filename) {
        (Some(matrix_dir), _) => {
            let matrix = read_feature_barcode_matrix(matrix_dir)?;
            bin_genes_with_detection(
                &matrix.expression,
                &gene_map,
                &matrix.detection,
                &binning_settings,
            )?
        }
        (None, Some(counts_filename)) => {
            let expression = read_umi_count_table(Utf8Path::new(counts_filename))?;
            bin_genes(&expression, &gene_map, &binning_settings)?
        }
        (None, None) => {
            return Err(CnvError::configuration(
                "No expression count table or matrix directory specified",
            ));
        }
    };

    write_mpack_file(
        &output_dir.join(BINNED_GENES_FILENAME),
        &binned_genes,
        "binned genes",
    );
    write_gene_positions(&output_dir.join(GENE_POSITIONS_FILENAME), &binned_genes);
    write_chrom_bounds(
        &output_dir.join(CHROM_BOUNDS_FILENAME),
        &binned_genes.chrom_bounds,
    );
    write_run_stats(output_dir, BINNING_STATS_FILENAME, &binning_stats);

    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use ndarray::array;

    use super::*;
    use crate::feature_matrix::test_utils::write_test_matrix_dir;
    use crate::mpack_utils::read_mpack_file;

    #[test]
    fn test_run_bin() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let annotation_filename = dir_path.join("annotation.tsv");
        let counts_filename = dir_path.join("counts.tsv");
        let mut annotation = String::from("gene_name\tchromosome\tstart\tend\n");
        let mut counts = String::from("gene\tc1\tc2\n");
        for (chrom, gene_count) in [("1", 5), ("chr2", 3), ("X", 4)] {
            for i in 0..gene_count {
                let gene_name = format!("G{chrom}_{i}");
                let start = 1000 * (i + 1);
                annotation += &format!("{gene_name}\t{chrom}\t{start}\t{}\n", start + 500);
                counts += &format!("{gene_name}\t{}\t1\n", i % 2);
            }
        }
        annotation += "HLA-A\t6\t100\t200\n";
        counts += "HLA-A\t5\t5\n";
        std::fs::write(&annotation_filename, annotation).unwrap();
        std::fs::write(&counts_filename, counts).unwrap();

        let output_dir = dir_path.join("out");
        std::fs::create_dir(&output_dir).unwrap();
        let settings = BinSettings {
            output_dir: output_dir.clone(),
            counts_filename: Some(counts_filename.to_string()),
            matrix_dir: None,
            annotation_filename: annotation_filename.to_string(),
            chrom_lengths_filename: None,
            bin_size: 2,
            min_detection: 1,
            exclude_gene_regex: "HLA".to_string(),
        };
        run_bin(&settings).unwrap();

        let binned_genes: BinnedGenes =
            read_mpack_file(&output_dir.join(BINNED_GENES_FILENAME), "binned genes").unwrap();
        binned_genes.validate().unwrap();
        assert_eq!(binned_genes.bin_count(), 5);
        assert_eq!(binned_genes.chrom_bounds.get_chrom_range(0), 0..2);
        assert_eq!(binned_genes.chrom_bounds.get_chrom_range(1), 2..3);
        assert_eq!(binned_genes.chrom_bounds.get_chrom_range(22), 3..5);
        assert!(!binned_genes.gene_names().contains(&"HLA-A"));

        for filename in [
            GENE_POSITIONS_FILENAME,
            CHROM_BOUNDS_FILENAME,
            BINNING_STATS_FILENAME,
            BIN_SETTINGS_FILENAME,
        ] {
            assert!(output_dir.join(filename).is_file());
        }
        let chrom_bounds = std::fs::read_to_string(output_dir.join(CHROM_BOUNDS_FILENAME)).unwrap();
        assert_eq!(chrom_bounds.lines().count(), 24);
    }

    #[test]
    fn test_run_bin_from_matrix_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let matrix_dir = dir_path.join("matrix");
        std::fs::create_dir(&matrix_dir).unwrap();
        write_test_matrix_dir(&matrix_dir);

        // Headerless chrom.sizes file
        let annotation_filename = dir_path.join("annotation.tsv");
        std::fs::write(
            &annotation_filename,
            "gene_name\tchromosome\tstart\tend\n\
             GC\tchr1\t3000\t3500\n\
             GA\tchr1\t1000\t1500\n\
             GB\tchr1\t2000\t2500\n",
        )
        .unwrap();
        let chrom_lengths_filename = dir_path.join("genome.chrom.sizes");
        let mut chrom_lengths = String::new();
        for chrom in (1..=22).map(|x| x.to_string()).chain(["X".to_string()]) {
            chrom_lengths += &format!("chr{chrom}\t1000000\n");
        }
        std::fs::write(&chrom_lengths_filename, chrom_lengths).unwrap();

        let output_dir = dir_path.join("out");
        std::fs::create_dir(&output_dir).unwrap();
        let settings = BinSettings {
            output_dir: output_dir.clone(),
            counts_filename: None,
            matrix_dir: Some(matrix_dir),
            annotation_filename: annotation_filename.to_string(),
            chrom_lengths_filename: Some(chrom_lengths_filename.to_string()),
            bin_size: 1,
            min_detection: 2,
            exclude_gene_regex: String::new(),
        };
        run_bin(&settings).unwrap();

        let binned_genes: BinnedGenes =
            read_mpack_file(&output_dir.join(BINNED_GENES_FILENAME), "binned genes").unwrap();
        binned_genes.validate().unwrap();

        // Only GC is detected in both cells
        assert_eq!(binned_genes.gene_names(), vec!["GC"]);
        assert_eq!(binned_genes.detection, vec![2]);
        assert_eq!(binned_genes.cell_names, vec!["AAAC-1", "AAAG-1"]);
        assert_eq!(binned_genes.expression, array![[2.0], [5.0]]);
    }
}
