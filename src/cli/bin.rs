use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use super::utils::{canonicalize_string_path, check_optional_filename, check_required_filename};
use crate::feature_matrix::check_feature_barcode_matrix_dir;
use crate::pipeline::BIN_SETTINGS_FILENAME;

#[derive(Args, Default, Deserialize, Serialize)]
pub struct BinSettings {
    /// Directory for all bin command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_bin_output"))]
    pub output_dir: Utf8PathBuf,

    /// UMI count table in tab-delimited format, optionally gzipped
    ///
    /// The header line is a gene column label followed by all cell names. Each following line is a
    /// gene name followed by the count for that gene in every cell.
    ///
    #[arg(
        long = "counts",
        value_name = "FILE",
        required_unless_present = "matrix_dir",
        conflicts_with = "matrix_dir"
    )]
    pub counts_filename: Option<String>,

    /// Feature-barcode count matrix directory, as an alternative to --counts
    ///
    /// The directory must contain 'matrix.mtx', 'features.tsv' (or 'genes.tsv') and
    /// 'barcodes.tsv', each optionally gzipped. Features are matched to the annotation by the
    /// gene name in the second column of 'features.tsv'.
    ///
    #[arg(long = "matrix-dir", value_name = "DIR")]
    pub matrix_dir: Option<Utf8PathBuf>,

    /// Gene annotation table in tab-delimited format, optionally gzipped
    ///
    /// The header line must include columns 'gene_name', 'chromosome', 'start' and 'end'. Genes on
    /// chromosomes other than 1-22 and X are ignored. A 'chr' prefix on chromosome names is
    /// accepted.
    ///
    #[arg(long = "annotation", value_name = "FILE")]
    pub annotation_filename: String,

    /// Chromosome length table used to compute absolute gene positions, in tab-delimited format
    ///
    /// The first two columns give a chromosome name and length for each of chromosomes 1-22 and X,
    /// so chrom.sizes and .fai files can be used directly. Other lines, including an optional
    /// header, are skipped. GRCh38 lengths are used by default.
    ///
    #[arg(long = "chrom-lengths", value_name = "FILE")]
    pub chrom_lengths_filename: Option<String>,

    /// Number of genes in each bin
    #[arg(long, default_value_t = 25)]
    pub bin_size: usize,

    /// Genes expressed in fewer than this many cells are removed before binning
    #[arg(long, default_value_t = 1)]
    pub min_detection: u32,

    /// Genes with names matching this regex are removed before binning. Use an empty string to
    /// keep all genes.
    #[arg(long, value_name = "REGEX", default_value = "HLA")]
    pub exclude_gene_regex: String,
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_bin_settings(mut settings: BinSettings) -> SimpleResult<BinSettings> {
    match (&settings.counts_filename, &settings.matrix_dir) {
        (Some(counts_filename), None) => check_required_filename(counts_filename, "UMI count")?,
        (None, Some(matrix_dir)) => {
            if !matrix_dir.is_dir() {
                bail!("Can't find specified count matrix directory: '{matrix_dir}'");
            }
            if let Err(e) = check_feature_barcode_matrix_dir(matrix_dir) {
                bail!("{e}");
            }
        }
        _ => {
            bail!("Must specify exactly one of --counts or --matrix-dir");
        }
    }
    check_required_filename(&settings.annotation_filename, "gene annotation")?;
    check_optional_filename(
        settings.chrom_lengths_filename.as_ref(),
        "chromosome length",
    )?;

    if settings.bin_size == 0 {
        bail!("--bin-size argument must be greater than 0");
    }

    if let Err(e) = regex::Regex::new(&settings.exclude_gene_regex) {
        bail!(
            "--exclude-gene-regex argument '{}' is not a valid regex: {e}",
            settings.exclude_gene_regex
        );
    }

    settings.counts_filename = settings
        .counts_filename
        .map(|x| canonicalize_string_path(&x));
    settings.matrix_dir = settings.matrix_dir.map(|x| {
        unwrap!(
            x.canonicalize_utf8(),
            "Unable to canonicalize count matrix directory: '{x}'"
        )
    });
    settings.annotation_filename = canonicalize_string_path(&settings.annotation_filename);
    settings.chrom_lengths_filename = settings
        .chrom_lengths_filename
        .map(|x| canonicalize_string_path(&x));

    Ok(settings)
}

/// Write bin settings out in json format
pub fn write_bin_settings(output_dir: &Utf8Path, settings: &BinSettings) {
    use log::info;

    let filename = output_dir.join(BIN_SETTINGS_FILENAME);

    info!("Writing bin settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create bin settings json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &settings).unwrap();
}
