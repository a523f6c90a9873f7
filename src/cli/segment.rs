use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use super::utils::{canonicalize_string_path, check_optional_filename, check_required_filename};
use crate::pipeline::{BINNED_GENES_FILENAME, SEGMENT_SETTINGS_FILENAME};

#[derive(Args, Default, Deserialize, Serialize)]
pub struct SegmentSettings {
    /// Directory for all segment command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_segment_output"))]
    pub output_dir: Utf8PathBuf,

    /// Output directory of the bin command
    #[arg(long, value_name = "DIR")]
    pub binned_dir: Utf8PathBuf,

    /// Per-cell gene copy number estimates in tab-delimited format, optionally gzipped
    ///
    /// The header line is a cell column label followed by gene names, which must match the genes
    /// retained by the bin command in bin order. Each following line is a cell name followed by
    /// the copy number estimate for every gene.
    ///
    #[arg(long = "gene-copy-number", value_name = "FILE")]
    pub gene_copy_number_filename: String,

    /// Clone label for each cell in tab-delimited format, with a header line
    ///
    /// Each line is a cell name and a label. Cells labeled 'normal', '0' or 'false' are left out
    /// of segmentation, all other labels name a tumor clone. By default all cells form a single
    /// clone.
    ///
    #[arg(long = "clone-labels", value_name = "FILE")]
    pub clone_labels_filename: Option<String>,

    /// Copy number levels used to find breakpoints are capped at this value
    #[arg(long, default_value_t = 6)]
    pub max_copy_number: u32,

    /// Runs of equal copy number shorter than this many bins are merged into a neighbouring run
    #[arg(long, default_value_t = 1)]
    pub min_segment_bins: usize,
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_segment_settings(
    mut settings: SegmentSettings,
) -> SimpleResult<SegmentSettings> {
    if !settings.binned_dir.is_dir() {
        bail!(
            "Can't find specified bin command output directory: '{}'",
            settings.binned_dir
        );
    }
    check_required_filename(
        settings.binned_dir.join(BINNED_GENES_FILENAME).as_str(),
        "binned genes",
    )?;
    check_required_filename(&settings.gene_copy_number_filename, "gene copy number")?;
    check_optional_filename(settings.clone_labels_filename.as_ref(), "clone label")?;

    if settings.min_segment_bins == 0 {
        bail!("--min-segment-bins argument must be greater than 0");
    }

    settings.binned_dir = unwrap!(
        settings.binned_dir.canonicalize_utf8(),
        "Unable to canonicalize bin command output directory: '{}'",
        settings.binned_dir
    );
    settings.gene_copy_number_filename =
        canonicalize_string_path(&settings.gene_copy_number_filename);
    settings.clone_labels_filename = settings
        .clone_labels_filename
        .map(|x| canonicalize_string_path(&x));

    Ok(settings)
}

/// Write segment settings out in json format
pub fn write_segment_settings(output_dir: &Utf8Path, settings: &SegmentSettings) {
    use log::info;

    let filename = output_dir.join(SEGMENT_SETTINGS_FILENAME);

    info!("Writing segment settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create segment settings json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &settings).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_paths_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let binned_dir = dir.join("binned");
        std::fs::create_dir(&binned_dir).unwrap();
        std::fs::write(binned_dir.join(BINNED_GENES_FILENAME), b"").unwrap();
        let gene_cn_filename = dir.join("gene_cn.tsv");
        std::fs::write(&gene_cn_filename, "cell\n").unwrap();
        let labels_filename = dir.join("labels.tsv");
        std::fs::write(&labels_filename, "cell\tlabel\n").unwrap();

        let settings = SegmentSettings {
            output_dir: dir.join("out"),
            binned_dir: binned_dir.join("."),
            gene_copy_number_filename: dir.join(".").join("gene_cn.tsv").to_string(),
            clone_labels_filename: Some(dir.join(".").join("labels.tsv").to_string()),
            max_copy_number: 6,
            min_segment_bins: 1,
        };
        let settings = validate_and_fix_segment_settings(settings).unwrap();
        assert_eq!(settings.binned_dir, binned_dir.canonicalize_utf8().unwrap());
        assert_eq!(
            settings.gene_copy_number_filename,
            gene_cn_filename.canonicalize_utf8().unwrap().as_str()
        );
        assert_eq!(
            settings.clone_labels_filename.as_deref(),
            Some(labels_filename.canonicalize_utf8().unwrap().as_str())
        );
    }
}
