//! Feature-barcode matrix directory input, as written by single-cell count pipelines
//!
//! The directory holds a Matrix Market sparse count matrix with one row per feature and one
//! column per cell, a features table and a barcodes table. Each file may be gzipped.
//!

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use ndarray::Array2;
use sprs::{CsMat, TriMat};
use thousands::Separable;

use crate::errors::{CnvError, CnvResult};
use crate::expression::ExpressionMatrix;
use crate::tsv_utils::{get_headerless_tsv_reader, map_csv_error, open_input_file};

const MATRIX_FILENAMES: [&str; 2] = ["matrix.mtx.gz", "matrix.mtx"];
const FEATURE_FILENAMES: [&str; 4] = [
    "features.tsv.gz",
    "features.tsv",
    "genes.tsv.gz",
    "genes.tsv",
];
const BARCODE_FILENAMES: [&str; 2] = ["barcodes.tsv.gz", "barcodes.tsv"];

/// Expression counts read from a feature-barcode matrix directory
///
pub struct FeatureBarcodeMatrix {
    pub expression: ExpressionMatrix,

    /// Number of cells with a non-zero stored count for each gene, computed from the sparse
    /// matrix entries
    pub detection: Vec<u32>,
}

/// Find the first of the candidate filenames present in `dir`
///
fn find_matrix_dir_file(dir: &Utf8Path, candidates: &[&str], label: &str) -> CnvResult<Utf8PathBuf> {
    candidates
        .iter()
        .map(|x| dir.join(x))
        .find(|x| x.is_file())
        .ok_or_else(|| {
            CnvError::configuration(format!(
                "Can't find {label} file in matrix directory '{dir}', expected one of: {}",
                candidates.join(", ")
            ))
        })
}

/// Check that `dir` contains all files of a feature-barcode matrix directory
///
pub fn check_feature_barcode_matrix_dir(dir: &Utf8Path) -> CnvResult<()> {
    find_matrix_dir_file(dir, &MATRIX_FILENAMES, "count matrix")?;
    find_matrix_dir_file(dir, &FEATURE_FILENAMES, "feature")?;
    find_matrix_dir_file(dir, &BARCODE_FILENAMES, "barcode")?;
    Ok(())
}

/// Read gene names from the features table
///
/// The second column holds the gene name. A single column table is read as gene names directly.
///
fn read_feature_names(filename: &Utf8Path) -> CnvResult<Vec<String>> {
    let mut reader = get_headerless_tsv_reader(filename, "feature")?;
    let mut names = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| map_csv_error(filename, e))?;
        let name = record.get(1).or(record.get(0)).unwrap_or_default();
        if name.is_empty() {
            let line = record.position().map(|x| x.line() as usize).unwrap_or(0);
            return Err(CnvError::parse(filename.as_str(), line, "Empty gene name"));
        }
        names.push(name.to_string());
    }
    Ok(names)
}

fn read_barcodes(filename: &Utf8Path) -> CnvResult<Vec<String>> {
    let mut reader = get_headerless_tsv_reader(filename, "barcode")?;
    let mut barcodes = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| map_csv_error(filename, e))?;
        barcodes.push(record.get(0).unwrap_or_default().to_string());
    }
    Ok(barcodes)
}

/// Read a feature-barcode matrix directory into a dense cells x genes expression matrix
///
pub fn read_feature_barcode_matrix(dir: &Utf8Path) -> CnvResult<FeatureBarcodeMatrix> {
    info!("Reading feature-barcode matrix from directory: '{dir}'");

    let gene_names = read_feature_names(&find_matrix_dir_file(dir, &FEATURE_FILENAMES, "feature")?)?;
    let cell_names = read_barcodes(&find_matrix_dir_file(dir, &BARCODE_FILENAMES, "barcode")?)?;

    let matrix_filename = find_matrix_dir_file(dir, &MATRIX_FILENAMES, "count matrix")?;
    let mut reader = open_input_file(&matrix_filename, "count matrix")?;
    let triplets: TriMat<f64> = sprs::io::read_matrix_market_from_bufread(&mut reader)
        .map_err(|e| CnvError::parse(matrix_filename.as_str(), 0, e.to_string()))?;
    if triplets.rows() != gene_names.len() || triplets.cols() != cell_names.len() {
        return Err(CnvError::validation(format!(
            "Count matrix '{matrix_filename}' has shape {}x{}, expected {} features x {} barcodes",
            triplets.rows(),
            triplets.cols(),
            gene_names.len(),
            cell_names.len()
        )));
    }

    // Duplicate entries are summed by the conversion
    let gene_counts: CsMat<f64> = triplets.to_csr();
    let mut counts = Array2::zeros((cell_names.len(), gene_names.len()));
    let mut detection = vec![0u32; gene_names.len()];
    for (gene_index, gene_row) in gene_counts.outer_iterator().enumerate() {
        for (cell_index, &count) in gene_row.iter() {
            counts[[cell_index, gene_index]] = count;
            if count > 0.0 {
                detection[gene_index] += 1;
            }
        }
    }

    info!(
        "Read {} non-zero counts for {} genes in {} cells",
        gene_counts.nnz().separate_with_commas(),
        gene_names.len().separate_with_commas(),
        cell_names.len().separate_with_commas()
    );

    Ok(FeatureBarcodeMatrix {
        expression: ExpressionMatrix::new(cell_names, gene_names, counts)?,
        detection,
    })
}


#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::test_utils::{write_gz, write_test_matrix_dir};
    use super::*;

    #[test]
    fn test_read_feature_barcode_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        write_test_matrix_dir(&dir);
        check_feature_barcode_matrix_dir(&dir).unwrap();

        let matrix = read_feature_barcode_matrix(&dir).unwrap();
        let expression = &matrix.expression;
        assert_eq!(expression.gene_names, vec!["GA", "GB", "GC"]);
        assert_eq!(expression.cell_names, vec!["AAAC-1", "AAAG-1"]);
        assert_eq!(expression.counts, array![[3.0, 0.0, 2.0], [0.0, 1.0, 5.0]]);

        // The explicit zero entry for GB does not count as a detection
        assert_eq!(matrix.detection, vec![1, 1, 2]);
        assert_eq!(matrix.detection, expression.get_gene_detection_counts());
    }

    #[test]
    fn test_incomplete_matrix_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        write_test_matrix_dir(&dir);
        std::fs::remove_file(dir.join("features.tsv")).unwrap();

        assert!(matches!(
            check_feature_barcode_matrix_dir(&dir),
            Err(CnvError::Configuration { .. })
        ));
        assert!(matches!(
            read_feature_barcode_matrix(&dir),
            Err(CnvError::Configuration { .. })
        ));
    }

    #[test]
    fn test_matrix_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        write_test_matrix_dir(&dir);
        write_gz(&dir.join("barcodes.tsv.gz"), "AAAC-1\nAAAG-1\nAAAT-1\n");

        assert!(matches!(
            read_feature_barcode_matrix(&dir),
            Err(CnvError::Validation { .. })
        ));
    }
}
