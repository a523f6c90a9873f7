//! Single-cell expression count input
//!

use std::collections::HashSet;

use camino::Utf8Path;
use log::info;
use ndarray::{Array2, Axis};
use thousands::Separable;

use crate::errors::{CnvError, CnvResult};
use crate::tsv_utils::{get_tsv_reader, map_csv_error, parse_field};

/// Cells x genes count matrix with cell and gene labels
///
pub struct ExpressionMatrix {
    pub cell_names: Vec<String>,
    pub gene_names: Vec<String>,

    /// Counts matrix with one row per cell and one column per gene
    pub counts: Array2<f64>,
}

impl ExpressionMatrix {
    pub fn new(
        cell_names: Vec<String>,
        gene_names: Vec<String>,
        counts: Array2<f64>,
    ) -> CnvResult<Self> {
        if counts.dim() != (cell_names.len(), gene_names.len()) {
            return Err(CnvError::validation(format!(
                "Expression matrix shape {:?} does not match {} cell and {} gene labels",
                counts.dim(),
                cell_names.len(),
                gene_names.len()
            )));
        }
        let mut unique_cell_names = HashSet::new();
        if let Some(x) = cell_names.iter().find(|x| !unique_cell_names.insert(*x)) {
            return Err(CnvError::validation(format!(
                "Cell name '{x}' is listed more than once in the expression matrix"
            )));
        }
        if let Some(x) = counts.iter().find(|x| !(**x >= 0.0)) {
            return Err(CnvError::validation(format!(
                "Expression matrix contains invalid count value '{x}'"
            )));
        }
        Ok(Self {
            cell_names,
            gene_names,
            counts,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cell_names.len()
    }

    pub fn gene_count(&self) -> usize {
        self.gene_names.len()
    }

    /// Number of cells with a non-zero count for each gene
    ///
    pub fn get_gene_detection_counts(&self) -> Vec<u32> {
        self.counts
            .axis_iter(Axis(1))
            .map(|gene_counts| gene_counts.iter().filter(|&&x| x > 0.0).count() as u32)
            .collect()
    }
}

/// Read UMI counts from a tab-delimited genes x cells table
///
/// The header line lists a gene column label followed by all cell names. Each following line
/// lists a gene name followed by that gene's count in every cell. The result is transposed into
/// the cells x genes layout used by the rest of clonecn.
///
pub fn read_umi_count_table(filename: &Utf8Path) -> CnvResult<ExpressionMatrix> {
    info!("Reading UMI count table from file: '{filename}'");

    let mut reader = get_tsv_reader(filename, "UMI count")?;
    let cell_names = reader
        .headers()
        .map_err(|e| map_csv_error(filename, e))?
        .iter()
        .skip(1)
        .map(|x| x.to_string())
        .collect::<Vec<_>>();
    if cell_names.is_empty() {
        return Err(CnvError::validation(format!(
            "No cells found in UMI count table '{filename}'"
        )));
    }

    let cell_count = cell_names.len();
    let mut gene_names = Vec::new();
    let mut gene_counts = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| map_csv_error(filename, e))?;
        gene_names.push(parse_field::<String>(filename, &record, 0, "gene name")?);
        for cell_index in 0..cell_count {
            gene_counts.push(parse_field::<f64>(filename, &record, cell_index + 1, "count")?);
        }
    }

    let gene_count = gene_names.len();
    let genes_by_cells = Array2::from_shape_vec((gene_count, cell_count), gene_counts)
        .map_err(|e| CnvError::validation(format!("UMI count table '{filename}': {e}")))?;
    let counts = genes_by_cells.t().as_standard_layout().into_owned();

    info!(
        "Read counts for {} genes in {} cells",
        gene_count.separate_with_commas(),
        cell_count.separate_with_commas()
    );

    ExpressionMatrix::new(cell_names, gene_names, counts)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use camino::Utf8PathBuf;
    use ndarray::array;

    use super::*;

    fn get_names(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|x| format!("{prefix}{x}")).collect()
    }

    #[test]
    fn test_get_gene_detection_counts() {
        let counts = array![[0.0, 1.0, 3.0], [0.0, 0.0, 2.0], [0.0, 4.0, 1.0]];
        let expr = ExpressionMatrix::new(get_names("c", 3), get_names("G", 3), counts).unwrap();
        assert_eq!(expr.get_gene_detection_counts(), vec![0, 2, 3]);
    }

    #[test]
    fn test_invalid_expression_matrix() {
        let result = ExpressionMatrix::new(get_names("c", 1), get_names("G", 1), array![[-1.0]]);
        assert!(matches!(result, Err(CnvError::Validation { .. })));

        let result = ExpressionMatrix::new(get_names("c", 2), get_names("G", 1), array![[1.0]]);
        assert!(matches!(result, Err(CnvError::Validation { .. })));
    }

    #[test]
    fn test_read_umi_count_table() {
        let dir = tempfile::tempdir().unwrap();
        let filename = Utf8PathBuf::from_path_buf(dir.path().join("umi.tsv")).unwrap();
        {
            let mut f = std::fs::File::create(&filename).unwrap();
            writeln!(f, "gene\tcellA\tcellB").unwrap();
            writeln!(f, "G1\t0\t5").unwrap();
            writeln!(f, "G2\t2\t0").unwrap();
            writeln!(f, "G3\t1\t1").unwrap();
        }

        let expr = read_umi_count_table(&filename).unwrap();
        assert_eq!(expr.cell_names, vec!["cellA", "cellB"]);
        assert_eq!(expr.gene_names, vec!["G1", "G2", "G3"]);
        assert_eq!(expr.counts, array![[0.0, 2.0, 1.0], [5.0, 0.0, 1.0]]);
    }

    #[test]
    fn test_duplicate_cell_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let filename = Utf8PathBuf::from_path_buf(dir.path().join("umi.tsv")).unwrap();
        std::fs::write(&filename, "gene\tcellA\tcellB\tcellA\nG1\t0\t5\t1\n").unwrap();

        let result = read_umi_count_table(&filename);
        assert!(matches!(result, Err(CnvError::Validation { .. })));
    }
}
