//! Tumor/normal cell classification and clone grouping
//!

use std::collections::{BTreeMap, HashMap};

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use regex::Regex;

use crate::errors::{CnvError, CnvResult};
use crate::tsv_utils::{get_tsv_reader, map_csv_error, parse_field};

/// Clone id used when all cells are treated as a single tumor clone
pub const DEFAULT_CLONE_ID: &str = "1";

/// Cells assigned to one tumor clone
#[derive(Clone, Debug, PartialEq)]
pub struct CellGroup {
    pub clone_id: String,

    /// Indices into the cell list given to the classifier, in increasing order
    pub cell_indices: Vec<usize>,
}

/// Split cells into tumor clones, leaving out normal cells
///
pub trait TumorCellClassifier {
    /// Returns clone groups sorted by clone id
    fn get_tumor_clones(&self, cell_names: &[String]) -> CnvResult<Vec<CellGroup>>;

    fn describe(&self) -> String;
}

/// Treat every cell as a member of one tumor clone
pub struct AllCellsClassifier;

impl TumorCellClassifier for AllCellsClassifier {
    fn get_tumor_clones(&self, cell_names: &[String]) -> CnvResult<Vec<CellGroup>> {
        if cell_names.is_empty() {
            return Err(CnvError::validation("No cells available for clone grouping"));
        }
        Ok(vec![CellGroup {
            clone_id: DEFAULT_CLONE_ID.to_string(),
            cell_indices: (0..cell_names.len()).collect(),
        }])
    }

    fn describe(&self) -> String {
        "all cells as one clone".to_string()
    }
}

fn is_normal_label(label: &str) -> bool {
    ["normal", "0", "false"]
        .iter()
        .any(|x| label.eq_ignore_ascii_case(x))
}

/// Clone labels read from a tab-delimited (cell, label) table with a header line
///
/// Labels 'normal', '0' and 'false' mark normal cells, any other label names a tumor clone. Every
/// cell must be labeled.
///
pub struct CloneLabelTable {
    filename: Utf8PathBuf,
}

impl CloneLabelTable {
    pub fn new(filename: &Utf8Path) -> Self {
        Self {
            filename: filename.to_owned(),
        }
    }

    fn read_labels(&self) -> CnvResult<HashMap<String, String>> {
        let filename = self.filename.as_path();
        // Clone ids are used in output filenames
        let clone_id_regex = Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap();

        let mut reader = get_tsv_reader(filename, "clone label")?;
        let mut labels = HashMap::new();
        for record in reader.records() {
            let record = record.map_err(|e| map_csv_error(filename, e))?;
            let cell_name = parse_field::<String>(filename, &record, 0, "cell name")?;
            let label = parse_field::<String>(filename, &record, 1, "clone label")?;
            if !clone_id_regex.is_match(&label) {
                let line = record.position().map(|x| x.line() as usize).unwrap_or(0);
                return Err(CnvError::parse(
                    filename.as_str(),
                    line,
                    format!("Clone label '{label}' contains characters other than [A-Za-z0-9_.-]"),
                ));
            }
            if labels.insert(cell_name.clone(), label).is_some() {
                return Err(CnvError::validation(format!(
                    "Clone label table '{filename}' lists cell '{cell_name}' more than once"
                )));
            }
        }
        Ok(labels)
    }
}

impl TumorCellClassifier for CloneLabelTable {
    fn get_tumor_clones(&self, cell_names: &[String]) -> CnvResult<Vec<CellGroup>> {
        let labels = self.read_labels()?;

        let mut clones: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        let mut normal_cell_count = 0;
        for (cell_index, cell_name) in cell_names.iter().enumerate() {
            let Some(label) = labels.get(cell_name) else {
                return Err(CnvError::validation(format!(
                    "Cell '{cell_name}' has no label in clone label table '{}'",
                    self.filename
                )));
            };
            if is_normal_label(label) {
                normal_cell_count += 1;
            } else {
                clones.entry(label.as_str()).or_default().push(cell_index);
            }
        }

        info!(
            "Found {} tumor clones and {normal_cell_count} normal cells in {}",
            clones.len(),
            self.describe()
        );
        if clones.is_empty() {
            return Err(CnvError::validation(format!(
                "No tumor cells found in {}",
                self.describe()
            )));
        }

        Ok(clones
            .into_iter()
            .map(|(clone_id, cell_indices)| CellGroup {
                clone_id: clone_id.to_string(),
                cell_indices,
            })
            .collect())
    }

    fn describe(&self) -> String {
        format!("clone label table '{}'", self.filename)
    }
}
