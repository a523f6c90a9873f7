//! Map gene names to chromosome and absolute genome position
//!

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thousands::Separable;

use crate::errors::{CnvError, CnvResult};
use crate::tsv_utils::{
    get_column_index, get_headerless_tsv_reader, get_tsv_reader, map_csv_error, parse_field,
};

/// Number of chromosomes tracked by the gene map: autosomes 1-22 followed by X
pub const CHROM_COUNT: usize = 23;

/// GRCh38 chromosome lengths, chr1-chr22 then chrX
const GRCH38_CHROM_LENGTHS: [u64; CHROM_COUNT] = [
    248956422, 242193529, 198295559, 190214555, 181538259, 170805979, 159345973, 145138636,
    138394717, 133797422, 135086622, 133275309, 114364328, 107043718, 101991189, 90338345,
    83257441, 80373285, 58617616, 64444167, 46709983, 50818468, 156040895,
];

/// Convert a zero-based chromosome index into the chromosome label used in clonecn output
///
pub fn get_chrom_label(chrom_index: usize) -> String {
    assert!(chrom_index < CHROM_COUNT);
    if chrom_index + 1 == CHROM_COUNT {
        "X".to_string()
    } else {
        (chrom_index + 1).to_string()
    }
}

/// Parse an annotation chromosome name into a zero-based chromosome index
///
/// An optional 'chr' prefix is removed, 'X' maps to chromosome 23. All other names, including Y,
/// the mitochondrial chromosome and unplaced scaffolds, return None.
///
pub fn parse_chrom_index(label: &str) -> Option<usize> {
    let label = label.strip_prefix("chr").unwrap_or(label);
    if label == "X" {
        return Some(CHROM_COUNT - 1);
    }
    // Reject forms like '+1' or '01' which `parse` would otherwise accept
    if label.is_empty() || label.starts_with(['0', '+']) {
        return None;
    }
    match label.parse::<usize>() {
        Ok(x) if (1..=CHROM_COUNT).contains(&x) => Some(x - 1),
        _ => None,
    }
}

/// Per-chromosome length table used to compute absolute genome positions
///
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChromosomeLengths {
    lengths: Vec<u64>,
}

impl Default for ChromosomeLengths {
    fn default() -> Self {
        Self {
            lengths: GRCH38_CHROM_LENGTHS.to_vec(),
        }
    }
}

impl ChromosomeLengths {
    pub fn new(lengths: Vec<u64>) -> CnvResult<Self> {
        if lengths.len() != CHROM_COUNT {
            return Err(CnvError::configuration(format!(
                "Chromosome length table has {} entries, expected {CHROM_COUNT}",
                lengths.len()
            )));
        }
        if let Some(chrom_index) = lengths.iter().position(|&x| x == 0) {
            return Err(CnvError::configuration(format!(
                "Chromosome length table has zero length for chromosome {}",
                get_chrom_label(chrom_index)
            )));
        }
        Ok(Self { lengths })
    }

    /// Read chromosome lengths from a headerless tab-delimited file with chromosome name and
    /// length in the first two columns
    ///
    /// This accepts both 'chrom.sizes' and '.fai' files. Chromosome names are parsed with the
    /// same rules as the gene annotation. Every tracked chromosome must be listed exactly once,
    /// lines for any other name are skipped, so an optional header line is also skipped.
    ///
    pub fn from_file(filename: &Utf8Path) -> CnvResult<Self> {
        let mut reader = get_headerless_tsv_reader(filename, "chromosome length")?;
        let mut lengths: Vec<Option<u64>> = vec![None; CHROM_COUNT];
        for record in reader.records() {
            let record = record.map_err(|e| map_csv_error(filename, e))?;
            let chrom_name = record.get(0).unwrap_or_default();
            let Some(chrom_index) = parse_chrom_index(chrom_name) else {
                continue;
            };
            let length = parse_field::<u64>(filename, &record, 1, "chromosome length")?;
            if lengths[chrom_index].replace(length).is_some() {
                return Err(CnvError::configuration(format!(
                    "Chromosome '{chrom_name}' is listed more than once in chromosome length file '{filename}'"
                )));
            }
        }
        let mut checked_lengths = Vec::with_capacity(CHROM_COUNT);
        for (chrom_index, length) in lengths.into_iter().enumerate() {
            match length {
                Some(x) => checked_lengths.push(x),
                None => {
                    return Err(CnvError::configuration(format!(
                        "Chromosome {} is missing from chromosome length file '{filename}'",
                        get_chrom_label(chrom_index)
                    )));
                }
            }
        }
        Self::new(checked_lengths)
    }

    /// Total length of all chromosomes preceding `chrom_index`
    pub fn get_chrom_offset(&self, chrom_index: usize) -> u64 {
        self.lengths[..chrom_index].iter().sum()
    }
}

/// One gene entry from the external annotation source
#[derive(Clone, Debug)]
pub struct GeneAnnotation {
    pub gene_name: String,
    pub chrom_name: String,
    pub start: u64,
    pub end: u64,
}

/// Source of gene coordinate annotation
///
pub trait GeneAnnotationSource {
    /// Return all gene annotations from the source, or a configuration error if the source can't
    /// be reached
    fn fetch_gene_annotations(&self) -> CnvResult<Vec<GeneAnnotation>>;

    fn describe(&self) -> String;
}

/// Gene annotation read from a tab-delimited table with header
///
/// Columns are found by the header names 'gene_name', 'chromosome', 'start' and 'end', in any
/// order. Additional columns are ignored.
///
pub struct GeneAnnotationTable {
    filename: Utf8PathBuf,
}

impl GeneAnnotationTable {
    pub fn new(filename: &Utf8Path) -> Self {
        Self {
            filename: filename.to_path_buf(),
        }
    }
}

impl GeneAnnotationSource for GeneAnnotationTable {
    fn fetch_gene_annotations(&self) -> CnvResult<Vec<GeneAnnotation>> {
        let filename = self.filename.as_path();
        let mut reader = get_tsv_reader(filename, "gene annotation")?;
        let headers = reader
            .headers()
            .map_err(|e| map_csv_error(filename, e))?
            .clone();
        let gene_name_index = get_column_index(filename, &headers, "gene_name")?;
        let chrom_index = get_column_index(filename, &headers, "chromosome")?;
        let start_index = get_column_index(filename, &headers, "start")?;
        let end_index = get_column_index(filename, &headers, "end")?;

        let mut annotations = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| map_csv_error(filename, e))?;
            annotations.push(GeneAnnotation {
                gene_name: parse_field(filename, &record, gene_name_index, "gene name")?,
                chrom_name: parse_field(filename, &record, chrom_index, "chromosome")?,
                start: parse_field(filename, &record, start_index, "gene start")?,
                end: parse_field(filename, &record, end_index, "gene end")?,
            });
        }
        Ok(annotations)
    }

    fn describe(&self) -> String {
        format!("gene annotation file '{}'", self.filename)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GeneRecord {
    pub gene_name: String,

    /// Zero-based chromosome index, where index 22 is chromosome X
    pub chrom_index: usize,

    pub start: u64,
    pub end: u64,

    /// Gene start position plus the total length of all preceding chromosomes
    pub abs_pos: u64,
}

/// Gene records in genome order, with lookup by gene name
///
pub struct GeneMap {
    records: Vec<GeneRecord>,
    name_to_index: HashMap<String, usize>,
}

impl GeneMap {
    pub fn records(&self) -> &[GeneRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, gene_name: &str) -> Option<&GeneRecord> {
        self.name_to_index
            .get(gene_name)
            .map(|&x| &self.records[x])
    }
}

/// Build the gene map from an annotation source
///
/// Annotation entries on chromosomes outside of 1-22,X are filtered out. Records are sorted by
/// (chromosome, start, gene name), and only the first record is kept for any gene name listed
/// more than once.
///
pub fn build_gene_map(
    source: &dyn GeneAnnotationSource,
    chrom_lengths: &ChromosomeLengths,
) -> CnvResult<GeneMap> {
    info!("Building gene map from {}", source.describe());

    let annotations = source.fetch_gene_annotations()?;
    if annotations.is_empty() {
        return Err(CnvError::configuration(format!(
            "No genes found in {}",
            source.describe()
        )));
    }
    let annotation_count = annotations.len();

    let records = annotations
        .into_iter()
        .filter_map(|x| {
            let chrom_index = parse_chrom_index(&x.chrom_name)?;
            Some(GeneRecord {
                abs_pos: x.start + chrom_lengths.get_chrom_offset(chrom_index),
                gene_name: x.gene_name,
                chrom_index,
                start: x.start,
                end: x.end,
            })
        })
        .sorted_by(|a, b| {
            (a.chrom_index, a.start, &a.gene_name).cmp(&(b.chrom_index, b.start, &b.gene_name))
        })
        .collect::<Vec<_>>();

    if records.is_empty() {
        return Err(CnvError::configuration(format!(
            "No genes on chromosomes 1-22,X found in {}",
            source.describe()
        )));
    }

    let mut name_to_index = HashMap::new();
    let mut unique_records = Vec::with_capacity(records.len());
    for record in records {
        if name_to_index.contains_key(&record.gene_name) {
            debug!(
                "Skipping duplicate annotation for gene '{}'",
                record.gene_name
            );
            continue;
        }
        name_to_index.insert(record.gene_name.clone(), unique_records.len());
        unique_records.push(record);
    }

    info!(
        "Gene map contains {} genes from {} annotation entries",
        unique_records.len().separate_with_commas(),
        annotation_count.separate_with_commas()
    );

    Ok(GeneMap {
        records: unique_records,
        name_to_index,
    })
}
