//! Shared helpers for the tab-delimited input tables
//!

use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use csv::{ReaderBuilder, Trim};
use flate2::read::MultiGzDecoder;

use crate::errors::{CnvError, CnvResult};

/// Open an input file for buffered reading, transparently decompressing '.gz' input
///
/// A file which can't be opened is reported as a configuration error, because all clonecn table
/// inputs are specified by the run configuration.
///
pub fn open_input_file(filename: &Utf8Path, label: &str) -> CnvResult<Box<dyn BufRead>> {
    let f = File::open(filename).map_err(|e| {
        CnvError::configuration(format!("Unable to open {label} file '{filename}': {e}"))
    })?;
    let f: Box<dyn BufRead> = if filename.extension() == Some("gz") {
        Box::new(BufReader::new(MultiGzDecoder::new(BufReader::new(f))))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(f)
}

fn get_tsv_reader_impl(
    filename: &Utf8Path,
    label: &str,
    has_headers: bool,
) -> CnvResult<csv::Reader<Box<dyn BufRead>>> {
    Ok(ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .flexible(!has_headers)
        .trim(Trim::All)
        .from_reader(open_input_file(filename, label)?))
}

/// Open a tab-delimited table with a header line
///
pub fn get_tsv_reader(filename: &Utf8Path, label: &str) -> CnvResult<csv::Reader<Box<dyn BufRead>>> {
    get_tsv_reader_impl(filename, label, true)
}

/// Open a tab-delimited table without a header line
///
/// Records may differ in field count.
///
pub fn get_headerless_tsv_reader(
    filename: &Utf8Path,
    label: &str,
) -> CnvResult<csv::Reader<Box<dyn BufRead>>> {
    get_tsv_reader_impl(filename, label, false)
}

/// Find the index of a named column in a table header
///
pub fn get_column_index(
    filename: &Utf8Path,
    headers: &csv::StringRecord,
    column_name: &str,
) -> CnvResult<usize> {
    headers.iter().position(|x| x == column_name).ok_or_else(|| {
        CnvError::configuration(format!(
            "Required column '{column_name}' is missing from the header of file '{filename}'"
        ))
    })
}

/// Convert a csv error into a parse error carrying the filename and line number
///
pub fn map_csv_error(filename: &Utf8Path, err: csv::Error) -> CnvError {
    let line = err.position().map(|x| x.line() as usize).unwrap_or(0);
    CnvError::parse(filename.as_str(), line, err.to_string())
}

/// Parse one numeric table field
///
pub fn parse_field<T: std::str::FromStr>(
    filename: &Utf8Path,
    record: &csv::StringRecord,
    field_index: usize,
    label: &str,
) -> CnvResult<T> {
    let line = record.position().map(|x| x.line() as usize).unwrap_or(0);
    let field = record.get(field_index).ok_or_else(|| {
        CnvError::parse(filename.as_str(), line, format!("Missing {label} field"))
    })?;
    field.parse::<T>().map_err(|_| {
        CnvError::parse(
            filename.as_str(),
            line,
            format!("Can't parse {label} value '{field}'"),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn test_gz_table_read() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let dir = tempfile::tempdir().unwrap();
        let filename = Utf8PathBuf::from_path_buf(dir.path().join("table.tsv.gz")).unwrap();
        {
            let f = File::create(&filename).unwrap();
            let mut enc = GzEncoder::new(f, Compression::default());
            write!(enc, "name\tvalue\nA\t3\n").unwrap();
            enc.finish().unwrap();
        }

        let mut reader = get_tsv_reader(&filename, "test").unwrap();
        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        let value: u32 = parse_field(&filename, &records[0], 1, "value").unwrap();
        assert_eq!(value, 3);
        let bad = parse_field::<u32>(&filename, &records[0], 0, "value");
        assert!(matches!(bad, Err(CnvError::Parse { .. })));
    }

    #[test]
    fn test_missing_table() {
        let filename = Utf8PathBuf::from("/nonexistent/clonecn/table.tsv");
        let result = get_tsv_reader(&filename, "test");
        assert!(matches!(result, Err(CnvError::Configuration { .. })));
    }

    #[test]
    fn test_headerless_table_read() {
        let dir = tempfile::tempdir().unwrap();
        let filename = Utf8PathBuf::from_path_buf(dir.path().join("table.tsv")).unwrap();
        std::fs::write(&filename, "chr1\t100\nchr2\t200\n").unwrap();

        let mut reader = get_headerless_tsv_reader(&filename, "test").unwrap();
        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "chr1");
    }

    #[test]
    fn test_get_column_index() {
        let filename = Utf8PathBuf::from("table.tsv");
        let headers = csv::StringRecord::from(vec!["gene_name", "gene_id", "chromosome"]);
        assert_eq!(get_column_index(&filename, &headers, "chromosome").unwrap(), 2);
        let result = get_column_index(&filename, &headers, "start");
        assert!(matches!(result, Err(CnvError::Configuration { .. })));
    }
}
