use camino::{Utf8Path, Utf8PathBuf};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

/// Check that an input table exists and is a regular file
///
/// Assumes no logger has been configured yet
///
pub fn check_required_filename(filename: &str, label: &str) -> SimpleResult<()> {
    if filename.is_empty() {
        bail!("Must specify {label} file");
    }
    let path = Utf8Path::new(filename);
    if !path.exists() {
        bail!("Can't find specified {label} file: '{filename}'");
    }
    if !path.is_file() {
        bail!("Specified {label} file path is not a file: '{filename}'");
    }
    Ok(())
}

/// Same as [check_required_filename] for inputs which may be omitted
///
pub fn check_optional_filename(filename_opt: Option<&String>, label: &str) -> SimpleResult<()> {
    match filename_opt {
        Some(filename) => check_required_filename(filename, label),
        None => Ok(()),
    }
}

/// Absolute form of an input path with all symlinks resolved
///
pub fn canonicalize_string_path(s: &str) -> String {
    unwrap!(
        Utf8PathBuf::from(s).canonicalize_utf8(),
        "Unable to canonicalize input file path: '{s}'"
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_filename() {
        let dir = tempfile::tempdir().unwrap();
        let dirname = dir.path().to_str().unwrap();
        let filename = dir.path().join("counts.tsv");
        std::fs::write(&filename, "gene\n").unwrap();
        let filename = filename.to_str().unwrap();

        assert!(check_required_filename(filename, "count").is_ok());
        assert!(check_required_filename("", "count").is_err());
        assert!(check_required_filename(dirname, "count").is_err());
        assert!(check_optional_filename(None, "count").is_ok());
        assert!(check_optional_filename(Some(&format!("{filename}.missing")), "count").is_err());
    }

    #[test]
    fn test_canonicalize_string_path() {
        let dir = tempfile::tempdir().unwrap();
        let filename = Utf8PathBuf::from_path_buf(dir.path().join("counts.tsv")).unwrap();
        std::fs::write(&filename, "gene\n").unwrap();

        let indirect = Utf8PathBuf::from_path_buf(dir.path().join(".").join("counts.tsv")).unwrap();
        let canonical = canonicalize_string_path(indirect.as_str());
        assert_eq!(canonical, filename.canonicalize_utf8().unwrap().as_str());
        assert!(Utf8Path::new(&canonical).is_absolute());
    }
}
