//! NumPy array output files
//!

use camino::Utf8Path;
use log::info;
use ndarray_npy::{WriteNpyExt, write_npy};
use unwrap::unwrap;

/// Write an array to a `.npy` file in standard layout with little-endian f64 values
///
pub fn write_npy_file<T: WriteNpyExt>(filename: &Utf8Path, array: &T, label: &str) {
    info!("Writing {label} to NumPy array file: '{filename}'");

    unwrap!(
        write_npy(filename, array),
        "Unable to open and write {label} NumPy array file: '{filename}'"
    );
}
