//! MessagePack binary artifact read/write
//!

use camino::Utf8Path;
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use unwrap::unwrap;

use crate::errors::{CnvError, CnvResult};

pub fn write_mpack_file<T: Serialize>(filename: &Utf8Path, value: &T, label: &str) {
    let mut buf = Vec::new();
    value
        .serialize(&mut rmp_serde::Serializer::new(&mut buf))
        .unwrap();

    info!("Writing {label} to binary file: '{filename}'");

    unwrap!(
        std::fs::write(filename, buf.as_slice()),
        "Unable to open and write {label} binary file: '{filename}'"
    );
}

pub fn read_mpack_file<T: DeserializeOwned>(filename: &Utf8Path, label: &str) -> CnvResult<T> {
    info!("Reading {label} from binary file: '{filename}'");
    let buf = std::fs::read(filename).map_err(|e| {
        CnvError::configuration(format!(
            "Unable to open and read {label} binary file '{filename}': {e}"
        ))
    })?;
    rmp_serde::from_slice(&buf).map_err(|e| {
        CnvError::validation(format!(
            "Unable to decode {label} binary file '{filename}': {e}"
        ))
    })
}
