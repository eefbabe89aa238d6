use std::fs::{read_to_string, write, File};
use std::path::Path;

use crate::defs::{IntoResult, Result};

pub fn open_file<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    File::open(path)
        .into_result(|| format!("failed to open file '{}'", path.display()))
}

pub fn create_file<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    File::create(path)
        .into_result(|| format!("failed to create file '{}'", path.display()))
}

pub fn read_file_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    read_to_string(path)
        .into_result(|| format!("failed to read file '{}'", path.display()))
}

pub fn write_file<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    write(path, data)
        .into_result(|| format!("failed to write file '{}'", path.display()))
}
