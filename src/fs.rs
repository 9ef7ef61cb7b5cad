//! Temporary output files.

use std::{
    ffi::OsString,
    fs,
    io,
    path::{Path, PathBuf},
};

const TMP_PREFIX: &str = "tmp_";

/// Sibling of `path` used while the output is incomplete.
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(TMP_PREFIX);
    if let Some(file_name) = path.file_name() {
        name.push(file_name);
    }
    path.with_file_name(name)
}

/// Move the temporary output for `path` onto `path`, replacing any file
/// already there.
pub fn promote_tmp_file(path: &Path) -> io::Result<()> {
    let tmp = tmp_path_for(path);
    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(&tmp, path)
}
