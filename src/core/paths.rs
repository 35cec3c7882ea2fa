// Expansion of file/directory arguments into ingestible files

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::Result;

/// Flattens `paths` into files. Directories are listed one level deep and filtered by `accept`;
/// files given explicitly are always kept. The result is ordered by file name.
pub fn expand_paths<F>(paths: &[PathBuf], accept: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool,
{
    let mut files = Vec::with_capacity(paths.len());

    for path in paths {
        if path.is_dir() {
            for entry in fs::read_dir(path)? {
                let entry_path = entry?.path();
                if entry_path.is_file() && accept(&entry_path) {
                    files.push(entry_path);
                }
            }
        } else {
            files.push(path.clone());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Extension predicate for [`expand_paths`], case-insensitive.
pub fn has_extension(extension: &str) -> impl Fn(&Path) -> bool + '_ {
    move |path: &Path| {
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
    }
}
