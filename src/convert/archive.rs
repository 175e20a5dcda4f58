//! Zip archive extraction.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use glob::{glob, Pattern};
use tracing::debug;

use crate::convert::SourceFormat;
use crate::error::ConvertResult;

/// `true` if `path` has a `.zip` suffix (case-insensitive).
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Extract `archive` into `out_dir`, remove the archive and return every convertible file found
/// in `out_dir`, sorted.
pub fn extract_archive(archive: &Path, out_dir: &Path) -> ConvertResult<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    let entries = zip.len();
    zip.extract(out_dir)?;
    fs::remove_file(archive)?;

    let files = convertible_files(out_dir)?;
    debug!(
        archive = %archive.display(),
        entries,
        convertible = files.len(),
        "extracted archive"
    );
    Ok(files)
}

/// Files below `dir` whose suffix maps to a [`SourceFormat`], sorted.
pub fn convertible_files(dir: &Path) -> ConvertResult<Vec<PathBuf>> {
    let pattern = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));
    let mut files: Vec<PathBuf> = match glob(&pattern) {
        Ok(paths) => paths
            .flatten()
            .filter(|p| p.is_file() && SourceFormat::from_path(p).is_ok())
            .collect(),
        // The pattern is built from an escaped root, so it always parses.
        Err(_) => Vec::new(),
    };
    files.sort();
    Ok(files)
}
