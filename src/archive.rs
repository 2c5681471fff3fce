//! Zip packaging of staging folders.
//!
//! Entries are named relative to the parent of the packed folder, so every
//! archive carries exactly one top-level directory. Archives are written to a
//! temporary file next to the target and renamed into place once complete.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ReportError, Result};

/// Packs `source` into a deflate-compressed zip at `target`.
///
/// Returns the number of entries written, directories included.
pub fn pack(source: &Path, target: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(ReportError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("staging folder {} does not exist", source.display()),
        )));
    }
    let base = source.parent().unwrap_or(source);
    let target_dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut staged = tempfile::NamedTempFile::new_in(target_dir)?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0usize;
    {
        let mut writer = ZipWriter::new(staged.as_file_mut());
        for entry in WalkDir::new(source).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let name = entry_name(entry.path(), base)?;

            if entry.file_type().is_dir() {
                writer.add_directory(format!("{name}/"), options)?;
            } else if entry.file_type().is_file() {
                writer.start_file(name, options)?;
                let mut file = File::open(entry.path())?;
                io::copy(&mut file, &mut writer)?;
            } else {
                continue;
            }
            entries += 1;
        }
        writer.finish()?;
    }

    staged.persist(target).map_err(|e| ReportError::Io(e.error))?;
    Ok(entries)
}

/// Extracts every entry of `archive` below `dest`, returning the files written.
pub fn unpack(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut written = Vec::new();

    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            ReportError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsafe entry name {}", entry.name()),
            ))
        })?;
        let path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&path)?;
        io::copy(&mut entry, &mut out)?;
        written.push(path);
    }

    Ok(written)
}

/// Entry names of `archive` in stored order.
pub fn entry_names(archive: &Path) -> Result<Vec<String>> {
    let zip = ZipArchive::new(File::open(archive)?)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

fn entry_name(path: &Path, base: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).map_err(|_| {
        ReportError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is outside {}", path.display(), base.display()),
        ))
    })?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}
