//! Record file naming: one file per calendar month, uniquified on collision.

use chrono::{DateTime, Datelike, Utc};
use std::path::{Path, PathBuf};

pub const RECORD_EXTENSION: &str = "json";

/// `<data_dir>/<YYYY>-<MM>.json` for the UTC month containing `now`.
pub fn file_by_date(data_dir: &Path, now: DateTime<Utc>) -> PathBuf {
    data_dir.join(format!(
        "{}.{}",
        period_label(now),
        RECORD_EXTENSION
    ))
}

/// `YYYY-MM` label of the period containing `now`.
pub fn period_label(now: DateTime<Utc>) -> String {
    format!("{}-{:02}", now.year(), now.month())
}

/// Return `path` if it is free, otherwise the first free
/// `<stem>-<n>.<ext>` with `n` counting up from 1.
pub fn uniquify(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 1u32;
    loop {
        let name = match &extension {
            Some(ext) => format!("{}-{}.{}", stem, counter, ext),
            None => format!("{}-{}", stem, counter),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

pub fn unique_name(data_dir: &Path, now: DateTime<Utc>) -> PathBuf {
    uniquify(&file_by_date(data_dir, now))
}

/// Most recently written record file in `data_dir`, if any.
pub fn latest_record_file(data_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(data_dir).ok()?;

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
        })
        .filter_map(|path| {
            let metadata = std::fs::metadata(&path).ok()?;
            let stamp = metadata.created().or_else(|_| metadata.modified()).ok()?;
            Some((stamp, path))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}
