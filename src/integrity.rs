//! Post-fetch checks. Both are heuristics: a folder that is big enough and a
//! profile that does not start like an XML document pass. There is no schema
//! validation and no checksum.

use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};

use crate::store::Store;

pub const DEFAULT_MIN_FOLDER_BYTES: u64 = 100;

pub fn is_valid(folder: &Utf8Path, min_bytes: u64) -> bool {
    Store::compute_folder_size(folder) >= min_bytes
}

/// False when the file is missing, empty, or starts with `<`, which is what
/// the remote returns in place of a profile table when a lookup fails.
pub fn is_valid_content(file: &Utf8Path) -> bool {
    let Ok(handle) = File::open(file.as_std_path()) else {
        return false;
    };
    let mut first_line = String::new();
    match BufReader::new(handle).read_line(&mut first_line) {
        Ok(0) | Err(_) => false,
        Ok(_) => !first_line.starts_with('<'),
    }
}

/// The first `*.txt` file in `folder` by name: the profile table written by
/// the scheme downloader.
pub fn find_profile_file(folder: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut candidates = folder
        .read_dir_utf8()
        .ok()?
        .flatten()
        .map(|entry| entry.into_path())
        .filter(|path| path.extension() == Some("txt") && path.is_file())
        .collect::<Vec<_>>();
    candidates.sort();
    candidates.into_iter().next()
}
