//! Input discovery
//!
//! Expands the command line inputs into the list of legacy containers to
//! convert and drops anything that is not a multi-read container before any
//! worker is started.

use crate::legacy::{is_multi_read, LegacyReader};
use crate::status::checking_bar;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Expand `inputs` into container paths
///
/// Files are kept as given. Directories are searched for files with the
/// reader's `extension`, one level deep unless `recursive`. Duplicates are
/// removed keeping the first occurrence.
pub fn iterate_inputs(inputs: &[PathBuf], recursive: bool, extension: &str) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut paths = Vec::new();

    for input in inputs {
        if input.is_file() {
            if seen.insert(input.clone()) {
                paths.push(input.clone());
            }
            continue;
        }

        if !input.is_dir() {
            warn!(path = %input.display(), "Input does not exist, ignoring");
            continue;
        }

        let walker = WalkDir::new(input)
            .max_depth(if recursive { usize::MAX } else { 1 })
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Failed to read input directory entry");
                    continue;
                }
            };

            if entry.file_type().is_file() && has_extension(entry.path(), extension) {
                let path = entry.into_path();
                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        }
    }

    debug!(count = paths.len(), "Discovered inputs");
    paths
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Keep only the multi-read containers among `paths`, preserving order
///
/// Each file is opened once on one of `threads` scoped threads. Files that
/// cannot be opened count as not multi-read.
pub fn filter_multi_read(
    paths: &[PathBuf],
    reader: &dyn LegacyReader,
    threads: usize,
    show_progress: bool,
) -> Vec<PathBuf> {
    if paths.is_empty() {
        return Vec::new();
    }

    let bar = checking_bar(paths.len(), show_progress);
    let chunk_len = paths.len().div_ceil(threads.max(1));

    let checks: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = paths
            .chunks(chunk_len)
            .map(|chunk| {
                let bar = bar.clone();
                let handle = scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|path| {
                            let ok = reader
                                .open(path)
                                .map(|file| is_multi_read(file.as_ref()))
                                .unwrap_or(false);
                            bar.inc(1);
                            ok
                        })
                        .collect::<Vec<_>>()
                });
                (chunk.len(), handle)
            })
            .collect();

        // A panicked checker rejects its whole chunk
        handles
            .into_iter()
            .flat_map(|(len, h)| h.join().unwrap_or_else(|_| vec![false; len]))
            .collect()
    });
    bar.finish_and_clear();

    let mut accepted = Vec::new();
    let mut skipped = Vec::new();
    for (path, ok) in paths.iter().zip(checks) {
        if ok {
            accepted.push(path.clone());
        } else {
            skipped.push(path);
        }
    }

    if !skipped.is_empty() {
        let names: Vec<String> = skipped
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect();
        warn!(
            count = skipped.len(),
            files = %names.join(" "),
            "Some inputs are not multi-read containers and will be ignored"
        );
    }

    accepted
}
