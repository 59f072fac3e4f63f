//! Output path resolution and writer lifecycle
//!
//! Every input resolves to exactly one target path, once, and the result is
//! cached. Each distinct target moves through
//!
//! ```text
//!   Unopened ──first append / input done──▶ Open ──input complete / close_all──▶ Closed
//! ```
//!
//! and never leaves `Closed`: asking for a closed target again is an error,
//! so a later input can never overwrite a file this run already finished.

use crate::container::{ContainerWriter, WriterFactory, TARGET_EXTENSION};
use crate::error::{OutputError, OutputResult};
use crate::model::TranslatedRecord;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// File name used when merging into an output directory
pub const MERGED_FILE_NAME: &str = "output.pod5";

/// Lifecycle of one output target
enum TargetState {
    Unopened,
    Open(Box<dyn ContainerWriter>),
    Closed,
}

/// Routes records from inputs to their target containers
pub struct OutputHandler {
    /// Output file, or directory in mirror mode
    output: PathBuf,

    /// Mirror root; `None` merges everything into one target
    one_to_one: Option<PathBuf>,

    force_overwrite: bool,
    factory: Arc<dyn WriterFactory>,

    input_to_output: HashMap<PathBuf, PathBuf>,
    targets: HashMap<PathBuf, TargetState>,

    /// Targets in the order they were opened
    opened: Vec<PathBuf>,

    records_written: u64,
}

impl OutputHandler {
    pub fn new(
        output: PathBuf,
        one_to_one: Option<PathBuf>,
        force_overwrite: bool,
        factory: Arc<dyn WriterFactory>,
    ) -> Self {
        Self {
            output,
            one_to_one,
            force_overwrite,
            factory,
            input_to_output: HashMap::new(),
            targets: HashMap::new(),
            opened: Vec::new(),
            records_written: 0,
        }
    }

    /// Resolve (and cache) the target path for `input`
    pub fn output_path_for(&mut self, input: &Path) -> OutputResult<PathBuf> {
        if let Some(path) = self.input_to_output.get(input) {
            return Ok(path.clone());
        }

        let path = resolve_output_path(input, &self.output, self.one_to_one.as_deref())?;
        self.input_to_output
            .insert(input.to_path_buf(), path.clone());
        Ok(path)
    }

    /// Append records read from `input` to its target, opening it if needed
    pub fn append(&mut self, input: &Path, records: &[TranslatedRecord]) -> OutputResult<()> {
        let writer = self.writer_for(input)?;
        writer.append(records)?;
        self.records_written += records.len() as u64;
        Ok(())
    }

    /// Resolve and open the target of `input` even if it produced no records
    ///
    /// Every input that finishes cleanly gets an output, so an empty input
    /// still yields a valid (empty) container and mirror-root errors surface.
    pub fn ensure_open(&mut self, input: &Path) -> OutputResult<()> {
        self.writer_for(input).map(|_| ())
    }

    /// Mark `input` finished; in mirror mode its target is closed now
    pub fn set_input_complete(&mut self, input: &Path) -> OutputResult<()> {
        if self.one_to_one.is_none() {
            return Ok(());
        }

        // The input failed before producing any records
        let Some(path) = self.input_to_output.get(input) else {
            return Ok(());
        };

        match self.targets.get_mut(path) {
            Some(state) => close_target(path, state),
            None => Ok(()),
        }
    }

    /// Close every open target
    ///
    /// Safe to call repeatedly. Every target is attempted even if one fails;
    /// the first failure is returned.
    pub fn close_all(&mut self) -> OutputResult<()> {
        let mut first_error = None;

        for (path, state) in self.targets.iter_mut() {
            if let Err(e) = close_target(path, state) {
                warn!(path = %path.display(), error = %e, "Failed to close output");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Targets opened during the run, in open order
    pub fn output_paths(&self) -> &[PathBuf] {
        &self.opened
    }

    /// Records appended across all targets
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    fn writer_for(&mut self, input: &Path) -> OutputResult<&mut Box<dyn ContainerWriter>> {
        let path = self.output_path_for(input)?;

        let state = self
            .targets
            .entry(path.clone())
            .or_insert(TargetState::Unopened);

        if let TargetState::Unopened = state {
            *state = TargetState::Open(open_target(
                &path,
                self.force_overwrite,
                self.factory.as_ref(),
            )?);
            self.opened.push(path.clone());
        }

        match state {
            TargetState::Open(writer) => Ok(writer),
            _ => Err(OutputError::ReopenClosed { path }),
        }
    }
}

impl Drop for OutputHandler {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}

fn open_target(
    path: &Path,
    force_overwrite: bool,
    factory: &dyn WriterFactory,
) -> OutputResult<Box<dyn ContainerWriter>> {
    if path.exists() {
        if !force_overwrite {
            return Err(OutputError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        fs::remove_file(path)?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| OutputError::CreateFailed {
            path: parent.to_path_buf(),
            reason: e.to_string(),
        })?;
    }

    debug!(path = %path.display(), "Opening output");
    factory.open(path)
}

fn close_target(path: &Path, state: &mut TargetState) -> OutputResult<()> {
    match std::mem::replace(state, TargetState::Closed) {
        TargetState::Open(mut writer) => {
            debug!(
                path = %path.display(),
                records = writer.records_written(),
                "Closing output"
            );
            writer.close()
        }
        TargetState::Unopened | TargetState::Closed => Ok(()),
    }
}

/// Resolve the target path of `input`
///
/// With a mirror root the input is re-rooted under `output`; otherwise every
/// input merges into `output`, or `output/output.pod5` if it is a directory.
pub fn resolve_output_path(
    input: &Path,
    output: &Path,
    one_to_one: Option<&Path>,
) -> OutputResult<PathBuf> {
    match one_to_one {
        Some(root) => resolve_one_to_one_path(input, output, root),
        None if output.is_dir() => Ok(output.join(MERGED_FILE_NAME)),
        None => Ok(output.to_path_buf()),
    }
}

/// Map `root/a/b/in.ext` to `output/a/b/in.pod5`
pub fn resolve_one_to_one_path(input: &Path, output: &Path, root: &Path) -> OutputResult<PathBuf> {
    let not_under_root = || OutputError::NotUnderRoot {
        input: input.to_path_buf(),
        root: root.to_path_buf(),
    };

    let absolute_input = std::path::absolute(input)?;
    let absolute_root = std::path::absolute(root)?;
    let relative = absolute_input
        .strip_prefix(&absolute_root)
        .map_err(|_| not_under_root())?;

    if relative.file_name().is_none() {
        return Err(not_under_root());
    }

    Ok(output.join(relative.with_extension(TARGET_EXTENSION)))
}
