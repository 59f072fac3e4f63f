//! Configuration types for pod5-convert
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::codec::DEFAULT_SIGNAL_CHUNK_SIZE;
use crate::error::ConfigError;
use crate::status::progress_enabled;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Cap on the default worker count
const DEFAULT_MAX_WORKERS: usize = 10;

/// Default staleness timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 1200;

/// Convert multi-read legacy containers into pod5 read tables
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pod5-convert",
    version,
    about = "Convert multi-read legacy containers into pod5 read tables",
    long_about = "Converts multi-read legacy containers into pod5 read tables using a pool of \
                  worker threads.\n\n\
                  By default every input is merged into a single output file. With \
                  --one-to-one, each input gets its own output, mirrored under the output \
                  directory relative to the given root.",
    after_help = "EXAMPLES:\n    \
        pod5-convert runs/ -o converted.pod5\n    \
        pod5-convert runs/ -r -o out_dir/ -t 8\n    \
        pod5-convert runs/ -r --one-to-one runs/ -o mirrored/ --strict\n\n\
        Set POD5_PBAR=0 to disable progress bars."
)]
pub struct CliArgs {
    /// Input files or directories
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output file, or directory for one-to-one / merged output
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,

    /// Search input directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Write one output per input, mirrored relative to this directory
    #[arg(long, value_name = "DIR")]
    pub one_to_one: Option<PathBuf>,

    /// Number of worker threads
    #[arg(
        short = 't',
        long,
        default_value_t = default_threads(),
        value_name = "NUM"
    )]
    pub threads: usize,

    /// Samples per compressed signal chunk
    #[arg(long, default_value_t = DEFAULT_SIGNAL_CHUNK_SIZE, value_name = "NUM")]
    pub signal_chunk_size: usize,

    /// Overwrite existing output files
    #[arg(short = 'f', long)]
    pub force_overwrite: bool,

    /// Stop on the first input that fails to convert
    #[arg(long)]
    pub strict: bool,

    /// Seconds without progress before the run is abandoned
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, value_name = "SECS")]
    pub timeout: u64,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_threads() -> usize {
    num_cpus::get().clamp(1, DEFAULT_MAX_WORKERS)
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Input files and directories as given
    pub inputs: Vec<PathBuf>,

    /// Output file or directory
    pub output: PathBuf,

    /// Search directories recursively
    pub recursive: bool,

    /// Mirror root for one-to-one output
    pub one_to_one: Option<PathBuf>,

    /// Number of worker threads requested
    pub worker_count: usize,

    /// Samples per signal chunk
    pub signal_chunk_size: usize,

    /// Replace existing outputs
    pub force_overwrite: bool,

    /// Fail the run on the first failed input
    pub strict: bool,

    /// Longest wait for a credit or a message
    pub timeout: Duration,

    /// Show progress bars
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ConvertConfig {
    /// Configuration with default settings for `inputs` and `output`
    pub fn new(inputs: Vec<PathBuf>, output: PathBuf) -> Self {
        Self {
            inputs,
            output,
            recursive: false,
            one_to_one: None,
            worker_count: default_threads(),
            signal_chunk_size: DEFAULT_SIGNAL_CHUNK_SIZE,
            force_overwrite: false,
            strict: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            show_progress: false,
            verbose: false,
        }
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let config = Self {
            inputs: args.inputs,
            output: args.output,
            recursive: args.recursive,
            one_to_one: args.one_to_one,
            worker_count: args.threads,
            signal_chunk_size: args.signal_chunk_size,
            force_overwrite: args.force_overwrite,
            strict: args.strict,
            timeout: Duration::from_secs(args.timeout),
            show_progress: !args.quiet && progress_enabled(),
            verbose: args.verbose,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check limits and output preconditions
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inputs.is_empty() {
            return Err(ConfigError::NoInputs);
        }

        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }

        if self.signal_chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.signal_chunk_size));
        }

        if self.timeout.as_secs() == 0 {
            return Err(ConfigError::InvalidTimeout(self.timeout.as_secs()));
        }

        if self.output.is_file() {
            if self.one_to_one.is_some() {
                return Err(ConfigError::InvalidOutputPath {
                    path: self.output.clone(),
                    reason: "one-to-one output must be a directory".into(),
                });
            }
            if !self.force_overwrite {
                return Err(ConfigError::InvalidOutputPath {
                    path: self.output.clone(),
                    reason: "file exists and --force-overwrite is not set".into(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("pod5-convert").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_defaults() {
        let args = parse(&["in.fast5", "-o", "out.pod5"]);
        assert_eq!(args.inputs, vec![PathBuf::from("in.fast5")]);
        assert_eq!(args.signal_chunk_size, DEFAULT_SIGNAL_CHUNK_SIZE);
        assert_eq!(args.timeout, DEFAULT_TIMEOUT_SECS);
        assert!(args.threads >= 1 && args.threads <= DEFAULT_MAX_WORKERS);
        assert!(!args.strict);
        assert!(args.one_to_one.is_none());
    }

    #[test]
    fn test_cli_requires_inputs_and_output() {
        assert!(CliArgs::try_parse_from(["pod5-convert", "-o", "out.pod5"]).is_err());
        assert!(CliArgs::try_parse_from(["pod5-convert", "in.fast5"]).is_err());
    }

    #[test]
    fn test_from_args() {
        let args = parse(&[
            "a", "b", "-o", "out", "-r", "--one-to-one", "a", "-t", "4", "--strict", "--timeout", "30", "-q",
        ]);
        let config = ConvertConfig::from_args(args).unwrap();
        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.one_to_one, Some(PathBuf::from("a")));
        assert!(config.recursive && config.strict);
        assert!(!config.show_progress);
    }

    #[test]
    fn test_invalid_limits() {
        let config = ConvertConfig::from_args(parse(&["a", "-o", "out", "-t", "0"]));
        assert!(matches!(config, Err(ConfigError::InvalidWorkerCount { .. })));

        let config = ConvertConfig::from_args(parse(&["a", "-o", "out", "-t", "513"]));
        assert!(matches!(config, Err(ConfigError::InvalidWorkerCount { .. })));

        let config = ConvertConfig::from_args(parse(&["a", "-o", "out", "--signal-chunk-size", "0"]));
        assert!(matches!(config, Err(ConfigError::InvalidChunkSize(0))));

        let config = ConvertConfig::from_args(parse(&["a", "-o", "out", "--timeout", "0"]));
        assert!(matches!(config, Err(ConfigError::InvalidTimeout(0))));
    }

    #[test]
    fn test_existing_output_file() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.pod5");
        std::fs::write(&out, b"").unwrap();
        let out_str = out.to_str().unwrap();

        let config = ConvertConfig::from_args(parse(&["a", "-o", out_str]));
        assert!(matches!(config, Err(ConfigError::InvalidOutputPath { .. })));

        let config = ConvertConfig::from_args(parse(&["a", "-o", out_str, "-f"]));
        assert!(config.is_ok());

        let config = ConvertConfig::from_args(parse(&["a", "-o", out_str, "-f", "--one-to-one", "a"]));
        assert!(matches!(config, Err(ConfigError::InvalidOutputPath { .. })));
    }
}
