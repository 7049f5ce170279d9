//! Configuration types for record-jogger
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - The properties file format consumed by the resource descriptors
//! - Runtime options for a local job

use crate::error::ConfigError;
use clap::{Args, Parser, Subcommand, ValueEnum};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// Regex for `Key = Value` property lines
static PROPERTY_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Keys may contain spaces ("Chunk Size"); the value is everything after
    // the first '=' with surrounding whitespace trimmed
    Regex::new(r"^\s*([^=]*[^=\s])\s*=\s*(.*?)\s*$").expect("Invalid property regex")
});

/// Distribute a record store across workers in fixed-size work packages
#[derive(Parser, Debug, Clone)]
#[command(
    name = "record-jogger",
    version,
    about = "Distribute a record store across workers in fixed-size work packages",
    long_about = "Splits a read-only record store into chunks of 'Chunk Size' records and\n\
                  ships each chunk as a work package to a pool of workers. Each worker runs\n\
                  a processor over its packages and reports to a shared logsheet.\n\n\
                  Jobs are described by a properties file:\n\n    \
                  Input Record Store = /data/prints\n    \
                  Chunk Size = 500\n    \
                  Workers Per Node = 8\n    \
                  Logsheet URL = file:///var/log/prints.log",
    after_help = "EXAMPLES:\n    \
        record-jogger run job.properties\n    \
        record-jogger run job.properties -w 16 -p\n    \
        record-jogger run job.properties --keys-only --format json\n    \
        record-jogger check job.properties"
)]
pub struct CliArgs {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress progress and summary output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a job described by a properties file
    Run(RunArgs),

    /// Validate a job properties file and report store facts
    Check {
        /// Job properties file
        #[arg(value_name = "PROPERTIES")]
        properties: PathBuf,
    },
}

/// Arguments of the `run` subcommand
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Job properties file
    #[arg(value_name = "PROPERTIES")]
    pub properties: PathBuf,

    /// Number of local workers (overrides 'Workers Per Node')
    #[arg(short = 'w', long, value_name = "NUM")]
    pub workers: Option<usize>,

    /// Ship keys only, without record values
    #[arg(long)]
    pub keys_only: bool,

    /// Make the built-in processor fail fatally on this chunk index (drill)
    #[arg(long, value_name = "CHUNK", action = clap::ArgAction::Append)]
    pub fail_on: Vec<u64>,

    /// Show a progress bar
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Summary output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Summary output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// JSON summary on stdout
    Json,
}

/// Parsed `Key = Value` properties
///
/// Lines starting with `#` and blank lines are ignored. A key that appears
/// more than once keeps its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    /// Read and parse a properties file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text)
    }

    /// Parse properties from text
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();

        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let caps = PROPERTY_LINE_REGEX
                .captures(line)
                .ok_or_else(|| ConfigError::MalformedLine {
                    line: idx + 1,
                    content: trimmed.to_string(),
                })?;

            values.insert(caps[1].to_string(), caps[2].to_string());
        }

        Ok(Self { values })
    }

    /// Get a property value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Check if a property is present
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Names from `required` that are not present, in the given order
    pub fn missing<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        required
            .iter()
            .map(AsRef::as_ref)
            .filter(|key| !self.contains(key))
            .map(str::to_string)
            .collect()
    }

    /// Get a required property
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingRequired(vec![key.to_string()]))
    }

    /// Get a required property as a strictly positive integer
    pub fn require_positive(&self, key: &str) -> Result<u32, ConfigError> {
        let raw = self.require(key)?;
        let invalid = |reason: &str| ConfigError::InvalidValue {
            property: key.to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        let value: i64 = raw.parse().map_err(|_| invalid("not an integer"))?;
        if value <= 0 {
            return Err(invalid("must be greater than zero"));
        }
        u32::try_from(value).map_err(|_| invalid("too large"))
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if there are no properties
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Runtime options for a local job, from the `run` subcommand
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Job properties file
    pub properties: PathBuf,
    /// Worker count override
    pub workers: Option<usize>,
    /// Ship keys without values
    pub keys_only: bool,
    /// Chunks the built-in processor fails on
    pub fail_on: Vec<u64>,
    /// Show progress bar
    pub show_progress: bool,
    /// Summary format
    pub format: OutputFormat,
    /// Verbose logging
    pub verbose: bool,
    /// Suppress human output
    pub quiet: bool,
}

impl RunOptions {
    /// Create from the `run` subcommand and the global flags
    pub fn from_args(run: &RunArgs, verbose: bool, quiet: bool) -> Result<Self, ConfigError> {
        if let Some(count) = run.workers {
            validate_worker_count(count)?;
        }

        Ok(Self {
            properties: run.properties.clone(),
            workers: run.workers,
            keys_only: run.keys_only,
            fail_on: run.fail_on.clone(),
            show_progress: run.progress && !quiet,
            format: run.format,
            verbose,
            quiet,
        })
    }
}

/// Check a worker count against the supported range
pub fn validate_worker_count(count: usize) -> Result<(), ConfigError> {
    if count == 0 || count > MAX_WORKERS {
        return Err(ConfigError::InvalidWorkerCount {
            count,
            max: MAX_WORKERS,
        });
    }
    Ok(())
}

/// Default local worker count
pub fn default_workers() -> usize {
    num_cpus::get().clamp(1, MAX_WORKERS)
}
