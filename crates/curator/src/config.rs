//! JSON-serializable configuration for the auto pipeline, one section per
//! stage, with defaults matching a workstation-scale curation run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Bits per configured GiB of bloom filter.
pub const GIB_BITS: u64 = 1 << 30;
/// Bytes per configured MiB of sort memory.
pub const MIB: usize = 1024 * 1024;

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_filter_size() -> u64 {
    8
}

fn default_filter_hashes() -> u32 {
    14
}

fn default_keys() -> Vec<String> {
    vec!["email".to_string(), "user".to_string(), "domain".to_string()]
}

fn default_max_memory() -> usize {
    2048
}

/// Bloom (dedup) stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomConfig {
    /// Filter size in GiB of bits.
    #[serde(default = "default_filter_size")]
    pub filter_size: u64,
    #[serde(default = "default_filter_hashes")]
    pub filter_hashes: u32,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub filter_load: Option<PathBuf>,
    #[serde(default)]
    pub filter_save: Option<PathBuf>,
    /// Deduplicated corpus path; defaults to `bloomed.json` under the
    /// pipeline output directory.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            filter_size: default_filter_size(),
            filter_hashes: default_filter_hashes(),
            workers: default_workers(),
            filter_load: None,
            filter_save: None,
            output: None,
        }
    }
}

/// Index stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Keys to build indexes for, by name.
    #[serde(default = "default_keys")]
    pub keys: Vec<String>,
    #[serde(default)]
    pub no_cleanup: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            keys: default_keys(),
            no_cleanup: false,
        }
    }
}

/// Sort stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortConfig {
    /// Memory ceiling in MiB.
    #[serde(default = "default_max_memory")]
    pub max_memory: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub no_cleanup: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            max_memory: default_max_memory(),
            workers: default_workers(),
            no_cleanup: false,
        }
    }
}

/// A complete configuration for one [`auto`](crate::pipeline::auto) run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutoConfig {
    #[serde(default)]
    pub bloom: BloomConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub sort: SortConfig,

    /// Normalized JSON input: a file or a directory of files.
    pub input: PathBuf,
    /// Where the sorted `{key}.idx` files (and by default the
    /// deduplicated corpus) land.
    pub output_dir: PathBuf,
    /// Scratch space root; the system temp directory when unset.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl AutoConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Writes this configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Writes a default configuration for the operator to edit.
    pub fn write_default(path: &Path) -> Result<()> {
        Self::default().save(path)
    }
}
