//! # leakdb-curator — command-line front door to the curation pipeline
//!
//! Thin argument plumbing over the library crates: each subcommand maps
//! onto one pipeline stage (or the one-shot `auto` driver) and exits
//! nonzero on any stage failure.
//!
//! ```text
//! leakdb-curator normalize  --format colon-newline --target dumps/ --output normalized.json
//! leakdb-curator bloom      --target normalized.json --output bloomed.json
//! leakdb-curator index      --target bloomed.json --output email.idx --key email
//! leakdb-curator sort       --index email.idx --output email-sorted.idx
//! leakdb-curator check-sort --index email-sorted.idx
//! leakdb-curator search     --json bloomed.json --index email-sorted.idx --value a@b.io
//! leakdb-curator auto       --config leakdb.json
//! ```
//!
//! Logging is controlled with `RUST_LOG` (defaults to `info`).

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use credentials::IndexKey;
use curator::config::{GIB_BITS, MIB};
use curator::{auto, AutoConfig, Bloomer};
use index::{check_sort, Indexer, Searcher, Sorter};
use normalize::Normalizer;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "leakdb-curator")]
#[command(about = "Curate credential dumps into searchable LeakDB indexes")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Convert raw dump files into normalized JSON lines
    Normalize {
        /// Line format: colon-newline, semicolon-newline, whitespace-newline
        #[arg(short, long)]
        format: String,
        /// Input file or directory
        #[arg(short, long)]
        target: PathBuf,
        /// Output JSON Lines file (appended)
        #[arg(short, long)]
        output: PathBuf,
        /// Recurse into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Skip files whose name starts with this prefix
        #[arg(long)]
        skip_prefix: Option<String>,
        /// Skip files whose name ends with this suffix
        #[arg(long)]
        skip_suffix: Option<String>,
    },

    /// Deduplicate JSON lines through a bloom filter
    Bloom {
        /// Input file or directory of normalized JSON lines
        #[arg(short, long)]
        target: PathBuf,
        /// Deduplicated output file (appended)
        #[arg(short, long)]
        output: PathBuf,
        /// Worker threads (defaults to the CPU count)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Filter size in GiB of bits
        #[arg(long, default_value_t = 8)]
        filter_size: u64,
        /// Number of filter hash functions
        #[arg(long, default_value_t = 14)]
        filter_hashes: u32,
        /// Load a previously saved filter before starting
        #[arg(long)]
        filter_load: Option<PathBuf>,
        /// Save the filter after finishing
        #[arg(long)]
        filter_save: Option<PathBuf>,
    },

    /// Build an unsorted index of a deduplicated corpus
    Index {
        /// Deduplicated JSON Lines corpus
        #[arg(short, long)]
        target: PathBuf,
        /// Unsorted index output
        #[arg(short, long)]
        output: PathBuf,
        /// Key field: email, user, domain, or password
        #[arg(short, long)]
        key: String,
        /// Worker threads (defaults to the CPU count)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Scratch directory (defaults to the system temp dir)
        #[arg(long)]
        temp: Option<PathBuf>,
        /// Keep per-worker partition files
        #[arg(long)]
        no_cleanup: bool,
    },

    /// Sort an index by digest value under a memory ceiling
    Sort {
        /// Unsorted index input
        #[arg(short, long)]
        index: PathBuf,
        /// Sorted index output
        #[arg(short, long)]
        output: PathBuf,
        /// Memory ceiling in MiB
        #[arg(short, long, default_value_t = 2048)]
        max_memory: usize,
        /// Sort worker threads (defaults to the CPU count)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Scratch directory (defaults to the system temp dir)
        #[arg(long)]
        temp: Option<PathBuf>,
        /// Keep tape files
        #[arg(long)]
        no_cleanup: bool,
    },

    /// Verify that an index is sorted and well-formed
    CheckSort {
        /// Index to verify
        #[arg(short, long)]
        index: PathBuf,
    },

    /// Look a value up in a sorted index
    Search {
        /// Deduplicated JSON Lines corpus
        #[arg(short, long)]
        json: PathBuf,
        /// Sorted index to search
        #[arg(short, long)]
        index: PathBuf,
        /// Value to look up
        #[arg(short, long)]
        value: String,
    },

    /// Run the whole pipeline (bloom, index, sort) from a config file
    Auto {
        /// JSON pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write a default configuration to this path and exit
        #[arg(short, long)]
        generate: Option<PathBuf>,
    },
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().cmd {
        Cmd::Normalize {
            format,
            target,
            output,
            recursive,
            skip_prefix,
            skip_suffix,
        } => {
            let mut normalizer =
                Normalizer::new(&format, &target, &output, recursive, skip_prefix, skip_suffix)?;
            let emitted = normalizer.run()?;
            println!(
                "Normalized {} lines ({} skipped) into {}",
                emitted,
                normalizer.parse_errors(),
                output.display()
            );
        }

        Cmd::Bloom {
            target,
            output,
            workers,
            filter_size,
            filter_hashes,
            filter_load,
            filter_save,
        } => {
            let bloomer = Bloomer::new(
                &target,
                &output,
                workers.unwrap_or_else(default_workers),
                filter_size * GIB_BITS,
                filter_hashes,
                filter_load,
                filter_save,
            )?;
            bloomer.run()?;
            let (seen, duplicates) = bloomer.progress();
            println!(
                "Deduplicated {} lines ({} duplicates) into {}",
                seen - duplicates,
                duplicates,
                output.display()
            );
        }

        Cmd::Index {
            target,
            output,
            key,
            workers,
            temp,
            no_cleanup,
        } => {
            let key: IndexKey = key.parse()?;
            let indexer = Indexer::new(
                &target,
                &output,
                key,
                workers.unwrap_or_else(default_workers),
                &temp.unwrap_or_else(std::env::temp_dir),
                no_cleanup,
            )?;
            indexer.run()?;
            println!(
                "Indexed {} lines by {} into {}",
                indexer.count(),
                key,
                output.display()
            );
        }

        Cmd::Sort {
            index,
            output,
            max_memory,
            workers,
            temp,
            no_cleanup,
        } => {
            let mut sorter = Sorter::new(
                &index,
                &output,
                max_memory * MIB,
                workers.unwrap_or_else(default_workers),
                &temp.unwrap_or_else(std::env::temp_dir),
                no_cleanup,
            )?;
            sorter.start()?;
            println!(
                "Sorted {} entries into {}",
                sorter.total_entries(),
                output.display()
            );
        }

        Cmd::CheckSort { index } => {
            check_sort(&index)?;
            println!("{} is sorted", index.display());
        }

        Cmd::Search { json, index, value } => {
            let searcher = Searcher::open(&json, &index)?;
            let results = searcher.find(&value)?;
            println!("Found {} results ...", results.len());
            for cred in &results {
                println!(
                    "{}\t{}\t{}\t{}",
                    cred.email, cred.user, cred.domain, cred.password
                );
            }
        }

        Cmd::Auto { config, generate } => {
            if let Some(path) = generate {
                AutoConfig::write_default(&path)?;
                println!("Wrote default config to {}", path.display());
                return Ok(());
            }
            let Some(path) = config else {
                bail!("auto requires --config (or --generate to create one)");
            };
            let config = AutoConfig::load(&path)?;
            let indexes = auto(&config)?;
            for index in indexes {
                println!("{}", index.display());
            }
        }
    }
    Ok(())
}
