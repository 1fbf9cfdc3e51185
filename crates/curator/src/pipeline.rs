//! The one-shot pipeline driver: bloom → index → sort, per configured key.

use anyhow::{bail, Context, Result};
use credentials::IndexKey;
use index::{Indexer, Sorter};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use crate::config::{AutoConfig, GIB_BITS, MIB};
use crate::dedupe::Bloomer;

/// Runs the whole curation pipeline described by `config`:
///
/// 1. Deduplicate the input into a bloomed corpus.
/// 2. For every configured key, build an unsorted index in scratch space.
/// 3. Sort each index into `{key}.idx` under the output directory.
///
/// Scratch space lives in a `leakdb-tmp-*` directory that is removed when
/// the run finishes (stage-level `no_cleanup` flags only keep the stages'
/// own intermediate files). Returns the sorted index paths, in key order.
pub fn auto(config: &AutoConfig) -> Result<Vec<PathBuf>> {
    let started = Instant::now();
    if !config.input.exists() {
        bail!("input {} does not exist", config.input.display());
    }
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;

    let temp_root = config
        .temp_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&temp_root)?;
    let temp = tempfile::Builder::new()
        .prefix("leakdb-tmp-")
        .tempdir_in(&temp_root)
        .context("creating pipeline scratch directory")?;

    // Parse the key names before doing any work.
    let mut keys = Vec::with_capacity(config.index.keys.len());
    for name in &config.index.keys {
        keys.push(name.parse::<IndexKey>()?);
    }

    // *** Bloom ***
    let bloomed = config
        .bloom
        .output
        .clone()
        .unwrap_or_else(|| config.output_dir.join("bloomed.json"));
    let bloomer = Bloomer::new(
        &config.input,
        &bloomed,
        config.bloom.workers,
        config.bloom.filter_size * GIB_BITS,
        config.bloom.filter_hashes,
        config.bloom.filter_load.clone(),
        config.bloom.filter_save.clone(),
    )?;
    bloomer.run()?;
    let (seen, duplicates) = bloomer.progress();
    info!(seen, duplicates, corpus = %bloomed.display(), "bloom stage done");

    // *** Index & Sort, per key ***
    let index_temp = temp.path().join("indexer");
    let sort_temp = temp.path().join("sorter");
    let mut outputs = Vec::with_capacity(keys.len());
    for key in keys {
        let unsorted = temp.path().join(format!("{}.idx", key));
        let indexer = Indexer::new(
            &bloomed,
            &unsorted,
            key,
            config.index.workers,
            &index_temp,
            config.index.no_cleanup,
        )?;
        indexer.run()?;
        info!(key = %key, entries = indexer.count(), "index stage done");

        let sorted = config.output_dir.join(format!("{}.idx", key));
        let mut sorter = Sorter::new(
            &unsorted,
            &sorted,
            config.sort.max_memory * MIB,
            config.sort.workers,
            &sort_temp,
            config.sort.no_cleanup,
        )?;
        sorter.start()?;
        info!(key = %key, index = %sorted.display(), "sort stage done");
        outputs.push(sorted);
    }

    info!(elapsed = ?started.elapsed(), "pipeline completed");
    Ok(outputs)
}
