//! The dedup stage: stream every input line through one shared bloom
//! filter, writing each line to the output the first time it is observed.
//!
//! One reader thread feeds a bounded channel; `W` workers trim each line,
//! skip empties, and perform a combined test-and-add on the filter under a
//! single exclusive lock — so two workers racing on the same unseen line
//! cannot both emit it. The output append is guarded by its own short-held
//! lock to keep filter contention and I/O contention apart.
//!
//! The dedup key is the *whole trimmed line*, not the parsed credential
//! fields: two records differing only in formatting are distinct.

use anyhow::{anyhow, bail, Context, Result};
use bloom::BloomFilter;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use tracing::{debug, info};

/// Bounded line-queue capacity between the reader and the workers.
const LINE_QUEUE_CAPACITY: usize = 4096;

/// Streaming bloom-filter deduplicator over one file or a directory of
/// files.
pub struct Bloomer {
    targets: Vec<PathBuf>,
    output: PathBuf,
    filter_bits: u64,
    filter_hashes: u32,
    workers: usize,
    filter_load: Option<PathBuf>,
    filter_save: Option<PathBuf>,
    seen: AtomicU64,
    duplicates: AtomicU64,
}

impl Bloomer {
    /// Plans a dedup run over `target` (a file, or every regular file
    /// directly under a directory) appending unique lines to `output`.
    ///
    /// The filter is dimensioned as `filter_bits` bits with
    /// `filter_hashes` hash functions. Fails if the target does not exist
    /// or resolves to no files.
    pub fn new(
        target: &Path,
        output: &Path,
        workers: usize,
        filter_bits: u64,
        filter_hashes: u32,
        filter_load: Option<PathBuf>,
        filter_save: Option<PathBuf>,
    ) -> Result<Self> {
        let targets = collect_targets(target)
            .with_context(|| format!("resolving target {}", target.display()))?;
        if targets.is_empty() {
            bail!("no target files under {}", target.display());
        }
        Ok(Self {
            targets,
            output: output.to_path_buf(),
            filter_bits,
            filter_hashes,
            workers: workers.max(1),
            filter_load,
            filter_save,
            seen: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        })
    }

    /// `(total_seen, duplicates)` so far, summed across workers. Safe to
    /// poll from another thread while [`run`](Bloomer::run) blocks.
    #[must_use]
    pub fn progress(&self) -> (u64, u64) {
        (
            self.seen.load(Ordering::Relaxed),
            self.duplicates.load(Ordering::Relaxed),
        )
    }

    /// Runs the stage to completion.
    ///
    /// The output is opened append-create, so a run with a loaded filter
    /// extends the output of the run that saved it. If a save path was
    /// configured, the bitmap is written after the workers have joined,
    /// before returning.
    pub fn run(&self) -> Result<()> {
        let mut filter = BloomFilter::new(self.filter_bits, self.filter_hashes);
        if let Some(load) = &self.filter_load {
            if load.exists() {
                let mut f = File::open(load)
                    .with_context(|| format!("opening filter {}", load.display()))?;
                filter = BloomFilter::read_from(&mut f)
                    .with_context(|| format!("loading filter {}", load.display()))?;
                info!(path = %load.display(), "loaded bloom filter");
            }
        }

        let output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output)
            .with_context(|| format!("opening output {}", self.output.display()))?;

        let filter = Mutex::new(filter);
        let output = Mutex::new(BufWriter::new(output));

        let (line_tx, line_rx) = bounded::<String>(LINE_QUEUE_CAPACITY);
        thread::scope(|s| -> Result<()> {
            let reader = s.spawn(|| read_targets(&self.targets, line_tx));

            let mut handles = Vec::with_capacity(self.workers);
            for _ in 0..self.workers {
                let rx = line_rx.clone();
                handles.push(s.spawn(|| self.dedupe_worker(rx, &filter, &output)));
            }
            drop(line_rx);

            for handle in handles {
                match handle.join() {
                    Ok(result) => result?,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            match reader.join() {
                Ok(result) => result?,
                Err(panic) => std::panic::resume_unwind(panic),
            }
            Ok(())
        })?;

        let mut output = output
            .into_inner()
            .map_err(|e| anyhow!("output lock poisoned: {}", e))?;
        output.flush()?;

        let filter = filter
            .into_inner()
            .map_err(|e| anyhow!("filter lock poisoned: {}", e))?;
        if let Some(save) = &self.filter_save {
            let mut f = File::create(save)
                .with_context(|| format!("creating filter {}", save.display()))?;
            filter.write_to(&mut f)?;
            info!(path = %save.display(), "saved bloom filter");
        }

        let (seen, duplicates) = self.progress();
        debug!(seen, duplicates, "dedup finished");
        Ok(())
    }

    fn dedupe_worker(
        &self,
        rx: Receiver<String>,
        filter: &Mutex<BloomFilter>,
        output: &Mutex<BufWriter<File>>,
    ) -> Result<()> {
        while let Ok(raw) = rx.recv() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            self.seen.fetch_add(1, Ordering::Relaxed);

            let present = {
                let mut filter = filter
                    .lock()
                    .map_err(|e| anyhow!("filter lock poisoned: {}", e))?;
                filter.test_and_add(line.as_bytes())
            };
            if present {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let mut out = output
                .lock()
                .map_err(|e| anyhow!("output lock poisoned: {}", e))?;
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Reader task: streams every target file line by line into the queue.
fn read_targets(targets: &[PathBuf], tx: Sender<String>) -> Result<()> {
    for target in targets {
        let file =
            File::open(target).with_context(|| format!("opening {}", target.display()))?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        loop {
            line.clear();
            if reader
                .read_line(&mut line)
                .with_context(|| format!("reading {}", target.display()))?
                == 0
            {
                break;
            }
            if tx.send(std::mem::take(&mut line)).is_err() {
                // Every worker exited early; their errors surface at join.
                return Ok(());
            }
        }
    }
    Ok(())
}

/// A file target is itself; a directory target is every regular file
/// directly inside it.
fn collect_targets(target: &Path) -> Result<Vec<PathBuf>> {
    let meta = fs::metadata(target)
        .with_context(|| format!("target {} does not exist", target.display()))?;
    if meta.is_file() {
        return Ok(vec![target.to_path_buf()]);
    }
    let mut targets: Vec<PathBuf> = fs::read_dir(target)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    targets.sort();
    Ok(targets)
}
