//! The indexer: corpus file → unsorted index, partitioned across workers
//! by byte offset so each line is processed exactly once.

use anyhow::{bail, Context, Result};
use credentials::{Credential, IndexKey};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::debug;

use crate::format::{digest6, Entry};

/// One worker's contiguous byte range of the source file.
///
/// `stop` is the offset of the newline terminating the partition's last
/// line (or the file size, for the final partition); the next partition
/// starts one byte past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub start: u64,
    pub stop: u64,
}

/// Produces an unsorted index of a corpus file under one key.
///
/// Each worker owns a byte range of the source, opens its own file
/// handles, and writes entries into a private partition file; the
/// partition files are concatenated in worker order at the end, so no
/// locking is needed anywhere on the write path.
pub struct Indexer {
    target: PathBuf,
    output: PathBuf,
    key: IndexKey,
    temp_dir: PathBuf,
    no_cleanup: bool,
    partitions: Vec<Partition>,
    counters: Vec<AtomicU64>,
}

impl Indexer {
    /// Plans an indexing run: stats the target and divides it into at most
    /// `workers` newline-aligned partitions.
    ///
    /// Fails up front on a missing or empty target, or on a source whose
    /// first chunk contains no newline at all (the partition boundary scan
    /// would otherwise never terminate).
    pub fn new(
        target: &Path,
        output: &Path,
        key: IndexKey,
        workers: usize,
        temp_dir: &Path,
        no_cleanup: bool,
    ) -> Result<Self> {
        let workers = workers.max(1);
        let partitions = divide_labor(target, workers)
            .with_context(|| format!("partitioning {}", target.display()))?;
        let counters = partitions.iter().map(|_| AtomicU64::new(0)).collect();
        Ok(Self {
            target: target.to_path_buf(),
            output: output.to_path_buf(),
            key,
            temp_dir: temp_dir.join(".indexes"),
            no_cleanup,
            partitions,
            counters,
        })
    }

    /// The planned byte ranges, one per worker.
    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Lines indexed so far, summed across workers.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Runs every worker to completion, then concatenates the partition
    /// files (in worker order) into the output.
    ///
    /// Partition files and the scratch directory are removed on success
    /// unless `no_cleanup` was set.
    pub fn run(&self) -> Result<()> {
        fs::create_dir_all(&self.temp_dir)
            .with_context(|| format!("creating {}", self.temp_dir.display()))?;

        thread::scope(|s| -> Result<()> {
            let mut handles = Vec::with_capacity(self.partitions.len());
            for (id, partition) in self.partitions.iter().enumerate() {
                let counter = &self.counters[id];
                let path = self.partition_path(id);
                handles.push(s.spawn(move || self.index_partition(*partition, &path, counter)));
            }
            for (id, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(result) => {
                        result.with_context(|| format!("index worker {} failed", id))?;
                    }
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok(())
        })?;

        debug!(
            entries = self.count(),
            partitions = self.partitions.len(),
            key = %self.key,
            "indexed corpus"
        );
        self.merge_partitions()
    }

    /// `{worker_id}_{output_basename}` inside the scratch directory.
    fn partition_path(&self, id: usize) -> PathBuf {
        let base = self
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        self.temp_dir.join(format!("{}_{}", id, base))
    }

    /// One worker: read lines in `[start, stop]`, emit one entry per
    /// non-empty line into the private partition file.
    ///
    /// A line that fails to decode as a credential still produces an entry
    /// — its key is the empty string, so the entry digests "".
    fn index_partition(
        &self,
        partition: Partition,
        path: &Path,
        counter: &AtomicU64,
    ) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        let mut reader = BufReader::new(File::open(&self.target)?);
        reader.seek(SeekFrom::Start(partition.start))?;

        let mut position = partition.start;
        let mut raw = String::new();
        loop {
            raw.clear();
            let consumed = reader.read_line(&mut raw)? as u64;
            if consumed == 0 {
                break;
            }
            let line = raw.trim_end_matches('\n');
            if !line.is_empty() {
                let cred: Credential = serde_json::from_str(line).unwrap_or_default();
                let entry = Entry::new(digest6(cred.field(self.key)), position);
                entry.write_to(&mut out)?;
                counter.fetch_add(1, Ordering::Relaxed);
            }
            position += consumed;
            if partition.stop <= position {
                break;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn merge_partitions(&self) -> Result<()> {
        let mut out = BufWriter::new(
            File::create(&self.output)
                .with_context(|| format!("creating {}", self.output.display()))?,
        );
        for id in 0..self.partitions.len() {
            let path = self.partition_path(id);
            let mut part = File::open(&path)
                .with_context(|| format!("opening partition {}", path.display()))?;
            io::copy(&mut part, &mut out)?;
            if !self.no_cleanup {
                fs::remove_file(&path)?;
            }
        }
        out.flush()?;
        if !self.no_cleanup {
            // Best effort: the scratch dir may be shared with another run.
            let _ = fs::remove_dir(&self.temp_dir);
        }
        Ok(())
    }
}

/// Divides the target into at most `workers` byte ranges, each ending on a
/// newline, so no line is ever split across workers.
///
/// The boundary cursor for each non-final worker starts at `i · chunk` and
/// backs up one byte at a time until it lands on a `\n`; backing up past
/// the partition's own start means the source has a line longer than a
/// whole chunk and is rejected.
pub(crate) fn divide_labor(target: &Path, workers: usize) -> Result<Vec<Partition>> {
    let meta = fs::metadata(target)
        .with_context(|| format!("target {} does not exist", target.display()))?;
    if !meta.is_file() {
        bail!("target is not a regular file");
    }
    let size = meta.len();
    if size == 0 {
        bail!("target is empty");
    }

    let mut file = File::open(target)?;
    let chunk = size.div_ceil(workers as u64);

    let mut partitions = Vec::with_capacity(workers);
    let mut position = 0u64;
    for _ in 0..workers - 1 {
        let mut cursor = position + chunk;
        if cursor >= size {
            break;
        }
        loop {
            if read_byte_at(&mut file, cursor)? == b'\n' {
                break;
            }
            if cursor == position {
                bail!("no newline within a {} byte chunk", chunk);
            }
            cursor -= 1;
        }
        partitions.push(Partition {
            start: position,
            stop: cursor,
        });
        position = cursor + 1;
    }
    partitions.push(Partition {
        start: position,
        stop: size,
    });
    Ok(partitions)
}

fn read_byte_at(file: &mut File, offset: u64) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf[0])
}
