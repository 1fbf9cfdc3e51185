//! External merge sort for index files, bounded by a configured memory
//! ceiling.
//!
//! For sorting far more entries than fit in RAM under a ceiling of `M`
//! bytes with `W` workers:
//!
//! 1. Read the unsorted index sequentially into *tapes* of
//!    `ceil(M / W) / 12` entries each. A worker pool sorts each tape in
//!    memory and writes it to its own file, releasing the buffer before
//!    taking the next tape.
//! 2. Give every tape a prefetch window of `ceil(M / (tapes + 1)) / 12`
//!    entries plus one output buffer of the same size, and k-way merge
//!    through a min-heap: pop the smallest entry, append it to the output
//!    buffer, and pull the next entry from the popped entry's tape —
//!    refilling that tape's window from disk whenever it runs dry.
//!
//! Peak memory is one tape buffer per worker during phase 1 and
//! `(tapes + 1)` merge windows during phase 2 — both within a constant
//! multiple of `M` regardless of index size.

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, unbounded, Sender};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::debug;

use crate::format::{Entry, ENTRY_SIZE};

/// Lifecycle of a sort run, for progress consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotStarted,
    Starting,
    Sorting,
    Merging,
}

impl Status {
    fn from_u8(raw: u8) -> Status {
        match raw {
            1 => Status::Starting,
            2 => Status::Sorting,
            3 => Status::Merging,
            _ => Status::NotStarted,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::NotStarted => "Not Started",
            Status::Starting => "Starting",
            Status::Sorting => "Sorting",
            Status::Merging => "Merging",
        })
    }
}

/// Shared, lock-free view of a running sort, safe to poll from another
/// thread while [`Sorter::start`] blocks.
pub struct SortProgress {
    status: AtomicU8,
    tapes_total: AtomicU64,
    tapes_completed: AtomicU64,
    merged: AtomicU64,
    total_entries: u64,
}

impl SortProgress {
    fn new(total_entries: u64) -> Self {
        Self {
            status: AtomicU8::new(0),
            tapes_total: AtomicU64::new(0),
            tapes_completed: AtomicU64::new(0),
            merged: AtomicU64::new(0),
            total_entries,
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Relaxed))
    }

    /// `(completed, total)` tape counts for phase 1.
    #[must_use]
    pub fn tapes(&self) -> (u64, u64) {
        (
            self.tapes_completed.load(Ordering::Relaxed),
            self.tapes_total.load(Ordering::Relaxed),
        )
    }

    /// Approximate merge completion, `0.0 ..= 100.0`.
    #[must_use]
    pub fn merge_percent(&self) -> f64 {
        if self.total_entries == 0 {
            return 0.0;
        }
        (self.merged.load(Ordering::Relaxed) as f64 / self.total_entries as f64) * 100.0
    }

    fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Relaxed);
    }

    fn tape_completed(&self) {
        self.tapes_completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// A contiguous run of entries: loaded into memory and sorted, saved to
/// its own file, then streamed back through a prefetch window during the
/// merge.
///
/// State machine: fresh → in-memory (sorting) → saved → streaming
/// (prefetched) → drained. End-of-tape is `position == size`; drained
/// additionally requires the in-memory window to be consumed.
struct Tape {
    id: usize,
    path: PathBuf,
    entries: Vec<Entry>,
    /// Read cursor into `entries` while streaming.
    head: usize,
    /// Total entries in the tape file.
    size: usize,
    /// Prefetch window length, in entries.
    merge_size: usize,
    /// Next on-disk entry index to prefetch.
    position: usize,
}

impl Tape {
    /// Writes the sorted entries to the tape file and releases the
    /// in-memory buffer.
    fn save(&mut self) -> Result<()> {
        let mut out = BufWriter::new(
            File::create(&self.path)
                .with_context(|| format!("creating tape {}", self.path.display()))?,
        );
        for entry in &self.entries {
            entry.write_to(&mut out)?;
        }
        out.flush()?;
        self.entries = Vec::new();
        self.head = 0;
        Ok(())
    }

    /// Loads up to `merge_size` entries starting at on-disk index
    /// `position` into the window.
    fn prefetch(&mut self, position: usize) -> Result<()> {
        let mut reader = BufReader::new(
            File::open(&self.path)
                .with_context(|| format!("opening tape {}", self.path.display()))?,
        );
        reader.seek(SeekFrom::Start((position * ENTRY_SIZE) as u64))?;

        self.entries.clear();
        self.head = 0;
        let stop = (position + self.merge_size).min(self.size);
        for _ in position..stop {
            self.entries.push(Entry::read_from(&mut reader)?);
        }
        self.position = stop;
        Ok(())
    }

    /// Pops the next entry in tape order, refilling the window from disk
    /// on demand. `None` once the tape is fully drained.
    fn pop(&mut self) -> Result<Option<Entry>> {
        if self.head == self.entries.len() {
            if self.is_end_of_tape() {
                return Ok(None);
            }
            self.prefetch(self.position)?;
        }
        let entry = self.entries[self.head];
        self.head += 1;
        Ok(Some(entry))
    }

    fn is_end_of_tape(&self) -> bool {
        self.position == self.size
    }

    fn is_drained(&self) -> bool {
        self.is_end_of_tape() && self.head == self.entries.len()
    }
}

/// A pending entry from one tape, ordered for min-heap merging.
struct HeapItem {
    entry: Entry,
    /// Index into the sorter's tape list.
    tape: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.entry.value() == other.entry.value() && self.tape == other.tape
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; we want the *smallest* value first, so
        // reverse the comparison. On tie, prefer the lower tape index
        // (arbitrary but deterministic).
        other
            .entry
            .value()
            .cmp(&self.entry.value())
            .then_with(|| other.tape.cmp(&self.tape))
    }
}

/// Rewrites an unsorted index as a globally digest-ordered sorted index.
pub struct Sorter {
    index_path: PathBuf,
    output_path: PathBuf,
    total_entries: u64,
    max_memory: usize,
    workers: usize,
    tape_dir: PathBuf,
    no_cleanup: bool,
    tapes: Vec<Tape>,
    progress: Arc<SortProgress>,
    messages: Option<Sender<String>>,
}

impl Sorter {
    /// Plans a sort of `index` into `output` under a ceiling of
    /// `max_memory` bytes, using up to `workers` sort workers and a
    /// `.tapes` scratch directory under `temp_dir`.
    ///
    /// Fails up front if the index is missing, empty, not a regular file,
    /// or not a whole number of 12-byte entries.
    pub fn new(
        index: &Path,
        output: &Path,
        max_memory: usize,
        workers: usize,
        temp_dir: &Path,
        no_cleanup: bool,
    ) -> Result<Self> {
        let meta = fs::metadata(index)
            .with_context(|| format!("index {} does not exist", index.display()))?;
        if !meta.is_file() {
            bail!("invalid index file: not a regular file");
        }
        if meta.len() == 0 {
            bail!("invalid index file: empty");
        }
        if meta.len() % ENTRY_SIZE as u64 != 0 {
            bail!(
                "invalid index file: {} bytes is not a multiple of {}",
                meta.len(),
                ENTRY_SIZE
            );
        }

        let total_entries = meta.len() / ENTRY_SIZE as u64;
        Ok(Self {
            index_path: index.to_path_buf(),
            output_path: output.to_path_buf(),
            total_entries,
            max_memory: max_memory.max(ENTRY_SIZE),
            workers: workers.max(1),
            tape_dir: temp_dir.join(".tapes"),
            no_cleanup,
            tapes: Vec::new(),
            progress: Arc::new(SortProgress::new(total_entries)),
            messages: None,
        })
    }

    /// Attaches an informational message channel. The caller must drain
    /// it, or sends on a bounded channel will block the sort.
    pub fn set_messages(&mut self, messages: Sender<String>) {
        self.messages = Some(messages);
    }

    /// A shared progress handle, pollable while `start` runs.
    #[must_use]
    pub fn progress(&self) -> Arc<SortProgress> {
        Arc::clone(&self.progress)
    }

    /// Number of entries in the input index.
    #[must_use]
    pub fn total_entries(&self) -> u64 {
        self.total_entries
    }

    /// Runs both phases to completion. The sorted output lands at the
    /// configured path via temp file + atomic rename; tape files are
    /// removed only on success, unless `no_cleanup` was set.
    pub fn start(&mut self) -> Result<()> {
        self.progress.set_status(Status::Starting);
        fs::create_dir_all(&self.tape_dir)
            .with_context(|| format!("creating {}", self.tape_dir.display()))?;

        // Parameter derivation from the memory ceiling.
        let worker_buf = self.max_memory.div_ceil(self.workers);
        let entries_per_tape = worker_buf.div_ceil(ENTRY_SIZE);
        let num_tapes = (self.total_entries as usize).div_ceil(entries_per_tape);
        let per_tape_merge_buf = self.max_memory.div_ceil(num_tapes + 1);
        let merge_buf_len = per_tape_merge_buf.div_ceil(ENTRY_SIZE).max(1);

        self.progress
            .tapes_total
            .store(num_tapes as u64, Ordering::Relaxed);
        self.say(format!(
            "sorting {} entries across {} tapes",
            self.total_entries, num_tapes
        ));
        debug!(
            entries = self.total_entries,
            num_tapes, entries_per_tape, merge_buf_len, "derived sort parameters"
        );

        self.create_and_sort_tapes(num_tapes, entries_per_tape, merge_buf_len)?;
        self.merge_tapes(merge_buf_len)?;

        if !self.no_cleanup {
            fs::remove_dir_all(&self.tape_dir)?;
        }
        Ok(())
    }

    /// Phase 1: cut the index into tapes and hand each to the worker pool
    /// over a rendezvous channel; workers sort in place and save. Dropping
    /// the channel after the last tape is the quit signal.
    fn create_and_sort_tapes(
        &mut self,
        num_tapes: usize,
        entries_per_tape: usize,
        merge_buf_len: usize,
    ) -> Result<()> {
        let (tape_tx, tape_rx) = bounded::<Tape>(0);
        let (done_tx, done_rx) = unbounded::<Tape>();
        let mut reader = BufReader::new(
            File::open(&self.index_path)
                .with_context(|| format!("opening {}", self.index_path.display()))?,
        );

        self.progress.set_status(Status::Sorting);
        thread::scope(|s| -> Result<()> {
            let mut handles = Vec::with_capacity(self.workers);
            for _ in 0..self.workers {
                let rx = tape_rx.clone();
                let tx = done_tx.clone();
                let progress = Arc::clone(&self.progress);
                handles.push(s.spawn(move || -> Result<()> {
                    while let Ok(mut tape) = rx.recv() {
                        tape.entries.sort_unstable_by_key(|e| e.value());
                        tape.save()?;
                        progress.tape_completed();
                        // Receiver lives on the parent thread.
                        let _ = tx.send(tape);
                    }
                    Ok(())
                }));
            }
            drop(tape_rx);
            drop(done_tx);

            for id in 0..num_tapes {
                let tape = self.create_tape(id, entries_per_tape, merge_buf_len, &mut reader)?;
                if tape_tx.send(tape).is_err() {
                    // Every worker exited early; their errors surface below.
                    break;
                }
            }
            drop(tape_tx);

            for handle in handles {
                match handle.join() {
                    Ok(result) => result?,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok(())
        })?;

        let mut tapes: Vec<Tape> = done_rx.into_iter().collect();
        tapes.sort_by_key(|t| t.id);
        if tapes.len() != num_tapes {
            bail!("sorted {} of {} tapes", tapes.len(), num_tapes);
        }
        self.tapes = tapes;
        Ok(())
    }

    /// Reads the next `entries_per_tape` entries (or whatever remains)
    /// into a fresh tape.
    fn create_tape(
        &self,
        id: usize,
        entries_per_tape: usize,
        merge_buf_len: usize,
        reader: &mut BufReader<File>,
    ) -> Result<Tape> {
        let base = self
            .index_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());

        let mut entries = Vec::with_capacity(entries_per_tape);
        for _ in 0..entries_per_tape {
            match Entry::read_from(reader) {
                Ok(entry) => entries.push(entry),
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
        }
        let size = entries.len();
        Ok(Tape {
            id,
            path: self.tape_dir.join(format!("{}_{}.tape", base, id)),
            entries,
            head: 0,
            size,
            merge_size: merge_buf_len,
            position: 0,
        })
    }

    /// Phase 2: k-way merge through a min-heap seeded with the head of
    /// every tape.
    fn merge_tapes(&mut self, merge_buf_len: usize) -> Result<()> {
        self.progress.set_status(Status::Merging);
        self.say("merging tapes".to_string());

        for tape in &mut self.tapes {
            tape.prefetch(0)?;
        }
        let mut heap: BinaryHeap<HeapItem> = BinaryHeap::with_capacity(self.tapes.len());
        for (idx, tape) in self.tapes.iter_mut().enumerate() {
            if let Some(entry) = tape.pop()? {
                heap.push(HeapItem { entry, tape: idx });
            }
        }

        let tmp_path = self.output_path.with_extension("tmp");
        let mut out = BufWriter::new(
            File::create(&tmp_path)
                .with_context(|| format!("creating {}", tmp_path.display()))?,
        );

        let mut output_buf: Vec<Entry> = Vec::with_capacity(merge_buf_len + 1);
        let mut emitted: u64 = 0;
        // Integer math makes the percent-update modulus zero below 100
        // entries; floor it at 1.
        let modulus = (self.total_entries / 100).max(1);

        loop {
            let Some(item) = heap.pop() else {
                // The heap holds one entry per non-drained tape, so
                // underflow before completion is a bug, not an I/O state.
                panic!("merge heap underflow before all tapes drained");
            };
            output_buf.push(item.entry);
            emitted += 1;
            if emitted % modulus == 0 {
                self.progress.merged.store(emitted, Ordering::Relaxed);
            }

            if output_buf.len() > merge_buf_len {
                drain(&mut out, &output_buf)?;
                output_buf.clear();
            }

            if let Some(next) = self.tapes[item.tape].pop()? {
                heap.push(HeapItem {
                    entry: next,
                    tape: item.tape,
                });
            }

            if heap.is_empty() && self.tapes.iter().all(Tape::is_drained) {
                break;
            }
        }

        drain(&mut out, &output_buf)?;
        out.flush()?;
        out.into_inner()
            .map_err(|e| anyhow::anyhow!("flushing sorted output: {}", e))?
            .sync_all()?;
        fs::rename(&tmp_path, &self.output_path)
            .with_context(|| format!("renaming into {}", self.output_path.display()))?;

        self.progress
            .merged
            .store(self.total_entries, Ordering::Relaxed);
        self.say(format!("merged {} entries", emitted));
        Ok(())
    }

    fn say(&self, message: String) {
        if let Some(tx) = &self.messages {
            let _ = tx.send(message);
        }
    }
}

fn drain(out: &mut BufWriter<File>, buf: &[Entry]) -> Result<()> {
    for entry in buf {
        entry.write_to(out)?;
    }
    Ok(())
}

/// Verifies that `index` is a well-formed sorted index: a whole number of
/// 12-byte entries in non-decreasing digest-value order.
pub fn check_sort<P: AsRef<Path>>(index: P) -> Result<()> {
    let index = index.as_ref();
    let meta = fs::metadata(index)
        .with_context(|| format!("index {} does not exist", index.display()))?;
    if !meta.is_file() {
        bail!("invalid index file: not a regular file");
    }
    if meta.len() % ENTRY_SIZE as u64 != 0 {
        bail!(
            "irregular index size: {} bytes is not a multiple of {}",
            meta.len(),
            ENTRY_SIZE
        );
    }

    let mut reader = BufReader::new(File::open(index)?);
    let mut previous: Option<u64> = None;
    for position in 0..meta.len() / ENTRY_SIZE as u64 {
        let entry = Entry::read_from(&mut reader)?;
        if let Some(prev) = previous {
            if entry.value() < prev {
                bail!(
                    "index is not sorted at entry {}: {} < {}",
                    position,
                    entry.value(),
                    prev
                );
            }
        }
        previous = Some(entry.value());
    }
    Ok(())
}
