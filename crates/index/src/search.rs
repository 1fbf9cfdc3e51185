//! Binary-search point lookups against a sorted index, resolving matches
//! to full credential records via their corpus offsets.

use anyhow::{anyhow, bail, Context, Result};
use credentials::{read_line_at, Credential};
use crossbeam_channel::Sender;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use crate::format::{needle, Entry, ENTRY_SIZE};

/// Point-lookup reader over a deduplicated corpus and one sorted index.
///
/// Persistent file handles are kept open for the lifetime of the searcher,
/// wrapped in `Mutex` so [`find`](Searcher::find) can be called through a
/// shared `&self` reference. Each probe is a single seek + 12-byte read
/// into the index; each match adds one seek + line read into the corpus.
pub struct Searcher {
    target: Mutex<File>,
    index: Mutex<File>,
    num_entries: u64,
    messages: Option<Sender<String>>,
}

impl Searcher {
    /// Opens the corpus and index files.
    ///
    /// Fails if either file is missing or the index is not a whole number
    /// of 12-byte entries.
    pub fn open(target: &Path, index: &Path) -> Result<Self> {
        let meta = fs::metadata(index)
            .with_context(|| format!("index {} does not exist", index.display()))?;
        if meta.len() % ENTRY_SIZE as u64 != 0 {
            bail!(
                "irregular index size: {} bytes is not a multiple of {}",
                meta.len(),
                ENTRY_SIZE
            );
        }
        let target_file = File::open(target)
            .with_context(|| format!("corpus {} does not exist", target.display()))?;
        let index_file = File::open(index)
            .with_context(|| format!("opening {}", index.display()))?;
        Ok(Self {
            target: Mutex::new(target_file),
            index: Mutex::new(index_file),
            num_entries: meta.len() / ENTRY_SIZE as u64,
            messages: None,
        })
    }

    /// Attaches an informational message channel. The caller must drain
    /// it, or sends on a bounded channel will block the lookup.
    pub fn set_messages(&mut self, messages: Sender<String>) {
        self.messages = Some(messages);
    }

    /// Number of entries in the index.
    #[must_use]
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Returns every credential whose indexed key shares `value`'s 48-bit
    /// digest, in index order.
    ///
    /// Matches are *not* post-filtered against `value`: a low-48-bit
    /// SHA-256 collision (or a lookup against an index keyed on a
    /// different field) returns whatever records the matching offsets
    /// resolve to. Callers that need collision safety compare the returned
    /// fields against the query. An offset that resolves to malformed
    /// JSON yields an empty-fielded record rather than an error.
    pub fn find(&self, value: &str) -> Result<Vec<Credential>> {
        let needle = needle(value);
        self.say(format!("searching {} entries for {:012x}", self.num_entries, needle));

        let Some(hit) = self.walk(needle)? else {
            self.say("no matching digest".to_string());
            return Ok(Vec::new());
        };

        // Walk backward to the first entry sharing the digest — equal
        // values are contiguous in a sorted index.
        let mut first = hit;
        while first > 0 && self.entry_at(first - 1)?.value() == needle {
            first -= 1;
        }

        let mut results = Vec::new();
        let mut position = first;
        while position < self.num_entries {
            let entry = self.entry_at(position)?;
            if entry.value() != needle {
                break;
            }
            results.push(self.credential_at(entry.offset())?);
            position += 1;
        }

        self.say(format!("found {} results", results.len()));
        Ok(results)
    }

    /// Classic half-interval search for any entry with the given value.
    fn walk(&self, needle: u64) -> Result<Option<u64>> {
        let mut lower: i64 = 0;
        let mut upper: i64 = self.num_entries as i64 - 1;
        while lower <= upper {
            let middle = lower + (upper - lower) / 2;
            let value = self.entry_at(middle as u64)?.value();
            if needle < value {
                upper = middle - 1;
            } else if value < needle {
                lower = middle + 1;
            } else {
                return Ok(Some(middle as u64));
            }
        }
        Ok(None)
    }

    /// Reads the 12-byte record at entry index `position`.
    fn entry_at(&self, position: u64) -> Result<Entry> {
        let mut file = self
            .index
            .lock()
            .map_err(|e| anyhow!("index lock poisoned: {}", e))?;
        file.seek(SeekFrom::Start(position * ENTRY_SIZE as u64))?;
        Ok(Entry::read_from(&mut *file)?)
    }

    /// Reads and decodes the corpus line starting at `offset`.
    fn credential_at(&self, offset: u64) -> Result<Credential> {
        let mut file = self
            .target
            .lock()
            .map_err(|e| anyhow!("corpus lock poisoned: {}", e))?;
        let line = read_line_at(&mut *file, offset)?;
        Ok(serde_json::from_str(&line).unwrap_or_default())
    }

    fn say(&self, message: String) {
        if let Some(tx) = &self.messages {
            let _ = tx.send(message);
        }
    }
}
