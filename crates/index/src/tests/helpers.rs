use credentials::Credential;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::format::Entry;

/// Writes `creds` as a JSON Lines corpus, returning each line's start
/// offset.
pub fn write_corpus(path: &Path, creds: &[Credential]) -> Vec<u64> {
    let mut out = BufWriter::new(File::create(path).unwrap());
    let mut offsets = Vec::with_capacity(creds.len());
    let mut position = 0u64;
    for cred in creds {
        let line = serde_json::to_string(cred).unwrap();
        offsets.push(position);
        out.write_all(line.as_bytes()).unwrap();
        out.write_all(b"\n").unwrap();
        position += line.len() as u64 + 1;
    }
    out.flush().unwrap();
    offsets
}

/// A deterministic corpus: `n` unique users spread over seven domains.
pub fn sample_creds(n: usize) -> Vec<Credential> {
    (0..n)
        .map(|i| {
            Credential::from_email_password(
                &format!("user{:04}@domain{}.example", i, i % 7),
                &format!("pw{:04}", i),
            )
            .unwrap()
        })
        .collect()
}

/// xorshift64 — deterministic scrambled values without pulling in an RNG.
pub fn xorshift(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *state = x;
    x
}

/// `n` entries with scrambled digests and offsets `0, 12, 24, ...`.
pub fn scrambled_entries(n: usize, seed: u64) -> Vec<Entry> {
    let mut state = seed;
    (0..n)
        .map(|i| {
            let mut digest = [0u8; 6];
            digest.copy_from_slice(&xorshift(&mut state).to_le_bytes()[..6]);
            Entry::new(digest, (i * 12) as u64)
        })
        .collect()
}

pub fn write_entries(path: &Path, entries: &[Entry]) {
    let mut out = BufWriter::new(File::create(path).unwrap());
    for entry in entries {
        entry.write_to(&mut out).unwrap();
    }
    out.flush().unwrap();
}

pub fn read_entries(path: &Path) -> Vec<Entry> {
    let mut reader = BufReader::new(File::open(path).unwrap());
    let mut entries = Vec::new();
    while let Ok(entry) = Entry::read_from(&mut reader) {
        entries.push(entry);
    }
    entries
}

/// Multiset view of entries, for permutation checks.
pub fn entry_multiset(entries: &[Entry]) -> HashMap<[u8; 12], usize> {
    let mut counts = HashMap::new();
    for entry in entries {
        *counts.entry(entry.to_bytes()).or_insert(0) += 1;
    }
    counts
}
