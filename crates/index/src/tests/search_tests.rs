use super::helpers::*;
use crate::format::{digest6, Entry};
use crate::search::Searcher;
use crate::sort::Sorter;
use crate::writer::Indexer;
use credentials::{Credential, IndexKey};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Corpus + sorted index for `key`, built through the real pipeline.
fn build_sorted_index(dir: &Path, creds: &[Credential], key: IndexKey) -> (PathBuf, PathBuf) {
    let corpus = dir.join("corpus.json");
    write_corpus(&corpus, creds);

    let unsorted = dir.join(format!("{}-unsorted.idx", key));
    Indexer::new(&corpus, &unsorted, key, 2, dir, false)
        .unwrap()
        .run()
        .unwrap();

    let sorted = dir.join(format!("{}-sorted.idx", key));
    Sorter::new(&unsorted, &sorted, 8 * 1024 * 1024, 2, dir, false)
        .unwrap()
        .start()
        .unwrap();

    (corpus, sorted)
}

fn fixture_creds() -> Vec<Credential> {
    let mut creds = sample_creds(200);
    // Thirteen accounts sharing one domain, one of them a known user.
    for i in 0..13 {
        creds.push(
            Credential::from_email_password(
                &format!("gov-user{}@nsw.gov.au", i),
                &format!("govpw{}", i),
            )
            .unwrap(),
        );
    }
    creds.push(Credential::from_email_password("acirlosmg@nsw.gov.au", "avXtGXM").unwrap());
    creds
}

// -------------------- Lookups --------------------

#[test]
fn email_lookup_returns_exactly_one_credential() {
    let dir = tempdir().unwrap();
    let (corpus, index) = build_sorted_index(dir.path(), &fixture_creds(), IndexKey::Email);

    let searcher = Searcher::open(&corpus, &index).unwrap();
    let results = searcher.find("acirlosmg@nsw.gov.au").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].password, "avXtGXM");
}

#[test]
fn domain_lookup_returns_every_match() {
    let dir = tempdir().unwrap();
    let (corpus, index) = build_sorted_index(dir.path(), &fixture_creds(), IndexKey::Domain);

    let searcher = Searcher::open(&corpus, &index).unwrap();
    let results = searcher.find("nsw.gov.au").unwrap();
    assert_eq!(results.len(), 14);
    for cred in &results {
        assert_eq!(cred.domain, "nsw.gov.au");
    }
}

#[test]
fn user_lookup_returns_exactly_one_credential() {
    let dir = tempdir().unwrap();
    let (corpus, index) = build_sorted_index(dir.path(), &fixture_creds(), IndexKey::User);

    let searcher = Searcher::open(&corpus, &index).unwrap();
    let results = searcher.find("acirlosmg").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].email, "acirlosmg@nsw.gov.au");
    assert_eq!(results[0].password, "avXtGXM");
}

#[test]
fn every_indexed_email_is_findable() {
    let dir = tempdir().unwrap();
    let creds = sample_creds(64);
    let (corpus, index) = build_sorted_index(dir.path(), &creds, IndexKey::Email);

    let searcher = Searcher::open(&corpus, &index).unwrap();
    for cred in &creds {
        let results = searcher.find(&cred.email).unwrap();
        assert_eq!(results.len(), 1, "missing {}", cred.email);
        assert_eq!(results[0].password, cred.password);
    }
}

#[test]
fn miss_returns_empty() {
    let dir = tempdir().unwrap();
    let (corpus, index) = build_sorted_index(dir.path(), &fixture_creds(), IndexKey::Email);

    let searcher = Searcher::open(&corpus, &index).unwrap();
    assert!(searcher.find("nobody@nowhere.example").unwrap().is_empty());
}

#[test]
fn duplicate_records_are_all_returned() {
    let dir = tempdir().unwrap();
    let one = Credential::from_email_password("dup@b.io", "first").unwrap();
    let mut two = one.clone();
    two.password = "second".to_string();
    let mut creds = sample_creds(20);
    creds.push(one);
    creds.push(two);
    let (corpus, index) = build_sorted_index(dir.path(), &creds, IndexKey::Email);

    let searcher = Searcher::open(&corpus, &index).unwrap();
    let results = searcher.find("dup@b.io").unwrap();
    assert_eq!(results.len(), 2);
    let mut passwords: Vec<&str> = results.iter().map(|c| c.password.as_str()).collect();
    passwords.sort_unstable();
    assert_eq!(passwords, ["first", "second"]);
}

// -------------------- Edge cases --------------------

#[test]
fn empty_index_finds_nothing() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.json");
    write_corpus(&corpus, &sample_creds(3));
    let index = dir.path().join("empty.idx");
    fs::write(&index, b"").unwrap();

    let searcher = Searcher::open(&corpus, &index).unwrap();
    assert_eq!(searcher.num_entries(), 0);
    assert!(searcher.find("a@b.io").unwrap().is_empty());
}

#[test]
fn malformed_record_comes_back_with_empty_fields() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.json");
    fs::write(&corpus, "this is not json\n").unwrap();

    // Hand-build a single-entry index pointing the digest of "x" at it.
    let index = dir.path().join("one.idx");
    write_entries(&index, &[Entry::new(digest6("x"), 0)]);

    let searcher = Searcher::open(&corpus, &index).unwrap();
    let results = searcher.find("x").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0], Credential::default());
}

#[test]
fn match_at_first_entry_does_not_underflow() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.json");
    let creds = vec![
        Credential::from_email_password("a@b.io", "pw1").unwrap(),
        Credential::from_email_password("c@d.io", "pw2").unwrap(),
    ];
    let (corpus_path, index) = {
        write_corpus(&corpus, &creds);
        let unsorted = dir.path().join("u.idx");
        Indexer::new(&corpus, &unsorted, IndexKey::Email, 1, dir.path(), false)
            .unwrap()
            .run()
            .unwrap();
        let sorted = dir.path().join("s.idx");
        Sorter::new(&unsorted, &sorted, 1024, 1, dir.path(), false)
            .unwrap()
            .start()
            .unwrap();
        (corpus, sorted)
    };

    let searcher = Searcher::open(&corpus_path, &index).unwrap();
    // Whichever email sorts first must still be findable.
    for cred in &creds {
        assert_eq!(searcher.find(&cred.email).unwrap().len(), 1);
    }
}

#[test]
fn missing_files_are_fatal() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.json");
    write_corpus(&corpus, &sample_creds(2));
    let index = dir.path().join("real.idx");
    write_entries(&index, &[Entry::new([0; 6], 0)]);

    assert!(Searcher::open(&dir.path().join("no-corpus"), &index).is_err());
    assert!(Searcher::open(&corpus, &dir.path().join("no-index")).is_err());
}

#[test]
fn irregular_index_size_is_fatal() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("corpus.json");
    write_corpus(&corpus, &sample_creds(2));
    let index = dir.path().join("bad.idx");
    fs::write(&index, vec![0u8; 10]).unwrap();
    assert!(Searcher::open(&corpus, &index).is_err());
}

#[test]
fn messages_report_the_lookup() {
    let dir = tempdir().unwrap();
    let (corpus, index) = build_sorted_index(dir.path(), &sample_creds(10), IndexKey::Email);

    let mut searcher = Searcher::open(&corpus, &index).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    searcher.set_messages(tx);
    searcher.find("user0000@domain0.example").unwrap();

    let messages: Vec<String> = rx.try_iter().collect();
    assert!(messages.iter().any(|m| m.contains("found 1 results")));
}
