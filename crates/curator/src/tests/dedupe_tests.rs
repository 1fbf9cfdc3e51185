use super::{json_lines, read_lines, write_lines};
use crate::dedupe::Bloomer;
use std::fs;
use tempfile::tempdir;

const TEST_FILTER_BITS: u64 = 1 << 20;
const TEST_FILTER_HASHES: u32 = 4;

fn bloom_once(input_lines: &[String], workers: usize) -> Vec<String> {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.json");
    let output = dir.path().join("bloomed.json");
    write_lines(&input, input_lines);

    Bloomer::new(
        &input,
        &output,
        workers,
        TEST_FILTER_BITS,
        TEST_FILTER_HASHES,
        None,
        None,
    )
    .unwrap()
    .run()
    .unwrap();
    read_lines(&output)
}

// -------------------- Deduplication --------------------

#[test]
fn doubled_input_dedupes_to_unique_lines() {
    let unique = json_lines(50);
    let mut doubled = unique.clone();
    doubled.extend(unique.clone());

    let out = bloom_once(&doubled, 2);
    assert_eq!(out.len(), 50);

    let mut sorted_out = out.clone();
    sorted_out.sort();
    let mut sorted_unique = unique;
    sorted_unique.sort();
    assert_eq!(sorted_out, sorted_unique);
}

#[test]
fn unique_input_passes_through() {
    let unique = json_lines(8_000);
    let out = bloom_once(&unique, 4);
    assert_eq!(out.len(), 8_000);
}

#[test]
fn deduping_the_output_is_the_identity() {
    let mut doubled = json_lines(100);
    doubled.extend(doubled.clone());

    let dir = tempdir().unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");
    write_lines(&first, &bloom_once(&doubled, 2));

    Bloomer::new(
        &first,
        &second,
        1,
        TEST_FILTER_BITS,
        TEST_FILTER_HASHES,
        None,
        None,
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(read_lines(&second), read_lines(&first));
}

#[test]
fn progress_counts_lines_and_duplicates() {
    let unique = json_lines(30);
    let mut doubled = unique.clone();
    doubled.extend(unique);

    let dir = tempdir().unwrap();
    let input = dir.path().join("input.json");
    let output = dir.path().join("bloomed.json");
    write_lines(&input, &doubled);

    let bloomer = Bloomer::new(
        &input,
        &output,
        2,
        TEST_FILTER_BITS,
        TEST_FILTER_HASHES,
        None,
        None,
    )
    .unwrap();
    bloomer.run().unwrap();

    let (seen, duplicates) = bloomer.progress();
    assert_eq!(seen, 60);
    assert_eq!(duplicates, 30);
}

#[test]
fn blank_and_whitespace_lines_are_dropped() {
    let lines = vec![
        "{\"email\":\"a@b.io\"}".to_string(),
        "".to_string(),
        "   ".to_string(),
        "{\"email\":\"c@d.io\"}".to_string(),
    ];
    let out = bloom_once(&lines, 1);
    assert_eq!(out.len(), 2);
}

#[test]
fn lines_are_trimmed_before_keying() {
    let lines = vec![
        "{\"email\":\"a@b.io\"}   ".to_string(),
        "  {\"email\":\"a@b.io\"}".to_string(),
    ];
    let out = bloom_once(&lines, 1);
    assert_eq!(out, vec!["{\"email\":\"a@b.io\"}".to_string()]);
}

// -------------------- Directory targets --------------------

#[test]
fn directory_target_reads_every_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("drops");
    fs::create_dir(&input).unwrap();
    write_lines(&input.join("a.json"), &json_lines(10));
    write_lines(&input.join("b.json"), &json_lines(10)); // same 10 lines again
    let output = dir.path().join("bloomed.json");

    Bloomer::new(
        &input,
        &output,
        2,
        TEST_FILTER_BITS,
        TEST_FILTER_HASHES,
        None,
        None,
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(read_lines(&output).len(), 10);
}

// -------------------- Filter persistence --------------------

#[test]
fn load_filter_then_bloom_equals_bloom_of_concat() {
    let all = json_lines(40);
    let (first_half, second_half) = all.split_at(20);
    // The second drop repeats part of the first.
    let mut second_drop = second_half.to_vec();
    second_drop.extend(first_half[..5].to_vec());

    let dir = tempdir().unwrap();
    let filter_path = dir.path().join("filter.bloom");

    // Incremental: first drop with save, second drop with load, shared
    // append-create output.
    let incremental_out = dir.path().join("incremental.json");
    let drop1 = dir.path().join("drop1.json");
    write_lines(&drop1, first_half);
    Bloomer::new(
        &drop1,
        &incremental_out,
        1,
        TEST_FILTER_BITS,
        TEST_FILTER_HASHES,
        None,
        Some(filter_path.clone()),
    )
    .unwrap()
    .run()
    .unwrap();

    let drop2 = dir.path().join("drop2.json");
    write_lines(&drop2, &second_drop);
    Bloomer::new(
        &drop2,
        &incremental_out,
        1,
        TEST_FILTER_BITS,
        TEST_FILTER_HASHES,
        Some(filter_path),
        None,
    )
    .unwrap()
    .run()
    .unwrap();

    // One-shot over the concatenated input.
    let mut concat = first_half.to_vec();
    concat.extend(second_drop);
    let oneshot = bloom_once(&concat, 1);

    assert_eq!(read_lines(&incremental_out), oneshot);
}

#[test]
fn missing_load_path_starts_fresh() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.json");
    let output = dir.path().join("out.json");
    write_lines(&input, &json_lines(5));

    Bloomer::new(
        &input,
        &output,
        1,
        TEST_FILTER_BITS,
        TEST_FILTER_HASHES,
        Some(dir.path().join("never-saved.bloom")),
        None,
    )
    .unwrap()
    .run()
    .unwrap();
    assert_eq!(read_lines(&output).len(), 5);
}

// -------------------- Failures --------------------

#[test]
fn missing_target_is_fatal() {
    let dir = tempdir().unwrap();
    assert!(Bloomer::new(
        &dir.path().join("nope.json"),
        &dir.path().join("out.json"),
        1,
        TEST_FILTER_BITS,
        TEST_FILTER_HASHES,
        None,
        None,
    )
    .is_err());
}

#[test]
fn empty_directory_is_fatal() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("empty");
    fs::create_dir(&input).unwrap();
    assert!(Bloomer::new(
        &input,
        &dir.path().join("out.json"),
        1,
        TEST_FILTER_BITS,
        TEST_FILTER_HASHES,
        None,
        None,
    )
    .is_err());
}
