mod dedupe_tests;

use std::fs;
use std::path::Path;

/// Writes `lines` to `path`, one per line.
pub fn write_lines(path: &Path, lines: &[String]) {
    let mut data = lines.join("\n");
    data.push('\n');
    fs::write(path, data).unwrap();
}

/// Reads `path` back as a vec of lines.
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

/// `n` unique normalized JSON lines.
pub fn json_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let cred = credentials::Credential::from_email_password(
                &format!("user{:04}@domain{}.example", i, i % 5),
                &format!("pw{:04}", i),
            )
            .unwrap();
            serde_json::to_string(&cred).unwrap()
        })
        .collect()
}
