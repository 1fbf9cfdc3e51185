//! # Normalize — raw dump lines → canonical JSON lines
//!
//! Raw credential dumps arrive in a handful of ad-hoc line formats:
//!
//! ```text
//! alice@example.com:hunter2        colon-newline
//! alice@example.com;hunter2        semicolon-newline
//! alice@example.com	hunter2        whitespace-newline
//! ```
//!
//! The normalizer converts each parseable line into one canonical JSON
//! object per line — `{"email","user","domain","password"}` with the email
//! lower-cased and split on the first `@` — and appends it to a JSON Lines
//! output the rest of the pipeline consumes.
//!
//! Lines that do not match the selected format are skipped and counted;
//! they never abort a run. I/O errors do abort the run.

use anyhow::{bail, Context, Result};
use credentials::Credential;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Anchored email matcher shared by all line formats.
const EMAIL_PATTERN: &str = "^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\\.[a-zA-Z0-9-.]{2,63}";
/// Password side: anything that is not a C0/C1 control character.
const PASSWORD_PATTERN: &str = "[^\\x00-\\x1F\\x80-\\x9F]*";

static COLON_NEWLINE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("{}:{}", EMAIL_PATTERN, PASSWORD_PATTERN)).unwrap());
static SEMICOLON_NEWLINE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("{};{}", EMAIL_PATTERN, PASSWORD_PATTERN)).unwrap());
static WHITESPACE_NEWLINE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("{}[ \t]+{}", EMAIL_PATTERN, PASSWORD_PATTERN)).unwrap());

/// Why a single line could not be normalized.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not match the format's pattern.
    #[error("pattern mismatch")]
    PatternMismatch,
    /// The line matched loosely but is missing a field.
    #[error("line is missing a field")]
    MissingField,
}

/// A raw dump line format: a name, a recognizer pattern, and a parser.
///
/// Formats are selected by name at startup and dispatched dynamically; each
/// implementation is a stateless unit struct.
pub trait Format: Send + Sync {
    /// The format's CLI/config name.
    fn name(&self) -> &'static str;
    /// The pattern a line must match before splitting.
    fn pattern(&self) -> &Regex;
    /// Parses one line into a credential record.
    fn parse(&self, line: &str) -> Result<Credential, ParseError>;
}

/// `email:password` — split on the first `:` (the password may itself
/// contain colons).
pub struct ColonNewline;

impl Format for ColonNewline {
    fn name(&self) -> &'static str {
        "colon-newline"
    }

    fn pattern(&self) -> &Regex {
        &COLON_NEWLINE_PATTERN
    }

    fn parse(&self, line: &str) -> Result<Credential, ParseError> {
        split_on(line, ':', self.pattern())
    }
}

/// `email;password` — split on the first `;`.
pub struct SemicolonNewline;

impl Format for SemicolonNewline {
    fn name(&self) -> &'static str {
        "semicolon-newline"
    }

    fn pattern(&self) -> &Regex {
        &SEMICOLON_NEWLINE_PATTERN
    }

    fn parse(&self, line: &str) -> Result<Credential, ParseError> {
        split_on(line, ';', self.pattern())
    }
}

/// `email<ws>password` — split on runs of spaces/tabs, exactly two fields.
pub struct WhitespaceNewline;

impl Format for WhitespaceNewline {
    fn name(&self) -> &'static str {
        "whitespace-newline"
    }

    fn pattern(&self) -> &Regex {
        &WHITESPACE_NEWLINE_PATTERN
    }

    fn parse(&self, line: &str) -> Result<Credential, ParseError> {
        if !self.pattern().is_match(line) {
            return Err(ParseError::PatternMismatch);
        }
        let fields: Vec<&str> = line
            .split(|c| c == ' ' || c == '\t')
            .filter(|f| !f.is_empty())
            .collect();
        if fields.len() != 2 {
            return Err(ParseError::MissingField);
        }
        Credential::from_email_password(fields[0], fields[1]).ok_or(ParseError::PatternMismatch)
    }
}

fn split_on(line: &str, sep: char, pattern: &Regex) -> Result<Credential, ParseError> {
    if !pattern.is_match(line) {
        return Err(ParseError::PatternMismatch);
    }
    let (email, password) = line.split_once(sep).ok_or(ParseError::MissingField)?;
    Credential::from_email_password(email, password).ok_or(ParseError::PatternMismatch)
}

static FORMATS: &[&dyn Format] = &[&ColonNewline, &SemicolonNewline, &WhitespaceNewline];

/// Looks a format up by its name.
#[must_use]
pub fn format_by_name(name: &str) -> Option<&'static dyn Format> {
    FORMATS.iter().find(|f| f.name() == name).copied()
}

/// The names of every supported format.
#[must_use]
pub fn supported_formats() -> Vec<&'static str> {
    FORMATS.iter().map(|f| f.name()).collect()
}

/// The normalization stage: walks targets, parses lines, appends JSON lines.
pub struct Normalizer {
    format: &'static dyn Format,
    targets: Vec<PathBuf>,
    output: PathBuf,
    skip_prefix: Option<String>,
    skip_suffix: Option<String>,

    emitted: u64,
    parse_errors: u64,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("format", &self.format.name())
            .field("targets", &self.targets)
            .field("output", &self.output)
            .field("skip_prefix", &self.skip_prefix)
            .field("skip_suffix", &self.skip_suffix)
            .field("emitted", &self.emitted)
            .field("parse_errors", &self.parse_errors)
            .finish()
    }
}

impl Normalizer {
    /// Creates a normalizer for `target` (a file, or a directory of files —
    /// recursive when asked) writing to `output`.
    ///
    /// Fails if the format name is unknown or the target does not exist.
    pub fn new(
        format_name: &str,
        target: &Path,
        output: &Path,
        recursive: bool,
        skip_prefix: Option<String>,
        skip_suffix: Option<String>,
    ) -> Result<Self> {
        let Some(format) = format_by_name(format_name) else {
            bail!(
                "unknown format '{}' (supported: {})",
                format_name,
                supported_formats().join(", ")
            );
        };
        let targets = collect_targets(target, recursive)
            .with_context(|| format!("resolving target {}", target.display()))?;
        Ok(Self {
            format,
            targets,
            output: output.to_path_buf(),
            skip_prefix,
            skip_suffix,
            emitted: 0,
            parse_errors: 0,
        })
    }

    /// Lines successfully normalized and written so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Lines that failed to parse and were skipped.
    #[must_use]
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors
    }

    /// Runs the stage to completion; returns the number of emitted lines.
    ///
    /// The output is opened append-create, so repeated runs accumulate.
    /// Per-line parse failures are skipped and counted; an I/O error
    /// aborts the run.
    pub fn run(&mut self) -> Result<u64> {
        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output)
            .with_context(|| format!("opening output {}", self.output.display()))?;
        let mut out = BufWriter::new(out);

        for target in self.targets.clone() {
            if let Some(name) = target.file_name().and_then(|n| n.to_str()) {
                if matches!(&self.skip_prefix, Some(p) if name.starts_with(p.as_str())) {
                    continue;
                }
                if matches!(&self.skip_suffix, Some(s) if name.ends_with(s.as_str())) {
                    continue;
                }
            }
            self.normalize_file(&target, &mut out)
                .with_context(|| format!("normalizing {}", target.display()))?;
        }

        out.flush()?;
        Ok(self.emitted)
    }

    fn normalize_file(&mut self, target: &Path, out: &mut BufWriter<File>) -> Result<()> {
        let file = File::open(target)?;
        let mut reader = BufReader::new(file);
        let mut raw = String::new();
        let mut lines = 0u64;
        let mut errors = 0u64;

        loop {
            raw.clear();
            if reader.read_line(&mut raw)? == 0 {
                break;
            }
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            lines += 1;
            match self.format.parse(line) {
                Ok(cred) => {
                    let json = serde_json::to_string(&cred)?;
                    out.write_all(json.as_bytes())?;
                    out.write_all(b"\n")?;
                    self.emitted += 1;
                }
                Err(_) => {
                    errors += 1;
                    self.parse_errors += 1;
                }
            }
        }

        debug!(
            file = %target.display(),
            lines,
            errors,
            "normalized file"
        );
        Ok(())
    }
}

/// Resolves a file-or-directory target into the list of files to read.
fn collect_targets(target: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let meta = fs::metadata(target)
        .with_context(|| format!("target {} does not exist", target.display()))?;
    if meta.is_file() {
        return Ok(vec![target.to_path_buf()]);
    }

    let mut targets = Vec::new();
    let mut stack = vec![target.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        entries.sort();
        for path in entries {
            if path.is_dir() {
                if recursive {
                    stack.push(path);
                }
            } else {
                targets.push(path);
            }
        }
    }
    Ok(targets)
}
