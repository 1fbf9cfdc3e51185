//! Shared record types for the LeakDB corpus.
//!
//! A deduplicated corpus is a UTF-8 JSON Lines file: one [`Credential`]
//! object per line, terminated by `\n`, with no surrounding whitespace.
//! Line-start byte offsets are stable once the file is written — they are
//! what the on-disk indexes point back into.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::str::FromStr;
use thiserror::Error;

/// A single credential record, one corpus line.
///
/// Every field defaults to the empty string so that a malformed or partial
/// JSON line decodes to an empty-fielded record instead of failing the
/// stage that is walking the corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub password: String,
}

impl Credential {
    /// Builds a record from an already-validated email and password.
    ///
    /// The email is lower-cased first; `user` and `domain` come from the
    /// split on the first `@`. Returns `None` if the email has no `@`.
    pub fn from_email_password(email: &str, password: &str) -> Option<Self> {
        let email = email.to_lowercase();
        let (user, domain) = email.split_once('@')?;
        Some(Self {
            user: user.to_string(),
            domain: domain.to_string(),
            email,
            password: password.to_string(),
        })
    }

    /// Returns the field an index keyed on `key` digests.
    #[must_use]
    pub fn field(&self, key: IndexKey) -> &str {
        match key {
            IndexKey::Email => &self.email,
            IndexKey::User => &self.user,
            IndexKey::Domain => &self.domain,
            IndexKey::Password => &self.password,
        }
    }
}

/// The credential field an index is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Email,
    User,
    Domain,
    Password,
}

/// Returned when an index key name does not match any [`IndexKey`].
#[derive(Debug, Error)]
#[error("invalid index key '{0}'")]
pub struct UnknownKey(pub String);

impl IndexKey {
    /// All keys, in the order the pipeline builds indexes for them.
    pub const ALL: [IndexKey; 4] = [
        IndexKey::Email,
        IndexKey::User,
        IndexKey::Domain,
        IndexKey::Password,
    ];

    /// The key's wire/CLI name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            IndexKey::Email => "email",
            IndexKey::User => "user",
            IndexKey::Domain => "domain",
            IndexKey::Password => "password",
        }
    }
}

impl FromStr for IndexKey {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(IndexKey::Email),
            "user" => Ok(IndexKey::User),
            "domain" => Ok(IndexKey::Domain),
            "password" => Ok(IndexKey::Password),
            other => Err(UnknownKey(other.to_string())),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reads the line beginning at byte `offset`, without the trailing `\n`.
///
/// The reader's cursor position after the call is unspecified (a buffered
/// reader may have read ahead); callers seek before every use.
pub fn read_line_at<R: Read + Seek>(r: &mut R, offset: u64) -> io::Result<String> {
    r.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(r);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

#[cfg(test)]
mod tests;
