//! Lookup request/response types and per-deployment index dispatch — the
//! interface a network front-end drives.

use anyhow::{bail, Result};
use index::Searcher;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

static HEX_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new("^[0-9a-fA-F]+$").unwrap());
static B64_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new("^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$").unwrap()
});

/// One lookup request. Exactly one of the three key fields must be
/// non-empty; `page` is advisory and currently unused (results come back
/// in full).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerySet {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub page: u32,
}

/// One matched credential in a [`ResultSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub email: String,
    pub password: String,
}

impl QueryResult {
    /// The password appears to be blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        // Some dumps contain hardcoded 'blank' values.
        self.password.is_empty() || self.password == "xxx"
    }

    /// The password *appears* to be a hash rather than plaintext.
    #[must_use]
    pub fn is_hash(&self) -> bool {
        // No common hash is shorter than 8 characters.
        if self.password.len() < 8 {
            return false;
        }
        // Hex-encoded MD5 or longer.
        if HEX_PATTERN.is_match(&self.password) && self.password.len() >= 32 {
            return true;
        }
        // Base64-encoded MD5 (minus padding) or longer.
        if B64_PATTERN.is_match(&self.password) && self.password.len() >= 22 {
            return true;
        }
        false
    }
}

/// The response to one [`QuerySet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    pub count: usize,
    pub page: u32,
    pub pages: u32,
    pub results: Vec<QueryResult>,
}

/// The corpus and sorted indexes one deployment answers queries from.
///
/// Indexes are optional per key; querying a key with no configured index
/// is a per-request error, not a construction failure.
pub struct IndexSet {
    corpus: PathBuf,
    email_index: Option<PathBuf>,
    user_index: Option<PathBuf>,
    domain_index: Option<PathBuf>,
}

impl IndexSet {
    #[must_use]
    pub fn new(
        corpus: PathBuf,
        email_index: Option<PathBuf>,
        user_index: Option<PathBuf>,
        domain_index: Option<PathBuf>,
    ) -> Self {
        Self {
            corpus,
            email_index,
            user_index,
            domain_index,
        }
    }

    /// Answers one query against the matching index.
    ///
    /// Results are not post-filtered against the query value, so a 48-bit
    /// digest collision returns the colliding record as-is; callers that
    /// need exactness compare the returned fields.
    pub fn lookup(&self, query: &QuerySet) -> Result<ResultSet> {
        let populated = [&query.email, &query.user, &query.domain]
            .iter()
            .filter(|v| !v.is_empty())
            .count();
        if populated != 1 {
            bail!("query must set exactly one of email, user, or domain");
        }

        let (value, index, key) = if !query.email.is_empty() {
            (&query.email, &self.email_index, "email")
        } else if !query.user.is_empty() {
            (&query.user, &self.user_index, "user")
        } else {
            (&query.domain, &self.domain_index, "domain")
        };
        let Some(index) = index else {
            bail!("no {} index configured", key);
        };

        let searcher = Searcher::open(&self.corpus, index)?;
        let results = searcher.find(value)?;
        Ok(ResultSet {
            count: results.len(),
            page: 0,
            pages: 1,
            results: results
                .into_iter()
                .map(|cred| QueryResult {
                    email: cred.email,
                    password: cred.password,
                })
                .collect(),
        })
    }
}
