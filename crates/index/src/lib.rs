//! # Index — fixed-record lookup indexes over a credential corpus
//!
//! An index maps the SHA-256 digest of one credential field (email, user,
//! domain, or password) back to the byte offset of the full record in the
//! deduplicated JSON Lines corpus. Indexes are *write-once, read-many*:
//! the indexer emits them unsorted, the sorter rewrites them in digest
//! order, and the searcher binary-searches the sorted result.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ ENTRY (exactly 12 bytes, repeated)                            │
//! │                                                               │
//! │ digest: 6 bytes — SHA-256(key_value)[0..6]                    │
//! │ offset: 6 bytes — u48 LE line-start offset into the corpus    │
//! │                                                               │
//! │ ... file size is always a multiple of 12 ...                  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. For ordering and search, a record's
//! numeric *value* is its digest read as a little-endian u64 with the top
//! two bytes zero; 6-byte offsets address corpora up to 2⁴⁸−1 bytes
//! (≈ 281 TB).
//!
//! ## Module responsibilities
//!
//! | Module     | Purpose                                                |
//! |------------|--------------------------------------------------------|
//! | [`format`] | The 12-byte [`Entry`] record and digest helpers        |
//! | [`writer`] | [`Indexer`]: parallel corpus → unsorted index          |
//! | [`sort`]   | [`Sorter`]: memory-bounded external sort, [`check_sort`] |
//! | [`search`] | [`Searcher`]: binary-search point lookups              |

mod format;
mod search;
mod sort;
mod writer;

pub use format::{digest6, needle, Entry, DIGEST_SIZE, ENTRY_SIZE, OFFSET_SIZE};
pub use search::Searcher;
pub use sort::{check_sort, SortProgress, Sorter, Status};
pub use writer::{Indexer, Partition};

#[cfg(test)]
mod tests;
