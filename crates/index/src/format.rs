use byteorder::{ByteOrder, LittleEndian};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read, Write};

/// Significant bytes of SHA-256 kept per entry.
pub const DIGEST_SIZE: usize = 6;
/// Bytes of corpus offset kept per entry.
pub const OFFSET_SIZE: usize = 6;
/// On-disk size of one index record.
pub const ENTRY_SIZE: usize = DIGEST_SIZE + OFFSET_SIZE;

/// Mask for values representable in a 6-byte offset.
const U48_MASK: u64 = (1 << 48) - 1;

/// A single index record: `[digest: 6 bytes][offset: 6 bytes]`.
///
/// Entries are plain 12-byte values — tapes and merge buffers hold them in
/// contiguous `Vec<Entry>` slices with no per-entry allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    digest: [u8; DIGEST_SIZE],
    offset: [u8; OFFSET_SIZE],
}

impl Entry {
    /// Builds an entry from a key digest and the line-start offset of the
    /// record in the corpus. The offset is truncated to 48 bits.
    #[must_use]
    pub fn new(digest: [u8; DIGEST_SIZE], offset: u64) -> Self {
        let mut off = [0u8; OFFSET_SIZE];
        LittleEndian::write_u48(&mut off, offset & U48_MASK);
        Self {
            digest,
            offset: off,
        }
    }

    /// Reassembles an entry from its 12 on-disk bytes.
    #[must_use]
    pub fn from_bytes(raw: [u8; ENTRY_SIZE]) -> Self {
        let mut digest = [0u8; DIGEST_SIZE];
        let mut offset = [0u8; OFFSET_SIZE];
        digest.copy_from_slice(&raw[..DIGEST_SIZE]);
        offset.copy_from_slice(&raw[DIGEST_SIZE..]);
        Self { digest, offset }
    }

    /// The entry's 12 on-disk bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; ENTRY_SIZE] {
        let mut raw = [0u8; ENTRY_SIZE];
        raw[..DIGEST_SIZE].copy_from_slice(&self.digest);
        raw[DIGEST_SIZE..].copy_from_slice(&self.offset);
        raw
    }

    /// The numeric value of the digest: a little-endian u64 whose top two
    /// bytes are zero. This is the sort key and the search needle space.
    #[must_use]
    pub fn value(self) -> u64 {
        LittleEndian::read_u48(&self.digest)
    }

    /// The corpus byte offset this entry points at.
    #[must_use]
    pub fn offset(self) -> u64 {
        LittleEndian::read_u48(&self.offset)
    }

    /// Writes the 12-byte record.
    pub fn write_to<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.digest)?;
        w.write_all(&self.offset)
    }

    /// Reads one 12-byte record; `UnexpectedEof` at a record boundary means
    /// a clean end of file (index sizes are validated to be multiples of
    /// [`ENTRY_SIZE`]).
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut raw = [0u8; ENTRY_SIZE];
        r.read_exact(&mut raw)?;
        Ok(Self::from_bytes(raw))
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("value", &self.value())
            .field("offset", &self.offset())
            .finish()
    }
}

/// The first six bytes of SHA-256 of a key value.
#[must_use]
pub fn digest6(value: &str) -> [u8; DIGEST_SIZE] {
    let digest = Sha256::digest(value.as_bytes());
    let mut out = [0u8; DIGEST_SIZE];
    out.copy_from_slice(&digest[..DIGEST_SIZE]);
    out
}

/// The numeric search needle for a key value: `u64_le(digest6 ∥ 0x00 0x00)`.
#[must_use]
pub fn needle(value: &str) -> u64 {
    LittleEndian::read_u48(&digest6(value))
}
