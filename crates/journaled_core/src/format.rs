//! On-disk framing for journal headers, footers and WAL entries.
//!
//! All integers are little-endian and every structure is packed with no
//! padding.
//!
//! ```text
//! JournalHeader (18 bytes)
//! ┌────────────┬─────────┬──────────┬─────────┐
//! │ magic (8)  │ impl (1)│ nonce (8)│ flags(1)│
//! └────────────┴─────────┴──────────┴─────────┘
//!
//! WalEntryHeader (22 bytes, followed by `length` payload bytes)
//! ┌───────────┬─────────────────┬────────────┬──────────────┐
//! │ magic (4) │ inner_offset (8)│ length (2) │ checksum (8) │
//! └───────────┴─────────────────┴────────────┴──────────────┘
//!
//! WalFooter (30 bytes)
//! ┌───────────┬───────────┬──────────────┬──────────────────┬─────────────────┐
//! │ magic (8) │ nonce (8) │ entries (4)  │ final_length (8) │ max_entry (2)   │
//! └───────────┴───────────┴──────────────┴──────────────────┴─────────────────┘
//!
//! SparseFooter (37 bytes)
//! ┌───────────┬───────────┬──────────────────┬───────────┬───────────┬────────────────┐
//! │ magic (8) │ nonce (8) │ final_length (8) │ power (1) │ words (4) │ bitmap_off (8) │
//! └───────────┴───────────┴──────────────────┴───────────┴───────────┴────────────────┘
//! ```
//!
//! The header's flags byte is the only field ever rewritten in place; see
//! [`JournalHeader::FLAGS_OFFSET`].

use crate::error::{JournalError, JournalResult};
use journaled_storage::{ByteStore, StorageError};
use xxhash_rust::xxh64::xxh64;

/// Magic identifying a journal header ("JRNLVER1").
pub const HEADER_MAGIC: u64 = 0x3152_4556_4C4E_524A;

/// Magic identifying a WAL footer.
pub const WAL_FOOTER_MAGIC: u64 = 0x4A52_4E4C_5F45_4E44;

/// Magic identifying a WAL entry.
pub const WAL_ENTRY_MAGIC: u32 = 0x5347_4D54;

/// Magic identifying a sparse footer.
pub const SPARSE_FOOTER_MAGIC: u64 = 0x5350_5253_5F45_4E44;

/// Computes the payload checksum stored in WAL entries.
#[must_use]
pub fn checksum(data: &[u8]) -> u64 {
    xxh64(data, 0)
}

/// A fixed-size little-endian record.
pub trait Frame: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Human-readable name used in corruption messages.
    const NAME: &'static str;

    /// Encodes the record into exactly [`Self::SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if a length or offset does not
    /// fit the signed on-disk field.
    fn encode(&self) -> JournalResult<Vec<u8>>;

    /// Decodes the record, validating its magic.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if `bytes` is too short, the magic does
    /// not match, or a field is out of range.
    fn decode(bytes: &[u8]) -> JournalResult<Self>;
}

/// Reads and decodes a frame stored at `offset`.
///
/// A store that ends before the frame does is reported as corruption.
///
/// # Errors
///
/// Returns a corruption error for truncated or invalid frames, or a storage
/// error if the read itself fails.
pub fn read_frame<F: Frame>(store: &mut dyn ByteStore, offset: u64) -> JournalResult<F> {
    let mut buf = vec![0u8; F::SIZE];
    match store.read_exact_at(offset, &mut buf) {
        Ok(()) => F::decode(&buf),
        Err(StorageError::ReadPastEnd { .. }) => Err(JournalError::corrupted(
            format!("{} at offset {offset} is truncated", F::NAME),
            false,
        )),
        Err(e) => Err(e.into()),
    }
}

/// Writes a frame at `offset`.
///
/// # Errors
///
/// Returns a storage error if the write fails.
pub fn write_frame<F: Frame>(store: &mut dyn ByteStore, offset: u64, frame: &F) -> JournalResult<()> {
    store.write_at(offset, &frame.encode()?)?;
    Ok(())
}

struct FieldReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
    name: &'static str,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8], size: usize, name: &'static str) -> JournalResult<Self> {
        if bytes.len() < size {
            return Err(JournalError::corrupted(
                format!("{name} needs {size} bytes, got {}", bytes.len()),
                false,
            ));
        }
        Ok(Self {
            bytes,
            cursor: 0,
            name,
        })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.cursor..self.cursor + N]);
        self.cursor += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    /// Reads a signed length or offset, rejecting negative values.
    fn non_negative(&mut self, field: &str) -> JournalResult<u64> {
        let value = i64::from_le_bytes(self.take());
        u64::try_from(value).map_err(|_| {
            JournalError::corrupted(format!("{} has negative {field}: {value}", self.name), false)
        })
    }

    fn expect_magic(&self, found: u64, expected: u64) -> JournalResult<()> {
        if found != expected {
            return Err(JournalError::corrupted(
                format!("bad {} magic: {found:#018x}", self.name),
                false,
            ));
        }
        Ok(())
    }
}

/// Appends a length or offset as the signed on-disk field.
fn put_length(buf: &mut Vec<u8>, value: u64, field: &str) -> JournalResult<()> {
    let value = i64::try_from(value).map_err(|_| {
        JournalError::invalid_argument(format!("{field} {value} exceeds i64::MAX"))
    })?;
    buf.extend_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Header flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFlags(u8);

impl HeaderFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// Finalization completed; the journal is durable.
    pub const COMMITTED: Self = Self(0x01);

    /// Creates flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if the committed bit is set.
    #[must_use]
    pub const fn is_committed(self) -> bool {
        self.0 & Self::COMMITTED.0 != 0
    }

    /// Returns these flags with `other` added.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// The fixed header written first in every journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    /// Identifier of the strategy that wrote the journal.
    pub implementation_id: u8,
    /// Per-journal random value binding header and footer.
    pub nonce: u64,
    /// Flag bits.
    pub flags: HeaderFlags,
}

impl JournalHeader {
    /// Byte offset of the flags field within the header.
    pub const FLAGS_OFFSET: u64 = 17;

    /// Creates an uncommitted header.
    #[must_use]
    pub const fn new(implementation_id: u8, nonce: u64) -> Self {
        Self {
            implementation_id,
            nonce,
            flags: HeaderFlags::NONE,
        }
    }

    /// Returns true if the committed flag is set.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.flags.is_committed()
    }
}

impl Frame for JournalHeader {
    const SIZE: usize = 18;
    const NAME: &'static str = "journal header";

    fn encode(&self) -> JournalResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
        buf.push(self.implementation_id);
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.push(self.flags.bits());
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> JournalResult<Self> {
        let mut r = FieldReader::new(bytes, Self::SIZE, Self::NAME)?;
        let magic = r.u64();
        r.expect_magic(magic, HEADER_MAGIC)?;
        Ok(Self {
            implementation_id: r.u8(),
            nonce: r.u64(),
            flags: HeaderFlags::from_bits(r.u8()),
        })
    }
}

/// Trailing record of a finalized WAL journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalFooter {
    /// Must equal the header nonce.
    pub header_nonce: u64,
    /// Number of entries appended.
    pub entry_count: u32,
    /// Origin length after apply.
    pub final_length: u64,
    /// Largest entry payload, bounding the replay buffer.
    pub max_entry_length: u16,
}

impl Frame for WalFooter {
    const SIZE: usize = 30;
    const NAME: &'static str = "WAL footer";

    fn encode(&self) -> JournalResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&WAL_FOOTER_MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.header_nonce.to_le_bytes());
        buf.extend_from_slice(&self.entry_count.to_le_bytes());
        put_length(&mut buf, self.final_length, "final length")?;
        buf.extend_from_slice(&self.max_entry_length.to_le_bytes());
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> JournalResult<Self> {
        let mut r = FieldReader::new(bytes, Self::SIZE, Self::NAME)?;
        let magic = r.u64();
        r.expect_magic(magic, WAL_FOOTER_MAGIC)?;
        Ok(Self {
            header_nonce: r.u64(),
            entry_count: r.u32(),
            final_length: r.non_negative("final length")?,
            max_entry_length: r.u16(),
        })
    }
}

/// Header of one staged WAL write; `length` payload bytes follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalEntryHeader {
    /// Destination offset in the origin.
    pub inner_offset: u64,
    /// Payload length.
    pub length: u16,
    /// Checksum of the payload.
    pub checksum: u64,
}

impl WalEntryHeader {
    /// Builds the entry header for `payload` destined for `inner_offset`.
    ///
    /// The payload must not exceed `u16::MAX` bytes.
    #[must_use]
    pub fn for_payload(inner_offset: u64, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= usize::from(u16::MAX));
        Self {
            inner_offset,
            length: payload.len() as u16,
            checksum: checksum(payload),
        }
    }

    /// Returns the total on-disk size of the entry including its payload.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        Self::SIZE as u64 + u64::from(self.length)
    }

    /// Returns true if `payload` matches the recorded checksum.
    #[must_use]
    pub fn verify(&self, payload: &[u8]) -> bool {
        payload.len() == usize::from(self.length) && checksum(payload) == self.checksum
    }
}

impl Frame for WalEntryHeader {
    const SIZE: usize = 22;
    const NAME: &'static str = "WAL entry";

    fn encode(&self) -> JournalResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&WAL_ENTRY_MAGIC.to_le_bytes());
        put_length(&mut buf, self.inner_offset, "entry offset")?;
        buf.extend_from_slice(&self.length.to_le_bytes());
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> JournalResult<Self> {
        let mut r = FieldReader::new(bytes, Self::SIZE, Self::NAME)?;
        let magic = r.u32();
        r.expect_magic(u64::from(magic), u64::from(WAL_ENTRY_MAGIC))?;
        Ok(Self {
            inner_offset: r.non_negative("offset")?,
            length: r.u16(),
            checksum: r.u64(),
        })
    }
}

/// Trailing record of a finalized sparse journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseFooter {
    /// Must equal the header nonce.
    pub header_nonce: u64,
    /// Origin length after apply.
    pub final_length: u64,
    /// Block size as a power of two.
    pub block_power: u8,
    /// Number of 64-bit bitmap words.
    pub bitmap_word_count: u32,
    /// Journal offset of the first bitmap word.
    pub bitmap_offset: u64,
}

impl Frame for SparseFooter {
    const SIZE: usize = 37;
    const NAME: &'static str = "sparse footer";

    fn encode(&self) -> JournalResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&SPARSE_FOOTER_MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.header_nonce.to_le_bytes());
        put_length(&mut buf, self.final_length, "final length")?;
        buf.push(self.block_power);
        buf.extend_from_slice(&self.bitmap_word_count.to_le_bytes());
        buf.extend_from_slice(&self.bitmap_offset.to_le_bytes());
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> JournalResult<Self> {
        let mut r = FieldReader::new(bytes, Self::SIZE, Self::NAME)?;
        let magic = r.u64();
        r.expect_magic(magic, SPARSE_FOOTER_MAGIC)?;
        Ok(Self {
            header_nonce: r.u64(),
            final_length: r.non_negative("final length")?,
            block_power: r.u8(),
            bitmap_word_count: r.u32(),
            bitmap_offset: r.u64(),
        })
    }
}
