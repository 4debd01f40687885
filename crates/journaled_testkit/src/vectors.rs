//! Byte-exact format vectors.
//!
//! Journals produced with a fixed nonce must match these bytes exactly;
//! any difference is a format break that invalidates journals left on disk
//! by earlier builds.

/// Hex-decodes `hex`, ignoring whitespace.
///
/// # Panics
///
/// Panics on a malformed vector.
pub fn decode_hex(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).expect("ASCII hex");
            u8::from_str_radix(text, 16).expect("Invalid hex digit")
        })
        .collect()
}

/// Hex-encodes `bytes`.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Committed WAL header with nonce 1.
pub const WAL_HEADER_COMMITTED: &str = "4a524e4c56455231 01 0100000000000000 01";

/// WAL footer: nonce 1, one entry, final length 2, largest entry 2.
pub const WAL_FOOTER: &str = "444e455f4c4e524a 0100000000000000 01000000 0200000000000000 0200";

/// Sparse journal (32-byte blocks, nonce 1) holding "Hi" at origin offset 0,
/// finalized with length 2 and committed.
pub const SPARSE_HI: &str = "\
    4a524e4c56455231 02 0100000000000000 01 \
    0000000000000000000000000000 \
    4869000000000000000000000000000000000000000000000000000000000000 \
    0100000000000000 \
    444e455f53525053 0100000000000000 0200000000000000 05 01000000 4000000000000000";
