use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Encode a u32 as a variable-length integer
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed)
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return None; // Overflow
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None // Incomplete
}

/// Delta-encode a sorted, deduplicated list of u32s
pub fn delta_encode(values: &[u32], buf: &mut Vec<u8>) {
    let mut prev = 0u32;
    for &value in values {
        debug_assert!(value >= prev, "postings must be sorted");
        encode_varint(value - prev, buf);
        prev = value;
    }
}

/// Delta-decode a list of u32s
pub fn delta_decode(buf: &[u8]) -> Vec<u32> {
    let mut result = Vec::new();
    let mut prev = 0u32;
    let mut pos = 0;

    while pos < buf.len() {
        if let Some((delta, consumed)) = decode_varint(&buf[pos..]) {
            prev = prev.saturating_add(delta);
            result.push(prev);
            pos += consumed;
        } else {
            break;
        }
    }

    result
}

/// Read a little-endian u32 at `at`, if the slice is long enough
pub fn read_u32_at(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a little-endian u64 at `at`, if the slice is long enough
pub fn read_u64_at(buf: &[u8], at: usize) -> Option<u64> {
    let bytes = buf.get(at..at + 8)?;
    let mut b = [0u8; 8];
    b.copy_from_slice(bytes);
    Some(u64::from_le_bytes(b))
}

/// Stored form of a path: its raw bytes.
///
/// `None` where the platform has no lossless byte form for it (non-Unicode
/// names off unix); such paths are not indexed.
#[cfg(unix)]
pub fn path_to_bytes(path: &Path) -> Option<Cow<'_, [u8]>> {
    use std::os::unix::ffi::OsStrExt;
    Some(Cow::Borrowed(path.as_os_str().as_bytes()))
}

#[cfg(not(unix))]
pub fn path_to_bytes(path: &Path) -> Option<Cow<'_, [u8]>> {
    path.to_str().map(|s| Cow::Borrowed(s.as_bytes()))
}

/// Inverse of [`path_to_bytes`]
#[cfg(unix)]
pub fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(bytes))
}

#[cfg(not(unix))]
pub fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    match String::from_utf8(bytes) {
        Ok(s) => PathBuf::from(s),
        Err(e) => PathBuf::from(String::from_utf8_lossy(e.as_bytes()).into_owned()),
    }
}
