//! Best-effort text extraction from intake files.

use std::path::Path;

use privsentry_core::{Error, Result};

/// Read a file as text. Invalid UTF-8 sequences are dropped, not replaced.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.display().to_string()),
        _ => Error::Io(e),
    })?;
    Ok(decode_lossy(&bytes))
}

/// Decode UTF-8, skipping any byte sequence that is not valid.
pub fn decode_lossy(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                // prefix verified by `valid_up_to`
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(len) => bytes = &rest[len..],
                    // Truncated sequence at end of input
                    None => return out,
                }
            }
        }
    }
}
