//! Encoding detection and decoding of extracted text files.
//!
//! Aozora Bunko ships most texts as Shift_JIS, newer ones as UTF-8. The
//! codec is guessed with `chardetng` over the whole buffer and the bytes are
//! decoded strictly with `encoding_rs`; if that fails the file is retried
//! as Shift_JIS (the WHATWG definition, which matches Windows CP932).
//!
//! The detector's guess is used without any confidence threshold, so a
//! wrong guess that happens to decode cleanly produces garbled text. For
//! binary garbage chardetng usually picks a single-byte codec such as
//! windows-1256, which accepts almost any byte, so [`PipelineError::Decode`]
//! is rare in practice.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, SHIFT_JIS};
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::models::Work;

/// Best-guess codec for a buffer. A byte-order mark wins over detection.
pub fn detect(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

/// Decode with `primary`, then `fallback`. Returns the codec that worked.
pub fn decode_with(
    bytes: &[u8],
    primary: &'static Encoding,
    fallback: &'static Encoding,
) -> Option<(&'static Encoding, String)> {
    let mut candidates = vec![primary];
    if fallback != primary {
        candidates.push(fallback);
    }

    for encoding in candidates {
        let body = match Encoding::for_bom(bytes) {
            Some((bom_encoding, bom_len)) if bom_encoding == encoding => &bytes[bom_len..],
            _ => bytes,
        };
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(body) {
            return Some((encoding, text.into_owned()));
        }
        tracing::debug!(encoding = encoding.name(), "strict decode failed");
    }
    None
}

/// Detect and decode a buffer.
pub fn decode_bytes(bytes: &[u8]) -> Option<(&'static Encoding, String)> {
    let guess = detect(bytes);
    tracing::debug!(guess = guess.name(), len = bytes.len(), "detected encoding");
    decode_with(bytes, guess, SHIFT_JIS)
}

/// Read a file and decode it into a [`Work`].
pub fn read_work(path: &Path) -> PipelineResult<Work> {
    let bytes = std::fs::read(path)?;
    let Some((encoding, text)) = decode_bytes(&bytes) else {
        let guess = detect(&bytes);
        let tried = if guess == SHIFT_JIS {
            guess.name().to_string()
        } else {
            format!("{}, {}", guess.name(), SHIFT_JIS.name())
        };
        return Err(PipelineError::Decode {
            path: path.to_path_buf(),
            tried,
        });
    };

    Ok(Work {
        path: path.to_path_buf(),
        encoding: encoding.name(),
        text,
    })
}
