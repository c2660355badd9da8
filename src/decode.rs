//! Incremental UTF-8 decoding of a chunked byte stream.
//!
//! Network chunk boundaries are arbitrary and routinely split a multi-byte
//! character in half. [`Utf8Decoder`] decodes whatever prefix of the buffered
//! bytes is complete and holds the trailing partial sequence back until the
//! next chunk arrives, so that feeding a byte stream chunk-by-chunk produces
//! exactly the same text as decoding it in one piece.

use std::fmt;

/// Decoding errors.
///
/// An invalid sequence is fatal to the current exchange; the decoder never
/// substitutes replacement characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input contains a byte sequence that cannot be part of any valid
    /// UTF-8 character. `offset` is the number of valid bytes preceding it
    /// within the decoder's internal buffer.
    InvalidSequence { offset: usize },
    /// The stream ended in the middle of a multi-byte character.
    Truncated { pending_bytes: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidSequence { offset } => {
                write!(f, "invalid UTF-8 sequence after {} valid bytes", offset)
            }
            DecodeError::Truncated { pending_bytes } => {
                write!(
                    f,
                    "stream ended inside a multi-byte character ({} bytes pending)",
                    pending_bytes
                )
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Incremental UTF-8 decoder.
///
/// Every byte fed in is either returned as decoded text or retained in the
/// pending buffer; nothing is dropped. Call [`finish`](Utf8Decoder::finish)
/// at end of stream to verify no partial character is left dangling.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Trailing bytes of an incomplete character, carried to the next feed.
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a new decoder with an empty pending buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether bytes from a previous chunk are still awaiting completion.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Decode the next chunk, prefixed by any bytes held back earlier.
    ///
    /// Returns the longest valid prefix as text; an incomplete trailing
    /// sequence is retained for the next call. A sequence that can never
    /// become valid fails with [`DecodeError::InvalidSequence`].
    pub fn feed(&mut self, chunk: &[u8]) -> Result<String, DecodeError> {
        self.pending.extend_from_slice(chunk);

        let valid_len = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            // error_len() == None means the error is a character cut off at
            // the end of the input, which the next chunk may complete.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(DecodeError::InvalidSequence {
                    offset: e.valid_up_to(),
                })
            }
        };

        let remainder = self.pending.split_off(valid_len);
        let decoded = std::mem::replace(&mut self.pending, remainder);
        let text = String::from_utf8(decoded).map_err(|e| DecodeError::InvalidSequence {
            offset: e.utf8_error().valid_up_to(),
        })?;
        Ok(text)
    }

    /// Flush the decoder at end of stream.
    ///
    /// Returns any remaining decodable text (normally empty). A non-empty
    /// pending buffer at this point is an incomplete character that can no
    /// longer be finished and is reported as [`DecodeError::Truncated`].
    pub fn finish(&mut self) -> Result<String, DecodeError> {
        if self.pending.is_empty() {
            return Ok(String::new());
        }
        let pending_bytes = self.pending.len();
        self.pending.clear();
        Err(DecodeError::Truncated { pending_bytes })
    }
}
