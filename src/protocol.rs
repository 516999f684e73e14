//! Wire format for file requests.
//!
//! The client sends one length-prefixed request; the server answers with
//! the raw file content and closes, or closes without sending anything
//! when the file cannot be served:
//!
//! ```text
//! Request:  <length>\r\n<name of exactly length bytes>
//! Response: <file bytes...><close>
//!           <close>
//!
//! Example:
//! Request:  5\r\na.txt
//! Response: hello<close>
//! ```
//!
//! There is no response header, so an empty file and a missing file look
//! the same to the client.

use bytes::{BufMut, BytesMut};

/// Longest filename a request may carry.
pub const MAX_NAME_LEN: usize = 4096;

/// Longest decimal length prefix accepted before `\r\n`.
const MAX_LENGTH_DIGITS: usize = 20;

/// Result of parsing a request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// Complete request with the bytes consumed by the frame.
    Complete { name: Vec<u8>, consumed: usize },
    /// Need more data.
    Incomplete,
    /// The length prefix is not a decimal number.
    InvalidLength,
    /// The request names an empty file.
    EmptyName,
    /// The announced name is longer than [`MAX_NAME_LEN`].
    NameTooLong(usize),
}

/// Parse a request frame from the start of `input`.
pub fn parse_request(input: &[u8]) -> ParseResult {
    let header = match find_crlf(input) {
        Some(pos) => &input[..pos],
        None => {
            // Reject garbage early instead of waiting for a CRLF that never comes
            let pending = input.strip_suffix(b"\r").unwrap_or(input);
            if pending.len() > MAX_LENGTH_DIGITS || !pending.iter().all(u8::is_ascii_digit) {
                return ParseResult::InvalidLength;
            }
            return ParseResult::Incomplete;
        }
    };

    if header.is_empty()
        || header.len() > MAX_LENGTH_DIGITS
        || !header.iter().all(u8::is_ascii_digit)
    {
        return ParseResult::InvalidLength;
    }

    let length: usize = match std::str::from_utf8(header).ok().and_then(|s| s.parse().ok()) {
        Some(len) => len,
        None => return ParseResult::InvalidLength,
    };

    if length == 0 {
        return ParseResult::EmptyName;
    }
    if length > MAX_NAME_LEN {
        return ParseResult::NameTooLong(length);
    }

    let start = header.len() + 2;
    let end = start + length;
    if input.len() < end {
        return ParseResult::Incomplete;
    }

    ParseResult::Complete {
        name: input[start..end].to_vec(),
        consumed: end,
    }
}

/// Build the request frame for `name`.
pub fn encode_request(name: &[u8]) -> BytesMut {
    let header = format!("{}\r\n", name.len());
    let mut frame = BytesMut::with_capacity(header.len() + name.len());
    frame.put_slice(header.as_bytes());
    frame.put_slice(name);
    frame
}

/// Find \r\n in buffer, returning the position of \r.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    (0..buffer.len().saturating_sub(1)).find(|&i| buffer[i] == b'\r' && buffer[i + 1] == b'\n')
}
