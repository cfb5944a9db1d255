//! Raw body streaming and the binary-safety guard.

use std::io::Write;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::{BINARY_OUTPUT_WARNING, BINARY_PEEK_SIZE};
use crate::error_handling::RenderError;

/// Whether `peek` can be written to a terminal without messing with its state.
///
/// Control characters other than tab, newline and carriage return are binary,
/// as is invalid UTF-8. A multi-byte sequence cut by the end of the window is
/// accepted.
pub fn is_printable(peek: &[u8]) -> bool {
    let text = match std::str::from_utf8(peek) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() => {
            // Only the last, truncated, sequence is invalid
            match std::str::from_utf8(&peek[..e.valid_up_to()]) {
                Ok(text) => text,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    !text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
}

/// Reads until `buf` is full or the reader is exhausted.
async fn fill<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Copies `reader` to `out` unchanged.
pub async fn copy<R: AsyncRead + Unpin>(reader: &mut R, out: &mut dyn Write) -> Result<u64, RenderError> {
    let mut buf = vec![0u8; 8 * 1024];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
    out.flush()?;
    Ok(total)
}

/// Streams `prefix` then `reader` to `out`.
///
/// With `guard` set, the first [`BINARY_PEEK_SIZE`] bytes are inspected first
/// and, if they are not printable, [`BINARY_OUTPUT_WARNING`] is written instead
/// of the body.
///
/// # Returns
///
/// `true` when the body was written, `false` when it was suppressed.
///
/// # Errors
///
/// Returns `RenderError::Read` if reading or writing fails.
pub async fn stream<R: AsyncRead + Unpin>(
    prefix: &[u8],
    reader: &mut R,
    out: &mut dyn Write,
    guard: bool,
) -> Result<bool, RenderError> {
    if !guard {
        out.write_all(prefix)?;
        copy(reader, out).await?;
        return Ok(true);
    }

    let mut peek = Vec::with_capacity(BINARY_PEEK_SIZE);
    peek.extend_from_slice(&prefix[..prefix.len().min(BINARY_PEEK_SIZE)]);
    let rest_of_prefix = &prefix[peek.len()..];
    if peek.len() < BINARY_PEEK_SIZE {
        let missing = BINARY_PEEK_SIZE - peek.len();
        let mut buf = vec![0u8; missing];
        let n = fill(reader, &mut buf).await?;
        peek.extend_from_slice(&buf[..n]);
    }

    if !is_printable(&peek) {
        writeln!(out, "{BINARY_OUTPUT_WARNING}")?;
        out.flush()?;
        return Ok(false);
    }
    out.write_all(&peek)?;
    out.write_all(rest_of_prefix)?;
    copy(reader, out).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_text() {
        assert!(is_printable(b"hello\tworld\r\n"));
        assert!(is_printable("héllo wörld".as_bytes()));
        assert!(is_printable(b""));
    }

    #[test]
    fn test_binary_bytes() {
        assert!(!is_printable(b"\x89PNG\r\n\x1a\n"));
        assert!(!is_printable(b"abc\x00def"));
        assert!(!is_printable(b"\x1b[2J"));
        assert!(!is_printable(&[0xff, 0xfe, b'a']));
    }

    #[test]
    fn test_truncated_sequence_at_window_end() {
        let mut bytes = b"abc".to_vec();
        bytes.extend_from_slice(&"é".as_bytes()[..1]);
        assert!(is_printable(&bytes));
    }

    #[tokio::test]
    async fn test_guard_suppresses_binary_body() {
        let body = b"text\x00more".to_vec();
        let mut out = Vec::new();
        let written = stream(&[], &mut body.as_slice(), &mut out, true).await.unwrap();
        assert!(!written);
        assert_eq!(String::from_utf8(out).unwrap(), format!("{BINARY_OUTPUT_WARNING}\n"));
    }

    #[tokio::test]
    async fn test_guard_only_looks_at_window() {
        let mut body = vec![b'a'; BINARY_PEEK_SIZE];
        body.push(0);
        let mut out = Vec::new();
        assert!(stream(&[], &mut body.as_slice(), &mut out, true).await.unwrap());
        assert_eq!(out, body);
    }

    #[tokio::test]
    async fn test_unguarded_stream_keeps_bytes() {
        let body = b"\x00\x01\x02".to_vec();
        let mut out = Vec::new();
        assert!(stream(b"pre", &mut body.as_slice(), &mut out, false).await.unwrap());
        assert_eq!(out, b"pre\x00\x01\x02");
    }

    #[tokio::test]
    async fn test_guard_with_buffered_prefix() {
        let prefix = vec![b'x'; BINARY_PEEK_SIZE + 10];
        let rest = b"tail".to_vec();
        let mut out = Vec::new();
        assert!(stream(&prefix, &mut rest.as_slice(), &mut out, true).await.unwrap());
        assert_eq!(out.len(), BINARY_PEEK_SIZE + 10 + 4);
        assert!(out.ends_with(b"xxtail"));
    }
}
