//! Newline-delimited input with a hard per-line cap enforced while reading.

use std::io::{self, BufRead, Read};

#[derive(Debug, PartialEq, Eq)]
pub enum BoundedLine {
    Text(String),
    /// Longer than the cap. The rest of the line was discarded unbuffered.
    TooLong,
    NotUtf8,
}

/// Reads the next line, holding at most `max_bytes` of it in memory.
/// Returns `Ok(None)` at end of input.
pub fn read_bounded_line<R: BufRead>(
    reader: &mut R,
    max_bytes: usize,
    buffer: &mut Vec<u8>,
) -> io::Result<Option<BoundedLine>> {
    buffer.clear();
    let read = reader
        .by_ref()
        .take(max_bytes as u64 + 1)
        .read_until(b'\n', buffer)?;
    if read == 0 {
        return Ok(None);
    }

    if buffer.last() == Some(&b'\n') {
        buffer.pop();
        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }
    } else if read > max_bytes {
        skip_past_newline(reader)?;
        return Ok(Some(BoundedLine::TooLong));
    }

    Ok(Some(match String::from_utf8(std::mem::take(buffer)) {
        Ok(text) => BoundedLine::Text(text),
        Err(_) => BoundedLine::NotUtf8,
    }))
}

fn skip_past_newline<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|byte| *byte == b'\n') {
            Some(index) => {
                reader.consume(index + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}
