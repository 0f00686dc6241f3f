//! Incremental newline splitter for the streamed response body.
//!
//! Chunk boundaries do not respect frame boundaries, so a trailing
//! partial line is carried over until more bytes arrive or the stream
//! ends, at which point it is flushed as a final line.

/// Buffers incomplete lines across chunk boundaries.
///
/// The carry-over is kept as raw bytes. A chunk boundary can land in the
/// middle of a multi-byte character, so text is decoded only once a line
/// is complete.
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed raw bytes from the HTTP response. Returns the complete lines
    /// found, without their terminators.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(idx) = self.buffer.iter().position(|&b| b == b'\n') {
            let rest = self.buffer.split_off(idx + 1);
            self.buffer.pop();
            let line = std::mem::replace(&mut self.buffer, rest);
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Drain whatever is left once the stream has ended.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            let tail = std::mem::take(&mut self.buffer);
            Some(String::from_utf8_lossy(&tail).into_owned())
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut buf = LineBuffer::new();
        let lines = buf.feed(b"alpha\nbeta\n");
        assert_eq!(lines, vec!["alpha", "beta"]);
        assert_eq!(buf.flush(), None);
    }

    #[test]
    fn carries_partial_line_across_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.feed(b"hel").is_empty());
        let lines = buf.feed(b"lo\nwor");
        assert_eq!(lines, vec!["hello"]);
        assert_eq!(buf.flush(), Some("wor".to_string()));
    }

    #[test]
    fn multibyte_character_split_across_chunks_stays_intact() {
        let mut buf = LineBuffer::new();
        let bytes = "你好\n".as_bytes();
        // Split inside the first character's three-byte sequence.
        assert!(buf.feed(&bytes[..2]).is_empty());
        assert_eq!(buf.feed(&bytes[2..]), vec!["你好"]);
    }

    #[test]
    fn flush_decodes_a_trailing_multibyte_line() {
        let mut buf = LineBuffer::new();
        let bytes = "résumé".as_bytes();
        buf.feed(&bytes[..2]);
        buf.feed(&bytes[2..]);
        assert_eq!(buf.flush(), Some("résumé".to_string()));
    }

    #[test]
    fn flush_is_empty_after_draining() {
        let mut buf = LineBuffer::new();
        buf.feed(b"tail");
        assert_eq!(buf.flush(), Some("tail".to_string()));
        assert_eq!(buf.flush(), None);
    }
}
