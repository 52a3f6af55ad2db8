/// Splits a byte stream into newline-delimited lines.
///
/// Partial lines are held until the next chunk arrives. A line longer than
/// `max_line_bytes` without a terminator is flushed as-is so a single peer
/// cannot grow the buffer without bound.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_bytes: usize,
}

impl LineFramer {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Appends a chunk and returns every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            lines.push(decode(&line[..line.len() - 1]));
        }

        while self.buffer.len() > self.max_line_bytes {
            let overflow: Vec<u8> = self.buffer.drain(..self.max_line_bytes).collect();
            lines.push(decode(&overflow));
        }

        lines
    }

    /// Returns whatever partial line remains once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode(&rest))
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut framer = LineFramer::new(1024);
        assert!(framer.push(b"hel").is_empty());
        assert_eq!(framer.push(b"lo\nwor"), vec!["hello"]);
        assert_eq!(framer.push(b"ld\r\nx\ny"), vec!["world", "x"]);
        assert_eq!(framer.pending_bytes(), 1);
        assert_eq!(framer.finish(), Some("y".to_string()));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_empty_lines_are_preserved_for_caller() {
        let mut framer = LineFramer::new(1024);
        assert_eq!(framer.push(b"\n\na\n"), vec!["", "", "a"]);
    }

    #[test]
    fn test_overlong_line_is_flushed() {
        let mut framer = LineFramer::new(4);
        assert_eq!(framer.push(b"abcdefghij"), vec!["abcd", "efgh"]);
        assert_eq!(framer.push(b"\n"), vec!["ij"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new(1024);
        let lines = framer.push(&[0x66, 0xff, 0x6f, b'\n']);
        assert_eq!(lines, vec!["f\u{fffd}o"]);
    }
}
