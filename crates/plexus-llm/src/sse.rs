//! Line framing for streamed HTTP bodies (SSE and NDJSON)

/// Accumulates raw body chunks and yields complete lines.
///
/// Chunks can split lines (and UTF-8 sequences) anywhere, so bytes are buffered
/// until a `\n` arrives. A trailing `\r` is stripped.
#[derive(Debug, Default)]
pub(crate) struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and drain every complete line it finished
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left once the body ends without a final newline
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
        Some(line)
    }
}

/// Payload of an SSE `data:` line, if this is one
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"data: {\"a\"").is_empty());
        let lines = framer.push(b":1}\r\ndata: [DONE]\n\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: [DONE]", ""]);
        assert!(framer.finish().is_none());
    }

    #[test]
    fn test_multibyte_char_split() {
        let mut framer = LineFramer::new();
        let text = "héllo\n".as_bytes();
        assert!(framer.push(&text[..2]).is_empty());
        assert_eq!(framer.push(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn test_finish_returns_partial_line() {
        let mut framer = LineFramer::new();
        framer.push(b"{\"done\":true}");
        assert_eq!(framer.finish().as_deref(), Some("{\"done\":true}"));
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: hello"), Some("hello"));
        assert_eq!(sse_data("data:hello"), Some("hello"));
        assert_eq!(sse_data("event: ping"), None);
    }
}
