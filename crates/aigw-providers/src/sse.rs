//! Minimal Server-Sent-Events line framer. Splits a byte stream on `\n`,
//! keeping a rolling buffer for the trailing partial line, and hands back
//! only the `data: ` payload of each event. Comment lines (starting with
//! `:`) and `event:` lines are consumed but discarded; this gateway's
//! adapters only care about `data`.

pub struct SseLineReader {
    buffer: String,
}

impl SseLineReader {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feeds a chunk of bytes, returning any `data: ...` payloads completed
    /// by a newline in this chunk. Malformed UTF-8 is replaced lossily
    /// rather than aborting the stream.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(payload) = parse_data_line(line) {
                out.push(payload);
            }
        }
        out
    }

    /// Flushes any trailing partial line left in the buffer once the
    /// underlying connection has closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_data_line(line.trim_end_matches(['\r', '\n']))
    }
}

impl Default for SseLineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_data_line(line: &str) -> Option<String> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    line.strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newline_and_strips_prefix() {
        let mut reader = SseLineReader::new();
        let out = reader.push(b"data: hello\ndata: world\n");
        assert_eq!(out, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn keeps_trailing_partial_line_across_chunks() {
        let mut reader = SseLineReader::new();
        assert!(reader.push(b"data: par").is_empty());
        let out = reader.push(b"tial\n");
        assert_eq!(out, vec!["partial".to_string()]);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let mut reader = SseLineReader::new();
        let out = reader.push(b": keep-alive\n\ndata: x\n");
        assert_eq!(out, vec!["x".to_string()]);
    }

    #[test]
    fn finish_flushes_remaining_buffer() {
        let mut reader = SseLineReader::new();
        reader.push(b"data: no-newline");
        assert_eq!(reader.finish(), Some("no-newline".to_string()));
        assert_eq!(reader.finish(), None);
    }
}
