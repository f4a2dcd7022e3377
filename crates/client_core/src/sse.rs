//! Incremental decoder for `text/event-stream` bodies.
//!
//! Only `data:` fields matter here; the backend puts the whole envelope in
//! them. Chunks may split lines and UTF-8 sequences anywhere.

use thiserror::Error;

/// Largest unterminated line, or accumulated event data, the decoder holds.
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event stream frame exceeds {limit} bytes without completing")]
pub struct FrameTooLarge {
    pub limit: usize,
}

#[derive(Debug)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
    data_bytes: usize,
    limit: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_EVENT_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            data_lines: Vec::new(),
            data_bytes: 0,
            limit,
        }
    }

    /// Feeds a chunk and returns the data of every event it completed.
    /// Once a frame outgrows the limit the buffered input is discarded and
    /// the stream should be dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, FrameTooLarge> {
        self.pending.extend_from_slice(chunk);

        let mut completed = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(data) = self.process_line(&line) {
                completed.push(data);
            }
        }
        if self.pending.len() > self.limit || self.data_bytes > self.limit {
            self.pending.clear();
            self.data_lines.clear();
            self.data_bytes = 0;
            return Err(FrameTooLarge { limit: self.limit });
        }
        Ok(completed)
    }

    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        if line.is_empty() {
            if self.data_lines.is_empty() {
                return None;
            }
            let data = self.data_lines.join("\n");
            self.data_lines.clear();
            self.data_bytes = 0;
            return Some(data);
        }
        if line[0] == b':' {
            return None;
        }

        let line = String::from_utf8_lossy(line);
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };
        if field == "data" {
            self.data_bytes += value.len();
            self.data_lines.push(value.to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(decoder: &mut SseDecoder, chunk: &[u8]) -> Vec<String> {
        decoder.push(chunk).expect("within limit")
    }

    #[test]
    fn decodes_single_event() {
        let mut decoder = SseDecoder::new();
        let events = push(&mut decoder, b"data: {\"event\":\"heartbeat\",\"data\":{}}\n\n");
        assert_eq!(events, vec![r#"{"event":"heartbeat","data":{}}"#.to_string()]);
    }

    #[test]
    fn reassembles_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(push(&mut decoder, b"data: {\"event\":").is_empty());
        assert!(push(&mut decoder, b"\"heartbeat\"}\n").is_empty());
        let events = push(&mut decoder, b"\ndata: second\n\n");
        assert_eq!(events, vec![r#"{"event":"heartbeat"}"#.to_string(), "second".to_string()]);
    }

    #[test]
    fn handles_crlf_and_split_utf8() {
        let mut decoder = SseDecoder::new();
        let text = "data: caf\u{e9}\r\n\r\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).expect("lead byte") + 1;
        assert!(push(&mut decoder, &text[..split]).is_empty());
        assert_eq!(push(&mut decoder, &text[split..]), vec!["caf\u{e9}".to_string()]);
    }

    #[test]
    fn joins_multiline_data_and_ignores_other_fields() {
        let mut decoder = SseDecoder::new();
        let events = push(
            &mut decoder,
            b": keep-alive\nevent: message\nid: 7\ndata: line one\ndata:line two\nretry: 10\n\n",
        );
        assert_eq!(events, vec!["line one\nline two".to_string()]);
    }

    #[test]
    fn blank_lines_without_data_emit_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(push(&mut decoder, b"\n\n: ping\n\n").is_empty());
    }

    #[test]
    fn unterminated_line_past_the_limit_is_rejected() {
        let mut decoder = SseDecoder::with_limit(16);
        assert!(push(&mut decoder, b"data: 0123456789").is_empty());
        assert_eq!(
            decoder.push(b"abcdef"),
            Err(FrameTooLarge { limit: 16 })
        );

        assert_eq!(push(&mut decoder, b"data: ok\n\n"), vec!["ok".to_string()]);
    }

    #[test]
    fn data_lines_count_towards_the_limit() {
        let mut decoder = SseDecoder::with_limit(16);
        assert!(push(&mut decoder, b"data: 0123456789\n").is_empty());
        assert!(decoder.push(b"data: 0123456789\n").is_err());
    }
}
