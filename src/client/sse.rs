//! Incremental event-stream decoding
//!
//! Network reads split the body at arbitrary byte offsets: inside a line,
//! between `\r` and `\n`, or in the middle of a multi-byte UTF-8 sequence.
//! [`SseDecoder`] keeps both the undecoded byte tail and the partial line
//! across reads and yields text fragments only for complete `data:` lines.

use serde::Deserialize;

/// Sentinel payload marking the end of the stream
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Extracts the text fragment from a single event-stream line
///
/// Returns `None` for non-`data:` lines, the `[DONE]` sentinel, payloads
/// that are not JSON, events without a `text_delta`, and empty fragments.
///
/// # Examples
///
/// ```
/// use noor::client::sse::parse_data_line;
///
/// let line = r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"Hi"}}"#;
/// assert_eq!(parse_data_line(line), Some("Hi".to_string()));
/// assert_eq!(parse_data_line("data: [DONE]"), None);
/// assert_eq!(parse_data_line("event: ping"), None);
/// ```
pub fn parse_data_line(line: &str) -> Option<String> {
    let rest = line.strip_prefix("data:")?;
    let payload = rest.strip_prefix(' ').unwrap_or(rest).trim_end();

    if payload.is_empty() || payload == DONE_SENTINEL {
        return None;
    }

    let event: StreamEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            tracing::trace!("Skipping malformed stream line: {}", e);
            return None;
        }
    };

    let delta = event.delta?;
    if delta.kind.as_deref() != Some("text_delta") {
        return None;
    }
    delta.text.filter(|t| !t.is_empty())
}

/// Stateful decoder for a chunked event stream
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of an incomplete UTF-8 sequence from the previous read
    pending: Vec<u8>,
    /// Decoded text after the last complete line
    line_buffer: String,
}

impl SseDecoder {
    /// Creates an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network read and returns the fragments of every line it completed
    ///
    /// # Examples
    ///
    /// ```
    /// use noor::client::sse::SseDecoder;
    ///
    /// let mut decoder = SseDecoder::new();
    /// let first = decoder.push(br#"data: {"delta":{"type":"text_delta","te"#);
    /// assert!(first.is_empty());
    /// let second = decoder.push(b"xt\":\"Hello\"}}\n");
    /// assert_eq!(second, vec!["Hello".to_string()]);
    /// ```
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        self.decode_pending();
        self.drain_lines()
    }

    /// Flushes the decoder at end of stream
    ///
    /// Any incomplete UTF-8 tail is decoded lossily and a final line without
    /// a terminating newline is processed as complete.
    pub fn finish(&mut self) -> Vec<String> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.line_buffer.push_str(&tail);
            self.pending.clear();
        }

        let mut fragments = self.drain_lines();
        let last = std::mem::take(&mut self.line_buffer);
        let last = last.strip_suffix('\r').unwrap_or(&last);
        if let Some(fragment) = parse_data_line(last) {
            fragments.push(fragment);
        }
        fragments
    }

    fn decode_pending(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.line_buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.line_buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(invalid) => {
                            self.line_buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut fragments = Vec::new();
        while let Some(pos) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=pos).collect();
            let line = line.trim_end_matches('\n');
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(fragment) = parse_data_line(line) {
                fragments.push(fragment);
            }
        }
        fragments
    }
}
