//! Minimal incremental server-sent-events framing.
//!
//! Providers stream responses as SSE over HTTP. Chunks from the byte stream
//! do not align with event boundaries, so [`SseBuffer`] accumulates bytes and
//! yields one complete event block (terminated by a blank line) at a time.

pub struct SseBuffer {
    buffer: String,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Pop the next complete event block, if one has fully arrived.
    pub fn next_event_block(&mut self) -> Option<String> {
        let boundary = self.buffer.find("\n\n")?;
        let block = self.buffer[..boundary].to_string();
        self.buffer.drain(..boundary + 2);
        Some(block)
    }
}

impl Default for SseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract `data:` payloads from an event block, skipping the `[DONE]`
/// sentinel some vendors terminate with.
pub fn parse_data_lines(block: &str) -> Vec<&str> {
    block
        .lines()
        .filter_map(|line| {
            let line = line.strip_prefix("data:")?.trim_start();
            if line == "[DONE]" { None } else { Some(line) }
        })
        .collect()
}
