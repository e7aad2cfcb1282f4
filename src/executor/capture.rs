// Bounded per-stream output capture

/// Appended to captured text when the stream exceeded its cap
pub const TRUNCATION_MARKER: &str = "\n\n[OUTPUT TRUNCATED - exceeded maximum size]";

/// Finalized view of one captured stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub text: String,
    pub truncated: bool,
}

/// Accumulates bytes from a single stream up to `cap` bytes.
///
/// Once the cap is hit the buffer stays truncated and drops everything
/// that arrives afterwards.
#[derive(Debug)]
pub struct OutputCapture {
    cap: usize,
    buf: Vec<u8>,
    truncated: bool,
    observed: u64,
}

impl OutputCapture {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: Vec::with_capacity(cap.min(8192)),
            truncated: false,
            observed: 0,
        }
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.observed = self.observed.saturating_add(chunk.len() as u64);

        if self.truncated {
            return;
        }

        let room = self.cap.saturating_sub(self.buf.len());
        if chunk.len() <= room {
            self.buf.extend_from_slice(chunk);
        } else {
            self.buf.extend_from_slice(&chunk[..room]);
            self.truncated = true;
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Bytes kept so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total bytes seen on the stream, including discarded ones
    pub fn observed_bytes(&self) -> u64 {
        self.observed
    }

    pub fn finalize(self) -> CapturedOutput {
        let mut text = String::from_utf8_lossy(&self.buf).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        CapturedOutput {
            text,
            truncated: self.truncated,
        }
    }
}

/// Output bytes in finalized `text`, not counting a trailing marker
pub fn body_len(text: &str) -> usize {
    text.strip_suffix(TRUNCATION_MARKER).map_or(text.len(), str::len)
}

/// Cut finalized `text` down to at most `max` output bytes on a char boundary.
///
/// The marker stays last and appears once. Returns true if anything was cut.
pub fn clip_text(text: &mut String, max: usize) -> bool {
    if body_len(text) <= max {
        return false;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    true
}
