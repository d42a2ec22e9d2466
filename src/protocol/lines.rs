//! Line tokenizer for the AT response stream
//!
//! Splits a receive buffer into CR-terminated lines. A leading LF left over
//! from the previous CRLF pair is dropped, as are empty lines.

/// Iterates the lines of a receive buffer without copying.
///
/// Consumed bytes are skipped; [`LineTokenizer::remaining`] exposes what
/// has not been tokenized yet. A trailing fragment without CR is still
/// yielded, since a streaming modem may stop mid-line when the window ends.
pub struct LineTokenizer<'a> {
    remaining: &'a [u8],
}

impl<'a> LineTokenizer<'a> {
    /// Create a tokenizer over a receive buffer
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { remaining: buffer }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &'a [u8] {
        self.remaining
    }

    /// Returns true once every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

impl<'a> Iterator for LineTokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining.is_empty() {
                return None;
            }

            let (raw, rest) = match self.remaining.iter().position(|&b| b == b'\r') {
                Some(pos) => (&self.remaining[..pos], &self.remaining[pos + 1..]),
                None => (self.remaining, &self.remaining[self.remaining.len()..]),
            };
            self.remaining = rest;

            let mut line = raw;
            while let [b'\n', tail @ ..] = line {
                line = tail;
            }
            while let [head @ .., b'\n'] = line {
                line = head;
            }
            if line.is_empty() {
                continue;
            }

            match core::str::from_utf8(line) {
                Ok(text) => return Some(text),
                Err(_) => {
                    log::warn!("Dropping non-UTF-8 line ({} bytes)", line.len());
                }
            }
        }
    }
}
