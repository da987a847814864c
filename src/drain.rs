//! Time-bounded collection of PTY output.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};
use tracing::trace;

/// What one drain episode collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainResult {
    pub text: String,
    pub elapsed: Duration,
    /// `false` once the stream has closed; nothing more will arrive.
    pub alive: bool,
}

/// Folds CRLF to LF and decodes UTF-8 across any number of drain episodes.
///
/// A trailing CR and an incomplete trailing UTF-8 sequence are held back
/// until the bytes that complete them arrive, or until [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct OutputDecoder {
    bytes: Vec<u8>,
    pending_cr: bool,
}

impl OutputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, chunk: &[u8]) {
        for &b in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if b == b'\n' {
                    self.bytes.push(b'\n');
                    continue;
                }
                self.bytes.push(b'\r');
            }
            if b == b'\r' {
                self.pending_cr = true;
            } else {
                self.bytes.push(b);
            }
        }
    }

    /// A pending CR is trailing whitespace, so it never affects the match.
    fn ends_with_prompt(&self, prompt: &[u8]) -> bool {
        self.bytes.trim_ascii_end().ends_with(prompt)
    }

    /// Decode everything complete so far, keeping a partial character back.
    fn take_complete(&mut self) -> String {
        let held = incomplete_tail(&self.bytes);
        let tail = self.bytes.split_off(self.bytes.len() - held);
        let text = String::from_utf8_lossy(&self.bytes).into_owned();
        self.bytes = tail;
        text
    }

    /// Decode whatever was held back once no more output will follow.
    pub fn finish(mut self) -> String {
        if self.pending_cr {
            self.bytes.push(b'\r');
        }
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Length of a UTF-8 sequence at the end of `bytes` that is cut short.
fn incomplete_tail(bytes: &[u8]) -> usize {
    let floor = bytes.len().saturating_sub(3);
    (floor..bytes.len())
        .rev()
        .find(|&i| bytes[i] & 0xC0 != 0x80)
        .filter(|&i| matches!(std::str::from_utf8(&bytes[i..]), Err(e) if e.error_len().is_none()))
        .map_or(0, |i| bytes.len() - i)
}

/// Collect output from `stream` for at most `budget`.
///
/// With a `prompt`, returns as soon as the right-trimmed text ends with the
/// right-trimmed prompt. Without one, only the budget or a closed stream ends
/// the episode. A zero budget performs a single non-blocking check.
pub fn drain(stream: &Receiver<Vec<u8>>, budget: Duration, prompt: Option<&str>) -> DrainResult {
    let mut decoder = OutputDecoder::new();
    let mut result = drain_with(&mut decoder, stream, budget, prompt);
    result.text.push_str(&decoder.finish());
    result
}

/// Like [`drain`], continuing `decoder` from earlier episodes. Bytes that
/// cannot be decoded yet stay in `decoder` rather than in the result.
pub fn drain_with(
    decoder: &mut OutputDecoder,
    stream: &Receiver<Vec<u8>>,
    budget: Duration,
    prompt: Option<&str>,
) -> DrainResult {
    let start = Instant::now();
    let target = prompt
        .map(|p| p.trim_end().as_bytes())
        .filter(|p| !p.is_empty());
    let mut alive = true;

    if budget.is_zero() {
        match stream.try_recv() {
            Ok(chunk) => decoder.push(&chunk),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => alive = false,
        }
    } else {
        loop {
            let elapsed = start.elapsed();
            if elapsed >= budget {
                break;
            }
            match stream.recv_timeout(budget - elapsed) {
                Ok(chunk) => {
                    trace!(bytes = chunk.len(), "pty output");
                    decoder.push(&chunk);
                    if target.is_some_and(|t| decoder.ends_with_prompt(t)) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    alive = false;
                    break;
                }
            }
        }
    }

    DrainResult {
        text: decoder.take_complete(),
        elapsed: start.elapsed(),
        alive,
    }
}
