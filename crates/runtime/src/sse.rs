use std::collections::VecDeque;
use std::pin::Pin;

use futures::{stream, Stream, StreamExt};
use serde::Deserialize;

const DONE_SENTINEL: &str = "[DONE]";

/// Longest line held while waiting for its newline. Longer lines are dropped.
const MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// One stream frame that could not be read. Logged and skipped by the decoder.
#[derive(Debug, thiserror::Error)]
#[error("failed to parse stream fragment {payload:?}: {source}")]
pub struct ParseFragmentError {
    payload: String,
    #[source]
    source: serde_json::Error,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

fn decode_line(line: &str) -> Result<Option<SseEvent>, ParseFragmentError> {
    let line = line.trim_end_matches('\r');
    let Some(payload) = line.strip_prefix("data:") else {
        // blank separators, comments and other fields
        return Ok(None);
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);

    if payload.trim() == DONE_SENTINEL {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|source| ParseFragmentError { payload: payload.to_string(), source })?;

    Ok(chunk.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(SseEvent::Delta))
}

/// Splits an OpenAI-style `data: ...` byte stream into events. Network chunk
/// boundaries may fall anywhere, including inside a UTF-8 sequence; lines are
/// decoded only once complete.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
    /// Set while skipping the rest of an oversized line.
    discarding: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.handle_line(&line[..newline], &mut events) {
                self.buffer.clear();
                break;
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            if !self.discarding {
                tracing::warn!("[SseDecoder] dropping line longer than {} bytes", MAX_LINE_BYTES);
            }
            self.buffer.clear();
            self.discarding = true;
        }
        events
    }

    /// Decodes a final line that had no trailing newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.done && !self.discarding && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.handle_line(&line, &mut events);
        }
        events
    }

    /// Returns true once the terminal sentinel has been seen.
    fn handle_line(&mut self, raw: &[u8], events: &mut Vec<SseEvent>) -> bool {
        let line = String::from_utf8_lossy(raw);
        match decode_line(&line) {
            Ok(Some(SseEvent::Done)) => {
                self.done = true;
                events.push(SseEvent::Done);
                true
            }
            Ok(Some(event)) => {
                events.push(event);
                false
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("[SseDecoder] skipping frame: {}", e);
                false
            }
        }
    }
}

/// Turns an upstream byte stream into the lazy sequence of text deltas.
/// Ends at `[DONE]`, at the end of the upstream, or at a transport error.
/// Dropping the returned stream drops the upstream connection with it.
pub fn decode_fragments<S, B, E>(upstream: S) -> impl Stream<Item = String> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<B, E> {
        upstream: Pin<Box<dyn Stream<Item = Result<B, E>> + Send>>,
        decoder: SseDecoder,
        queue: VecDeque<String>,
        finished: bool,
    }

    let state = State {
        upstream: Box::pin(upstream),
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.queue.pop_front() {
                return Some((fragment, state));
            }
            if state.finished {
                return None;
            }

            let events = match state.upstream.next().await {
                Some(Ok(bytes)) => state.decoder.push(bytes.as_ref()),
                Some(Err(e)) => {
                    tracing::warn!("[decode_fragments] upstream stream error: {}", e);
                    state.finished = true;
                    state.decoder.finish()
                }
                None => {
                    state.finished = true;
                    state.decoder.finish()
                }
            };

            for event in events {
                match event {
                    SseEvent::Delta(text) => state.queue.push_back(text),
                    SseEvent::Done => {
                        state.finished = true;
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!("data: {}\n\n", serde_json::json!({"choices":[{"delta":{"content":content}}]}))
    }

    #[test]
    fn test_decode_delta_and_done() {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.push(frame("Hi").as_bytes());
        events.extend(decoder.push(b"data: [DONE]\n\n"));
        assert_eq!(events, vec![SseEvent::Delta("Hi".into()), SseEvent::Done]);
        assert!(decoder.is_done());
        assert!(decoder.push(frame("late").as_bytes()).is_empty());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let raw = frame("héllo");
        let bytes = raw.as_bytes();
        // split inside the two-byte 'é'
        let split = raw.find('é').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec![SseEvent::Delta("héllo".into())]);
    }

    #[test]
    fn test_ignores_role_only_comments_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(
            b": keep-alive\r\n\r\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\ndata:{\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n"
        );
        assert_eq!(events, vec![SseEvent::Delta("ok".into())]);
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let mut decoder = SseDecoder::new();
        let mut input = frame("a");
        input.push_str("data: {not json\n\n");
        input.push_str(&frame("b"));
        let events = decoder.push(input.as_bytes());
        assert_eq!(events, vec![SseEvent::Delta("a".into()), SseEvent::Delta("b".into())]);
    }

    #[test]
    fn test_oversized_line_is_dropped() {
        let mut decoder = SseDecoder::new();
        let mut huge = b"data: ".to_vec();
        huge.extend(std::iter::repeat(b'x').take(MAX_LINE_BYTES));
        assert!(decoder.push(&huge).is_empty());
        assert!(decoder.buffer.is_empty());
        assert!(decoder.push(b"still the same line").is_empty());
        assert!(decoder.buffer.len() <= MAX_LINE_BYTES);

        let events = decoder.push(format!("tail\n{}", frame("ok")).as_bytes());
        assert_eq!(events, vec![SseEvent::Delta("ok".into())]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DO").is_empty());
        assert!(decoder.push(b"NE]").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Done]);
    }
}
