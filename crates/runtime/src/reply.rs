//! Separation of private `<think>` segments from the visible reply.
//!
//! Tag grammar: an open tag is `<think` followed by zero or more ASCII
//! digits and `>`; a close tag is the same with `</think`. Digit suffixes do
//! not have to agree between the two tags. Segments never nest: an open tag
//! pairs with the nearest close tag after it. An open tag with no close tag
//! after it is left in place together with the rest of the text, and a close
//! tag with no open tag before it is ordinary text.

use std::pin::Pin;

use futures::{stream, Stream, StreamExt};
use serde::Serialize;

const OPEN_PREFIX: &str = "<think";
const CLOSE_PREFIX: &str = "</think";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedReply {
    /// Text shown to the user.
    pub reply: String,
    /// Trimmed segment bodies joined with `\n`; empty when there were none.
    pub thinking: String,
}

/// Length of the tag at the start of `s`, if `s` starts with a complete tag
/// built from `prefix`.
fn tag_len(s: &str, prefix: &str) -> Option<usize> {
    let rest = s.strip_prefix(prefix)?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    match rest.as_bytes().get(digits) {
        Some(b'>') => Some(prefix.len() + digits + 1),
        _ => None,
    }
}

/// Byte offset and length of the first complete tag in `s`.
fn find_tag(s: &str, prefix: &str) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(pos) = s[from..].find(prefix) {
        let start = from + pos;
        if let Some(len) = tag_len(&s[start..], prefix) {
            return Some((start, len));
        }
        from = start + prefix.len();
    }
    None
}

fn find_open(s: &str) -> Option<(usize, usize)> {
    find_tag(s, OPEN_PREFIX)
}

fn find_close(s: &str) -> Option<(usize, usize)> {
    find_tag(s, CLOSE_PREFIX)
}

pub fn normalize_reply(raw: &str) -> NormalizedReply {
    let mut visible = String::with_capacity(raw.len());
    let mut segments: Vec<&str> = Vec::new();
    let mut rest = raw;

    while let Some((open_at, open_len)) = find_open(rest) {
        let body_and_after = &rest[open_at + open_len..];
        let Some((close_at, close_len)) = find_close(body_and_after) else {
            // unterminated: keep the tag and everything after it
            break;
        };
        visible.push_str(&rest[..open_at]);
        segments.push(body_and_after[..close_at].trim());
        rest = &body_and_after[close_at + close_len..];
    }
    visible.push_str(rest);

    NormalizedReply {
        reply: visible.trim().to_string(),
        thinking: segments.join("\n"),
    }
}

/// Length of a trailing piece of `s` that could still grow into an open tag.
fn partial_open_suffix(s: &str) -> usize {
    let Some(start) = s.rfind('<') else { return 0 };
    let tail = &s[start..];
    let could_grow = if tail.len() <= OPEN_PREFIX.len() {
        OPEN_PREFIX.starts_with(tail)
    } else {
        tail.starts_with(OPEN_PREFIX) && tail[OPEN_PREFIX.len()..].bytes().all(|b| b.is_ascii_digit())
    };
    if could_grow { tail.len() } else { 0 }
}

/// Incremental form of [`normalize_reply`] for streamed fragments.
///
/// Text inside a segment is held back until its close tag arrives and then
/// dropped. A segment still open at [`ThinkFilter::finish`] is released
/// verbatim. Leading whitespace of the visible reply is dropped; trailing
/// whitespace cannot be known in advance and is passed through.
#[derive(Debug, Default)]
pub struct ThinkFilter {
    pending: String,
    /// Set while `pending` starts with an open tag of this length.
    open_tag_len: Option<usize>,
    emitted: bool,
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) -> String {
        self.pending.push_str(fragment);
        let mut out = String::new();

        loop {
            match self.open_tag_len {
                None => match find_open(&self.pending) {
                    Some((open_at, open_len)) => {
                        out.push_str(&self.pending[..open_at]);
                        self.pending.drain(..open_at);
                        self.open_tag_len = Some(open_len);
                    }
                    None => {
                        let keep = partial_open_suffix(&self.pending);
                        let flush_to = self.pending.len() - keep;
                        out.push_str(&self.pending[..flush_to]);
                        self.pending.drain(..flush_to);
                        break;
                    }
                },
                Some(open_len) => match find_close(&self.pending[open_len..]) {
                    Some((close_at, close_len)) => {
                        self.pending.drain(..open_len + close_at + close_len);
                        self.open_tag_len = None;
                    }
                    None => break,
                },
            }
        }

        self.visible(out)
    }

    /// Releases whatever is still held back once the stream has ended.
    pub fn finish(&mut self) -> String {
        self.open_tag_len = None;
        let rest = std::mem::take(&mut self.pending);
        self.visible(rest)
    }

    fn visible(&mut self, text: String) -> String {
        let text = if self.emitted {
            text
        } else {
            text.trim_start().to_string()
        };
        if !text.is_empty() {
            self.emitted = true;
        }
        text
    }
}

/// Applies a [`ThinkFilter`] to a stream of raw fragments, skipping
/// fragments that become empty.
pub fn visible_fragments<S>(fragments: S) -> impl Stream<Item = String> + Send + 'static
where
    S: Stream<Item = String> + Send + 'static,
{
    struct State {
        upstream: Pin<Box<dyn Stream<Item = String> + Send>>,
        filter: ThinkFilter,
        finished: bool,
    }

    let state = State {
        upstream: Box::pin(fragments),
        filter: ThinkFilter::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        while !state.finished {
            let text = match state.upstream.next().await {
                Some(fragment) => state.filter.push(&fragment),
                None => {
                    state.finished = true;
                    state.filter.finish()
                }
            };
            if !text.is_empty() {
                return Some((text, state));
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_segment() {
        let normalized = normalize_reply("<think>plan A</think>Hello there.");
        assert_eq!(normalized.reply, "Hello there.");
        assert_eq!(normalized.thinking, "plan A");
    }

    #[test]
    fn test_numbered_segments() {
        let normalized = normalize_reply("<think1>a</think1>mid<think2>b</think2>tail");
        assert_eq!(normalized.reply, "midtail");
        assert_eq!(normalized.thinking, "a\nb");
    }

    #[test]
    fn test_no_tags_is_trimmed_passthrough() {
        let normalized = normalize_reply("  Just a reply.\n");
        assert_eq!(normalized.reply, "Just a reply.");
        assert_eq!(normalized.thinking, "");
    }

    #[test]
    fn test_normalizing_twice_is_a_no_op() {
        let once = normalize_reply("<think>hmm</think>  Well then.  ");
        let twice = normalize_reply(&once.reply);
        assert_eq!(twice.reply, once.reply);
        assert_eq!(twice.thinking, "");
    }

    #[test]
    fn test_mismatched_suffixes_still_pair() {
        let normalized = normalize_reply("<think3>x</think>ok");
        assert_eq!(normalized.reply, "ok");
        assert_eq!(normalized.thinking, "x");
    }

    #[test]
    fn test_multiline_body_is_trimmed() {
        let normalized = normalize_reply("<think>\n  step 1\n  step 2\n</think>\n\nSure!");
        assert_eq!(normalized.thinking, "step 1\n  step 2");
        assert_eq!(normalized.reply, "Sure!");
    }

    #[test]
    fn test_unterminated_segment_is_left_in_place() {
        let normalized = normalize_reply("Hi <think>never closed");
        assert_eq!(normalized.reply, "Hi <think>never closed");
        assert_eq!(normalized.thinking, "");

        let normalized = normalize_reply("<think>a</think>Hi <think>dangling");
        assert_eq!(normalized.reply, "Hi <think>dangling");
        assert_eq!(normalized.thinking, "a");
    }

    #[test]
    fn test_nested_open_pairs_with_nearest_close() {
        let normalized = normalize_reply("<think>a<think>b</think>c</think>d");
        assert_eq!(normalized.thinking, "a<think>b");
        assert_eq!(normalized.reply, "c</think>d");
    }

    #[test]
    fn test_stray_close_and_lookalike_tags_are_text() {
        let normalized = normalize_reply("</think>fine <thinking> <think x>");
        assert_eq!(normalized.reply, "</think>fine <thinking> <think x>");
        assert_eq!(normalized.thinking, "");
    }

    #[test]
    fn test_empty_segment_still_counts() {
        let normalized = normalize_reply("<think></think>a<think>b</think>");
        assert_eq!(normalized.reply, "a");
        assert_eq!(normalized.thinking, "\nb");
    }

    fn run_filter(fragments: &[&str]) -> String {
        let mut filter = ThinkFilter::new();
        let mut out: String = fragments.iter().map(|f| filter.push(f)).collect();
        out.push_str(&filter.finish());
        out
    }

    #[test]
    fn test_filter_passes_plain_fragments_through() {
        let mut filter = ThinkFilter::new();
        assert_eq!(filter.push("Hi"), "Hi");
        assert_eq!(filter.push(" there"), " there");
        assert_eq!(filter.finish(), "");
    }

    #[test]
    fn test_filter_drops_segment_split_across_fragments() {
        let out = run_filter(&["<thi", "nk1>plan", " A</th", "ink1>", "\nHello", " there."]);
        assert_eq!(out, "Hello there.");
    }

    #[test]
    fn test_filter_matches_normalizer_on_unterminated_segment() {
        let raw = "Sure <think>unfinished";
        let out = run_filter(&["Sure <th", "ink>unfin", "ished"]);
        assert_eq!(out, normalize_reply(raw).reply);
    }

    #[test]
    fn test_filter_releases_lookalike_tag() {
        let out = run_filter(&["a <", "thinking", "> b"]);
        assert_eq!(out, "a <thinking> b");
    }

    #[tokio::test]
    async fn test_visible_fragments_skips_hidden_text() {
        let raw = stream::iter(vec![
            "<think>".to_string(),
            "secret".to_string(),
            "</think>".to_string(),
            " Hello".to_string(),
            " world".to_string(),
        ]);
        let out: Vec<String> = visible_fragments(raw).collect().await;
        assert_eq!(out, vec!["Hello".to_string(), " world".to_string()]);
    }
}
