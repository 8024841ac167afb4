//! Line framing for streamed scan output
//!
//! The scan backend writes plain text with newline terminators, but transport
//! chunks land on arbitrary byte boundaries: a line can be split across chunks,
//! a chunk can carry several lines, and a multi-byte UTF-8 character can be
//! split in two. The framer buffers raw bytes and only decodes once a line is
//! complete, so none of those cases can corrupt or reorder output.
//!
//! One framer serves exactly one stream. There is no reset: build a new one.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;

/// Splits an incrementally delivered byte stream into complete lines
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes of the current, not yet terminated line
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment; returns every line it completed, in order
    ///
    /// Lines are returned without their terminator (`\n`, or `\r\n`).
    /// Whitespace-only lines are dropped.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = fragment;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];

            let raw = std::mem::take(&mut self.pending);
            if let Some(line) = finalize(&raw) {
                lines.push(line);
            }
        }

        self.pending.extend_from_slice(rest);
        lines
    }

    /// Convenience wrapper for text fragments
    pub fn push_str(&mut self, fragment: &str) -> Vec<String> {
        self.push(fragment.as_bytes())
    }

    /// True when an unterminated partial line is buffered
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// End of stream: flush the trailing partial line, if any
    pub fn finish(self) -> Option<String> {
        finalize(&self.pending)
    }
}

/// Strip a trailing `\r`, decode, and suppress whitespace-only lines
fn finalize(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}

struct FrameState<S, E> {
    stream: S,
    framer: Option<LineFramer>,
    ready: VecDeque<String>,
    error: Option<E>,
}

/// Lazily frame a byte stream into lines
///
/// Yields each line as soon as its terminator arrives. When the source ends,
/// the trailing partial line is flushed. When the source fails, the partial
/// line is flushed first and the error is yielded last; nothing follows it.
pub fn frame_stream<S, E>(stream: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    let state = FrameState {
        stream,
        framer: Some(LineFramer::new()),
        ready: VecDeque::new(),
        error: None,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if let Some(err) = state.error.take() {
                return Some((Err(err), state));
            }
            if state.framer.is_none() {
                return None;
            }

            match state.stream.next().await {
                Some(Ok(chunk)) => {
                    if let Some(framer) = state.framer.as_mut() {
                        state.ready.extend(framer.push(&chunk));
                    }
                }
                Some(Err(err)) => {
                    state
                        .ready
                        .extend(state.framer.take().and_then(LineFramer::finish));
                    state.error = Some(err);
                }
                None => {
                    state
                        .ready
                        .extend(state.framer.take().and_then(LineFramer::finish));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn frame_all(fragments: &[&str]) -> Vec<String> {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for fragment in fragments {
            lines.extend(framer.push_str(fragment));
        }
        lines.extend(framer.finish());
        lines
    }

    #[test]
    fn test_partial_line_joined_across_fragments() {
        let lines = frame_all(&["[*] Starting\n[*] Po", "rt scan\n[OK] Done\n"]);
        assert_eq!(lines, vec!["[*] Starting", "[*] Port scan", "[OK] Done"]);
    }

    #[test]
    fn test_fragment_without_terminator_stays_pending() {
        let mut framer = LineFramer::new();
        assert!(framer.push_str("no newline yet").is_empty());
        assert!(framer.has_pending());
        assert!(framer.push_str(" still").is_empty());
        assert_eq!(framer.push_str("\n"), vec!["no newline yet still"]);
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_multiple_terminators_in_one_fragment() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.push_str("a\nb\nc\n"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unterminated_tail_flushed_on_finish() {
        assert_eq!(frame_all(&["first\nsecond"]), vec!["first", "second"]);
    }

    #[test]
    fn test_empty_final_fragment_then_finish() {
        let mut framer = LineFramer::new();
        assert!(framer.push_str("tail").is_empty());
        assert!(framer.push_str("").is_empty());
        assert_eq!(framer.finish(), Some("tail".to_string()));
    }

    #[test]
    fn test_blank_lines_suppressed_but_content_untrimmed() {
        let lines = frame_all(&["\n   \n  indented\n\t\n"]);
        assert_eq!(lines, vec!["  indented"]);
    }

    #[test]
    fn test_crlf_terminator_stripped() {
        assert_eq!(frame_all(&["one\r\ntwo\r", "\n"]), vec!["one", "two"]);
    }

    #[test]
    fn test_multibyte_character_split_across_fragments() {
        let text = "ünïcode ✓ done\n".as_bytes();
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        // Split inside the three-byte check mark
        let split = text.iter().position(|&b| b == 0xE2).unwrap() + 1;
        lines.extend(framer.push(&text[..split]));
        lines.extend(framer.push(&text[split..]));
        assert_eq!(lines, vec!["ünïcode ✓ done"]);
    }

    #[test]
    fn test_any_split_point_yields_same_lines() {
        let text = "[*] Starting\n[*] Port scan\n\n[WARN] open 22\n[OK] Done";
        let expected: Vec<String> = text
            .split('\n')
            .filter(|l| !l.trim().is_empty())
            .map(String::from)
            .collect();

        for split in 0..=text.len() {
            let (a, b) = text.split_at(split);
            assert_eq!(frame_all(&[a, b]), expected, "split at {}", split);
        }

        let bytes: Vec<String> = text.chars().map(String::from).collect();
        let singles: Vec<&str> = bytes.iter().map(String::as_str).collect();
        assert_eq!(frame_all(&singles), expected);
    }

    #[tokio::test]
    async fn test_frame_stream_yields_lines_then_ends() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"[*] Starting\n[*] Po")),
            Ok(Bytes::from_static(b"rt scan\n[OK] Done")),
        ];
        let lines: Vec<_> = frame_stream(stream::iter(chunks)).collect().await;
        assert_eq!(
            lines,
            vec![
                Ok("[*] Starting".to_string()),
                Ok("[*] Port scan".to_string()),
                Ok("[OK] Done".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_frame_stream_flushes_partial_before_error() {
        let chunks: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"line one\npart")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"never read\n")),
        ];
        let lines: Vec<_> = frame_stream(stream::iter(chunks)).collect().await;
        assert_eq!(
            lines,
            vec![
                Ok("line one".to_string()),
                Ok("part".to_string()),
                Err("connection reset".to_string()),
            ]
        );
    }
}
