//! Real-time token scrubber.
//!
//! Streaming models leak artifacts that must never reach the client:
//! `<think>…</think>` spans, ReAct-style labels, and system-prompt echo
//! fragments. The scrubber is stateful because a tag can arrive split
//! across token boundaries.

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Labels dropped wherever they appear in a flushed chunk. Content
/// after a label is preserved; the post-generation governance pass
/// catches anything a token boundary let slip.
const ARTIFACT_LABELS: &[&str] = &[
    "Thought:",
    "Action:",
    "Action Input:",
    "Observation:",
    "Final Answer:",
    "You are Nutri.",
];

/// Stateful scrubber for one generation stream.
#[derive(Debug, Default)]
pub struct TokenScrubber {
    in_think: bool,
    carry: String,
}

impl TokenScrubber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one token; returns the text safe to emit now (possibly
    /// empty while inside a thinking span or holding a partial tag).
    pub fn scrub(&mut self, token: &str) -> String {
        self.carry.push_str(token);
        let mut out = String::new();

        loop {
            if self.in_think {
                match self.carry.find(THINK_CLOSE) {
                    Some(pos) => {
                        self.carry.drain(..pos + THINK_CLOSE.len());
                        self.in_think = false;
                    }
                    None => {
                        // Keep only a possible partial close tag.
                        let keep = partial_suffix_len(&self.carry, THINK_CLOSE);
                        self.carry.drain(..self.carry.len() - keep);
                        return strip_labels(&out);
                    }
                }
            } else {
                match self.carry.find(THINK_OPEN) {
                    Some(pos) => {
                        out.push_str(&self.carry[..pos]);
                        self.carry.drain(..pos + THINK_OPEN.len());
                        self.in_think = true;
                    }
                    None => {
                        let keep = partial_suffix_len(&self.carry, THINK_OPEN);
                        let flush_to = self.carry.len() - keep;
                        out.push_str(&self.carry[..flush_to]);
                        self.carry.drain(..flush_to);
                        return strip_labels(&out);
                    }
                }
            }
        }
    }

    /// Flush whatever is still held back at end of stream. An unclosed
    /// thinking span stays dropped.
    pub fn finish(&mut self) -> String {
        if self.in_think {
            self.carry.clear();
            return String::new();
        }
        let rest = std::mem::take(&mut self.carry);
        strip_labels(&rest)
    }
}

/// Length of the longest proper prefix of `tag` that the buffer ends
/// with — the bytes that might become a tag once the next token lands.
fn partial_suffix_len(buffer: &str, tag: &str) -> usize {
    let max = (tag.len() - 1).min(buffer.len());
    for len in (1..=max).rev() {
        if buffer.ends_with(&tag[..len]) {
            return len;
        }
    }
    0
}

fn strip_labels(text: &str) -> String {
    let mut out = text.to_string();
    for label in ARTIFACT_LABELS {
        if out.contains(label) {
            out = out.replace(label, "");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrub_all(tokens: &[&str]) -> String {
        let mut scrubber = TokenScrubber::new();
        let mut out = String::new();
        for token in tokens {
            out.push_str(&scrubber.scrub(token));
        }
        out.push_str(&scrubber.finish());
        out
    }

    #[test]
    fn plain_tokens_pass_through() {
        assert_eq!(scrub_all(&["hello ", "world"]), "hello world");
    }

    #[test]
    fn think_span_in_one_token_is_dropped() {
        assert_eq!(
            scrub_all(&["<think>pondering</think>answer"]),
            "answer"
        );
    }

    #[test]
    fn think_span_split_across_tokens_is_dropped() {
        assert_eq!(
            scrub_all(&["before <thi", "nk>hidden", " stuff</th", "ink> after"]),
            "before  after"
        );
    }

    #[test]
    fn unclosed_think_drops_remainder() {
        assert_eq!(scrub_all(&["visible <think>never closed"]), "visible ");
    }

    #[test]
    fn react_labels_are_removed() {
        assert_eq!(
            scrub_all(&["Final Answer: use less salt"]),
            " use less salt"
        );
        assert_eq!(scrub_all(&["Thought: hmm\nreal text"]), " hmm\nreal text");
    }

    #[test]
    fn system_prompt_echo_is_removed() {
        assert_eq!(scrub_all(&["You are Nutri. Welcome!"]), " Welcome!");
    }

    #[test]
    fn partial_tag_lookalike_is_eventually_flushed() {
        // "<th" never becomes a tag — it must still come out.
        assert_eq!(scrub_all(&["a <th", "ree course meal"]), "a <three course meal");
    }
}
