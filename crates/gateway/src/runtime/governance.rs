//! Mode-aware nutrition governance — the post-generation safety net
//! that strips numeric nutrition leakage.
//!
//! NUMERIC_ANALYSIS is the authorized numeric surface and bypasses this
//! pass entirely. Everywhere else:
//! - strict nutrient patterns ("500 kcal", "Protein: 25", Scoville
//!   figures) are always stripped;
//! - contextual units ("50 g", "20 mg", "30%") are stripped unless the
//!   mode is PROCEDURAL and no strict nutrient keyword appears within
//!   25 characters ("500g flour" in a recipe survives, "25g protein"
//!   does not);
//! - in non-procedural modes a unit followed by "of <word>" survives as
//!   a culinary volume reference.
//!
//! [`StreamGovernor`] applies the same rules to the live token stream:
//! tokens buffer to a sentence boundary and are governed before they
//! are released, so ungoverned text never reaches the event bus.

use std::sync::OnceLock;

use regex::Regex;

use nd_domain::modes::ResponseMode;

const NEUTRAL_PHRASE: &str = "[qualitatively significant amount]";
const SOFTENED_SENTENCE: &str =
    "a level suited to the dish's profile, providing a rich and balanced energy source.";

/// Nutrient keywords that force a strip regardless of mode.
const STRICT_NUTRIENT_KEYWORDS: &[&str] =
    &["protein", "carb", "fiber", "sodium", "cholesterol", "vitamin"];

/// Context window (chars) inspected around a contextual unit match.
const CONTEXT_WINDOW: usize = 25;

fn strict_patterns() -> &'static Vec<Regex> {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            // "500 kcal", "~500 calories"
            r"(?i)~?\b\d+\s*(?:kcal|calories)\b",
            // "Calories: 500", "Protein: ~25"
            r"(?i)\b(?:Calories|Protein|Fat|Carbs|Sugar):\s*~?\d+",
            // "provides 20g", "contains 300 mg"
            r"(?i)\b(?:provides|contains)\s*~?\d+\s*(?:g|mg)\b",
            // "50000 Scoville", "Scoville rating of 50000"
            r"(?i)~?\b\d+\s*Scoville\b",
            r"(?i)\bScoville\b(?:\s+\w+){0,3}\s+~?\d+\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex compiles"))
        .collect()
    })
}

fn contextual_unit_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)~?\b\d+(?:-\d+)?\s*(?:(?:g|mg)\b|%)").expect("static regex compiles")
    })
}

fn of_word_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*of\s+[a-z]+").expect("static regex compiles"))
}

fn softening_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[qualitatively significant amount\][^.!?\n]*")
            .expect("static regex compiles")
    })
}

/// Apply nutrition governance to an assembled response. Returns the
/// input unchanged for the numeric-analysis mode.
pub fn apply_governance(text: &str, mode: ResponseMode) -> String {
    govern_chunk(text, "", "", mode)
}

/// Govern one chunk of text. `lookbehind` is already-released text and
/// `lookahead` is text known to follow; both only feed the context
/// decisions at the chunk's edges, so a unit near a flush boundary sees
/// the same window it would in a whole-text pass.
fn govern_chunk(chunk: &str, lookbehind: &str, lookahead: &str, mode: ResponseMode) -> String {
    if mode == ResponseMode::NumericAnalysis {
        return chunk.to_string();
    }

    // 1. Strict patterns: stripped in every governed mode.
    let mut governed = chunk.to_string();
    for pattern in strict_patterns() {
        governed = pattern.replace_all(&governed, NEUTRAL_PHRASE).into_owned();
    }

    // 2. Contextual units, decided per match from surrounding text.
    governed = strip_contextual_units(&governed, lookbehind, lookahead, mode);

    // 3. Soften sentence fragments around stripped spans.
    if governed.contains(NEUTRAL_PHRASE) {
        tracing::warn!(mode = %mode, "nutrition governance stripped numeric leakage");
        governed = softening_pattern()
            .replace_all(&governed, SOFTENED_SENTENCE)
            .into_owned();
    }

    governed
}

fn strip_contextual_units(
    text: &str,
    lookbehind: &str,
    lookahead: &str,
    mode: ResponseMode,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    for m in contextual_unit_pattern().find_iter(text) {
        let pre = window_before(text, m.start(), lookbehind);
        let post = window_after(text, m.end(), lookahead);

        if should_strip_unit(&pre, &post, mode) {
            out.push_str(&text[cursor..m.start()]);
            out.push_str(NEUTRAL_PHRASE);
        } else {
            out.push_str(&text[cursor..m.end()]);
        }
        cursor = m.end();
    }
    out.push_str(&text[cursor..]);
    out
}

fn should_strip_unit(pre: &str, post: &str, mode: ResponseMode) -> bool {
    let context = format!("{} {}", pre.to_lowercase(), post.to_lowercase());

    // A strict nutrient label nearby always strips, recipe or not.
    if STRICT_NUTRIENT_KEYWORDS.iter().any(|k| context.contains(k)) {
        return true;
    }

    // Recipes keep their quantities. Ambiguous words (sugar, fat) read
    // as ingredients here, not nutrition facts.
    if mode == ResponseMode::Procedural {
        return false;
    }

    // "50g of flour" is a culinary volume reference; keep it.
    if of_word_pattern().is_match(post) {
        return false;
    }

    true
}

/// Up to `CONTEXT_WINDOW` chars before a byte offset, borrowing the
/// tail of the lookbehind when the chunk starts too late.
fn window_before(text: &str, at: usize, lookbehind: &str) -> String {
    let mut start = at.saturating_sub(CONTEXT_WINDOW);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut window = text[start..at].to_string();
    let have = window.chars().count();
    if have < CONTEXT_WINDOW {
        let need = CONTEXT_WINDOW - have;
        let tail_chars = lookbehind.chars().count();
        let prefix: String = lookbehind
            .chars()
            .skip(tail_chars.saturating_sub(need))
            .collect();
        window.insert_str(0, &prefix);
    }
    window
}

/// Up to `CONTEXT_WINDOW` chars after a byte offset, continuing into
/// the lookahead when the chunk ends early.
fn window_after(text: &str, at: usize, lookahead: &str) -> String {
    let mut window: String = text[at..].chars().take(CONTEXT_WINDOW).collect();
    let have = window.chars().count();
    if have < CONTEXT_WINDOW {
        window.extend(lookahead.chars().take(CONTEXT_WINDOW - have));
    }
    window
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming governor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Governs a token stream before anything reaches the event bus.
///
/// Tokens buffer until a sentence boundary with a full context window
/// behind it, then the completed sentences are governed (with the
/// still-buffered remainder as lookahead) and released. Nothing
/// ungoverned is ever returned; the numeric-analysis mode passes
/// tokens straight through.
#[derive(Debug)]
pub struct StreamGovernor {
    mode: ResponseMode,
    pending: String,
    /// Tail of the raw text already flushed, kept as lookbehind context
    /// for units near the next chunk's start.
    seen_tail: String,
}

impl StreamGovernor {
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            mode,
            pending: String::new(),
            seen_tail: String::new(),
        }
    }

    /// Feed one scrubbed token. Returns governed text that is safe to
    /// emit now, or `None` while buffering.
    pub fn feed(&mut self, token: &str) -> Option<String> {
        if self.mode == ResponseMode::NumericAnalysis {
            return Some(token.to_string());
        }

        self.pending.push_str(token);
        let cut = flush_point(&self.pending)?;
        let head: String = self.pending.drain(..cut).collect();
        let governed = govern_chunk(&head, &self.seen_tail, &self.pending, self.mode);
        self.remember(&head);
        Some(governed)
    }

    /// Govern and release whatever is still buffered at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        if rest.is_empty() {
            return String::new();
        }
        govern_chunk(&rest, &self.seen_tail, "", self.mode)
    }

    fn remember(&mut self, flushed: &str) {
        self.seen_tail.push_str(flushed);
        let len = self.seen_tail.chars().count();
        if len > CONTEXT_WINDOW {
            self.seen_tail = self
                .seen_tail
                .chars()
                .skip(len - CONTEXT_WINDOW)
                .collect();
        }
    }
}

/// Byte offset just past the last sentence terminator that still has a
/// full context window buffered behind it. Flushing only there keeps
/// every contextual decision identical to a whole-text pass.
fn flush_point(buffer: &str) -> Option<usize> {
    let mut candidate = None;
    for (i, c) in buffer.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let end = i + c.len_utf8();
            if buffer.len() - end >= CONTEXT_WINDOW {
                candidate = Some(end);
            }
        }
    }
    candidate
}
