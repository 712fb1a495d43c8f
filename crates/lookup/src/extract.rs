//! Ingredient-name extraction from user text.
//!
//! Used by the generation entry point when neither the explicit
//! ingredient list nor the intent carried any names: a regex pass over
//! line-prefixed quantities (`- 200g cream`) and inline quantities
//! (`500g flour`).

use std::sync::OnceLock;

use regex::Regex;

/// Words that terminate an inline ingredient name.
const STOPWORDS: &[&str] = &[
    "for", "the", "and", "with", "then", "a", "an", "to", "in", "on", "into", "until", "please",
];

fn line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?mi)^\s*-\s*\d+(?:\.\d+)?\s*(?:g|kg|mg|ml|l|tbsp|tsp|cups?|oz)\b\s+(.+?)\s*$",
        )
        .expect("static regex compiles")
    })
}

fn inline_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:g|kg|mg|ml|l)\s+(?:of\s+)?([a-z]+(?:\s+[a-z]+){0,2})")
            .expect("static regex compiles")
    })
}

/// Cut an inline capture at the first stopword: "sugar for the glaze"
/// becomes "sugar", "olive oil" stays whole.
fn trim_at_stopword(raw: &str) -> String {
    raw.split_whitespace()
        .take_while(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Well-known food compounds resolvable by name. Queries that mention
/// one directly ("why does capsaicin taste hot") carry no quantities,
/// so the quantity regexes alone would miss them.
const COMPOUND_LEXICON: &[&str] = &[
    "capsaicin",
    "caffeine",
    "menthol",
    "curcumin",
    "vanillin",
    "citric acid",
    "acetic acid",
    "glutamate",
    "fructose",
    "glucose",
    "sucrose",
    "lactose",
    "allicin",
    "piperine",
    "theobromine",
    "gingerol",
    "limonene",
    "quercetin",
];

/// Scan a message for directly-named compounds from the lexicon.
pub fn extract_compound_mentions(message: &str) -> Vec<String> {
    let msg = message.to_lowercase();
    COMPOUND_LEXICON
        .iter()
        .filter(|c| msg.contains(*c))
        .map(|c| c.to_string())
        .collect()
}

/// Extract ingredient names from free text. Names are lower-cased,
/// trimmed, and deduplicated in order of first appearance.
pub fn extract_ingredient_names(message: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        let name = raw
            .trim()
            .trim_end_matches(['.', ',', '!', '?'])
            .to_lowercase();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    };

    for caps in line_pattern().captures_iter(message) {
        push(&caps[1]);
    }
    for caps in inline_pattern().captures_iter(message) {
        push(&trim_at_stopword(&caps[1]));
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_line_prefixed_ingredients() {
        let msg = "Here's what I have:\n- 500g flour\n- 200 ml cream\n- 3 tbsp olive oil";
        let names = extract_ingredient_names(msg);
        assert!(names.contains(&"flour".to_string()));
        assert!(names.contains(&"cream".to_string()));
        assert!(names.contains(&"olive oil".to_string()));
    }

    #[test]
    fn extracts_inline_quantities() {
        let names = extract_ingredient_names("Make me a carbonara with 500g flour");
        assert_eq!(names, vec!["flour".to_string()]);
    }

    #[test]
    fn handles_of_phrasing() {
        let names = extract_ingredient_names("add 50g of butter, then serve");
        assert_eq!(names, vec!["butter".to_string()]);
    }

    #[test]
    fn inline_name_stops_at_stopword() {
        let names = extract_ingredient_names("use 200g sugar for the glaze");
        assert_eq!(names, vec!["sugar".to_string()]);
    }

    #[test]
    fn deduplicates_names() {
        let names = extract_ingredient_names("- 100g sugar\nuse 200g sugar for the glaze");
        assert_eq!(names, vec!["sugar".to_string()]);
    }

    #[test]
    fn plain_text_extracts_nothing() {
        assert!(extract_ingredient_names("why is my sauce broken").is_empty());
    }

    #[test]
    fn compound_mentions_are_detected() {
        let names = extract_compound_mentions("Why does capsaicin taste hot?");
        assert_eq!(names, vec!["capsaicin".to_string()]);
    }

    #[test]
    fn compound_mentions_absent_in_plain_chat() {
        assert!(extract_compound_mentions("hi there").is_empty());
    }
}
