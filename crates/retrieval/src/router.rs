//! Retrieval router — decides which index sets a query touches.
//!
//! Every routing decision is logged explicitly; a query with no keyword
//! match routes nowhere and retrieval returns empty.

use std::sync::Arc;

use serde::Serialize;

use nd_domain::error::Result;

use crate::index::Hit;
use crate::manager::IndexManager;
use crate::throttle::EmbeddingThrottle;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Index kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Named index sets available to the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Chemistry,
    Science,
    NutritionBranded,
    NutritionFoundation,
    Recipes,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chemistry => "chemistry",
            Self::Science => "science",
            Self::NutritionBranded => "nutrition_branded",
            Self::NutritionFoundation => "nutrition_foundation",
            Self::Recipes => "recipes",
        }
    }
}

// ── Keyword tables ─────────────────────────────────────────────────

const CHEMISTRY_KEYWORDS: &[&str] = &[
    "molecule",
    "compound",
    "chemical",
    "reaction",
    "enzyme",
    "molecular",
    "formula",
    "structure",
    "oxidation",
    "maillard",
    "flavor compound",
    "volatile",
    "amino acid",
];

const SCIENCE_KEYWORDS: &[&str] = &[
    "research",
    "study",
    "science",
    "why does",
    "how does",
    "temperature",
    "cooking science",
    "food science",
];

const NUTRITION_KEYWORDS: &[&str] = &[
    "nutrition",
    "calorie",
    "protein",
    "vitamin",
    "mineral",
    "macro",
    "nutrient",
    "healthy",
    "diet",
];

const RECIPE_KEYWORDS: &[&str] = &[
    "recipe",
    "cook",
    "make",
    "prepare",
    "ingredients",
    "dish",
    "meal",
    "dinner",
    "lunch",
    "breakfast",
];

/// Detect which indexes are relevant for a query.
pub fn detect_index_kinds(query: &str) -> Vec<IndexKind> {
    let q = query.to_lowercase();
    let mut relevant = Vec::new();

    if CHEMISTRY_KEYWORDS.iter().any(|k| q.contains(k)) {
        relevant.push(IndexKind::Chemistry);
    }
    if SCIENCE_KEYWORDS.iter().any(|k| q.contains(k)) {
        relevant.push(IndexKind::Science);
    }
    if NUTRITION_KEYWORDS.iter().any(|k| q.contains(k)) {
        // Foundation covers raw/fresh produce; branded covers the rest.
        if q.contains("raw") || q.contains("fresh") {
            relevant.push(IndexKind::NutritionFoundation);
        } else {
            relevant.push(IndexKind::NutritionBranded);
        }
    }
    if RECIPE_KEYWORDS.iter().any(|k| q.contains(k)) {
        relevant.push(IndexKind::Recipes);
    }

    if relevant.is_empty() {
        tracing::warn!(query = %query, "no index matched — skipping retrieval");
    } else {
        tracing::info!(
            indexes = ?relevant.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "routing query"
        );
    }
    relevant
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RetrievalRouter {
    manager: Arc<IndexManager>,
    throttle: Arc<EmbeddingThrottle>,
}

impl RetrievalRouter {
    pub fn new(manager: Arc<IndexManager>, throttle: Arc<EmbeddingThrottle>) -> Self {
        Self { manager, throttle }
    }

    /// Detect relevant indexes and search them, merging results by score.
    /// Index load or search failures degrade to fewer results, never to
    /// a failed request.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Hit>> {
        let kinds = detect_index_kinds(query);
        let mut all = Vec::new();

        for kind in kinds {
            let index = match self.manager.get(kind) {
                Ok(index) => index,
                Err(e) => {
                    tracing::warn!(index = kind.as_str(), error = %e, "index unavailable");
                    continue;
                }
            };
            let result = self
                .throttle
                .run(|| async { index.search(query, top_k).await })
                .await;
            match result {
                Ok(mut hits) => {
                    for hit in &mut hits {
                        hit.index_kind = Some(kind);
                    }
                    all.extend(hits);
                }
                Err(e) => {
                    tracing::warn!(index = kind.as_str(), error = %e, "search failed");
                }
            }
        }

        all.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        all.truncate(top_k);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chemistry_terms_route_to_chemistry() {
        let kinds = detect_index_kinds("what compound causes the maillard reaction");
        assert!(kinds.contains(&IndexKind::Chemistry));
    }

    #[test]
    fn raw_nutrition_prefers_foundation() {
        let kinds = detect_index_kinds("nutrition of raw spinach");
        assert!(kinds.contains(&IndexKind::NutritionFoundation));
        assert!(!kinds.contains(&IndexKind::NutritionBranded));
    }

    #[test]
    fn packaged_nutrition_prefers_branded() {
        let kinds = detect_index_kinds("protein in packaged granola");
        assert!(kinds.contains(&IndexKind::NutritionBranded));
    }

    #[test]
    fn recipe_terms_route_to_recipes() {
        let kinds = detect_index_kinds("a cozy dinner dish to cook tonight");
        assert!(kinds.contains(&IndexKind::Recipes));
    }

    #[test]
    fn unmatched_query_routes_nowhere() {
        assert!(detect_index_kinds("hello there").is_empty());
    }

    #[test]
    fn multi_domain_query_routes_to_multiple() {
        let kinds = detect_index_kinds("why does the maillard reaction brown my dish");
        assert!(kinds.contains(&IndexKind::Chemistry));
        assert!(kinds.contains(&IndexKind::Science));
        assert!(kinds.contains(&IndexKind::Recipes));
    }
}
