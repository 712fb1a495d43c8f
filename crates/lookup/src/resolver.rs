//! Compound resolver — resolves ingredient names through the lookup
//! client and produces the verification proof attached to traces.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::client::{CompoundProperties, LookupClient};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedCompound {
    pub name: String,
    pub cid: u64,
    pub properties: CompoundProperties,
    pub cached: bool,
    pub resolution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedCompound {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ResolutionResult {
    pub resolved: Vec<ResolvedCompound>,
    pub unresolved: Vec<UnresolvedCompound>,
    pub total_duration_ms: u64,
}

/// Confidence = |resolved| / (|resolved| + |unresolved|). An empty input
/// counts as fully confident — there was nothing to verify.
pub fn confidence_score(result: &ResolutionResult) -> f64 {
    let total = result.resolved.len() + result.unresolved.len();
    if total == 0 {
        return 1.0;
    }
    result.resolved.len() as f64 / total as f64
}

/// Stable proof hash: first 12 hex chars of sha256 over the sorted
/// `name:cid` pairs.
pub fn proof_hash(resolved: &[ResolvedCompound]) -> String {
    let mut pairs: Vec<String> = resolved
        .iter()
        .map(|c| format!("{}:{}", c.name, c.cid))
        .collect();
    pairs.sort();
    let digest = Sha256::digest(pairs.join("|").as_bytes());
    hex::encode(digest)[..12].to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolves ingredient names, two lookups each, with a per-process
/// result cache. Failures record as unresolved and never block the
/// request.
pub struct CompoundResolver {
    client: LookupClient,
    cache: Mutex<HashMap<String, (u64, CompoundProperties)>>,
}

impl CompoundResolver {
    pub fn new(client: LookupClient) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve_ingredients(&self, names: &[String]) -> ResolutionResult {
        let started = Instant::now();
        let mut result = ResolutionResult::default();

        for name in names {
            let key = name.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }

            if let Some((cid, properties)) = self.cache.lock().get(&key).cloned() {
                result.resolved.push(ResolvedCompound {
                    name: key,
                    cid,
                    properties,
                    cached: true,
                    resolution_time_ms: 0,
                });
                continue;
            }

            let item_start = Instant::now();
            match self.resolve_one(&key).await {
                Ok((cid, properties)) => {
                    self.cache
                        .lock()
                        .insert(key.clone(), (cid, properties.clone()));
                    result.resolved.push(ResolvedCompound {
                        name: key,
                        cid,
                        properties,
                        cached: false,
                        resolution_time_ms: item_start.elapsed().as_millis() as u64,
                    });
                }
                Err(e) => {
                    tracing::warn!(name = %key, error = %e, "compound resolution failed");
                    result.unresolved.push(UnresolvedCompound {
                        name: key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        result.total_duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            resolved = result.resolved.len(),
            unresolved = result.unresolved.len(),
            total_ms = result.total_duration_ms,
            "ingredient resolution complete"
        );
        result
    }

    async fn resolve_one(
        &self,
        name: &str,
    ) -> nd_domain::error::Result<(u64, CompoundProperties)> {
        let cid = self.client.search_compound(name).await?;
        let properties = self.client.compound_properties(cid).await?;
        Ok((cid, properties))
    }
}
