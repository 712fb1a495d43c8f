//! Index manager — safe lifecycle (load/unload/evict) for the vector
//! indexes under a resident-set policy.
//!
//! The two heavy indexes (chemistry and branded foods) are mutually
//! exclusive: loading one evicts the other. A small core set stays
//! resident. Before any load the memory gate is consulted; on rejection
//! the manager evicts everything non-core and retries exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use nd_domain::error::Result;

use crate::index::{IndexLoader, VectorIndex};
use crate::router::IndexKind;

/// Indexes that should stay resident if at all possible.
const CORE_INDEXES: [IndexKind; 2] = [IndexKind::Science, IndexKind::NutritionFoundation];

/// Estimated resident cost in GB, used for the memory gate.
fn index_cost_gb(kind: IndexKind) -> f64 {
    match kind {
        IndexKind::Chemistry => 12.0,
        IndexKind::NutritionBranded => 6.0,
        IndexKind::NutritionFoundation => 0.1,
        IndexKind::Science => 0.05,
        IndexKind::Recipes => 0.5,
    }
}

/// Memory admission check consulted before any index load.
pub trait MemoryGate: Send + Sync {
    /// Fails when loading `required_gb` more would be unsafe.
    fn ensure(&self, required_gb: f64) -> Result<()>;
}

/// Single-owner load/unload path for all indexes.
pub struct IndexManager {
    loader: Arc<dyn IndexLoader>,
    gate: Arc<dyn MemoryGate>,
    resident: Mutex<HashMap<IndexKind, Arc<dyn VectorIndex>>>,
}

impl IndexManager {
    pub fn new(loader: Arc<dyn IndexLoader>, gate: Arc<dyn MemoryGate>) -> Self {
        tracing::info!("index manager initialized, no indexes resident");
        Self {
            loader,
            gate,
            resident: Mutex::new(HashMap::new()),
        }
    }

    /// Get an index, loading it if missing. Triggers eviction of a
    /// conflicting heavy index and the memory-gate check first.
    pub fn get(&self, kind: IndexKind) -> Result<Arc<dyn VectorIndex>> {
        // Fast path: already resident.
        if let Some(index) = self.resident.lock().get(&kind) {
            return Ok(Arc::clone(index));
        }

        self.ensure_safe_memory(kind)?;

        tracing::info!(index = kind.as_str(), "lazy loading index");
        let index = self.loader.load(kind)?;
        self.resident.lock().insert(kind, Arc::clone(&index));
        Ok(index)
    }

    /// Explicitly unload an index, dropping its references.
    pub fn unload(&self, kind: IndexKind) {
        if self.resident.lock().remove(&kind).is_some() {
            tracing::info!(index = kind.as_str(), "index unloaded");
        }
    }

    pub fn resident_kinds(&self) -> Vec<IndexKind> {
        self.resident.lock().keys().copied().collect()
    }

    fn ensure_safe_memory(&self, target: IndexKind) -> Result<()> {
        // Mutual exclusion between the two heavy indexes.
        match target {
            IndexKind::Chemistry => {
                if self.resident.lock().contains_key(&IndexKind::NutritionBranded) {
                    tracing::info!("evicting branded-foods index to make room for chemistry");
                    self.unload(IndexKind::NutritionBranded);
                }
            }
            IndexKind::NutritionBranded => {
                if self.resident.lock().contains_key(&IndexKind::Chemistry) {
                    tracing::info!("evicting chemistry index to make room for branded foods");
                    self.unload(IndexKind::Chemistry);
                }
            }
            _ => {}
        }

        let required = index_cost_gb(target);
        if let Err(first) = self.gate.ensure(required) {
            // Last resort: evict everything non-core and retry once.
            tracing::warn!(error = %first, "memory pressure — evicting non-core indexes");
            self.evict_non_core();
            self.gate.ensure(required)?;
        }
        Ok(())
    }

    fn evict_non_core(&self) {
        let non_core: Vec<IndexKind> = self
            .resident
            .lock()
            .keys()
            .copied()
            .filter(|k| !CORE_INDEXES.contains(k))
            .collect();
        for kind in non_core {
            self.unload(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Hit;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubIndex;

    #[async_trait::async_trait]
    impl VectorIndex for StubIndex {
        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<Hit>> {
            Ok(Vec::new())
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl IndexLoader for CountingLoader {
        fn load(&self, _kind: IndexKind) -> Result<Arc<dyn VectorIndex>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubIndex))
        }
    }

    struct OpenGate;
    impl MemoryGate for OpenGate {
        fn ensure(&self, _required_gb: f64) -> Result<()> {
            Ok(())
        }
    }

    /// Rejects the first `deny` calls, then admits.
    struct FlakyGate {
        denials: AtomicUsize,
    }
    impl MemoryGate for FlakyGate {
        fn ensure(&self, required_gb: f64) -> Result<()> {
            if self.denials.load(Ordering::SeqCst) > 0 {
                self.denials.fetch_sub(1, Ordering::SeqCst);
                return Err(nd_domain::error::Error::ResourceExceeded(format!(
                    "no room for {required_gb} GB"
                )));
            }
            Ok(())
        }
    }

    fn manager_with_gate(gate: Arc<dyn MemoryGate>) -> (Arc<CountingLoader>, IndexManager) {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
        });
        let manager = IndexManager::new(loader.clone(), gate);
        (loader, manager)
    }

    #[test]
    fn second_get_hits_resident_cache() {
        let (loader, manager) = manager_with_gate(Arc::new(OpenGate));
        manager.get(IndexKind::Science).unwrap();
        manager.get(IndexKind::Science).unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn heavy_indexes_are_mutually_exclusive() {
        let (_, manager) = manager_with_gate(Arc::new(OpenGate));
        manager.get(IndexKind::Chemistry).unwrap();
        assert!(manager.resident_kinds().contains(&IndexKind::Chemistry));

        manager.get(IndexKind::NutritionBranded).unwrap();
        let resident = manager.resident_kinds();
        assert!(resident.contains(&IndexKind::NutritionBranded));
        assert!(!resident.contains(&IndexKind::Chemistry));

        manager.get(IndexKind::Chemistry).unwrap();
        let resident = manager.resident_kinds();
        assert!(resident.contains(&IndexKind::Chemistry));
        assert!(!resident.contains(&IndexKind::NutritionBranded));
    }

    #[test]
    fn core_indexes_coexist_with_heavy() {
        let (_, manager) = manager_with_gate(Arc::new(OpenGate));
        manager.get(IndexKind::Science).unwrap();
        manager.get(IndexKind::NutritionFoundation).unwrap();
        manager.get(IndexKind::Chemistry).unwrap();
        let resident = manager.resident_kinds();
        assert!(resident.contains(&IndexKind::Science));
        assert!(resident.contains(&IndexKind::NutritionFoundation));
        assert!(resident.contains(&IndexKind::Chemistry));
    }

    #[test]
    fn gate_rejection_evicts_non_core_and_retries_once() {
        let gate = Arc::new(FlakyGate {
            denials: AtomicUsize::new(1),
        });
        let (_, manager) = manager_with_gate(gate);
        manager.get(IndexKind::Science).unwrap();
        manager.get(IndexKind::Recipes).unwrap();

        // The next load is denied once; recipes (non-core) gets evicted,
        // the retry admits, and science survives.
        manager.get(IndexKind::Chemistry).unwrap();
        let resident = manager.resident_kinds();
        assert!(resident.contains(&IndexKind::Chemistry));
        assert!(resident.contains(&IndexKind::Science));
        assert!(!resident.contains(&IndexKind::Recipes));
    }

    #[test]
    fn persistent_gate_rejection_fails_the_load() {
        let gate = Arc::new(FlakyGate {
            denials: AtomicUsize::new(2),
        });
        let (_, manager) = manager_with_gate(gate);
        assert!(manager.get(IndexKind::Chemistry).is_err());
    }

    #[test]
    fn unload_drops_reference() {
        let (loader, manager) = manager_with_gate(Arc::new(OpenGate));
        manager.get(IndexKind::Recipes).unwrap();
        manager.unload(IndexKind::Recipes);
        assert!(manager.resident_kinds().is_empty());
        manager.get(IndexKind::Recipes).unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }
}
