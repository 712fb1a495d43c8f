//! User-scoped preferences with per-field confidence and decay.
//!
//! Preferences outlive sessions. Every field carries a confidence in
//! [0, 1] and the whole record carries a `last_confirmed_at` timestamp;
//! confidence decays by a fixed amount once the record goes unconfirmed
//! past the threshold. Only preferences at or above the injection
//! threshold ever reach a prompt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use nd_domain::error::{Error, Result};
use nd_domain::prefs::SkillLevel;

/// Confidence threshold for prompt injection.
pub const INJECT_THRESHOLD: f64 = 0.6;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Preferences
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserPreferences {
    #[serde(default)]
    pub skill_level: Option<SkillLevel>,
    #[serde(default)]
    pub equipment: Vec<String>,
    /// Only ever set from explicit statements — safety-critical.
    #[serde(default)]
    pub dietary_constraints: Vec<String>,

    #[serde(default)]
    pub skill_level_confidence: f64,
    #[serde(default)]
    pub equipment_confidence: HashMap<String, f64>,
    #[serde(default)]
    pub dietary_confidence: HashMap<String, f64>,

    #[serde(default)]
    pub last_confirmed_at: Option<DateTime<Utc>>,
}

/// A confidence-stamped update produced by the memory extractor.
#[derive(Debug, Clone, Default)]
pub struct PreferenceUpdate {
    pub skill_level: Option<(SkillLevel, f64)>,
    pub equipment: Vec<(String, f64)>,
    pub dietary_constraints: Vec<(String, f64)>,
}

impl PreferenceUpdate {
    pub fn is_empty(&self) -> bool {
        self.skill_level.is_none()
            && self.equipment.is_empty()
            && self.dietary_constraints.is_empty()
    }
}

impl UserPreferences {
    /// Apply confidence decay when the record went unconfirmed past
    /// `decay_days`. Returns true when a decay was applied.
    pub fn apply_decay(&mut self, now: DateTime<Utc>, decay_days: u32, amount: f64) -> bool {
        let Some(confirmed) = self.last_confirmed_at else {
            return false;
        };
        let days = now.signed_duration_since(confirmed).num_days();
        if days <= decay_days as i64 {
            return false;
        }

        self.skill_level_confidence = (self.skill_level_confidence - amount).max(0.0);
        for conf in self.equipment_confidence.values_mut() {
            *conf = (*conf - amount).max(0.0);
        }
        for conf in self.dietary_confidence.values_mut() {
            *conf = (*conf - amount).max(0.0);
        }
        tracing::info!(days_since_confirmed = days, "preference confidence decayed");
        true
    }

    /// Merge an extractor update: lists deduplicate, confidences are
    /// overwritten by the new observation, and the confirmation
    /// timestamp refreshes.
    pub fn merge_update(&mut self, update: PreferenceUpdate, now: DateTime<Utc>) {
        if let Some((level, confidence)) = update.skill_level {
            self.skill_level = Some(level);
            self.skill_level_confidence = confidence;
        }
        for (item, confidence) in update.equipment {
            if !self.equipment.contains(&item) {
                self.equipment.push(item.clone());
            }
            self.equipment_confidence.insert(item, confidence);
        }
        for (item, confidence) in update.dietary_constraints {
            if !self.dietary_constraints.contains(&item) {
                self.dietary_constraints.push(item.clone());
            }
            self.dietary_confidence.insert(item, confidence);
        }
        self.last_confirmed_at = Some(now);
    }

    /// True when any field clears the injection threshold.
    pub fn should_inject(&self, threshold: f64) -> bool {
        self.skill_level_confidence >= threshold
            || self.equipment_confidence.values().any(|c| *c >= threshold)
            || self.dietary_confidence.values().any(|c| *c >= threshold)
    }

    /// Prompt block carrying at most one copy of each preference whose
    /// confidence clears the threshold. `None` when nothing qualifies.
    pub fn injectable_block(&self, threshold: f64) -> Option<String> {
        let mut lines = Vec::new();

        if self.skill_level_confidence >= threshold {
            if let Some(level) = self.skill_level {
                lines.push(format!("- Skill level: {}", level.as_str()));
            }
        }

        let mut equipment: Vec<&String> = self
            .equipment
            .iter()
            .filter(|e| {
                self.equipment_confidence
                    .get(*e)
                    .is_some_and(|c| *c >= threshold)
            })
            .collect();
        equipment.sort();
        equipment.dedup();
        if !equipment.is_empty() {
            let joined: Vec<&str> = equipment.iter().map(|s| s.as_str()).collect();
            lines.push(format!("- Equipment on hand: {}", joined.join(", ")));
        }

        let mut dietary: Vec<&String> = self
            .dietary_constraints
            .iter()
            .filter(|d| {
                self.dietary_confidence
                    .get(*d)
                    .is_some_and(|c| *c >= threshold)
            })
            .collect();
        dietary.sort();
        dietary.dedup();
        if !dietary.is_empty() {
            let joined: Vec<&str> = dietary.iter().map(|s| s.as_str()).collect();
            lines.push(format!("- Dietary constraints: {}", joined.join(", ")));
        }

        if lines.is_empty() {
            return None;
        }
        Some(format!("KNOWN USER PREFERENCES:\n{}", lines.join("\n")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON-file backed preference store keyed by user id.
pub struct PreferenceStore {
    path: PathBuf,
    prefs: RwLock<HashMap<String, UserPreferences>>,
}

impl PreferenceStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("preferences.json");
        let prefs = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            prefs: RwLock::new(prefs),
        })
    }

    pub fn get(&self, user_id: &str) -> UserPreferences {
        self.prefs.read().get(user_id).cloned().unwrap_or_default()
    }

    /// Mutate a user's preferences in place and persist.
    pub fn update<F>(&self, user_id: &str, mutate: F)
    where
        F: FnOnce(&mut UserPreferences),
    {
        let mut prefs = self.prefs.write();
        let entry = prefs.entry(user_id.to_owned()).or_default();
        mutate(entry);
        drop(prefs);
        self.flush();
    }

    fn flush(&self) {
        let prefs = self.prefs.read();
        match serde_json::to_string_pretty(&*prefs) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(error = %e, "preference flush failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "preference serialization failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn confident_prefs() -> UserPreferences {
        let mut prefs = UserPreferences::default();
        prefs.merge_update(
            PreferenceUpdate {
                skill_level: Some((SkillLevel::Beginner, 0.9)),
                equipment: vec![("air fryer".into(), 0.9)],
                dietary_constraints: vec![("vegan".into(), 0.95)],
            },
            Utc::now(),
        );
        prefs
    }

    #[test]
    fn merge_sets_fields_and_timestamp() {
        let prefs = confident_prefs();
        assert_eq!(prefs.skill_level, Some(SkillLevel::Beginner));
        assert_eq!(prefs.equipment, vec!["air fryer".to_string()]);
        assert_eq!(prefs.dietary_confidence["vegan"], 0.95);
        assert!(prefs.last_confirmed_at.is_some());
    }

    #[test]
    fn merge_deduplicates_lists() {
        let mut prefs = confident_prefs();
        prefs.merge_update(
            PreferenceUpdate {
                skill_level: None,
                equipment: vec![("air fryer".into(), 0.9)],
                dietary_constraints: vec![],
            },
            Utc::now(),
        );
        assert_eq!(prefs.equipment.len(), 1);
    }

    #[test]
    fn decay_applies_after_threshold() {
        let mut prefs = confident_prefs();
        prefs.last_confirmed_at = Some(Utc::now() - Duration::days(91));
        assert!(prefs.apply_decay(Utc::now(), 90, 0.2));
        assert!((prefs.skill_level_confidence - 0.7).abs() < 1e-9);
        assert!((prefs.equipment_confidence["air fryer"] - 0.7).abs() < 1e-9);
        assert!((prefs.dietary_confidence["vegan"] - 0.75).abs() < 1e-9);
    }

    #[test]
    fn decay_skips_recent_confirmation() {
        let mut prefs = confident_prefs();
        prefs.last_confirmed_at = Some(Utc::now() - Duration::days(30));
        assert!(!prefs.apply_decay(Utc::now(), 90, 0.2));
        assert!((prefs.skill_level_confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn decay_clamps_at_zero() {
        let mut prefs = UserPreferences {
            skill_level: Some(SkillLevel::Expert),
            skill_level_confidence: 0.1,
            last_confirmed_at: Some(Utc::now() - Duration::days(200)),
            ..Default::default()
        };
        prefs.apply_decay(Utc::now(), 90, 0.2);
        assert_eq!(prefs.skill_level_confidence, 0.0);
    }

    #[test]
    fn no_timestamp_means_no_decay() {
        let mut prefs = UserPreferences {
            skill_level_confidence: 0.9,
            ..Default::default()
        };
        assert!(!prefs.apply_decay(Utc::now(), 90, 0.2));
    }

    #[test]
    fn injection_gate_filters_low_confidence() {
        let mut prefs = confident_prefs();
        assert!(prefs.should_inject(INJECT_THRESHOLD));
        let block = prefs.injectable_block(INJECT_THRESHOLD).unwrap();
        assert!(block.contains("air fryer"));
        assert!(block.contains("vegan"));
        assert!(block.contains("beginner"));

        // Decay everything below the threshold.
        prefs.last_confirmed_at = Some(Utc::now() - Duration::days(200));
        prefs.apply_decay(Utc::now(), 90, 0.4);
        assert!(!prefs.should_inject(INJECT_THRESHOLD));
        assert!(prefs.injectable_block(INJECT_THRESHOLD).is_none());
    }

    #[test]
    fn store_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let store = PreferenceStore::new(dir.path()).unwrap();
            store.update("u1", |p| {
                p.merge_update(
                    PreferenceUpdate {
                        skill_level: Some((SkillLevel::Expert, 0.9)),
                        equipment: vec![],
                        dietary_constraints: vec![],
                    },
                    Utc::now(),
                );
            });
        }
        let store = PreferenceStore::new(dir.path()).unwrap();
        assert_eq!(store.get("u1").skill_level, Some(SkillLevel::Expert));
    }
}
