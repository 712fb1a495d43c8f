//! Intent shape produced by the intent extractor and consumed by the
//! classifier, phase selector, and compound resolution wrapper.

use serde::{Deserialize, Serialize};

/// Recognized user goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentGoal {
    OptimizeNutrition,
    ModifyRecipe,
    Troubleshoot,
    Diagnose,
    MakeRecipe,
    Explore,
}

/// Output of intent extraction for one user message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Intent {
    #[serde(default)]
    pub goal: Option<IntentGoal>,
    /// Extraction confidence in [0, 1]. The phase selector gates on this.
    #[serde(default)]
    pub confidence: f64,
    /// Ingredient names lifted from the message, if any.
    #[serde(default)]
    pub ingredients: Vec<String>,
}

impl Intent {
    pub fn with_goal(goal: IntentGoal, confidence: f64) -> Self {
        Self {
            goal: Some(goal),
            confidence,
            ingredients: Vec::new(),
        }
    }
}
