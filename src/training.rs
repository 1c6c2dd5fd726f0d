//! Training configuration and model results
//!
//! Covers what the user picks in the variable-selection step (outcome,
//! predictors, outlier handling, model) and what comes back from a training
//! run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome and predictor choice for one dataset
///
/// Selecting an outcome auto-populates every other column as a predictor.
/// Predictors keep the order in which they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableSelection {
    outcome: Option<String>,
    predictors: Vec<String>,
}

impl VariableSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously saved configuration
    pub fn from_config(config: &TrainingConfig) -> Self {
        VariableSelection {
            outcome: Some(config.outcome_variable.clone()),
            predictors: config.predictors.clone(),
        }
    }

    pub fn outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    /// Choose the outcome variable
    ///
    /// Replaces the predictor set with every other column of `columns`, in
    /// column order.
    pub fn select_outcome(&mut self, outcome: &str, columns: &[String]) {
        self.outcome = Some(outcome.to_string());
        self.predictors = columns
            .iter()
            .filter(|column| column.as_str() != outcome)
            .cloned()
            .collect();
    }

    /// Append a predictor
    ///
    /// Returns false when the column is already a predictor or is the outcome.
    pub fn add_predictor(&mut self, name: &str) -> bool {
        if self.outcome.as_deref() == Some(name) || self.predictors.iter().any(|p| p == name) {
            return false;
        }
        self.predictors.push(name.to_string());
        true
    }

    /// Drop a predictor, returning whether it was present
    pub fn remove_predictor(&mut self, name: &str) -> bool {
        let before = self.predictors.len();
        self.predictors.retain(|p| p != name);
        self.predictors.len() != before
    }

    /// Columns that could still be added as predictors
    pub fn available_predictors<'a>(&self, columns: &'a [String]) -> Vec<&'a str> {
        columns
            .iter()
            .map(String::as_str)
            .filter(|column| {
                self.outcome.as_deref() != Some(*column)
                    && !self.predictors.iter().any(|p| p == column)
            })
            .collect()
    }

    /// An outcome is chosen and at least one predictor remains
    pub fn is_complete(&self) -> bool {
        self.outcome.is_some() && !self.predictors.is_empty()
    }
}

/// Outlier handling parameters sent to the backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierParams {
    /// IQR multiplier used to compute the fences
    pub iqr_k: f64,

    /// Replace detected outliers through KNN imputation
    pub clean_data: bool,

    /// Neighbour count for the imputation
    pub n_neighbors: u32,
}

impl Default for OutlierParams {
    fn default() -> Self {
        OutlierParams {
            iqr_k: 1.5,
            clean_data: true,
            n_neighbors: 5,
        }
    }
}

/// Configuration of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub outcome_variable: String,
    pub predictors: Vec<String>,
    pub selected_model: String,
    pub outliers: OutlierParams,
}

/// Goodness-of-fit and error values keyed by metric name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metrics(pub BTreeMap<String, f64>);

impl Metrics {
    /// Keep the numeric entries of a loosely shaped metrics object
    pub fn from_json(raw: &serde_json::Map<String, Value>) -> Self {
        Metrics(
            raw.iter()
                .filter_map(|(name, value)| value.as_f64().map(|v| (name.clone(), v)))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// R² under either of the names the backend uses
    pub fn r2(&self) -> Option<f64> {
        self.get("r2_score").or_else(|| self.get("r2"))
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.get("accuracy")
    }

    pub fn mse(&self) -> Option<f64> {
        self.get("mse")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Actual versus predicted value for one test sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub index: usize,
    pub name: String,
    pub importance: f64,
}

/// Rank features by descending importance and number them
pub fn rank_feature_importance<I>(raw: I) -> Vec<FeatureImportance>
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut pairs: Vec<(String, f64)> = raw.into_iter().collect();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs
        .into_iter()
        .enumerate()
        .map(|(index, (name, importance))| FeatureImportance {
            index,
            name,
            importance,
        })
        .collect()
}

/// Outcome of a completed training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResults {
    pub metrics: Metrics,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
}

/// Checkpoints of the training pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStage {
    EncodingCategoricals,
    PreparingData,
    Training,
    ProcessingResults,
    Completed,
    SavingModel,
}

impl TrainingStage {
    /// Progress shown when the stage starts
    pub fn progress(self) -> u8 {
        match self {
            TrainingStage::EncodingCategoricals => 10,
            TrainingStage::PreparingData => 40,
            TrainingStage::Training => 70,
            TrainingStage::ProcessingResults => 90,
            TrainingStage::Completed | TrainingStage::SavingModel => 100,
        }
    }

    /// Progress reached once the stage's backend call returns
    pub fn progress_after(self) -> u8 {
        match self {
            TrainingStage::EncodingCategoricals => 30,
            TrainingStage::PreparingData => 60,
            other => other.progress(),
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            TrainingStage::EncodingCategoricals => "Encoding categorical variables...",
            TrainingStage::PreparingData => "Preparing data (train/test split)...",
            TrainingStage::Training => "Training model...",
            TrainingStage::ProcessingResults => "Processing results...",
            TrainingStage::Completed => "Training completed!",
            TrainingStage::SavingModel => "Saving model...",
        }
    }
}

const GENERIC_TRAINING_FAILURE: &str =
    "Training failed. Please try again or select a different model.";

/// Shown when the backend could not be reached at all
pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your connection and try again.";

pub const TIMEOUT_MESSAGE: &str =
    "Training took too long and timed out. This can happen with very large datasets. Please try again.";

/// Turn a raw training failure into something a user can act on
///
/// The backend reports some failures in Spanish, so both spellings are
/// matched.
pub fn friendly_training_error(raw: &str) -> &'static str {
    let lower = raw.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("timeout") || has("timed out") || has("504") {
        TIMEOUT_MESSAGE
    } else if has("valores nulos") || has("null") || has("missing values") {
        "Your data contains missing values. Please enable 'Clean Data' in the Outlier Analysis section."
    } else if has("categóricas") || has("categorical") {
        "Error processing categorical variables. Please check your data and try again."
    } else if has("empty") || has("insufficient") {
        "Not enough data remaining after cleaning. Try adjusting outlier settings or using a different dataset."
    } else if has("network") || has("connect") || has("fetch") {
        NETWORK_ERROR_MESSAGE
    } else {
        GENERIC_TRAINING_FAILURE
    }
}
