//! Wire shapes exchanged with the analysis backend
//!
//! Required fields are required here too: a response missing them fails to
//! decode and surfaces as `GatewayError::Schema` instead of leaking empty
//! values into the session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::dataset::{DataSummary, DatasetInfo, FileInfo, PreviewRow};
use crate::training::{Metrics, ModelResults, Prediction, rank_feature_importance};

/// Responses that carry a `success` flag
pub trait Acknowledged {
    fn succeeded(&self) -> bool;
    fn message(&self) -> Option<&str>;
}

macro_rules! acknowledged {
    ($($ty:ty),* $(,)?) => {
        $(impl Acknowledged for $ty {
            fn succeeded(&self) -> bool {
                self.success
            }

            fn message(&self) -> Option<&str> {
                let message: &str = self.message.as_ref();
                (!message.is_empty()).then_some(message)
            }
        })*
    };
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub file_info: Option<FileInfo>,
    pub data_summary: DataSummary,
}

impl UploadResponse {
    pub fn into_dataset(self, fallback_filename: &str) -> DatasetInfo {
        DatasetInfo::from_summary(self.data_summary, self.file_info, fallback_filename)
    }
}

/// First rows of the currently loaded dataset
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataPreview {
    pub header: Vec<String>,
    pub first_rows: Vec<PreviewRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectFeaturesRequest {
    pub features: Vec<String>,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectFeaturesResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub features: Vec<String>,
    pub label: String,
    #[serde(default)]
    pub features_count: usize,
    #[serde(default)]
    pub all_columns_exist: bool,
}

/// One model the backend can train
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendTaskResponse {
    pub problem_type: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub unique_values: usize,
    #[serde(default)]
    pub total_values: usize,
    #[serde(default)]
    pub null_values: usize,
    #[serde(default)]
    pub unique_samples: Vec<Value>,
    #[serde(default)]
    pub recommendation: String,
    pub available_models: Vec<ModelInfo>,
    pub valid_models: Vec<String>,
}

impl RecommendTaskResponse {
    /// Models that are both listed and valid for the detected problem type
    pub fn candidates(&self) -> impl Iterator<Item = &ModelInfo> {
        self.available_models
            .iter()
            .filter(|model| self.valid_models.contains(&model.model_type))
    }

    pub fn is_valid(&self, model_type: &str) -> bool {
        self.valid_models.iter().any(|m| m == model_type)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnOutliers {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub outliers_count: u64,
    pub outliers_percentage: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutliersDetection {
    pub method: String,
    pub iqr_k: f64,
    pub columns_analyzed: Vec<String>,
    #[serde(default)]
    pub total_columns: usize,
    #[serde(default)]
    pub outliers_by_column: BTreeMap<String, ColumnOutliers>,
    pub total_outliers_before: u64,
    #[serde(default)]
    pub rows_analyzed: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleaningResults {
    pub method: String,
    pub n_neighbors: u32,
    #[serde(default)]
    pub columns_cleaned: Vec<String>,
    pub total_outliers_before: u64,
    pub total_outliers_after: u64,
    #[serde(default)]
    pub outliers_cleaned: u64,
    #[serde(default)]
    pub rows_before: usize,
    #[serde(default)]
    pub rows_after: usize,
    #[serde(default)]
    pub rows_removed: usize,
}

/// Outlier analysis and, when requested, the cleaning summary
#[derive(Debug, Clone, Deserialize)]
pub struct OutliersAnalysisResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub outliers_detection: OutliersDetection,
    #[serde(default)]
    pub cleaning_applied: bool,
    #[serde(default)]
    pub cleaning_results: Option<CleaningResults>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodeCategoricalResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub columns_encoded: Vec<String>,
    #[serde(default)]
    pub encoders: Map<String, Value>,
}

/// Result of the train/test split
#[derive(Debug, Clone, Deserialize)]
pub struct PrepareDataResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub training_samples: usize,
    pub test_samples: usize,
    #[serde(default)]
    pub features_shape: Vec<usize>,
    #[serde(default)]
    pub label_shape: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainModelRequest {
    pub model_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainModelResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub model_type: Option<String>,
    pub metrics: Map<String, Value>,
    #[serde(default)]
    pub training_info: Map<String, Value>,
    #[serde(default)]
    pub feature_importance: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub predictions: Option<Vec<Prediction>>,
}

impl TrainModelResponse {
    /// Feature importance from the top-level field, or nested in the metrics
    pub fn feature_importance_map(&self) -> BTreeMap<String, f64> {
        if let Some(map) = &self.feature_importance {
            return map.clone();
        }
        self.metrics
            .get("feature_importance")
            .and_then(Value::as_object)
            .map(|nested| {
                nested
                    .iter()
                    .filter_map(|(name, value)| value.as_f64().map(|v| (name.clone(), v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Build the session's view of a finished run
    pub fn to_results(&self, timestamp: chrono::DateTime<chrono::Utc>) -> ModelResults {
        ModelResults {
            metrics: Metrics::from_json(&self.metrics),
            predictions: self.predictions.clone().unwrap_or_default(),
            feature_importance: rank_feature_importance(self.feature_importance_map()),
            timestamp,
            model_type: self.model_type.clone(),
        }
    }
}

acknowledged!(
    UploadResponse,
    SelectFeaturesResponse,
    OutliersAnalysisResponse,
    EncodeCategoricalResponse,
    PrepareDataResponse,
    TrainModelResponse,
);
