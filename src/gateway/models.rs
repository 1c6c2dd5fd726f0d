//! Persisted model records
//!
//! A saved model aggregates the dataset preview, correlations, variable
//! selection, training configuration and results under one identifier. The
//! storage itself lives behind the backend's `/api/models` routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::dataset::{CorrelationData, DataSummary, DatasetInfo, PreviewRow};
use crate::session::ModelSession;
use crate::training::{
    FeatureImportance, Metrics, ModelResults, OutlierParams, Prediction, TrainingConfig,
    rank_feature_importance,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPreview {
    pub filename: String,
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    #[serde(default)]
    pub preview_data: Vec<PreviewRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_summary: Option<DataSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVariableSelection {
    pub outcome_variable: String,
    pub predictor_variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrainingConfig {
    pub selected_model: String,
    #[serde(default)]
    pub clean_data: bool,
    #[serde(default = "default_iqr_k")]
    pub iqr_k: f64,
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: u32,
}

fn default_iqr_k() -> f64 {
    OutlierParams::default().iqr_k
}

fn default_n_neighbors() -> u32 {
    OutlierParams::default().n_neighbors
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Detailed results kept with a record
///
/// Records written by older clients store the raw training response here, so
/// metrics may nest non-numeric values and feature importance may be a map.
/// Keys this type does not model are kept in `extra` and written back as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct StoredResultsData {
    pub predictions: Vec<Prediction>,
    pub feature_importance: Vec<StoredFeatureImportance>,
    pub model_type: Option<String>,
    pub metrics: Metrics,
    pub extra: Map<String, Value>,
}

fn ranked_importance(raw: &Map<String, Value>) -> Vec<StoredFeatureImportance> {
    rank_feature_importance(
        raw.iter()
            .filter_map(|(name, value)| value.as_f64().map(|v| (name.clone(), v))),
    )
    .into_iter()
    .map(|f| StoredFeatureImportance {
        feature: f.name,
        importance: f.importance,
    })
    .collect()
}

impl From<Map<String, Value>> for StoredResultsData {
    fn from(mut raw: Map<String, Value>) -> Self {
        let raw_metrics = match raw.remove("metrics") {
            Some(Value::Object(metrics)) => metrics,
            _ => Map::new(),
        };

        let predictions = match raw.remove("predictions") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        };

        let mut feature_importance = match raw.remove("feature_importance") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            Some(Value::Object(map)) => ranked_importance(&map),
            _ => Vec::new(),
        };
        if feature_importance.is_empty() {
            if let Some(Value::Object(map)) = raw_metrics.get("feature_importance") {
                feature_importance = ranked_importance(map);
            }
        }

        let model_type = match raw.remove("model_type") {
            Some(Value::String(name)) => Some(name),
            _ => None,
        };

        StoredResultsData {
            predictions,
            feature_importance,
            model_type,
            metrics: Metrics::from_json(&raw_metrics),
            extra: raw,
        }
    }
}

impl From<StoredResultsData> for Map<String, Value> {
    fn from(data: StoredResultsData) -> Self {
        let mut out = data.extra;
        out.insert(
            "predictions".into(),
            Value::Array(
                data.predictions
                    .iter()
                    .map(|p| json!({"actual": p.actual, "predicted": p.predicted}))
                    .collect(),
            ),
        );
        out.insert(
            "feature_importance".into(),
            Value::Array(
                data.feature_importance
                    .iter()
                    .map(|f| json!({"feature": f.feature, "importance": f.importance}))
                    .collect(),
            ),
        );
        if let Some(model_type) = data.model_type {
            out.insert("model_type".into(), Value::String(model_type));
        }
        out.insert(
            "metrics".into(),
            Value::Object(
                data.metrics
                    .0
                    .into_iter()
                    .map(|(name, value)| (name, json!(value)))
                    .collect(),
            ),
        );
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mse: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_data: Option<StoredResultsData>,
}

/// Body of `POST /api/models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlModelCreate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub preview: ModelPreview,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_data: Option<CorrelationData>,
    pub variable_selection: StoredVariableSelection,
    pub training_config: StoredTrainingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<StoredResults>,
}

/// A stored model as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlModelResponse {
    #[serde(flatten)]
    pub model: MlModelCreate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub has_model_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_file_size: Option<u64>,
}

/// Lightweight entry of `GET /api/models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlModelListItem {
    pub id: String,
    #[serde(default)]
    pub model_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub outcome_variable: String,
    pub selected_model: String,
    pub has_results: bool,
    pub has_model_file: bool,
}

impl MlModelListItem {
    /// Label shown in the model list
    pub fn display_name(&self) -> String {
        match &self.model_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Model: {}", self.outcome_variable),
        }
    }
}

/// Reasons a session cannot be turned into a model record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incomplete {
    NoModelId,
    NoDataset,
    NoTrainingConfig,
}

impl MlModelCreate {
    /// Snapshot a trained session into a record ready to save
    pub fn from_session(session: &ModelSession, now: DateTime<Utc>) -> Result<Self, Incomplete> {
        let id = session.model_id().ok_or(Incomplete::NoModelId)?;
        let dataset = session.dataset().ok_or(Incomplete::NoDataset)?;
        let config = session.training_config().ok_or(Incomplete::NoTrainingConfig)?;

        Ok(MlModelCreate {
            id: id.to_string(),
            user_id: None,
            model_name: Some(format!("Model {}", now.format("%Y-%m-%d"))),
            preview: ModelPreview {
                filename: dataset.filename.clone(),
                rows: dataset.rows,
                columns: dataset.columns,
                column_names: dataset.column_names.clone(),
                preview_data: dataset.preview.clone(),
                data_summary: dataset.data_summary.clone(),
            },
            correlation_data: session.correlation_data().cloned(),
            variable_selection: StoredVariableSelection {
                outcome_variable: config.outcome_variable.clone(),
                predictor_variables: config.predictors.clone(),
            },
            training_config: StoredTrainingConfig {
                selected_model: config.selected_model.clone(),
                clean_data: config.outliers.clean_data,
                iqr_k: config.outliers.iqr_k,
                n_neighbors: config.outliers.n_neighbors,
            },
            results: session.model_results().map(StoredResults::from),
        })
    }
}

impl From<&ModelResults> for StoredResults {
    fn from(results: &ModelResults) -> Self {
        StoredResults {
            r2_score: results.metrics.r2(),
            accuracy: results.metrics.accuracy(),
            mse: results.metrics.mse(),
            results_data: Some(StoredResultsData {
                predictions: results.predictions.clone(),
                feature_importance: results
                    .feature_importance
                    .iter()
                    .map(|f| StoredFeatureImportance {
                        feature: f.name.clone(),
                        importance: f.importance,
                    })
                    .collect(),
                model_type: results.model_type.clone(),
                metrics: results.metrics.clone(),
                extra: Map::new(),
            }),
        }
    }
}

impl MlModelResponse {
    pub fn dataset(&self) -> DatasetInfo {
        let preview = &self.model.preview;
        DatasetInfo {
            filename: preview.filename.clone(),
            rows: preview.rows,
            columns: preview.columns,
            column_names: preview.column_names.clone(),
            preview: preview.preview_data.clone(),
            encoding: "utf-8".to_string(),
            separator: ",".to_string(),
            data_summary: preview.data_summary.clone(),
            file_info: None,
        }
    }

    pub fn training_config(&self) -> TrainingConfig {
        let stored = &self.model.training_config;
        TrainingConfig {
            outcome_variable: self.model.variable_selection.outcome_variable.clone(),
            predictors: self.model.variable_selection.predictor_variables.clone(),
            selected_model: stored.selected_model.clone(),
            outliers: OutlierParams {
                iqr_k: stored.iqr_k,
                clean_data: stored.clean_data,
                n_neighbors: stored.n_neighbors,
            },
        }
    }

    /// Results as the session holds them, timestamped with the creation time
    pub fn results(&self) -> Option<ModelResults> {
        let stored = self.model.results.as_ref()?;
        let data = stored.results_data.clone().unwrap_or_default();

        let mut metrics = data.metrics;
        for (name, value) in [
            ("r2_score", stored.r2_score),
            ("accuracy", stored.accuracy),
            ("mse", stored.mse),
        ] {
            if let Some(value) = value {
                metrics.0.insert(name.to_string(), value);
            }
        }

        Some(ModelResults {
            metrics,
            predictions: data.predictions,
            // Stored order is already ranked
            feature_importance: data
                .feature_importance
                .into_iter()
                .enumerate()
                .map(|(index, f)| FeatureImportance {
                    index,
                    name: f.feature,
                    importance: f.importance,
                })
                .collect(),
            timestamp: self.created_at,
            model_type: data
                .model_type
                .or_else(|| Some(self.model.training_config.selected_model.clone())),
        })
    }

    /// Populate a cleared session from this record
    pub fn apply_to(&self, session: &mut ModelSession) {
        session.clear_session();
        session.set_model_id(Some(self.model.id.clone()));
        session.set_is_loaded_model(true);
        session.set_dataset(Some(self.dataset()));
        session.set_correlation_data(self.model.correlation_data.clone());
        session.set_training_config(Some(self.training_config()));
        session.set_model_results(self.results());
        if session.model_results().is_some() {
            session.set_has_completed_training(true);
        }
    }
}

/// Loose view of a stored record for callers that only need a few fields
pub fn model_id_of(body: &Value) -> Option<&str> {
    body.get("id").and_then(Value::as_str)
}
