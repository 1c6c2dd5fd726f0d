//! Step pipelines
//!
//! Each user action that talks to the backend is an explicit sequential
//! pipeline here. Every backend call is awaited in turn under one
//! [`CancellationToken`]; a failure or cancellation stops the pipeline and
//! leaves the session's data as it was before the action started.

use chrono::Utc;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::gateway::models::{MlModelCreate, MlModelListItem};
use crate::gateway::schema::{
    OutliersAnalysisResponse, RecommendTaskResponse, SelectFeaturesRequest,
    SelectFeaturesResponse, TrainModelRequest, TrainModelResponse,
};
use crate::gateway::{
    AnalysisBackend, CORRELATION_TOP_N, GatewayError, ModelStore, Operation, cancellable,
};
use crate::session::ModelSession;
use crate::steps::{StepError, ViewMode};
use crate::training::{
    NETWORK_ERROR_MESSAGE, OutlierParams, TIMEOUT_MESSAGE, TrainingConfig, TrainingStage,
    VariableSelection, friendly_training_error,
};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A training stage failed; the source keeps the raw backend text
    #[error("Training failed: {0}")]
    Training(#[source] GatewayError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error("Upload a dataset first")]
    NoDataset,

    #[error("Choose an outcome variable and at least one predictor")]
    IncompleteSelection,

    #[error("Choose a model to train")]
    NoModelSelected,

    #[error("No model to download")]
    NoModelId,

    #[error("Could not write model file: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    /// Short text to show the user
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Training(GatewayError::Http(err)) if err.is_timeout() => {
                TIMEOUT_MESSAGE.to_string()
            }
            WorkflowError::Training(GatewayError::Http(_))
            | WorkflowError::Gateway(GatewayError::Http(_)) => NETWORK_ERROR_MESSAGE.to_string(),
            WorkflowError::Training(err) => friendly_training_error(&err.to_string()).to_string(),
            WorkflowError::Gateway(GatewayError::Schema { operation, .. }) => {
                operation.fallback_message().to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkflowError::Gateway(err) | WorkflowError::Training(err) => err.is_cancelled(),
            _ => false,
        }
    }
}

/// Everything the outlier step learns about the selected variables
#[derive(Debug, Clone)]
pub struct OutlierAnalysis {
    pub features: SelectFeaturesResponse,
    pub outliers: OutliersAnalysisResponse,
    pub recommendations: RecommendTaskResponse,
}

/// What happened after a successful training run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingOutcome {
    /// The model record was stored; saving is best-effort
    pub saved: bool,
}

/// Drives a [`ModelSession`] through the backend
#[derive(Clone)]
pub struct Workflow {
    backend: Arc<dyn AnalysisBackend>,
    store: Arc<dyn ModelStore>,
}

impl Workflow {
    pub fn new(backend: Arc<dyn AnalysisBackend>, store: Arc<dyn ModelStore>) -> Self {
        Workflow { backend, store }
    }

    /// Upload a file and start a new model on it
    ///
    /// On success the session is reset, holds the new dataset under a fresh
    /// model id, and shows the preview step.
    pub async fn upload(
        &self,
        session: &mut ModelSession,
        token: &CancellationToken,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<(), WorkflowError> {
        let was_loading = session.is_loading();
        session.set_is_loading(true);
        let result = cancellable(
            token,
            Operation::Upload,
            self.backend.upload_dataset(filename, bytes),
        )
        .await;
        session.set_is_loading(was_loading);

        let dataset = result?.into_dataset(filename);
        let model_id = Uuid::new_v4().to_string();
        info!(
            "Uploaded {} ({} rows, {} columns) as model {model_id}",
            dataset.filename, dataset.rows, dataset.columns
        );

        session.clear_session();
        session.set_dataset(Some(dataset));
        session.set_model_id(Some(model_id));
        Ok(())
    }

    /// Fetch correlations for the current dataset unless already present
    ///
    /// Returns whether a request was made.
    pub async fn load_correlations(
        &self,
        session: &mut ModelSession,
        token: &CancellationToken,
    ) -> Result<bool, WorkflowError> {
        if session.dataset().is_none() {
            return Err(WorkflowError::NoDataset);
        }
        if session.correlation_data().is_some() {
            return Ok(false);
        }

        let data = cancellable(
            token,
            Operation::Correlations,
            self.backend.correlations(CORRELATION_TOP_N),
        )
        .await?;
        info!(
            "Loaded {} correlations over {} variables",
            data.total_correlations, data.n_variables
        );
        session.set_correlation_data(Some(data));
        Ok(true)
    }

    /// Register the selection, run outlier analysis and fetch model
    /// recommendations, in that order
    pub async fn analyze_outliers(
        &self,
        session: &mut ModelSession,
        token: &CancellationToken,
        selection: &VariableSelection,
        params: OutlierParams,
    ) -> Result<OutlierAnalysis, WorkflowError> {
        if session.dataset().is_none() {
            return Err(WorkflowError::NoDataset);
        }
        let outcome = match selection.outcome() {
            Some(outcome) if selection.is_complete() => outcome.to_string(),
            _ => return Err(WorkflowError::IncompleteSelection),
        };

        let was_analyzing = session.is_analyzing_outliers();
        session.set_is_analyzing_outliers(true);
        let request = SelectFeaturesRequest {
            features: selection.predictors().to_vec(),
            label: outcome,
        };
        let result = self.outlier_pipeline(token, &request, &params).await;
        session.set_is_analyzing_outliers(was_analyzing);

        let analysis = result?;
        info!(
            "Outlier analysis: {} outliers across {} columns, problem type {}",
            analysis.outliers.outliers_detection.total_outliers_before,
            analysis.outliers.outliers_detection.columns_analyzed.len(),
            analysis.recommendations.problem_type
        );
        Ok(analysis)
    }

    async fn outlier_pipeline(
        &self,
        token: &CancellationToken,
        request: &SelectFeaturesRequest,
        params: &OutlierParams,
    ) -> Result<OutlierAnalysis, GatewayError> {
        let features = cancellable(
            token,
            Operation::SelectFeatures,
            self.backend.select_features(request),
        )
        .await?;
        let outliers = cancellable(
            token,
            Operation::OutliersAnalysis,
            self.backend.analyze_outliers(params),
        )
        .await?;
        let recommendations = cancellable(
            token,
            Operation::RecommendTask,
            self.backend.recommend_task(),
        )
        .await?;

        Ok(OutlierAnalysis {
            features,
            outliers,
            recommendations,
        })
    }

    /// Train a model and show its results
    ///
    /// Runs encode → prepare → train, updating the progress as each stage
    /// starts and finishes. On success the results are stored, the view jumps
    /// to `results` and the model is saved (a failed save is only logged). On
    /// failure the session is left as it was before the call.
    pub async fn train(
        &self,
        session: &mut ModelSession,
        token: &CancellationToken,
        config: TrainingConfig,
    ) -> Result<TrainingOutcome, WorkflowError> {
        if session.dataset().is_none() {
            return Err(WorkflowError::NoDataset);
        }
        if config.outcome_variable.is_empty() || config.predictors.is_empty() {
            return Err(WorkflowError::IncompleteSelection);
        }
        if config.selected_model.is_empty() {
            return Err(WorkflowError::NoModelSelected);
        }

        let previous_config = session.training_config().cloned();
        let was_training = session.is_training();
        let previous_progress = session.training_progress();

        session.set_training_config(Some(config.clone()));
        session.set_is_training(true);
        session.set_training_progress(0);

        let response = match self.training_pipeline(session, token, &config).await {
            Ok(response) => response,
            Err(err) => {
                error!("Training {} failed: {err}", config.selected_model);
                session.set_training_config(previous_config);
                session.set_is_training(was_training);
                session.set_training_progress(previous_progress);
                return Err(WorkflowError::Training(err));
            }
        };

        session.set_model_results(Some(response.to_results(Utc::now())));
        enter_stage(session, TrainingStage::Completed);
        session.set_current_view(ViewMode::Results)?;
        session.set_has_completed_training(true);

        let saved = self.save_trained_model(session, token).await;
        session.set_is_training(false);
        Ok(TrainingOutcome { saved })
    }

    async fn training_pipeline(
        &self,
        session: &mut ModelSession,
        token: &CancellationToken,
        config: &TrainingConfig,
    ) -> Result<TrainModelResponse, GatewayError> {
        enter_stage(session, TrainingStage::EncodingCategoricals);
        let encoded = cancellable(
            token,
            Operation::EncodeCategorical,
            self.backend.encode_categorical(),
        )
        .await?;
        info!("Encoded {} categorical columns", encoded.columns_encoded.len());
        session.set_training_progress(TrainingStage::EncodingCategoricals.progress_after());

        enter_stage(session, TrainingStage::PreparingData);
        let prepared = cancellable(
            token,
            Operation::PrepareData,
            self.backend.prepare_data(),
        )
        .await?;
        info!(
            "Split data into {} training and {} test samples",
            prepared.training_samples, prepared.test_samples
        );
        session.set_training_progress(TrainingStage::PreparingData.progress_after());

        enter_stage(session, TrainingStage::Training);
        let request = TrainModelRequest {
            model_type: config.selected_model.clone(),
        };
        let trained = cancellable(
            token,
            Operation::Train,
            self.backend.train_model(&request),
        )
        .await?;

        enter_stage(session, TrainingStage::ProcessingResults);
        Ok(trained)
    }

    /// Store the trained session; returns whether it was saved
    async fn save_trained_model(&self, session: &mut ModelSession, token: &CancellationToken) -> bool {
        if session.model_id().is_none() {
            session.set_model_id(Some(Uuid::new_v4().to_string()));
        }
        let record = match MlModelCreate::from_session(session, Utc::now()) {
            Ok(record) => record,
            Err(missing) => {
                warn!("Cannot save model: {missing:?}");
                return false;
            }
        };

        session.set_is_saving_model(true);
        info!("{}", TrainingStage::SavingModel.message());
        let result = cancellable(token, Operation::SaveModel, self.store.save_model(&record)).await;
        session.set_is_saving_model(false);

        match result {
            Ok(saved) => {
                info!("Model saved: {}", saved.model.id);
                session.set_model_id(Some(saved.model.id));
                true
            }
            Err(err) => {
                warn!("Error saving model {}: {err}", record.id);
                false
            }
        }
    }

    /// Replace the session with a stored model
    pub async fn load_saved_model(
        &self,
        session: &mut ModelSession,
        token: &CancellationToken,
        model_id: &str,
    ) -> Result<(), WorkflowError> {
        if session.is_loaded_model() && session.model_id() == Some(model_id) {
            return Ok(());
        }

        let was_loading = session.is_loading();
        session.set_is_loading(true);
        let result = cancellable(token, Operation::GetModel, self.store.get_model(model_id)).await;
        session.set_is_loading(was_loading);

        let record = result?;
        record.apply_to(session);
        info!("Loaded model {model_id}");
        Ok(())
    }

    /// Discard everything and go back to the uploader
    pub fn new_model(&self, session: &mut ModelSession) {
        session.clear_session();
    }

    pub async fn list_models(
        &self,
        token: &CancellationToken,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MlModelListItem>, WorkflowError> {
        let models = cancellable(
            token,
            Operation::ListModels,
            self.store.list_models(limit, offset),
        )
        .await?;
        Ok(models)
    }

    /// Delete a stored model; the session is cleared if it was showing it
    pub async fn delete_model(
        &self,
        session: &mut ModelSession,
        token: &CancellationToken,
        model_id: &str,
    ) -> Result<(), WorkflowError> {
        cancellable(token, Operation::DeleteModel, self.store.delete_model(model_id)).await?;
        if session.model_id() == Some(model_id) {
            session.clear_session();
        }
        info!("Deleted model {model_id}");
        Ok(())
    }

    /// Download the current model's file into `dir`
    pub async fn download_model(
        &self,
        session: &ModelSession,
        token: &CancellationToken,
        dir: &Path,
    ) -> Result<PathBuf, WorkflowError> {
        let model_id = session.model_id().ok_or(WorkflowError::NoModelId)?;
        let artifact = cancellable(
            token,
            Operation::DownloadModel,
            self.backend.download_model(model_id),
        )
        .await?;
        let path = artifact.save_to(dir).await?;
        info!("Model {model_id} written to {}", path.display());
        Ok(path)
    }
}

fn enter_stage(session: &mut ModelSession, stage: TrainingStage) {
    info!("{}", stage.message());
    session.set_training_progress(stage.progress());
}
