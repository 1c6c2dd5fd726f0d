//! In-progress modelling session
//!
//! `ModelSession` is the single source of truth for one browser tab: the
//! uploaded dataset, correlations, training configuration, results, the view
//! cursor and the busy flags. It is constructed explicitly and passed to the
//! workflow steps that read or update it; nothing is shared between sessions
//! and nothing is persisted.

use crate::dataset::{CorrelationData, DatasetInfo};
use crate::steps::{StepError, ViewMode, check_transition};
use crate::training::{ModelResults, TrainingConfig};

/// State of one modelling session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSession {
    model_id: Option<String>,
    dataset: Option<DatasetInfo>,
    correlation_data: Option<CorrelationData>,
    training_config: Option<TrainingConfig>,
    model_results: Option<ModelResults>,
    current_view: ViewMode,
    is_loading: bool,
    is_training: bool,
    training_progress: u8,
    has_completed_training: bool,
    is_analyzing_outliers: bool,
    is_saving_model: bool,
    is_loaded_model: bool,
}

impl ModelSession {
    /// Create an empty session positioned on the preview step
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every field to its initial value
    ///
    /// Used when the user starts a new model.
    pub fn clear_session(&mut self) {
        *self = Self::default();
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    pub fn set_model_id(&mut self, id: Option<String>) {
        self.model_id = id;
    }

    pub fn dataset(&self) -> Option<&DatasetInfo> {
        self.dataset.as_ref()
    }

    pub fn set_dataset(&mut self, dataset: Option<DatasetInfo>) {
        self.dataset = dataset;
    }

    pub fn correlation_data(&self) -> Option<&CorrelationData> {
        self.correlation_data.as_ref()
    }

    pub fn set_correlation_data(&mut self, data: Option<CorrelationData>) {
        self.correlation_data = data;
    }

    pub fn training_config(&self) -> Option<&TrainingConfig> {
        self.training_config.as_ref()
    }

    pub fn set_training_config(&mut self, config: Option<TrainingConfig>) {
        self.training_config = config;
    }

    pub fn model_results(&self) -> Option<&ModelResults> {
        self.model_results.as_ref()
    }

    /// Replace the model results
    ///
    /// Clearing the results while the results step is displayed moves the
    /// cursor back to variable selection.
    pub fn set_model_results(&mut self, results: Option<ModelResults>) {
        self.model_results = results;
        if self.model_results.is_none() && self.current_view == ViewMode::Results {
            self.current_view = ViewMode::Selection;
        }
    }

    pub fn current_view(&self) -> ViewMode {
        self.current_view
    }

    /// Move the view cursor
    ///
    /// # Errors
    /// * `StepError::ResultsUnavailable` when targeting `results` without
    ///   model results; the cursor is left where it was.
    pub fn set_current_view(&mut self, view: ViewMode) -> Result<(), StepError> {
        check_transition(view, self.model_results.is_some())?;
        self.current_view = view;
        Ok(())
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn set_is_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn is_training(&self) -> bool {
        self.is_training
    }

    pub fn set_is_training(&mut self, training: bool) {
        self.is_training = training;
    }

    pub fn training_progress(&self) -> u8 {
        self.training_progress
    }

    /// Set the training progress, capped at 100
    pub fn set_training_progress(&mut self, progress: u8) {
        self.training_progress = progress.min(100);
    }

    pub fn has_completed_training(&self) -> bool {
        self.has_completed_training
    }

    pub fn set_has_completed_training(&mut self, completed: bool) {
        self.has_completed_training = completed;
    }

    pub fn is_analyzing_outliers(&self) -> bool {
        self.is_analyzing_outliers
    }

    pub fn set_is_analyzing_outliers(&mut self, analyzing: bool) {
        self.is_analyzing_outliers = analyzing;
    }

    pub fn is_saving_model(&self) -> bool {
        self.is_saving_model
    }

    pub fn set_is_saving_model(&mut self, saving: bool) {
        self.is_saving_model = saving;
    }

    pub fn is_loaded_model(&self) -> bool {
        self.is_loaded_model
    }

    pub fn set_is_loaded_model(&mut self, loaded: bool) {
        self.is_loaded_model = loaded;
    }

    /// Column names of the current dataset, empty when none is loaded
    pub fn column_names(&self) -> &[String] {
        self.dataset
            .as_ref()
            .map(|dataset| dataset.column_names.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{can_go_next, go_back, go_next};
    use crate::training::{Metrics, OutlierParams};
    use chrono::Utc;

    fn dataset() -> DatasetInfo {
        DatasetInfo {
            filename: "churn.csv".to_string(),
            rows: 3,
            columns: 3,
            column_names: vec!["age".into(), "income".into(), "churn".into()],
            preview: Vec::new(),
            encoding: "utf-8".to_string(),
            separator: ",".to_string(),
            data_summary: None,
            file_info: None,
        }
    }

    fn results() -> ModelResults {
        ModelResults {
            metrics: Metrics::default(),
            predictions: Vec::new(),
            feature_importance: Vec::new(),
            timestamp: Utc::now(),
            model_type: Some("linear_regression".to_string()),
        }
    }

    fn busy_session() -> ModelSession {
        let mut session = ModelSession::new();
        session.set_model_id(Some("abc".into()));
        session.set_dataset(Some(dataset()));
        session.set_training_config(Some(TrainingConfig {
            outcome_variable: "churn".into(),
            predictors: vec!["age".into()],
            selected_model: "logistic_regression".into(),
            outliers: OutlierParams::default(),
        }));
        session.set_model_results(Some(results()));
        session.set_current_view(ViewMode::Results).unwrap();
        session.set_is_loading(true);
        session.set_is_training(true);
        session.set_training_progress(70);
        session.set_has_completed_training(true);
        session.set_is_analyzing_outliers(true);
        session.set_is_saving_model(true);
        session.set_is_loaded_model(true);
        session
    }

    #[test]
    fn new_session_starts_on_preview_and_empty() {
        let session = ModelSession::new();
        assert_eq!(session.current_view(), ViewMode::Preview);
        assert!(session.dataset().is_none());
        assert!(session.model_results().is_none());
        assert_eq!(session.training_progress(), 0);
        assert!(session.column_names().is_empty());
    }

    #[test]
    fn clear_session_resets_every_field() {
        let mut session = busy_session();
        assert_ne!(session, ModelSession::new());

        session.clear_session();
        assert_eq!(session, ModelSession::new());
        assert_eq!(session.current_view(), ViewMode::Preview);
        assert!(!session.is_loading());
        assert!(!session.is_analyzing_outliers());
        assert!(!session.is_saving_model());
        assert!(!session.is_loaded_model());
    }

    #[test]
    fn results_view_refused_without_results() {
        let mut session = ModelSession::new();
        session.set_dataset(Some(dataset()));
        assert_eq!(
            session.set_current_view(ViewMode::Results),
            Err(StepError::ResultsUnavailable)
        );
        assert_eq!(session.current_view(), ViewMode::Preview);
    }

    #[test]
    fn no_navigation_sequence_reaches_results_without_results() {
        let mut session = ModelSession::new();
        session.set_dataset(Some(dataset()));

        // Walk forward and back a few times, trying every target each step
        for _ in 0..4 {
            for target in ViewMode::ORDER {
                let _ = session.set_current_view(target);
                assert_ne!(session.current_view(), ViewMode::Results);
            }
            assert_eq!(session.current_view(), ViewMode::Selection);
            assert!(!can_go_next(&session));
            assert_eq!(go_next(&mut session), Err(StepError::ResultsUnavailable));
            assert_ne!(session.current_view(), ViewMode::Results);
            go_back(&mut session);
        }
        assert_eq!(session.current_view(), ViewMode::Preview);
    }

    #[test]
    fn navigation_is_reversible_once_results_exist() {
        let mut session = ModelSession::new();
        session.set_dataset(Some(dataset()));
        session.set_model_results(Some(results()));

        assert_eq!(go_next(&mut session), Ok(ViewMode::Selection));
        assert!(can_go_next(&session));
        assert_eq!(go_next(&mut session), Ok(ViewMode::Results));
        assert!(!can_go_next(&session));
        assert_eq!(go_next(&mut session), Err(StepError::LastStep));
        assert_eq!(go_back(&mut session), ViewMode::Selection);
        assert_eq!(go_back(&mut session), ViewMode::Preview);
        assert_eq!(go_back(&mut session), ViewMode::Preview);
    }

    #[test]
    fn clearing_results_leaves_results_view() {
        let mut session = busy_session();
        assert_eq!(session.current_view(), ViewMode::Results);
        session.set_model_results(None);
        assert_eq!(session.current_view(), ViewMode::Selection);
    }

    #[test]
    fn progress_is_capped() {
        let mut session = ModelSession::new();
        session.set_training_progress(250);
        assert_eq!(session.training_progress(), 100);
    }
}
