//! Backend gateway
//!
//! Every HTTP call to the analysis backend and to the model-persistence API
//! goes through here. Each call is a single request/response with no retry.
//! Non-success statuses become [`GatewayError::Status`] carrying the backend's
//! detail message or a per-operation fallback; bodies are decoded into the
//! typed shapes of [`schema`] and [`models`].

pub mod error;
pub mod models;
pub mod schema;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ExecutionContext};
use crate::dataset::CorrelationData;
use crate::training::OutlierParams;

pub use error::{GatewayError, Operation, error_message};
use models::{MlModelCreate, MlModelListItem, MlModelResponse};
use schema::{
    Acknowledged, DataPreview, EncodeCategoricalResponse, OutliersAnalysisResponse, PrepareDataResponse,
    RecommendTaskResponse, SelectFeaturesRequest, SelectFeaturesResponse, TrainModelRequest,
    TrainModelResponse, UploadResponse,
};

/// Number of strongest pairs requested from the correlation endpoint
pub const CORRELATION_TOP_N: usize = 10;

/// Default page size of the model list
pub const DEFAULT_LIST_LIMIT: u32 = 50;

lazy_static! {
    static ref FILENAME_REGEX: Regex = Regex::new(r#"filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).unwrap();
}

/// Analysis and training endpoints of the backend
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn upload_dataset(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadResponse, GatewayError>;

    /// Header and first rows of the dataset the backend currently holds
    async fn data_preview(&self) -> Result<DataPreview, GatewayError>;

    async fn correlations(&self, top_n: usize) -> Result<CorrelationData, GatewayError>;

    async fn select_features(
        &self,
        request: &SelectFeaturesRequest,
    ) -> Result<SelectFeaturesResponse, GatewayError>;

    async fn recommend_task(&self) -> Result<RecommendTaskResponse, GatewayError>;

    async fn analyze_outliers(
        &self,
        params: &OutlierParams,
    ) -> Result<OutliersAnalysisResponse, GatewayError>;

    async fn encode_categorical(&self) -> Result<EncodeCategoricalResponse, GatewayError>;

    async fn prepare_data(&self) -> Result<PrepareDataResponse, GatewayError>;

    async fn train_model(&self, request: &TrainModelRequest) -> Result<TrainModelResponse, GatewayError>;

    /// Fetch the trained model file for `model_id`
    async fn download_model(&self, model_id: &str) -> Result<ModelArtifact, GatewayError>;
}

/// CRUD on persisted models
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save_model(&self, model: &MlModelCreate) -> Result<MlModelResponse, GatewayError>;

    async fn list_models(&self, limit: u32, offset: u32) -> Result<Vec<MlModelListItem>, GatewayError>;

    async fn get_model(&self, model_id: &str) -> Result<MlModelResponse, GatewayError>;

    async fn delete_model(&self, model_id: &str) -> Result<(), GatewayError>;
}

/// Run `call` unless `token` fires first
///
/// The in-flight request is dropped on cancellation, which aborts it.
pub async fn cancellable<T, F>(
    token: &CancellationToken,
    operation: Operation,
    call: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    if token.is_cancelled() {
        return Err(GatewayError::Cancelled(operation));
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!("{operation} cancelled");
            Err(GatewayError::Cancelled(operation))
        }
        result = call => result,
    }
}

/// Trained model file fetched from the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ModelArtifact {
    /// Write the artifact into `dir`, returning the written path
    ///
    /// Only the final component of the advertised filename is used.
    pub async fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let name = Path::new(&self.filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "model.joblib".into());
        let path = dir.join(name);
        tokio::fs::write(&path, &self.bytes).await?;
        Ok(path)
    }
}

/// Filename advertised by a `Content-Disposition` header
pub fn disposition_filename(header: &str) -> Option<String> {
    FILENAME_REGEX
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// reqwest-backed implementation of both backend traits
///
/// Analysis calls go straight to the backend. Model CRUD goes through the
/// auth proxy, which attaches the signed identity token, so the browser
/// session cookie is forwarded when one is set.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    analysis_url: String,
    models_url: String,
    session_cookie: Option<String>,
}

impl HttpGateway {
    pub fn new(analysis_url: impl Into<String>, models_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), analysis_url, models_url)
    }

    pub fn with_client(
        client: Client,
        analysis_url: impl Into<String>,
        models_url: impl Into<String>,
    ) -> Self {
        HttpGateway {
            client,
            analysis_url: analysis_url.into().trim_end_matches('/').to_string(),
            models_url: models_url.into().trim_end_matches('/').to_string(),
            session_cookie: None,
        }
    }

    /// Gateway for the browser side: analysis on the public backend URL,
    /// model CRUD on the local proxy
    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self::with_client(
            client,
            config.api_url(ExecutionContext::Browser),
            config.auth_url.clone(),
        ))
    }

    /// Forward a browser session cookie (`name=value`) on model CRUD calls
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    fn analysis(&self, path: &str) -> String {
        format!("{}{}", self.analysis_url, path)
    }

    fn models(&self, path: &str) -> String {
        format!("{}{}", self.models_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => request.header(reqwest::header::COOKIE, cookie),
            None => request,
        }
    }

    /// Send and turn non-success statuses into errors
    async fn checked(&self, operation: Operation, request: RequestBuilder) -> Result<Response, GatewayError> {
        debug!("{operation}: sending request");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = error_message(&body, operation.fallback_message());
        warn!("{operation} failed with {status}: {message}");
        Err(GatewayError::Status {
            operation,
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.checked(operation, request).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| {
            warn!("{operation}: undecodable response: {source}");
            GatewayError::Schema { operation, source }
        })
    }

    async fn fetch_acknowledged<T: DeserializeOwned + Acknowledged>(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response: T = self.fetch(operation, request).await?;
        if response.succeeded() {
            return Ok(response);
        }
        let message = response
            .message()
            .unwrap_or(operation.fallback_message())
            .to_string();
        warn!("{operation} rejected: {message}");
        Err(GatewayError::Rejected { operation, message })
    }
}

#[async_trait]
impl AnalysisBackend for HttpGateway {
    async fn upload_dataset(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadResponse, GatewayError> {
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);
        let request = self.client.post(self.analysis("/api/upload")).multipart(form);
        self.fetch_acknowledged(Operation::Upload, request).await
    }

    async fn data_preview(&self) -> Result<DataPreview, GatewayError> {
        let request = self.client.get(self.analysis("/data-preview"));
        self.fetch(Operation::DataPreview, request).await
    }

    async fn correlations(&self, top_n: usize) -> Result<CorrelationData, GatewayError> {
        let request = self
            .client
            .get(self.analysis("/api/correlations"))
            .query(&[("top_n", top_n)]);
        let data: CorrelationData = self.fetch(Operation::Correlations, request).await?;
        if !data.success {
            let message = if data.message.is_empty() {
                Operation::Correlations.fallback_message().to_string()
            } else {
                data.message
            };
            return Err(GatewayError::Rejected {
                operation: Operation::Correlations,
                message,
            });
        }
        Ok(data)
    }

    async fn select_features(
        &self,
        request: &SelectFeaturesRequest,
    ) -> Result<SelectFeaturesResponse, GatewayError> {
        let request = self
            .client
            .post(self.analysis("/api/select-features"))
            .json(request);
        self.fetch_acknowledged(Operation::SelectFeatures, request).await
    }

    async fn recommend_task(&self) -> Result<RecommendTaskResponse, GatewayError> {
        let request = self.client.get(self.analysis("/api/recommend-task"));
        self.fetch(Operation::RecommendTask, request).await
    }

    async fn analyze_outliers(
        &self,
        params: &OutlierParams,
    ) -> Result<OutliersAnalysisResponse, GatewayError> {
        let request = self
            .client
            .post(self.analysis("/api/outliers-analysis"))
            .query(&[
                ("iqr_k", params.iqr_k.to_string()),
                ("clean_data", params.clean_data.to_string()),
                ("n_neighbors", params.n_neighbors.to_string()),
            ]);
        self.fetch_acknowledged(Operation::OutliersAnalysis, request).await
    }

    async fn encode_categorical(&self) -> Result<EncodeCategoricalResponse, GatewayError> {
        let request = self.client.post(self.analysis("/api/encode-categorical"));
        self.fetch_acknowledged(Operation::EncodeCategorical, request).await
    }

    async fn prepare_data(&self) -> Result<PrepareDataResponse, GatewayError> {
        let request = self.client.post(self.analysis("/api/prepare-data"));
        self.fetch_acknowledged(Operation::PrepareData, request).await
    }

    async fn train_model(&self, request: &TrainModelRequest) -> Result<TrainModelResponse, GatewayError> {
        let request = self.client.post(self.analysis("/api/train")).json(request);
        self.fetch_acknowledged(Operation::Train, request).await
    }

    async fn download_model(&self, model_id: &str) -> Result<ModelArtifact, GatewayError> {
        let operation = Operation::DownloadModel;
        let url = self.analysis(&format!(
            "/api/download-model/{}",
            urlencoding::encode(model_id)
        ));
        let response = self.checked(operation, self.client.get(url)).await?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(disposition_filename)
            .unwrap_or_else(|| format!("model_{model_id}.joblib"));
        let bytes = response.bytes().await?.to_vec();

        debug!("{operation}: {filename} ({} bytes)", bytes.len());
        Ok(ModelArtifact { filename, bytes })
    }
}

#[async_trait]
impl ModelStore for HttpGateway {
    async fn save_model(&self, model: &MlModelCreate) -> Result<MlModelResponse, GatewayError> {
        let request = self.authorized(self.client.post(self.models("/api/models")).json(model));
        self.fetch(Operation::SaveModel, request).await
    }

    async fn list_models(&self, limit: u32, offset: u32) -> Result<Vec<MlModelListItem>, GatewayError> {
        let request = self.authorized(
            self.client
                .get(self.models("/api/models"))
                .query(&[("limit", limit), ("offset", offset)]),
        );
        self.fetch(Operation::ListModels, request).await
    }

    async fn get_model(&self, model_id: &str) -> Result<MlModelResponse, GatewayError> {
        let url = self.models(&format!("/api/models/{}", urlencoding::encode(model_id)));
        let request = self.authorized(self.client.get(url));
        self.fetch(Operation::GetModel, request).await
    }

    async fn delete_model(&self, model_id: &str) -> Result<(), GatewayError> {
        let url = self.models(&format!("/api/models/{}", urlencoding::encode(model_id)));
        let request = self.authorized(self.client.delete(url));
        self.checked(Operation::DeleteModel, request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_disposition_filenames() {
        assert_eq!(
            disposition_filename(r#"attachment; filename="model_rf.joblib""#).as_deref(),
            Some("model_rf.joblib")
        );
        assert_eq!(
            disposition_filename("attachment; filename=model.joblib").as_deref(),
            Some("model.joblib")
        );
        assert_eq!(
            disposition_filename("attachment; filename*=UTF-8''modelo.joblib").as_deref(),
            Some("modelo.joblib")
        );
        assert_eq!(disposition_filename("inline"), None);
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        let gateway = HttpGateway::new("http://backend:8000/", "http://127.0.0.1:3000/");
        assert_eq!(gateway.analysis("/api/train"), "http://backend:8000/api/train");
        assert_eq!(gateway.models("/api/models"), "http://127.0.0.1:3000/api/models");
    }

    #[test]
    fn config_routes_analysis_to_public_url_and_models_to_proxy() {
        let config = AppConfig::from_lookup(|key| match key {
            "PUBLIC_API_URL" => Some("https://analysis.example.com/".to_string()),
            "BACKEND_URL" => Some("http://backend:8000".to_string()),
            "AUTH_URL" => Some("https://app.example.com".to_string()),
            _ => None,
        });
        let gateway = HttpGateway::from_config(&config).unwrap();
        assert_eq!(
            gateway.analysis("/api/upload"),
            "https://analysis.example.com/api/upload"
        );
        assert_eq!(
            gateway.models("/api/models"),
            "https://app.example.com/api/models"
        );
        assert!(gateway.session_cookie.is_none());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<(), GatewayError> =
            cancellable(&token, Operation::Train, async { Ok(()) }).await;
        assert!(matches!(result, Err(GatewayError::Cancelled(Operation::Train))));
    }

    #[tokio::test]
    async fn artifact_is_written_under_its_basename() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ModelArtifact {
            filename: "../../escape.joblib".to_string(),
            bytes: vec![1, 2, 3],
        };
        let path = artifact.save_to(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("escape.joblib"));
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
    }
}
