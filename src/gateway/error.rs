use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Every call the gateway can make, used for logging and fallback messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    DataPreview,
    Correlations,
    SelectFeatures,
    RecommendTask,
    OutliersAnalysis,
    EncodeCategorical,
    PrepareData,
    Train,
    DownloadModel,
    SaveModel,
    ListModels,
    GetModel,
    DeleteModel,
}

impl Operation {
    /// Message used when the backend gives no usable detail
    pub fn fallback_message(self) -> &'static str {
        match self {
            Operation::Upload => "Error uploading file. Please try again.",
            Operation::DataPreview => "Failed to fetch data preview",
            Operation::Correlations => "Failed to load correlations",
            Operation::SelectFeatures => "Failed to select features",
            Operation::RecommendTask => "Failed to get model recommendations",
            Operation::OutliersAnalysis => "Failed to analyze outliers",
            Operation::EncodeCategorical => "Failed to encode categorical variables",
            Operation::PrepareData => "Failed to prepare data",
            Operation::Train => "Failed to train model",
            Operation::DownloadModel => "Failed to download model",
            Operation::SaveModel => "Failed to save model",
            Operation::ListModels => "Failed to fetch models",
            Operation::GetModel => "Failed to fetch model",
            Operation::DeleteModel => "Failed to delete model",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::DataPreview => "data-preview",
            Operation::Correlations => "correlations",
            Operation::SelectFeatures => "select-features",
            Operation::RecommendTask => "recommend-task",
            Operation::OutliersAnalysis => "outliers-analysis",
            Operation::EncodeCategorical => "encode-categorical",
            Operation::PrepareData => "prepare-data",
            Operation::Train => "train",
            Operation::DownloadModel => "download-model",
            Operation::SaveModel => "save-model",
            Operation::ListModels => "list-models",
            Operation::GetModel => "get-model",
            Operation::DeleteModel => "delete-model",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur when calling the backend
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status; `message` is never empty
    #[error("{message}")]
    Status {
        operation: Operation,
        status: u16,
        message: String,
    },

    #[error("Malformed {operation} response: {source}")]
    Schema {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    /// The backend answered 2xx but reported `success: false`
    #[error("{message}")]
    Rejected {
        operation: Operation,
        message: String,
    },

    #[error("{0} was cancelled")]
    Cancelled(Operation),
}

impl GatewayError {
    /// HTTP status reported by the backend, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            GatewayError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GatewayError::Cancelled(_))
    }
}

/// Pull a display message out of an error body
///
/// Looks at `detail`, then `message`. A string is used as-is; any other JSON
/// value (validation error lists, for instance) is rendered compactly. Falls
/// back to `fallback` when the body is not JSON or neither field is usable.
pub fn error_message(body: &[u8], fallback: &str) -> String {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            ["detail", "message"]
                .iter()
                .find_map(|key| value.get(*key).and_then(render_detail))
        })
        .unwrap_or_else(|| fallback.to_string())
}

fn render_detail(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_wins_over_message() {
        let body = br#"{"detail": "No hay archivo", "message": "other"}"#;
        assert_eq!(error_message(body, "fallback"), "No hay archivo");
    }

    #[test]
    fn message_used_when_detail_missing_or_blank() {
        assert_eq!(error_message(br#"{"message": "bad input"}"#, "fallback"), "bad input");
        assert_eq!(
            error_message(br#"{"detail": "  ", "message": "bad input"}"#, "fallback"),
            "bad input"
        );
    }

    #[test]
    fn structured_detail_is_rendered() {
        let body = br#"{"detail": [{"loc": ["body", "label"], "msg": "field required"}]}"#;
        let message = error_message(body, "fallback");
        assert!(message.contains("field required"));
    }

    #[test]
    fn falls_back_on_non_json() {
        assert_eq!(error_message(b"<html>502</html>", "Failed to train model"), "Failed to train model");
        assert_eq!(error_message(b"", "Failed"), "Failed");
        assert_eq!(error_message(br#"{"detail": null}"#, "Failed"), "Failed");
    }

    #[test]
    fn every_fallback_is_non_empty() {
        let all = [
            Operation::Upload,
            Operation::DataPreview,
            Operation::Correlations,
            Operation::SelectFeatures,
            Operation::RecommendTask,
            Operation::OutliersAnalysis,
            Operation::EncodeCategorical,
            Operation::PrepareData,
            Operation::Train,
            Operation::DownloadModel,
            Operation::SaveModel,
            Operation::ListModels,
            Operation::GetModel,
            Operation::DeleteModel,
        ];
        for op in all {
            assert!(!op.fallback_message().is_empty(), "{op}");
        }
    }
}
