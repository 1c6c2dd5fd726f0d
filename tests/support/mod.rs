#![allow(dead_code)]

//! In-process stand-in for the analysis backend and model store

use axum::{
    Json, Router,
    body::Body,
    extract::{Multipart, Path, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// One request seen by the fake backend
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub cookie: Option<String>,
}

#[derive(Default)]
pub struct Recorder {
    hits: Mutex<Vec<Hit>>,
    failures: Mutex<HashMap<String, (StatusCode, String)>>,
    users: Mutex<HashMap<String, String>>,
    models: Mutex<HashMap<String, Value>>,
}

pub struct FakeBackend {
    pub url: String,
    recorder: Arc<Recorder>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let recorder = Arc::new(Recorder::default());
        let app = router(recorder.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake backend");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve fake backend");
        });

        FakeBackend {
            url: format!("http://{addr}"),
            recorder,
        }
    }

    /// Answer `path` with `status` and a raw `body` from now on
    pub fn fail(&self, path: &str, status: u16, body: &str) {
        let status = StatusCode::from_u16(status).expect("valid status");
        self.recorder
            .failures
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn add_user(&self, email: &str, id: &str) {
        self.recorder
            .users
            .lock()
            .unwrap()
            .insert(email.to_string(), id.to_string());
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.recorder.hits.lock().unwrap().clone()
    }

    /// `METHOD path` of every request, in arrival order
    pub fn calls(&self) -> Vec<String> {
        self.hits()
            .into_iter()
            .map(|hit| format!("{} {}", hit.method, hit.path))
            .collect()
    }

    pub fn stored_model(&self, id: &str) -> Option<Value> {
        self.recorder.models.lock().unwrap().get(id).cloned()
    }
}

async fn record(State(recorder): State<Arc<Recorder>>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    recorder.hits.lock().unwrap().push(Hit {
        method: request.method().to_string(),
        path: path.clone(),
        query: request.uri().query().map(str::to_string),
        cookie: request
            .headers()
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    });

    let failure = recorder.failures.lock().unwrap().get(&path).cloned();
    if let Some((status, body)) = failure {
        return (status, body).into_response();
    }
    next.run(request).await
}

fn router(recorder: Arc<Recorder>) -> Router {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/data-preview", get(data_preview))
        .route("/api/correlations", get(correlations))
        .route("/api/select-features", post(select_features))
        .route("/api/outliers-analysis", post(outliers))
        .route("/api/recommend-task", get(recommend))
        .route("/api/encode-categorical", post(encode))
        .route("/api/prepare-data", post(prepare))
        .route("/api/train", post(train))
        .route("/api/download-model/:id", get(download))
        .route("/api/users/by-email/:email", get(user_by_email))
        .route("/api/users", post(create_user))
        .route("/api/models", get(list_models).post(save_model))
        .route("/api/models/:id", get(get_model).delete(delete_model))
        .layer(middleware::from_fn_with_state(recorder.clone(), record))
        .with_state(recorder)
}

pub fn data_summary() -> Value {
    json!({
        "shape": {"rows": 3, "columns": 3},
        "columns": ["age", "income", "churn"],
        "data_types": {"age": "int64", "income": "float64", "churn": "int64"},
        "memory_usage_mb": 0.01,
        "missing_values_percent": "0.00%",
        "numeric_columns_count": 3,
        "categorical_columns_count": 0,
        "preview": [
            {"age": 31, "income": 4200.0, "churn": 0},
            {"age": 45, "income": 3100.5, "churn": 1},
            {"age": 28, "income": 5100.0, "churn": 0}
        ],
        "columns_summary": []
    })
}

async fn upload(mut multipart: Multipart) -> Response {
    let mut filename = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
        }
    }
    let Some(filename) = filename else {
        return (StatusCode::BAD_REQUEST, Json(json!({"detail": "Falta el archivo"}))).into_response();
    };

    Json(json!({
        "success": true,
        "message": "Archivo cargado",
        "file_info": {
            "filename": filename,
            "encoding": "utf-8",
            "separator": ",",
            "uploaded_at": "2026-10-19T09:30:00"
        },
        "data_summary": data_summary()
    }))
    .into_response()
}

async fn data_preview() -> Json<Value> {
    Json(json!({
        "header": ["age", "income", "churn"],
        "first_rows": [
            {"age": 31, "income": 4200.0, "churn": 0},
            {"age": 45, "income": null, "churn": 1}
        ]
    }))
}

async fn correlations() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "ok",
        "methods": ["pearson", "spearman", "kendall"],
        "n_variables": 3,
        "variables": ["age", "income", "churn"],
        "total_correlations": 3,
        "samples_used": 3,
        "top_correlations": [],
        "all_correlations": [
            {
                "variable_1": "age",
                "variable_2": "churn",
                "pearson": {"correlation": 0.61, "p_value": 0.04},
                "spearman": {"correlation": 0.5, "p_value": 0.1},
                "kendall": {"correlation": 0.33, "p_value": 0.2}
            },
            {
                "variable_1": "income",
                "variable_2": "churn",
                "pearson": {"correlation": -0.82, "p_value": 0.01},
                "spearman": {"correlation": -0.5, "p_value": 0.1},
                "kendall": {"correlation": -0.33, "p_value": 0.2}
            }
        ],
        "correlation_matrices": {}
    }))
}

async fn select_features(Json(body): Json<Value>) -> Json<Value> {
    let features = body["features"].clone();
    let count = features.as_array().map(Vec::len).unwrap_or(0);
    Json(json!({
        "success": true,
        "message": "Features seleccionadas",
        "features": features,
        "label": body["label"].clone(),
        "features_count": count,
        "all_columns_exist": true
    }))
}

async fn outliers() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Outliers analizados",
        "features_and_label_used": ["age", "income", "churn"],
        "outliers_detection": {
            "method": "IQR",
            "iqr_k": 1.5,
            "columns_analyzed": ["age", "income"],
            "total_columns": 2,
            "outliers_by_column": {
                "income": {
                    "lower_bound": 1000.0,
                    "upper_bound": 7000.0,
                    "outliers_count": 1,
                    "outliers_percentage": 33.3
                }
            },
            "total_outliers_before": 1,
            "rows_analyzed": 3
        },
        "cleaning_applied": true,
        "cleaning_results": {
            "method": "KNN",
            "n_neighbors": 5,
            "columns_cleaned": ["income"],
            "total_outliers_before": 1,
            "total_outliers_after": 0,
            "outliers_cleaned": 1,
            "rows_before": 3,
            "rows_after": 3,
            "rows_removed": 0
        }
    }))
}

async fn recommend() -> Json<Value> {
    Json(json!({
        "problem_type": "classification",
        "data_type": "int64",
        "unique_values": 2,
        "total_values": 3,
        "null_values": 0,
        "unique_samples": [0, 1],
        "recommendation": "Use a classification model",
        "available_models": [
            {"model_type": "logistic_regression", "name": "Logistic Regression", "description": ""},
            {"model_type": "random_forest", "name": "Random Forest", "description": ""}
        ],
        "valid_models": ["logistic_regression", "random_forest"]
    }))
}

async fn encode() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Sin columnas categóricas",
        "columns_encoded": [],
        "encoders": {}
    }))
}

async fn prepare() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Datos preparados",
        "training_samples": 2,
        "test_samples": 1,
        "features_shape": [2, 2],
        "label_shape": [2]
    }))
}

async fn train(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Modelo entrenado",
        "model_type": body["model_type"].clone(),
        "metrics": {
            "accuracy": 0.9,
            "feature_importance": {"age": 0.3, "income": 0.7}
        },
        "training_info": {"training_samples": 2},
        "predictions": [{"actual": 1.0, "predicted": 1.0}]
    }))
}

async fn download(Path(id): Path<String>) -> Response {
    let disposition = format!("attachment; filename=\"trained_{id}.joblib\"");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(vec![0x80, 0x04, 0x95]))
        .unwrap()
}

async fn user_by_email(State(recorder): State<Arc<Recorder>>, Path(email): Path<String>) -> Response {
    match recorder.users.lock().unwrap().get(&email) {
        Some(id) => Json(json!({"id": id, "email": email})).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "User not found"}))).into_response(),
    }
}

async fn create_user(State(recorder): State<Arc<Recorder>>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let mut users = recorder.users.lock().unwrap();
    let id = format!("user-{}", users.len() + 1);
    users.insert(email.clone(), id.clone());
    (StatusCode::CREATED, Json(json!({"id": id, "email": email}))).into_response()
}

async fn list_models(State(recorder): State<Arc<Recorder>>) -> Json<Value> {
    let models = recorder.models.lock().unwrap();
    let items: Vec<Value> = models
        .values()
        .map(|model| {
            json!({
                "id": model["id"],
                "model_name": model["model_name"],
                "created_at": "2026-10-19T09:30:00Z",
                "outcome_variable": model["variable_selection"]["outcome_variable"],
                "selected_model": model["training_config"]["selected_model"],
                "has_results": !model["results"].is_null(),
                "has_model_file": false
            })
        })
        .collect();
    Json(Value::Array(items))
}

async fn save_model(State(recorder): State<Arc<Recorder>>, Json(mut body): Json<Value>) -> Response {
    let Some(id) = body["id"].as_str().map(str::to_string) else {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": "id required"}))).into_response();
    };
    body["created_at"] = json!("2026-10-19T09:30:00Z");
    body["updated_at"] = json!("2026-10-19T09:30:00Z");
    body["has_model_file"] = json!(false);
    recorder.models.lock().unwrap().insert(id, body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn get_model(State(recorder): State<Arc<Recorder>>, Path(id): Path<String>) -> Response {
    match recorder.models.lock().unwrap().get(&id) {
        Some(model) => Json(model.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"detail": "Modelo no encontrado"}))).into_response(),
    }
}

async fn delete_model(State(recorder): State<Arc<Recorder>>, Path(id): Path<String>) -> StatusCode {
    match recorder.models.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}
