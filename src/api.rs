use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tracing::{debug, error};

use crate::{
    app_state::AppState,
    error::{GenerationError, PipelineError},
    models::{ErrorResponse, QueryPayload, QueryResponse, SchemaResponse},
};

// --- Errores de la API ---

/// Error de un handler: el error del pipeline y si se expone su detalle.
pub struct ApiError {
    error: PipelineError,
    expose_details: bool,
}

impl ApiError {
    fn new(state: &AppState, error: PipelineError) -> Self {
        Self {
            error,
            expose_details: state.config.expose_error_details(),
        }
    }

    fn status(&self) -> StatusCode {
        match &self.error {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Generation(GenerationError::LocalServerNotRunning { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PipelineError::Generation(GenerationError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Error procesando la petición: {}", self.error);
        }
        let body = ErrorResponse {
            success: false,
            error: self.error.to_string(),
            details: self.expose_details.then(|| format!("{:?}", self.error)),
        };
        (status, Json(body)).into_response()
    }
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/query", post(query_handler))
        .route("/api/query/schema", get(schema_handler))
        .route("/api/health", get(health_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryPayload>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    // Un cuerpo mal formado también responde con `{success:false, error}`
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::new(&state, PipelineError::Validation(rejection.body_text()))
    })?;
    debug!("Payload recibido: question={:?} collection={:?}", payload.question, payload.collection);
    state
        .pipeline
        .run(payload.question.as_deref(), payload.collection.as_deref())
        .await
        .map(Json)
        .map_err(|e| ApiError::new(&state, e))
}

#[axum::debug_handler]
async fn schema_handler(
    State(state): State<AppState>,
) -> Result<Json<SchemaResponse>, ApiError> {
    state
        .pipeline
        .schema_overview()
        .await
        .map(Json)
        .map_err(|e| ApiError::new(&state, e))
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let generator = &state.pipeline.generator;
    let llm = generator.check_health().await;
    Json(json!({
        "success": true,
        "backend": generator.backend().as_str(),
        "llm": llm,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use mongodb::bson::doc;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::executor::QueryExecutor;
    use crate::explain::ResultExplainer;
    use crate::local_llm::LocalQueryGenerator;
    use crate::llm::QueryGenerator;
    use crate::pipeline::QueryPipeline;
    use crate::remote_llm::RemoteQueryGenerator;
    use crate::schema::SchemaIntrospector;
    use crate::test_support::{FakeStore, ScriptedChat};

    fn state(app_env: &str, generator: Arc<dyn QueryGenerator>, chat: Arc<ScriptedChat>, store: Arc<FakeStore>) -> AppState {
        let app_env = app_env.to_string();
        let config = AppConfig::from_lookup(move |key| match key {
            "MONGODB_URI" => Some("mongodb://localhost:27017".to_string()),
            "MONGODB_DB_NAME" => Some("helpdesk".to_string()),
            "APP_ENV" => Some(app_env.clone()),
            _ => None,
        })
        .unwrap();

        AppState {
            pipeline: QueryPipeline {
                generator,
                executor: QueryExecutor::new(store.clone()),
                explainer: ResultExplainer::new(chat),
                introspector: SchemaIntrospector::new(store, config.schema_sample_size),
                default_collection: config.default_collection.clone(),
                operator_check: config.operator_check,
            },
            config,
        }
    }

    fn remote_state(app_env: &str, replies: Vec<Result<String, String>>, store: FakeStore) -> AppState {
        let chat = Arc::new(ScriptedChat::new(replies));
        state(app_env, Arc::new(RemoteQueryGenerator::new(chat.clone())), chat, Arc::new(store))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_query(body: Value) -> Request<Body> {
        Request::post("/api/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn query_returns_full_response() {
        let app = create_router(remote_state(
            "production",
            vec![
                Ok(r#"{"query":{"status":"open","priority":"high"},"explanation":"Open high tickets"}"#.to_string()),
                Ok("Two tickets match.".to_string()),
            ],
            FakeStore::with_documents(vec![doc! { "title": "a" }, doc! { "title": "b" }]),
        ));

        let (status, body) =
            send(app, post_query(json!({"question": "show open high priority tickets"}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["resultCount"], 2);
        assert_eq!(body["query"], json!({"status": "open", "priority": "high"}));
        assert_eq!(body["queryExplanation"], "Open high tickets");
        assert_eq!(body["explanation"], "Two tickets match.");
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_question_is_a_bad_request() {
        let app = create_router(remote_state("production", vec![], FakeStore::default()));

        let (status, body) = send(app, post_query(json!({"collection": "tickets"}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Question is required");
    }

    #[tokio::test]
    async fn malformed_body_is_a_json_bad_request() {
        let chat = Arc::new(ScriptedChat::new(vec![]));
        let store = Arc::new(FakeStore::default());
        let app = create_router(state(
            "production",
            Arc::new(RemoteQueryGenerator::new(chat.clone())),
            chat.clone(),
            store.clone(),
        ));

        let (status, body) = send(app.clone(), post_query(json!({"question": 5}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());

        let not_json = Request::post("/api/query")
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let (status, body) = send(app.clone(), not_json).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let no_content_type = Request::post("/api/query")
            .body(Body::from(r#"{"question":"q"}"#))
            .unwrap();
        let (status, body) = send(app, no_content_type).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        assert!(chat.calls().is_empty());
        assert_eq!(store.find_count(), 0);
    }

    #[tokio::test]
    async fn details_only_in_development() {
        let failing = || vec![Err("upstream 500".to_string())];

        let prod = create_router(remote_state("production", failing(), FakeStore::default()));
        let (status, body) = send(prod, post_query(json!({"question": "q"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("upstream 500"));
        assert!(body.get("details").is_none());

        let dev = create_router(remote_state("development", failing(), FakeStore::default()));
        let (_, body) = send(dev, post_query(json!({"question": "q"}))).await;
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn local_server_down_maps_to_service_unavailable() {
        let chat = Arc::new(ScriptedChat::new(vec![]));
        let local = Arc::new(LocalQueryGenerator::new("http://127.0.0.1:1", "llama3-mongodb").unwrap());
        let app = create_router(state("production", local, chat, Arc::new(FakeStore::default())));

        let (status, body) = send(app, post_query(json!({"question": "open tickets"}))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("not running"));
    }

    #[tokio::test]
    async fn schema_lists_collections_and_schemas() {
        let store = FakeStore::default()
            .collection("tickets", vec![doc! { "status": "open", "tags": ["bug"] }])
            .collection("users", vec![]);
        let app = create_router(remote_state("production", vec![], store));

        let (status, body) = send(
            app,
            Request::get("/api/query/schema").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["collections"], json!(["tickets", "users"]));
        assert_eq!(body["schemas"]["tickets"], json!({"status": "string", "tags": "array"}));
        assert_eq!(body["schemas"]["users"], Value::Null);
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let app = create_router(remote_state("production", vec![], FakeStore::default()));

        let (status, body) =
            send(app, Request::get("/api/health").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["backend"], "remote");
        assert_eq!(body["llm"], Value::Null);
    }
}
