//! HTTP surface for the document chat actions.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/documents` | Multipart upload (`file`, optional `mimeType`) |
//! | `POST` | `/api/reindex` | Rebuild the collection from stored documents |
//! | `POST` | `/api/chat` | Answer `{ "query": "..." }` from indexed documents |
//! | `GET`  | `/health` | Liveness check with version |
//!
//! Failures use `{ "success": false, "error": "...", "code": "..." }`.

use crate::actions::{self, ActionError, ActionResult, ErrorCode, Services};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Extraction => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl<T: Serialize> IntoResponse for ActionResult<T> {
    fn into_response(self) -> Response {
        match self {
            ActionResult::Ok(_) => (StatusCode::OK, Json(self)).into_response(),
            ActionResult::Err(error) => error.into_response(),
        }
    }
}

pub fn router(services: Arc<Services>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/documents", post(handle_upload))
        .route("/api/reindex", post(handle_reindex))
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { services })
}

pub async fn run_server(
    services: Arc<Services>,
    bind: SocketAddr,
    max_upload_bytes: usize,
) -> anyhow::Result<()> {
    if let Err(error) = services.store.ensure_collection_exists().await {
        warn!(%error, "could not initialise vector store, continuing");
    }

    let app = router(services, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "docuchat listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn handle_upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut declared_mime_type: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => return ActionError::bad_request(error.body_text()).into_response(),
        };

        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) => file = Some((name, content_type, bytes.to_vec())),
                    Err(error) => {
                        return ActionError::bad_request(error.body_text()).into_response()
                    }
                }
            }
            Some("mimeType") => match field.text().await {
                Ok(text) => declared_mime_type = Some(text),
                Err(error) => return ActionError::bad_request(error.body_text()).into_response(),
            },
            _ => {}
        }
    }

    let Some((file_name, content_type, bytes)) = file else {
        return ActionError::bad_request("No file uploaded").into_response();
    };
    let mime_type = declared_mime_type
        .filter(|value| !value.trim().is_empty())
        .or(content_type.filter(|value| value != "application/octet-stream"));

    actions::upload_document(&state.services, &file_name, mime_type.as_deref(), &bytes)
        .await
        .into_response()
}

async fn handle_reindex(State(state): State<AppState>) -> Response {
    actions::reindex(&state.services).await.into_response()
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return ActionError::bad_request(rejection.body_text()).into_response(),
    };

    match actions::chat(&state.services, &request.query).await {
        Ok(answer) => Json(answer).into_response(),
        Err(error) => error.into_response(),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::{services, EchoModel};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BOUNDARY: &str = "docuchat-test-boundary";

    fn multipart_body(file_name: &str, contents: &str) -> String {
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {contents}\r\n\
             --{BOUNDARY}--\r\n"
        )
    }

    async fn send(app: Router, request: Request<Body>) -> Result<(StatusCode, Value), Box<dyn std::error::Error>> {
        let response = app.oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    fn chat_request(body: Value) -> Result<Request<Body>, axum::http::Error> {
        Request::post("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
    }

    #[tokio::test]
    async fn health_reports_version() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let app = router(Arc::new(services(dir.path(), Arc::default())), 1024);

        let (status, body) = send(app, Request::get("/health").body(Body::empty())?).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        Ok(())
    }

    #[tokio::test]
    async fn upload_then_chat_over_http() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let app = router(Arc::new(services(dir.path(), Arc::new(EchoModel::default()))), 1 << 20);

        let upload = Request::post("/api/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body("sky.txt", "The sky is blue.")))?;
        let (status, body) = send(app.clone(), upload).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"success": true, "metadata": {"fileName": "sky.txt", "pageCount": 1, "chunkCount": 1}})
        );

        let (status, body) =
            send(app, chat_request(json!({"query": "What color is the sky?"}))?).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "The sky is blue.");
        assert_eq!(body["sources"][0]["metadata"]["source"], "sky.txt");
        assert_eq!(body["sources"][0]["metadata"]["page"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn blank_query_returns_error_envelope() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let app = router(Arc::new(services(dir.path(), Arc::default())), 1024);

        let (status, body) = send(app, chat_request(json!({"query": "   "}))?).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"success": false, "error": "No query provided", "code": "bad_request"})
        );
        Ok(())
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let app = router(Arc::new(services(dir.path(), Arc::default())), 1024);

        let body = format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"mimeType\"\r\n\r\ntext/plain\r\n--{BOUNDARY}--\r\n");
        let request = Request::post("/api/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))?;

        let (status, body) = send(app, request).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "No file uploaded");
        Ok(())
    }

    #[tokio::test]
    async fn reindex_on_empty_storage_succeeds() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let app = router(Arc::new(services(dir.path(), Arc::default())), 1024);

        let (status, body) = send(app, Request::post("/api/reindex").body(Body::empty())?).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["metadata"]["documentCount"], 0);
        assert_eq!(body["metadata"]["chunkCount"], 0);
        Ok(())
    }
}
