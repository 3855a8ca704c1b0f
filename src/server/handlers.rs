use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::background::Background;
use crate::config::Config;
use crate::manager::ManagerOptions;
use crate::messages;
use crate::services::Services;
use crate::storage::Stores;

use super::models::{ErrorResponse, PageLoaded, ServerError};
use super::session::PageSession;
use super::state::ServerState;

pub async fn run_server(config: Config, addr: String) -> Result<()> {
    let services = Services::from_config(&config)?;
    let state = ServerState {
        background: Background::new(services.clone()),
        session: PageSession::spawn(
            Stores::from_config(&config),
            services,
            ManagerOptions::from(&config),
        )?,
    };
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/message", post(message))
        .route("/page", get(page_html).post(load_page))
        .with_state(Arc::new(state))
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

// Serves one message. Action failures are replies, not HTTP errors.
async fn message(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<Value>,
) -> Result<Json<messages::Response>, (StatusCode, Json<ErrorResponse>)> {
    let request = match messages::Request::parse(payload) {
        Ok(request) => request,
        Err(reply) => return Ok(Json(reply)),
    };
    if let Some(reply) = state.background.handle(&request).await {
        return Ok(Json(reply));
    }
    state
        .session
        .message(request)
        .await
        .map(Json)
        .map_err(|err| ServerError::from(err).into_reply())
}

async fn load_page(
    State(state): State<Arc<ServerState>>,
    html: String,
) -> Result<Json<PageLoaded>, (StatusCode, Json<ErrorResponse>)> {
    if html.trim().is_empty() {
        return Err(ServerError::bad_request("page body is empty").into_reply());
    }
    let paragraphs = state
        .session
        .load(html)
        .await
        .map_err(|err| ServerError::from(err).into_reply())?;
    Ok(Json(PageLoaded { paragraphs }))
}

async fn page_html(
    State(state): State<Arc<ServerState>>,
) -> Result<Html<String>, (StatusCode, Json<ErrorResponse>)> {
    match state.session.html().await {
        Ok(Some(html)) => Ok(Html(html)),
        Ok(None) => Err(ServerError::not_found("no page loaded").into_reply()),
        Err(err) => Err(ServerError::from(err).into_reply()),
    }
}
