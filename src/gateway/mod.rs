//! Axum-based HTTP gateway: the authenticated-request gate in front of the
//! research endpoints.
//!
//! Every inbound request is admitted by the origin gate before routing;
//! protected endpoints additionally resolve a bearer session token to a
//! subject identity before their handler body runs. Any gate failure
//! short-circuits the chain with a stable error kind and the handler is
//! never invoked.

pub mod origin;

use crate::auth::{AuthError, TokenIssuer};
use crate::config::Config;
use crate::database::{Database, DatabaseError};
use crate::research::{self, ResearchProvider};
use anyhow::{Context, Result};
use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use origin::OriginGate;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Most history rows a single `/history` call returns.
pub const HISTORY_LIMIT: usize = 50;
/// Preflight cache lifetime advertised to browsers.
const CORS_MAX_AGE_SECS: u64 = 86_400;

/// One message for both login failure paths, so a response never reveals
/// whether the email exists.
const MSG_BAD_LOGIN: &str = "Invalid email or password";
const MSG_BAD_TOKEN: &str = "Invalid or expired session token";
const MSG_NO_TOKEN: &str = "Missing Authorization header";

/// The gate's error taxonomy. Every variant is a terminal policy decision:
/// there is no transient category and nothing here is retried.
#[derive(Debug, Error)]
pub enum GateError {
    /// Declared origin does not match the configured allowed origin.
    #[error("Origin not allowed")]
    Forbidden,
    /// Missing/invalid/expired token, or bad login credentials.
    #[error("{0}")]
    Unauthorized(&'static str),
    /// Duplicate identity on registration.
    #[error("Email already registered")]
    Conflict,
    /// Malformed request body or failed validation.
    #[error("{0}")]
    Invalid(String),
    /// Store or provider failure. Detail is logged, never sent.
    #[error("Internal server error")]
    Internal,
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::Forbidden => StatusCode::FORBIDDEN,
            GateError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GateError::Conflict => StatusCode::CONFLICT,
            GateError::Invalid(_) => StatusCode::BAD_REQUEST,
            GateError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({"error": self.to_string()}));
        (self.status(), body).into_response()
    }
}

impl From<DatabaseError> for GateError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Conflict => GateError::Conflict,
            DatabaseError::InvalidCredentials => GateError::Unauthorized(MSG_BAD_LOGIN),
            DatabaseError::Invalid(msg) => GateError::Invalid(msg),
            other => {
                tracing::error!("database failure: {other}");
                GateError::Internal
            }
        }
    }
}

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub tokens: Arc<TokenIssuer>,
    pub origin: OriginGate,
    pub provider: Arc<dyn ResearchProvider>,
}

/// Concrete return type for handlers (avoids `impl IntoResponse` inference
/// issues).
type ApiResult = Result<(StatusCode, Json<serde_json::Value>), GateError>;

/// Request body for account creation and login.
#[derive(Debug, Deserialize)]
struct CredentialsBody {
    email: String,
    password: String,
}

/// Request body for a research query.
#[derive(Debug, Deserialize)]
struct QueryBody {
    query: String,
    #[serde(default)]
    model: Option<String>,
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, GateError> {
    body.map(|Json(b)| b)
        .map_err(|e| GateError::Invalid(format!("Invalid request: {e}")))
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// The token half of the request gate: resolve the presented bearer token
/// to a subject identity or stop the request with 401.
fn require_subject(state: &AppState, headers: &HeaderMap) -> Result<String, GateError> {
    let token =
        extract_bearer_token(headers).ok_or(GateError::Unauthorized(MSG_NO_TOKEN))?;
    state
        .tokens
        .verify_token(token)
        .map_err(|_| GateError::Unauthorized(MSG_BAD_TOKEN))
}

fn map_login_err(e: AuthError) -> GateError {
    match e {
        AuthError::Unauthorized => GateError::Unauthorized(MSG_BAD_LOGIN),
        AuthError::Database(db) => db.into(),
        AuthError::Signing(err) => {
            tracing::error!("token signing failed: {err}");
            GateError::Internal
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health — public (behind the origin gate only), no secrets leaked.
async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "allowed_origin": state.origin.allowed(),
    }))
}

/// POST /signup — create an account and issue its first session token.
async fn handle_signup(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResult {
    let body = parse_body(body)?;
    let user = state.db.create_user(&body.email, &body.password)?;
    let token = state.tokens.issue_session(&user.id).map_err(map_login_err)?;
    tracing::info!(user_id = %user.id, "new account registered");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "access_token": token,
            "token_type": "bearer",
        })),
    ))
}

/// POST /login — exchange credentials for a session token.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsBody>, JsonRejection>,
) -> ApiResult {
    let body = parse_body(body)?;
    let token = state
        .tokens
        .login(&state.db, &body.email, &body.password)
        .map_err(map_login_err)?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "access_token": token,
            "token_type": "bearer",
        })),
    ))
}

/// POST /query — protected: answer a research question and log it.
async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> ApiResult {
    let subject = require_subject(&state, &headers)?;
    let body = parse_body(body)?;

    let model = body.model.as_deref().unwrap_or(research::DEFAULT_MODEL);
    let answer = state
        .provider
        .answer(&body.query, model)
        .await
        .map_err(|e| {
            tracing::error!("research provider failed: {e}");
            GateError::Internal
        })?;

    let id = state.db.log_query(&subject, &body.query, Some(&answer))?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"answer": answer, "id": id})),
    ))
}

/// GET /history — protected: the subject's recent queries, newest first.
async fn handle_history(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let subject = require_subject(&state, &headers)?;
    let records = state.db.recent_queries(&subject, HISTORY_LIMIT)?;
    let rows: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "question": r.question,
                "answer": r.answer,
            })
        })
        .collect();
    Ok((StatusCode::OK, Json(serde_json::Value::Array(rows))))
}

// ══════════════════════════════════════════════════════════════════════════════
// ROUTER + SERVER
// ══════════════════════════════════════════════════════════════════════════════

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/signup", post(handle_signup))
        .route("/login", post(handle_login))
        .route("/query", post(handle_query))
        .route("/history", get(handle_history))
        .with_state(state)
}

/// Assemble the full gate stack around the routes. At request time the
/// origin gate runs first, then timeout, body limit, CORS, routing.
fn app(state: AppState) -> Result<Router> {
    let allowed = HeaderValue::from_str(state.origin.allowed())
        .context("FRONTEND_ORIGIN is not a valid header value")?;

    let cors = CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS));

    Ok(router(state.clone())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
        .layer(middleware::from_fn_with_state(state, origin::enforce_origin)))
}

/// Run the HTTP gateway.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let display_addr = listener.local_addr()?;

    let db = Arc::new(Database::open(&config.database_dir).context("failed to open database")?);
    let tokens = Arc::new(TokenIssuer::new(
        &config.secret_key,
        crate::auth::DEFAULT_TOKEN_TTL,
    ));
    let provider = research::create_provider(config.openai_api_key.as_deref());
    tracing::info!(provider = provider.name(), "research provider selected");

    let state = AppState {
        db,
        tokens,
        origin: OriginGate::new(config.frontend_origin.clone()),
        provider,
    };
    let app = app(state)?;

    println!("🔎 noit-api listening on http://{display_addr}");
    println!("  GET  /health   — health check");
    println!("  POST /signup   — create account, returns a session token");
    println!("  POST /login    — exchange credentials for a session token");
    println!("  POST /query    — ask a research question (bearer token)");
    println!("  GET  /history  — recent queries (bearer token)");
    println!("  Allowed origin: {}", config.frontend_origin);
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, app).await?;

    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// TESTS
// ══════════════════════════════════════════════════════════════════════════════
