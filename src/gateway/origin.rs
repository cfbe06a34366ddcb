//! Single-origin request admission.
//!
//! Every inbound request passes through `enforce_origin` before routing:
//! a declared `Origin` must equal the one configured allowed origin
//! exactly, or the request ends here with 403 and no handler runs.
//! Preflight requests carry an `Origin` and no body, so they are gated
//! the same way.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use super::{AppState, GateError};

/// Admits requests from the single configured origin.
#[derive(Debug, Clone)]
pub struct OriginGate {
    allowed: String,
}

impl OriginGate {
    /// Build the gate around the configured allowed origin.
    pub fn new(allowed_origin: impl Into<String>) -> Self {
        Self {
            allowed: allowed_origin.into(),
        }
    }

    pub fn allowed(&self) -> &str {
        &self.allowed
    }

    /// Decide admission for a request's declared origin.
    ///
    /// Matching is exact string equality against the one allowed origin;
    /// no wildcards, no sets. A request that declares no origin at all
    /// (same-origin navigation, curl, the proxy's health probe) is not a
    /// cross-origin request and is admitted.
    pub fn admit(&self, request_origin: Option<&str>) -> Result<(), GateError> {
        match request_origin {
            None => Ok(()),
            Some(origin) if origin == self.allowed => Ok(()),
            Some(origin) => {
                tracing::warn!(origin, "request rejected by origin gate");
                Err(GateError::Forbidden)
            }
        }
    }
}

/// Router-wide layer: evaluate the origin gate before any handler logic.
pub async fn enforce_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GateError> {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    state.origin.admit(origin)?;
    Ok(next.run(request).await)
}
