//! Axum adapter
//!
//! ```rust,ignore
//! let state = GatewayState::new(authenticator, GuardPipeline::new().admin_only().permissions(["kyc:approve"]));
//! let app = Router::new()
//!     .route("/kyc/:id/approve", post(approve))
//!     .layer(axum::middleware::from_fn_with_state(state, authorize));
//! ```

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use error_common::ErrorBody;
use std::sync::Arc;
use tracing::error;

use crate::authenticator::Authenticator;
use crate::caller::Caller;
use crate::error::GuardError;
use crate::guard::GuardPipeline;

/// Authenticator plus the guard chain for the routes this layer wraps
#[derive(Clone)]
pub struct GatewayState {
    pub authenticator: Arc<Authenticator>,
    pub pipeline: Arc<GuardPipeline>,
}

impl GatewayState {
    pub fn new(authenticator: Authenticator, pipeline: GuardPipeline) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Same authenticator, different guards
    pub fn with_pipeline(&self, pipeline: GuardPipeline) -> Self {
        Self {
            authenticator: Arc::clone(&self.authenticator),
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Authenticate the bearer token, run the guards and expose the [`Caller`]
/// to handlers through request extensions
pub async fn authorize(
    State(state): State<GatewayState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, GuardError> {
    let token = extract_bearer(&request).ok_or(GuardError::MissingToken)?.to_owned();
    let caller = state.authenticator.authenticate(&token).await?;

    state.pipeline.check(&caller)?;

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Token from an `Authorization: Bearer <token>` header
pub fn extract_bearer(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        if let Self::Storage(inner) = &self {
            error!(error = %inner, "Authorization check failed on storage");
        }

        let body = ErrorBody::from_error(&self);
        let status = StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body.to_json())).into_response()
    }
}

/// Handlers behind [`authorize`] can take the caller as `Extension<Caller>`;
/// this is for code paths holding the raw request
pub fn caller_of(request: &Request<Body>) -> Result<&Caller, GuardError> {
    request.extensions().get::<Caller>().ok_or(GuardError::Unauthenticated)
}
