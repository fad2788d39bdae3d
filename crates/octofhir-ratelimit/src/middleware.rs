//! HTTP admission control.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/fhir/Patient", get(handler))
//!     .layer(axum::middleware::from_fn_with_state(service, rate_limit_middleware));
//! ```

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::RateLimitError;
use crate::limiter::{RateLimitDecision, retry_after_secs};
use crate::service::{Admission, RateLimitService};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Seconds a fail-closed client is told to wait.
const DEGRADED_RETRY_AFTER_SECS: u64 = 1;

// =============================================================================
// Rate Limit Middleware
// =============================================================================

/// Counts the request against the caller's quota.
///
/// - disabled service: the request proceeds untouched
/// - admitted: the request proceeds and the response carries the quota headers
/// - rejected: `429 Too Many Requests` with an OperationOutcome body
/// - store unavailable: fail-open passes the request through, fail-closed
///   returns `503 Service Unavailable`
pub async fn rate_limit_middleware(
    State(service): State<RateLimitService>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !service.is_enabled() {
        return next.run(req).await;
    }

    let identity = service.dimension().identity(&req);

    let admission = match service.evaluate(&identity).await {
        Ok(admission) => admission,
        Err(e) => {
            tracing::error!(identity = %identity, error = %e, "Rate limit evaluation failed");
            return e.into_response();
        }
    };

    match admission {
        Admission::Allowed(decision) => {
            let mut response = next.run(req).await;
            insert_quota_headers(response.headers_mut(), &decision);
            response
        }
        Admission::Rejected(decision) => {
            tracing::debug!(
                identity = %identity,
                path = %req.uri().path(),
                "Request rejected by rate limiter"
            );
            too_many_requests(&decision)
        }
        Admission::Degraded { policy, .. } if policy.admits() => next.run(req).await,
        Admission::Degraded { .. } => service_unavailable(),
    }
}

fn insert_quota_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
}

fn too_many_requests(decision: &RateLimitDecision) -> Response {
    let retry_after = decision.retry_after.map(retry_after_secs).unwrap_or(1);

    let mut headers = fhir_headers();
    insert_quota_headers(&mut headers, decision);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));

    let body = operation_outcome(
        "throttled",
        &format!("Rate limit exceeded. Retry after {retry_after} seconds."),
    );
    (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response()
}

fn service_unavailable() -> Response {
    let mut headers = fhir_headers();
    headers.insert(
        header::RETRY_AFTER,
        HeaderValue::from(DEGRADED_RETRY_AFTER_SECS),
    );
    let body = operation_outcome("transient", "Rate limiter temporarily unavailable");
    (StatusCode::SERVICE_UNAVAILABLE, headers, Json(body)).into_response()
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            RateLimitError::InvalidCost { .. } => (StatusCode::BAD_REQUEST, "invalid"),
            RateLimitError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
            RateLimitError::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "exception"),
        };
        let body = operation_outcome(code, &self.to_string());
        (status, fhir_headers(), Json(body)).into_response()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn fhir_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/fhir+json"),
    );
    headers
}

/// FHIR OperationOutcome with a single error issue.
#[must_use]
pub fn operation_outcome(code: &str, diagnostics: &str) -> serde_json::Value {
    json!({
        "resourceType": "OperationOutcome",
        "issue": [{
            "severity": "error",
            "code": code,
            "diagnostics": diagnostics
        }]
    })
}
