//! Form endpoints guarded by the rate limiter.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::ratelimit::{client_ip, RateLimitDecision, RateLimitKey, RateLimitPolicy, RateLimiter};

/// Shared state for the form handlers.
#[derive(Clone)]
pub struct AppState {
    /// The rate limiter instance
    pub rate_limiter: Arc<RateLimiter>,
    /// Budget for the contact form
    pub contact_policy: RateLimitPolicy,
    /// Budget for the quote form
    pub quote_policy: RateLimitPolicy,
}

impl AppState {
    /// Create state with the default form policies.
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            rate_limiter,
            contact_policy: RateLimitPolicy::contact(),
            quote_policy: RateLimitPolicy::quote(),
        }
    }
}

/// The lead-capture forms, each with its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormRoute {
    Contact,
    Quote,
}

impl FormRoute {
    /// Route name used as the first half of the rate limit key.
    pub fn name(&self) -> &'static str {
        match self {
            FormRoute::Contact => "contact",
            FormRoute::Quote => "quote",
        }
    }

    fn policy<'a>(&self, state: &'a AppState) -> &'a RateLimitPolicy {
        match self {
            FormRoute::Contact => &state.contact_policy,
            FormRoute::Quote => &state.quote_policy,
        }
    }
}

/// A denied submission, rendered as `429 Too Many Requests`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// Seconds until the client may retry
    pub reset_in: u64,
}

impl From<RateLimitDecision> for RateLimited {
    fn from(decision: RateLimitDecision) -> Self {
        Self {
            reset_in: decision.reset_in,
        }
    }
}

impl IntoResponse for RateLimited {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": format!("Too many requests. Please try again in {} seconds.", self.reset_in),
        }));

        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(self.reset_in));
        response
    }
}

/// Build the router for the form endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/contact", post(contact_handler))
        .route("/api/quote", post(quote_handler))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn contact_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    submit(&state, FormRoute::Contact, &headers, &body)
}

async fn quote_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    submit(&state, FormRoute::Quote, &headers, &body)
}

/// Apply the rate limit guard, then accept the submission.
///
/// The guard runs before the body is parsed, so malformed submissions
/// spend budget too.
#[instrument(skip(state, route, headers, body), fields(route = route.name()))]
fn submit(state: &AppState, route: FormRoute, headers: &HeaderMap, body: &[u8]) -> Response {
    let client = client_ip(headers);
    let key = RateLimitKey::new(route.name(), &client);

    let decision = state
        .rate_limiter
        .check_rate_limit(&key.to_string_key(), route.policy(state));

    if !decision.success {
        warn!(client = %client, reset_in = decision.reset_in, "Form submission rate limited");
        return RateLimited::from(decision).into_response();
    }

    let submission: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(client = %client, error = %e, "Rejected malformed submission");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid submission body" })),
            )
                .into_response();
        }
    };

    let fields = submission.as_object().map_or(0, |object| object.len());
    info!(
        client = %client,
        fields,
        remaining = decision.remaining,
        "Form submission accepted"
    );

    (
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "remaining": decision.remaining })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn form_request(path: &str, ip: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(AppState::new(Arc::new(RateLimiter::new())));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_contact_accepted() {
        let app = router(AppState::new(Arc::new(RateLimiter::new())));
        let response = app
            .oneshot(form_request("/api/contact", "1.2.3.4", r#"{"name":"Ada"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["remaining"], 4);
    }

    #[tokio::test]
    async fn test_quote_limited_after_budget() {
        let limiter = Arc::new(RateLimiter::new());
        let app = router(AppState::new(limiter.clone()));

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(form_request("/api/quote", "5.6.7.8", "{}"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED);
        }

        let response = app
            .oneshot(form_request("/api/quote", "5.6.7.8", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 0 && retry_after <= 300);

        let body = json_body(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Too many requests. Please try again in "));

        assert_eq!(limiter.get_count("quote:5.6.7.8"), Some(4));
    }

    #[tokio::test]
    async fn test_routes_and_clients_have_separate_budgets() {
        let limiter = Arc::new(RateLimiter::new());
        let state = AppState {
            rate_limiter: limiter.clone(),
            contact_policy: RateLimitPolicy::new(1, Duration::from_secs(60)).unwrap(),
            quote_policy: RateLimitPolicy::new(1, Duration::from_secs(60)).unwrap(),
        };
        let app = router(state);

        let send = |path: &'static str, ip: &'static str| {
            let app = app.clone();
            async move { app.oneshot(form_request(path, ip, "{}")).await.unwrap().status() }
        };

        assert_eq!(send("/api/contact", "1.1.1.1").await, StatusCode::ACCEPTED);
        assert_eq!(send("/api/contact", "1.1.1.1").await, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(send("/api/quote", "1.1.1.1").await, StatusCode::ACCEPTED);
        assert_eq!(send("/api/contact", "2.2.2.2").await, StatusCode::ACCEPTED);

        assert_eq!(limiter.counter_count(), 3);
    }

    #[tokio::test]
    async fn test_malformed_body_spends_budget() {
        let limiter = Arc::new(RateLimiter::new());
        let app = router(AppState::new(limiter.clone()));

        let response = app
            .oneshot(form_request("/api/contact", "9.9.9.9", "not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(limiter.get_count("contact:9.9.9.9"), Some(1));
    }

    #[tokio::test]
    async fn test_missing_proxy_headers_share_unknown_bucket() {
        let limiter = Arc::new(RateLimiter::new());
        let app = router(AppState::new(limiter.clone()));

        let request = Request::builder()
            .method("POST")
            .uri("/api/contact")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(limiter.get_count("contact:unknown"), Some(1));
    }

    #[test]
    fn test_rate_limited_response() {
        let response = RateLimited { reset_in: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
