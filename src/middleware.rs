use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::env;

/// Source of the signed-in username
///
/// Sign-on itself happens elsewhere; the redirector only needs a name to
/// record as editor and for `/me`.
pub trait IdentityProvider: Send + Sync {
    fn current_username(&self, headers: &HeaderMap) -> String;
}

/// Reads the username from a request header set by a fronting proxy
pub struct HeaderIdentity {
    pub header: String,
    pub default_user: String,
}

impl HeaderIdentity {
    pub fn new(header: impl Into<String>, default_user: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            default_user: default_user.into(),
        }
    }
}

impl Default for HeaderIdentity {
    fn default() -> Self {
        Self::new("x-forwarded-user", "testuser")
    }
}

impl IdentityProvider for HeaderIdentity {
    fn current_username(&self, headers: &HeaderMap) -> String {
        headers
            .get(self.header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.default_user.as_str())
            .to_string()
    }
}

/// Middleware to check for Authorization header
///
/// If the `AUTHORIZATION` environment variable is set and not empty, editing
/// requests must carry an `Authorization` header with exactly that value.
/// Otherwise the check is skipped.
pub async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if let Ok(auth_secret) = env::var("AUTHORIZATION") {
        if !auth_secret.is_empty() {
            let unauthorized_response = || {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({
                        "error": "Unauthorized",
                        "message": "Invalid or missing authorization header"
                    })),
                )
                    .into_response()
            };

            let provided = headers
                .get("Authorization")
                .and_then(|value| value.to_str().ok());
            if provided != Some(auth_secret.as_str()) {
                tracing::debug!("rejected api request: bad authorization header");
                return Err(unauthorized_response());
            }
        }
    }

    Ok(next.run(request).await)
}
