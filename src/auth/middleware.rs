//! Bearer-token middleware for the `/api/*` surface.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use super::client::{AuthClient, VerifyOutcome};

/// Verified identity attached to the request after the middleware runs.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
}

pub async fn auth_middleware(
    State(auth): State<Arc<AuthClient>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // WebSocket upgrades can't set headers from the browser, so a token query
    // parameter is accepted there as well.
    let token_from_query = req.uri().query().and_then(|query| {
        query
            .split('&')
            .find(|pair| pair.starts_with("token="))
            .and_then(|pair| pair.split('=').nth(1))
            .map(str::to_string)
    });

    let token_from_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string);

    let token = token_from_header
        .or(token_from_query)
        .filter(|t| !t.trim().is_empty())
        .ok_or(AuthError::MissingToken)?;

    match auth.verify(&token).await {
        Ok(VerifyOutcome::Valid { user_id, email }) => {
            req.extensions_mut().insert(AuthUser { user_id, email });
            Ok(next.run(req).await)
        }
        Ok(VerifyOutcome::Invalid { reason }) => Err(AuthError::Rejected(reason)),
        Err(e) => {
            warn!(error = %e, "auth service verify failed");
            Err(AuthError::ServiceError)
        }
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    Rejected(String),
    ServiceError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "missing authorization token",
                None,
            ),
            AuthError::Rejected(reason) => {
                (StatusCode::UNAUTHORIZED, "token rejected", Some(reason))
            }
            AuthError::ServiceError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "authentication service unavailable",
                None,
            ),
        };

        let mut body = json!({ "error": error });
        if let Some(details) = details {
            body["details"] = json!(details);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_responses_carry_expected_status() {
        assert_eq!(
            AuthError::MissingToken.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Rejected("expired".to_string())
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::ServiceError.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
