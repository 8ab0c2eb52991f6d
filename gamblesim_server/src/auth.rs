use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use gamblesim_shared::ApiError;

use crate::{routes::AppError, state::AppState};

/// Decides whether a bearer token may use the admin API.
pub trait AdminAuth: Send + Sync {
    fn authorize(&self, token: &str) -> bool;
}

/// Single shared API key.
pub struct ApiKeyAuth {
    key: String,
}

impl ApiKeyAuth {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl AdminAuth for ApiKeyAuth {
    fn authorize(&self, token: &str) -> bool {
        !self.key.is_empty() && token == self.key
    }
}

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match bearer {
        Some(TypedHeader(Authorization(bearer))) if state.auth.authorize(bearer.token()) => {
            Ok(next.run(request).await)
        }
        _ => Err(ApiError::Unauthorized.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_must_match_exactly() {
        let auth = ApiKeyAuth::new("secret");
        assert!(auth.authorize("secret"));
        assert!(!auth.authorize("Secret"));
        assert!(!auth.authorize(""));
        assert!(!ApiKeyAuth::new("").authorize(""));
    }
}
