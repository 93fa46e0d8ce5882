use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Caller role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Authenticated caller, materialized as a request extension by the
/// platform's session middleware (an external collaborator; see
/// [`identity_layer`] for the header-based stand-in).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(ApiError::unauthorized)
    }
}

/// Extractor rejecting callers below [`Role::Admin`] with 403 before
/// the handler body runs, so no upstream call is ever attempted.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role < Role::Admin {
            return Err(ApiError::forbidden());
        }
        Ok(AdminUser(user))
    }
}

/// Stand-in for the platform's JWT middleware: trusts `x-user-id` and
/// `x-user-role` headers set by the authenticating gateway and inserts
/// the corresponding [`AuthUser`] extension. Requests without the
/// headers pass through unauthenticated and fail at the extractor.
pub async fn identity_layer(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok());
    if let Some(id) = id {
        let role = match req
            .headers()
            .get("x-user-role")
            .and_then(|v| v.to_str().ok())
        {
            Some("admin") => Role::Admin,
            _ => Role::User,
        };
        req.extensions_mut().insert(AuthUser { id, role });
    }
    next.run(req).await
}
