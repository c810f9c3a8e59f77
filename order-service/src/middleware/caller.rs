//! Caller identity extractor.
//!
//! The upstream gateway authenticates the user and forwards their identity
//! in `X-User-*` headers. Domain handlers take a [`Caller`] argument; the
//! webhook, health and metrics routes do not.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use service_core::error::AppError;

use crate::models::{Caller, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_PHONE_HEADER: &str = "x-user-phone";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(&parts.headers, USER_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header"))
        })?;

        let role = match header(&parts.headers, USER_ROLE_HEADER) {
            Some(raw) => raw
                .parse::<Role>()
                .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?,
            None => Role::User,
        };

        tracing::Span::current().record("user_id", user_id.as_str());

        Ok(Caller {
            user_id,
            role,
            name: header(&parts.headers, USER_NAME_HEADER),
            email: header(&parts.headers, USER_EMAIL_HEADER),
            phone: header(&parts.headers, USER_PHONE_HEADER),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Caller, AppError> {
        let (mut parts, _) = request.into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_identity_headers() {
        let request = Request::builder()
            .header("X-User-ID", "u1")
            .header("X-User-Role", "Admin")
            .header("X-User-Email", "ada@example.com")
            .body(())
            .unwrap();
        let caller = extract(request).await.unwrap();
        assert_eq!(caller.user_id, "u1");
        assert_eq!(caller.role, Role::Admin);
        assert_eq!(caller.email.as_deref(), Some("ada@example.com"));
        assert!(caller.name.is_none());
    }

    #[tokio::test]
    async fn role_defaults_to_user() {
        let request = Request::builder()
            .header("X-User-ID", "u1")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn missing_user_id_is_unauthorized() {
        let request = Request::builder().body(()).unwrap();
        let err = extract(request).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let request = Request::builder()
            .header("X-User-ID", "u1")
            .header("X-User-Role", "chef")
            .body(())
            .unwrap();
        assert!(matches!(extract(request).await, Err(AppError::BadRequest(_))));
    }
}
