//! The caller's session, taken from the bearer token of the request.
//! Signing in and refreshing tokens happens elsewhere, this only
//! carries the token through to the calendar service.

use axum::extract::FromRequestParts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use http::request::Parts;

use super::public::ApiError;

#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthenticated())?;

        let access_token = bearer.token().trim();
        if access_token.is_empty() {
            return Err(ApiError::unauthenticated());
        }

        Ok(Session {
            access_token: access_token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, StatusCode};

    async fn extract(request: Request<()>) -> Result<Session, ApiError> {
        let (mut parts, _) = request.into_parts();
        Session::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let request = Request::builder()
            .header("Authorization", "Bearer ya29.token")
            .body(())
            .unwrap();
        let session = extract(request).await.unwrap();
        assert_eq!(session.access_token, "ya29.token");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let err = extract(Request::builder().body(()).unwrap()).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(())
            .unwrap();
        let err = extract(request).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
