use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

use super::session::Session;

/// Extractor for the session placed in request extensions by the route
/// guard. Falls back to anonymous if the guard did not run (e.g. routes
/// mounted outside the guarded router in tests).
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<Session>()
                .cloned()
                .unwrap_or_else(Session::anonymous),
        ))
    }
}
