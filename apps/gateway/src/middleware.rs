use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use permitra_core::{AppError, ApplicationId, SessionContext};
use uuid::Uuid;

use crate::error::ApiResult;

/// Header carrying the optional application scope for catalog and role
/// listings.
pub const APPLICATION_SCOPE_HEADER: &str = "x-application-id";

/// Builds a [`SessionContext`] from the bearer token and optional
/// application scope header, rejecting requests without a token.
pub async fn require_session(mut request: Request, next: Next) -> ApiResult<Response> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| AppError::Unauthorized("bearer token required".to_owned()))?;

    let application_id = request
        .headers()
        .get(APPLICATION_SCOPE_HEADER)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| {
                    AppError::Validation(format!(
                        "{APPLICATION_SCOPE_HEADER} header is not valid UTF-8"
                    ))
                })
                .and_then(|raw| {
                    Uuid::parse_str(raw).map(ApplicationId::from_uuid).map_err(|error| {
                        AppError::Validation(format!(
                            "invalid {APPLICATION_SCOPE_HEADER} header: {error}"
                        ))
                    })
                })
        })
        .transpose()?;

    request
        .extensions_mut()
        .insert(SessionContext::new(token, application_id));

    Ok(next.run(request).await)
}
