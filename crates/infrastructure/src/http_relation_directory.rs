use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use permitra_application::{CreateRelationInput, CreateRoleInput, RelationDirectory};
use permitra_core::{
    AppError, AppResult, ApplicationId, PermissionId, RelationId, RestrictionId, RoleId,
    SessionContext,
};
use permitra_domain::{Permission, PermissionRelation, Restriction, Role};

/// Collaborator exchanging an expired session for a refreshed one.
///
/// Implementations own the refresh credentials; the directory adapter only
/// ever sees the resulting bearer token.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    /// Returns a session carrying a freshly issued access token.
    async fn refresh_session(&self, session: &SessionContext) -> AppResult<SessionContext>;
}

/// HTTP adapter over the remote reference service's relation directory.
///
/// When a refresher is attached, a 401 response is answered by refreshing
/// the session and replaying the original request exactly once; a second
/// 401 surfaces as an error. Callers therefore only observe outright
/// success or failure.
pub struct HttpRelationDirectory {
    http_client: reqwest::Client,
    base_url: Url,
    refresher: Option<Arc<dyn SessionRefresher>>,
}

impl HttpRelationDirectory {
    /// Creates a new directory adapter rooted at the service base URL.
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: Url) -> Self {
        Self {
            http_client,
            base_url,
            refresher: None,
        }
    }

    /// Attaches a session refresher enabling transparent 401 replay.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn SessionRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url.join(path).map_err(|error| {
            AppError::Internal(format!("invalid directory endpoint '{path}': {error}"))
        })
    }

    async fn execute<F>(&self, session: &SessionContext, mut build: F) -> AppResult<reqwest::Response>
    where
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let response = build(&self.http_client)
            .bearer_auth(session.bearer_token())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(refresher) = &self.refresher {
                debug!("directory returned 401, refreshing session and replaying once");
                let refreshed = refresher.refresh_session(session).await?;
                let replay = build(&self.http_client)
                    .bearer_auth(refreshed.bearer_token())
                    .send()
                    .await
                    .map_err(transport_error)?;
                return check_status(replay).await;
            }
        }

        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
    Err(error_for_status(status, &body))
}

fn error_for_status(status: StatusCode, body: &str) -> AppError {
    let message = format!("directory returned status {status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED => AppError::Unauthorized(message),
        StatusCode::FORBIDDEN => AppError::Forbidden(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        status if status.is_client_error() => AppError::Validation(message),
        _ => AppError::Upstream(message),
    }
}

fn transport_error(error: reqwest::Error) -> AppError {
    AppError::Upstream(format!("directory transport error: {error}"))
}

fn decode_error(error: reqwest::Error) -> AppError {
    AppError::Upstream(format!("directory returned malformed payload: {error}"))
}

#[derive(Debug, Deserialize)]
struct RelationDto {
    #[serde(rename = "role_permission_id")]
    relation_id: RelationId,
    role_id: RoleId,
    permission_id: PermissionId,
    #[serde(default)]
    restriction_id: Option<RestrictionId>,
    #[serde(default)]
    application_id: Option<ApplicationId>,
}

impl From<RelationDto> for PermissionRelation {
    fn from(value: RelationDto) -> Self {
        Self {
            relation_id: value.relation_id,
            role_id: value.role_id,
            permission_id: value.permission_id,
            restriction_id: value.restriction_id,
            application_id: value.application_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRelationDto {
    role_id: RoleId,
    permission_id: PermissionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    restriction_id: Option<RestrictionId>,
}

#[derive(Debug, Deserialize)]
struct PermissionDto {
    permission_id: PermissionId,
    #[serde(rename = "permission_name")]
    name: String,
    #[serde(default)]
    comment: Option<String>,
}

impl From<PermissionDto> for Permission {
    fn from(value: PermissionDto) -> Self {
        Self {
            permission_id: value.permission_id,
            name: value.name,
            comment: value.comment,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RestrictionDto {
    restriction_id: RestrictionId,
    #[serde(rename = "restriction_name")]
    name: String,
    #[serde(default)]
    comment: Option<String>,
}

impl From<RestrictionDto> for Restriction {
    fn from(value: RestrictionDto) -> Self {
        Self {
            restriction_id: value.restriction_id,
            name: value.name,
            comment: value.comment,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RoleDto {
    role_id: RoleId,
    #[serde(rename = "role_name")]
    name: String,
    application_id: ApplicationId,
}

impl From<RoleDto> for Role {
    fn from(value: RoleDto) -> Self {
        Self {
            role_id: value.role_id,
            name: value.name,
            application_id: value.application_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRoleDto {
    role_name: String,
    application_id: ApplicationId,
}

#[async_trait]
impl RelationDirectory for HttpRelationDirectory {
    async fn list_relations(
        &self,
        session: &SessionContext,
        role_id: RoleId,
    ) -> AppResult<Vec<PermissionRelation>> {
        let endpoint = self.endpoint("role-permissions")?;
        let response = self
            .execute(session, |client| {
                client
                    .get(endpoint.clone())
                    .query(&[("role_id", role_id.as_uuid())])
            })
            .await?;

        let rows: Vec<RelationDto> = response.json().await.map_err(decode_error)?;
        Ok(rows.into_iter().map(PermissionRelation::from).collect())
    }

    async fn create_relation(
        &self,
        session: &SessionContext,
        input: CreateRelationInput,
    ) -> AppResult<PermissionRelation> {
        let endpoint = self.endpoint("role-permissions")?;
        let payload = CreateRelationDto {
            role_id: input.role_id,
            permission_id: input.permission_id,
            restriction_id: input.restriction_id,
        };
        let response = self
            .execute(session, |client| {
                client.post(endpoint.clone()).json(&payload)
            })
            .await?;

        let row: RelationDto = response.json().await.map_err(decode_error)?;
        Ok(row.into())
    }

    async fn delete_relation(
        &self,
        session: &SessionContext,
        relation_id: RelationId,
    ) -> AppResult<()> {
        let endpoint = self.endpoint(&format!("role-permissions/{relation_id}"))?;
        self.execute(session, |client| client.delete(endpoint.clone()))
            .await?;
        Ok(())
    }

    async fn list_permissions(
        &self,
        session: &SessionContext,
        application_id: Option<ApplicationId>,
    ) -> AppResult<Vec<Permission>> {
        let endpoint = self.endpoint("permissions")?;
        let response = self
            .execute(session, |client| {
                let request = client.get(endpoint.clone());
                match application_id {
                    Some(application_id) => {
                        request.query(&[("application_id", application_id.as_uuid())])
                    }
                    None => request,
                }
            })
            .await?;

        let rows: Vec<PermissionDto> = response.json().await.map_err(decode_error)?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn list_restrictions(&self, session: &SessionContext) -> AppResult<Vec<Restriction>> {
        let endpoint = self.endpoint("restrictions")?;
        let response = self
            .execute(session, |client| client.get(endpoint.clone()))
            .await?;

        let rows: Vec<RestrictionDto> = response.json().await.map_err(decode_error)?;
        Ok(rows.into_iter().map(Restriction::from).collect())
    }

    async fn get_role(&self, session: &SessionContext, role_id: RoleId) -> AppResult<Role> {
        let endpoint = self.endpoint(&format!("roles/{role_id}"))?;
        let response = self
            .execute(session, |client| client.get(endpoint.clone()))
            .await?;

        let row: RoleDto = response.json().await.map_err(decode_error)?;
        Ok(row.into())
    }

    async fn list_roles(
        &self,
        session: &SessionContext,
        application_id: Option<ApplicationId>,
    ) -> AppResult<Vec<Role>> {
        let endpoint = self.endpoint("roles")?;
        let response = self
            .execute(session, |client| {
                let request = client.get(endpoint.clone());
                match application_id {
                    Some(application_id) => {
                        request.query(&[("application_id", application_id.as_uuid())])
                    }
                    None => request,
                }
            })
            .await?;

        let rows: Vec<RoleDto> = response.json().await.map_err(decode_error)?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn create_role(
        &self,
        session: &SessionContext,
        input: CreateRoleInput,
    ) -> AppResult<Role> {
        let endpoint = self.endpoint("roles")?;
        let payload = CreateRoleDto {
            role_name: input.name.into(),
            application_id: input.application_id,
        };
        let response = self
            .execute(session, |client| {
                client.post(endpoint.clone()).json(&payload)
            })
            .await?;

        let row: RoleDto = response.json().await.map_err(decode_error)?;
        Ok(row.into())
    }

    async fn delete_role(&self, session: &SessionContext, role_id: RoleId) -> AppResult<()> {
        let endpoint = self.endpoint(&format!("roles/{role_id}"))?;
        self.execute(session, |client| client.delete(endpoint.clone()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::Router;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use reqwest::StatusCode;
    use url::Url;

    use permitra_application::RelationDirectory;
    use permitra_core::{AppError, AppResult, SessionContext};
    use permitra_domain::PermissionRelation;

    use super::{HttpRelationDirectory, RelationDto, SessionRefresher, error_for_status};

    #[derive(Clone)]
    struct StubState {
        hits: Arc<AtomicUsize>,
    }

    /// Serves `/restrictions`, rejecting every bearer token except
    /// `refreshed` with a 401.
    async fn restrictions_stub(
        State(state): State<StubState>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        state.hits.fetch_add(1, Ordering::SeqCst);
        let authorized = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            == Some("Bearer refreshed");

        if authorized {
            axum::Json(serde_json::json!([{
                "restriction_id": "0d4f0f62-9d8f-4a5d-94d2-3f0a4c9b21e7",
                "restriction_name": "region-x",
            }]))
            .into_response()
        } else {
            StatusCode::UNAUTHORIZED.into_response()
        }
    }

    async fn spawn_directory_stub() -> (Url, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/restrictions", get(restrictions_stub))
            .with_state(StubState { hits: hits.clone() });

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("stub listener must bind");
        };
        let Ok(address) = listener.local_addr() else {
            panic!("stub listener must expose an address");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let Ok(base_url) = Url::parse(&format!("http://{address}/")) else {
            panic!("stub base url must parse");
        };
        (base_url, hits)
    }

    struct TokenRefresher {
        token: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionRefresher for TokenRefresher {
        async fn refresh_session(&self, session: &SessionContext) -> AppResult<SessionContext> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(session.with_access_token(self.token))
        }
    }

    #[tokio::test]
    async fn unauthorized_response_refreshes_and_replays_once() {
        let (base_url, hits) = spawn_directory_stub().await;
        let refreshes = Arc::new(AtomicUsize::new(0));
        let directory = HttpRelationDirectory::new(reqwest::Client::new(), base_url)
            .with_refresher(Arc::new(TokenRefresher {
                token: "refreshed",
                calls: refreshes.clone(),
            }));

        let session = SessionContext::new("stale", None);
        let Ok(restrictions) = directory.list_restrictions(&session).await else {
            panic!("replayed request must succeed");
        };

        assert_eq!(restrictions.len(), 1);
        assert_eq!(restrictions[0].name, "region-x");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_unauthorized_response_is_not_replayed_again() {
        let (base_url, hits) = spawn_directory_stub().await;
        let refreshes = Arc::new(AtomicUsize::new(0));
        let directory = HttpRelationDirectory::new(reqwest::Client::new(), base_url)
            .with_refresher(Arc::new(TokenRefresher {
                token: "still-stale",
                calls: refreshes.clone(),
            }));

        let session = SessionContext::new("stale", None);
        let outcome = directory.list_restrictions(&session).await;

        assert!(matches!(outcome, Err(AppError::Unauthorized(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unauthorized_without_refresher_surfaces_immediately() {
        let (base_url, hits) = spawn_directory_stub().await;
        let directory = HttpRelationDirectory::new(reqwest::Client::new(), base_url);

        let session = SessionContext::new("stale", None);
        let outcome = directory.list_restrictions(&session).await;

        assert!(matches!(outcome, Err(AppError::Unauthorized(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn statuses_map_to_error_categories() {
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, ""),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::CONFLICT, ""),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::UNPROCESSABLE_ENTITY, ""),
            AppError::Validation(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_GATEWAY, ""),
            AppError::Upstream(_)
        ));
    }

    #[test]
    fn relation_payload_tolerates_missing_restriction() {
        let payload = serde_json::json!({
            "role_permission_id": "8b9db9a7-4d91-4a32-9a27-3f2f4f3d7c1a",
            "role_id": "57e194d4-30ac-4f93-8a3c-5bb46f1b873d",
            "permission_id": "a7d4f3a8-27ff-423f-b7a5-1f4f2c7f9d6b",
        });

        let parsed: Result<RelationDto, _> = serde_json::from_value(payload);
        let Ok(parsed) = parsed else {
            panic!("relation payload must parse");
        };
        let relation = PermissionRelation::from(parsed);
        assert_eq!(relation.restriction_id, None);
        assert_eq!(relation.application_id, None);
    }
}
