use super::*;

pub async fn login_handler(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<SessionTokensResponse>> {
    let service = state.session_service.as_ref().ok_or_else(|| {
        AppError::NotFound("no auth service is configured for this deployment".to_owned())
    })?;

    let tokens = service.login(&payload.username, &payload.password).await?;
    Ok(Json(SessionTokensResponse::from(tokens)))
}

pub async fn refresh_session_handler(
    State(state): State<AppState>,
    Json(payload): Json<RefreshSessionRequest>,
) -> ApiResult<Json<SessionTokensResponse>> {
    let service = state.session_service.as_ref().ok_or_else(|| {
        AppError::NotFound("no auth service is configured for this deployment".to_owned())
    })?;

    let tokens = service.refresh(&payload.refresh_token).await?;
    Ok(Json(SessionTokensResponse::from(tokens)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use permitra_application::{
        GrantNotifier, GrantSnapshotService, GrantSyncService, RelationDirectory, RoleAdminService,
    };
    use permitra_infrastructure::{InMemoryRelationDirectory, TracingGrantNotifier};

    use crate::error::ApiError;

    use super::*;

    fn memory_state() -> AppState {
        let directory: Arc<dyn RelationDirectory> = Arc::new(InMemoryRelationDirectory::new());
        let notifier: Arc<dyn GrantNotifier> = Arc::new(TracingGrantNotifier::new());
        AppState {
            snapshot_service: GrantSnapshotService::new(directory.clone()),
            sync_service: GrantSyncService::new(directory.clone(), notifier),
            role_admin_service: RoleAdminService::new(directory.clone()),
            directory,
            session_service: None,
        }
    }

    #[tokio::test]
    async fn login_without_auth_service_is_not_found() {
        let payload = LoginRequest {
            username: "svc".to_owned(),
            password: "pw".to_owned(),
        };

        let outcome = login_handler(State(memory_state()), Json(payload)).await;
        assert!(matches!(outcome, Err(ApiError(AppError::NotFound(_)))));
    }

    #[tokio::test]
    async fn refresh_without_auth_service_is_not_found() {
        let payload = RefreshSessionRequest {
            refresh_token: "r1".to_owned(),
        };

        let outcome = refresh_session_handler(State(memory_state()), Json(payload)).await;
        assert!(matches!(outcome, Err(ApiError(AppError::NotFound(_)))));
    }
}
