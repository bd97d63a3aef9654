use super::*;

pub async fn list_roles_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    let roles = state
        .role_admin_service
        .list_roles(&session)
        .await?
        .into_iter()
        .map(RoleResponse::from)
        .collect();

    Ok(Json(roles))
}

pub async fn create_role_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleResponse>)> {
    let application_id = payload
        .application_id
        .map(ApplicationId::from_uuid)
        .or_else(|| session.application_id())
        .ok_or_else(|| {
            AppError::Validation(
                "application_id is required when the session carries no application scope"
                    .to_owned(),
            )
        })?;

    let role = state
        .role_admin_service
        .create_role(&session, &payload.name, application_id)
        .await?;

    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

pub async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .role_admin_service
        .delete_role(&session, RoleId::from_uuid(role_id))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
