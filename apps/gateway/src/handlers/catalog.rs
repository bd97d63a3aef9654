use super::*;

pub async fn list_permissions_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> ApiResult<Json<Vec<PermissionResponse>>> {
    let permissions = state
        .directory
        .list_permissions(&session, session.application_id())
        .await?
        .iter()
        .map(PermissionResponse::from)
        .collect();

    Ok(Json(permissions))
}

pub async fn list_restrictions_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> ApiResult<Json<Vec<RestrictionResponse>>> {
    let restrictions = state
        .directory
        .list_restrictions(&session)
        .await?
        .iter()
        .map(RestrictionResponse::from)
        .collect();

    Ok(Json(restrictions))
}
