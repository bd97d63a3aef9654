use super::*;

pub async fn get_role_grants_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<Json<RoleGrantsResponse>> {
    let snapshot = state
        .snapshot_service
        .load(&session, RoleId::from_uuid(role_id))
        .await?;

    Ok(Json(RoleGrantsResponse::from(&snapshot)))
}

pub async fn update_role_grants_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<UpdateRoleGrantsRequest>,
) -> ApiResult<Json<RoleGrantsResponse>> {
    let mut editor = GrantEditor::open(
        state.snapshot_service.clone(),
        state.sync_service.clone(),
        session,
        RoleId::from_uuid(role_id),
    )
    .await?;

    editor.begin_editing()?;
    *editor.selection_mut()? = payload.to_selection();
    editor.save().await?;

    Ok(Json(RoleGrantsResponse::from(editor.snapshot())))
}
