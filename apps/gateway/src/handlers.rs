use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;

use permitra_application::GrantEditor;
use permitra_core::{AppError, ApplicationId, RoleId, SessionContext};
use uuid::Uuid;

use crate::dto::{
    CreateRoleRequest, HealthResponse, LoginRequest, PermissionResponse, RefreshSessionRequest,
    RestrictionResponse, RoleGrantsResponse, RoleResponse, SessionTokensResponse,
    UpdateRoleGrantsRequest,
};
use crate::error::ApiResult;
use crate::state::AppState;

mod catalog;
mod grants;
mod health;
mod roles;
mod session;

pub use catalog::{list_permissions_handler, list_restrictions_handler};
pub use grants::{get_role_grants_handler, update_role_grants_handler};
pub use health::health_handler;
pub use roles::{create_role_handler, delete_role_handler, list_roles_handler};
pub use session::{login_handler, refresh_session_handler};
