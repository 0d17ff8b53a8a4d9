use axum::{
    extract::State,
    routing::{delete, get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::services;
use crate::{
    auth::{extractors::AdminUser, repo_types::User},
    error::AppResult,
    extract::{IdPath, JsonBody},
    recipes::{
        dto::{RecipeEnvelope, Recipes},
        repo_types::Recipe,
    },
    response::{self, ApiResponse, Empty},
    state::AppState,
};

type ApiJson<T> = Json<ApiResponse<T>>;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", delete(delete_user))
        .route("/admin/recipes", get(list_recipes))
        .route("/admin/recipes/:id", delete(delete_recipe))
        .route("/admin/recipes/:id/status", put(set_status))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct Users {
    pub users: Vec<User>,
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn list_users(
    State(state): State<AppState>,
    admin: AdminUser,
) -> AppResult<ApiJson<Users>> {
    let users = services::list_users(&state).await?;
    Ok(response::ok(Users { users }))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    IdPath(id): IdPath,
) -> AppResult<ApiJson<Empty>> {
    services::delete_user(&state, admin.0.id, id).await?;
    Ok(response::message("User deleted"))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn list_recipes(
    State(state): State<AppState>,
    admin: AdminUser,
) -> AppResult<ApiJson<Recipes>> {
    let recipes = services::list_recipes(&state).await?;
    Ok(response::ok(Recipes { recipes }))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn set_status(
    State(state): State<AppState>,
    admin: AdminUser,
    IdPath(id): IdPath,
    JsonBody(body): JsonBody<StatusRequest>,
) -> AppResult<ApiJson<RecipeEnvelope<Recipe>>> {
    let recipe = services::set_status(&state, admin.0.id, id, &body.status).await?;
    Ok(response::ok(RecipeEnvelope { recipe }))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    admin: AdminUser,
    IdPath(id): IdPath,
) -> AppResult<ApiJson<Empty>> {
    services::delete_recipe(&state, admin.0.id, id).await?;
    Ok(response::message("Recipe deleted"))
}
