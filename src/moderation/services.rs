use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::error::{AppError, AppResult};
use crate::recipes::repo_types::{Recipe, RecipeFilter, Status};
use crate::state::AppState;

/// Whether moderation may move a recipe from `from` to `to`.
pub fn allowed(from: Status, to: Status) -> bool {
    use Status::*;
    matches!(
        (from, to),
        (Pending, Approved)
            | (Pending, Rejected)
            | (Approved, Rejected)
            | (Approved, Pending)
            | (Rejected, Approved)
            | (Rejected, Pending)
    )
}

#[instrument(skip(st), fields(admin_id = %admin_id))]
pub async fn set_status(
    st: &AppState,
    admin_id: Uuid,
    recipe_id: Uuid,
    status: &str,
) -> AppResult<Recipe> {
    let to = Status::parse(status).ok_or_else(|| {
        warn!(status, "rejected unknown status");
        AppError::Validation("Invalid status".into())
    })?;

    let recipe = st
        .recipes
        .find_recipe(recipe_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Recipe not found".into()))?;
    if recipe.status == to {
        return Ok(recipe);
    }
    if !allowed(recipe.status, to) {
        return Err(AppError::Validation(format!(
            "Cannot move a {} recipe to {}",
            recipe.status.as_str(),
            to.as_str()
        )));
    }

    let updated = st
        .recipes
        .set_status(recipe_id, to)
        .await?
        .ok_or_else(|| AppError::NotFound("Recipe not found".into()))?;
    info!(from = recipe.status.as_str(), to = to.as_str(), "recipe moderated");
    Ok(updated)
}

pub async fn list_recipes(st: &AppState) -> AppResult<Vec<Recipe>> {
    Ok(st.recipes.list_recipes(RecipeFilter::All).await?)
}

#[instrument(skip(st), fields(admin_id = %admin_id))]
pub async fn delete_recipe(st: &AppState, admin_id: Uuid, recipe_id: Uuid) -> AppResult<()> {
    if !st.recipes.delete_recipe(recipe_id).await? {
        return Err(AppError::NotFound("Recipe not found".into()));
    }
    info!("recipe deleted by admin");
    Ok(())
}

pub async fn list_users(st: &AppState) -> AppResult<Vec<User>> {
    Ok(st.users.list_users().await?)
}

/// Hard delete; the user's recipes, comments and relation rows go with it.
#[instrument(skip(st), fields(admin_id = %admin_id))]
pub async fn delete_user(st: &AppState, admin_id: Uuid, user_id: Uuid) -> AppResult<()> {
    if !st.users.delete_user(user_id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!("user deleted by admin");
    Ok(())
}
