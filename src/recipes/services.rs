use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{RecipeDetail, RecipePayload};
use super::repo_types::{Comment, LeaderboardEntry, LikeState, NewComment, Recipe, RecipeFilter};
use crate::auth::extractors::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::images::services::{upload_recipe_image, UploadItem};
use crate::state::AppState;

pub const LEADERBOARD_SIZE: i64 = 10;

fn recipe_not_found() -> AppError {
    AppError::NotFound("Recipe not found".into())
}

/// Loads the recipe and checks that `user` may edit or delete it.
async fn load_for_edit(st: &AppState, recipe_id: Uuid, user: &CurrentUser) -> AppResult<Recipe> {
    let recipe = st
        .recipes
        .find_recipe(recipe_id)
        .await?
        .ok_or_else(recipe_not_found)?;
    if recipe.owner_id() != user.id && !user.is_admin() {
        warn!(%recipe_id, user_id = %user.id, "recipe edit denied");
        return Err(AppError::Unauthorized("User not authorized".into()));
    }
    Ok(recipe)
}

#[instrument(skip(st, payload, image), fields(user_id = %user.id))]
pub async fn create_recipe(
    st: &AppState,
    user: &CurrentUser,
    payload: RecipePayload,
    image: Option<UploadItem>,
) -> AppResult<Recipe> {
    let mut new = payload.into_new_recipe(user.id, &user.name)?;
    if let Some(image) = image {
        new.image = Some(upload_recipe_image(st, user.id, image).await?);
    }
    let recipe = st.recipes.insert_recipe(new).await?;
    info!(recipe_id = %recipe.id, "recipe created");
    Ok(recipe)
}

#[instrument(skip(st, payload, image), fields(user_id = %user.id))]
pub async fn update_recipe(
    st: &AppState,
    recipe_id: Uuid,
    user: &CurrentUser,
    payload: RecipePayload,
    image: Option<UploadItem>,
) -> AppResult<Recipe> {
    let recipe = load_for_edit(st, recipe_id, user).await?;
    let mut changes = payload.into_changes()?;
    if let Some(image) = image {
        changes.image = Some(upload_recipe_image(st, recipe.owner_id(), image).await?);
    }
    let updated = st
        .recipes
        .update_recipe(recipe_id, &changes)
        .await?
        .ok_or_else(recipe_not_found)?;
    info!(%recipe_id, "recipe updated, back to pending");
    Ok(updated)
}

#[instrument(skip(st), fields(user_id = %user.id))]
pub async fn delete_recipe(st: &AppState, recipe_id: Uuid, user: &CurrentUser) -> AppResult<()> {
    load_for_edit(st, recipe_id, user).await?;
    if !st.recipes.delete_recipe(recipe_id).await? {
        return Err(recipe_not_found());
    }
    info!(%recipe_id, "recipe deleted");
    Ok(())
}

pub async fn get_recipe(st: &AppState, recipe_id: Uuid) -> AppResult<RecipeDetail> {
    let recipe = st
        .recipes
        .find_recipe(recipe_id)
        .await?
        .ok_or_else(recipe_not_found)?;
    let comments = st.recipes.recipe_comments(recipe_id).await?;
    Ok(RecipeDetail { recipe, comments })
}

pub async fn list_recipes(st: &AppState, filter: RecipeFilter) -> AppResult<Vec<Recipe>> {
    Ok(st.recipes.list_recipes(filter).await?)
}

#[instrument(skip(st))]
pub async fn toggle_like(st: &AppState, recipe_id: Uuid, user_id: Uuid) -> AppResult<LikeState> {
    let state = st
        .recipes
        .toggle_like(recipe_id, user_id)
        .await?
        .ok_or_else(recipe_not_found)?;
    info!(is_liked = state.is_liked, likes_count = state.likes_count, "like toggled");
    Ok(state)
}

#[instrument(skip(st, text), fields(user_id = %user.id))]
pub async fn add_comment(
    st: &AppState,
    recipe_id: Uuid,
    user: &CurrentUser,
    text: &str,
) -> AppResult<Vec<Comment>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("Comment text is required".into()));
    }
    let comment = NewComment {
        author_id: user.id,
        author_name: user.name.clone(),
        text: text.to_string(),
    };
    st.recipes
        .add_comment(recipe_id, comment)
        .await?
        .ok_or_else(recipe_not_found)
}

pub async fn leaderboard(st: &AppState) -> AppResult<Vec<LeaderboardEntry>> {
    Ok(st.recipes.leaderboard(LEADERBOARD_SIZE).await?)
}
