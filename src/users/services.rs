use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::dto::{UpdateProfileRequest, UserProfile};
use crate::auth::extractors::CurrentUser;
use crate::auth::repo_types::{ProfileChanges, User};
use crate::error::{AppError, AppResult};
use crate::refs;
use crate::state::AppState;
use crate::sync;

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".into())
}

pub async fn profile(st: &AppState, user_id: Uuid) -> AppResult<UserProfile> {
    let user = st.users.find_user(user_id).await?.ok_or_else(user_not_found)?;
    let relations = st.users.relations(user_id).await?;
    Ok(UserProfile::new(user, relations))
}

/// Applies the supplied fields. A real name change is pushed into recipe and
/// comment snapshots afterwards; that step never fails the update.
#[instrument(skip(st, req), fields(user_id = %user.id))]
pub async fn update_profile(
    st: &AppState,
    user: &CurrentUser,
    req: UpdateProfileRequest,
) -> AppResult<User> {
    let name = match req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(AppError::Validation("Name cannot be empty".into()))
        }
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };
    let changes = ProfileChanges {
        name,
        bio: req.bio,
        profile_picture: req.profile_picture,
    };

    let updated = st
        .users
        .update_profile(user.id, &changes)
        .await?
        .ok_or_else(user_not_found)?;

    if updated.name != user.name {
        info!(old = %user.name, new = %updated.name, "display name changed");
        sync::propagate_name_change(st, user.id, &updated.name).await;
    }
    Ok(updated)
}

/// Flips the recipe in the caller's saved set. Returns the new state.
#[instrument(skip(st))]
pub async fn toggle_saved(st: &AppState, user_id: Uuid, recipe_id: Uuid) -> AppResult<bool> {
    if st.recipes.find_recipe(recipe_id).await?.is_none() {
        return Err(AppError::NotFound("Recipe not found".into()));
    }
    let saved = st.users.toggle_saved(user_id, recipe_id).await?;
    info!(saved, "saved recipes toggled");
    Ok(saved)
}

/// One-way unlock. Returns false when the recipe was already purchased.
#[instrument(skip(st))]
pub async fn purchase(st: &AppState, user_id: Uuid, recipe_id: Uuid) -> AppResult<bool> {
    if st.recipes.find_recipe(recipe_id).await?.is_none() {
        return Err(AppError::NotFound("Recipe not found".into()));
    }
    let relations = st.users.relations(user_id).await?;
    if refs::contains(&relations.purchased_recipes, recipe_id) {
        return Ok(false);
    }
    let added = st.users.add_purchase(user_id, recipe_id).await?;
    if added {
        info!("recipe unlocked");
    }
    Ok(added)
}
