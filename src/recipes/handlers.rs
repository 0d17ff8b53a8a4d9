use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::instrument;

use super::dto::{
    CommentRequest, Comments, Leaderboard, RecipeDetail, RecipeEnvelope, RecipeList, RecipePayload,
    Recipes, SaveState, SavedRecipes,
};
use super::repo_types::{LikeState, Recipe, RecipeFilter};
use super::services;
use crate::{
    auth::extractors::CurrentUser,
    error::{AppError, AppResult},
    extract::{IdPath, JsonBody},
    images::services::{UploadItem, MAX_IMAGE_BYTES},
    response::{self, ApiResponse, Empty},
    state::AppState,
    users,
};

type ApiJson<T> = Json<ApiResponse<T>>;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(list_recipes))
        .route("/recipes/leaderboard", get(leaderboard))
        .route("/recipes/saved", get(saved_recipes))
        .route("/recipes/my-recipes", get(my_recipes))
        .route("/recipes/:id", get(get_recipe))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", post(create_recipe))
        .route("/recipes/:id", axum::routing::put(update_recipe).delete(delete_recipe))
        .route("/recipes/:id/like", post(like_recipe))
        .route("/recipes/:id/comment", post(comment_recipe))
        .route("/recipes/:id/save", post(save_recipe))
        .route("/recipes/:id/purchase", post(purchase_recipe))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024 * 1024))
}

/// Recipe body from either JSON or `multipart/form-data` with an optional `image` file.
pub struct RecipeForm {
    pub payload: RecipePayload,
    pub image: Option<UploadItem>,
}

#[async_trait]
impl<S> FromRequest<S> for RecipeForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let JsonBody(payload) = JsonBody::<RecipePayload>::from_request(req, state).await?;
            return Ok(Self {
                payload,
                image: None,
            });
        }

        let mut mp = Multipart::from_request(req, state).await?;
        let mut fields = Map::new();
        let mut image = None;
        while let Some(field) = mp.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" && field.file_name().is_some() {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field.bytes().await?;
                // browsers send an empty part when no file was picked
                if !body.is_empty() {
                    image = Some(UploadItem { body, content_type });
                }
            } else {
                let text = field.text().await?;
                fields.insert(name, Value::String(text));
            }
        }

        let payload = serde_json::from_value(Value::Object(fields))
            .map_err(|e| AppError::Validation(format!("Invalid recipe fields: {e}")))?;
        Ok(Self { payload, image })
    }
}

#[instrument(skip(state))]
pub async fn list_recipes(State(state): State<AppState>) -> AppResult<ApiJson<RecipeList>> {
    let recipes = services::list_recipes(&state, RecipeFilter::Approved).await?;
    Ok(response::ok(RecipeList {
        count: recipes.len(),
        recipes,
    }))
}

#[instrument(skip(state))]
pub async fn leaderboard(State(state): State<AppState>) -> AppResult<ApiJson<Leaderboard>> {
    let leaderboard = services::leaderboard(&state).await?;
    Ok(response::ok(Leaderboard { leaderboard }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn saved_recipes(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<ApiJson<SavedRecipes>> {
    let recipes = services::list_recipes(&state, RecipeFilter::SavedBy(user.id)).await?;
    Ok(response::ok(SavedRecipes {
        saved_recipes: recipes.clone(),
        recipes,
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn my_recipes(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<ApiJson<Recipes>> {
    let recipes = services::list_recipes(&state, RecipeFilter::OwnedBy(user.id)).await?;
    Ok(response::ok(Recipes { recipes }))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> AppResult<ApiJson<RecipeEnvelope<RecipeDetail>>> {
    let recipe = services::get_recipe(&state, id).await?;
    Ok(response::ok(RecipeEnvelope { recipe }))
}

#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn create_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    form: RecipeForm,
) -> AppResult<(StatusCode, ApiJson<RecipeEnvelope<Recipe>>)> {
    let recipe = services::create_recipe(&state, &user, form.payload, form.image).await?;
    Ok((StatusCode::CREATED, response::ok(RecipeEnvelope { recipe })))
}

#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn update_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    IdPath(id): IdPath,
    form: RecipeForm,
) -> AppResult<ApiJson<RecipeEnvelope<Recipe>>> {
    let recipe = services::update_recipe(&state, id, &user, form.payload, form.image).await?;
    Ok(response::ok(RecipeEnvelope { recipe }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<ApiJson<Empty>> {
    services::delete_recipe(&state, id, &user).await?;
    Ok(response::message("Recipe deleted"))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn like_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<ApiJson<LikeState>> {
    Ok(response::ok(services::toggle_like(&state, id, user.id).await?))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn comment_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    IdPath(id): IdPath,
    JsonBody(body): JsonBody<CommentRequest>,
) -> AppResult<ApiJson<Comments>> {
    let comments = services::add_comment(&state, id, &user, &body.text).await?;
    Ok(response::ok(Comments { comments }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn save_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<ApiJson<SaveState>> {
    let is_saved = users::services::toggle_saved(&state, user.id, id).await?;
    Ok(response::ok(SaveState { is_saved }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn purchase_recipe(
    State(state): State<AppState>,
    user: CurrentUser,
    IdPath(id): IdPath,
) -> AppResult<ApiJson<Empty>> {
    let newly_bought = users::services::purchase(&state, user.id, id).await?;
    Ok(response::message(if newly_bought {
        "Recipe unlocked successfully"
    } else {
        "Already purchased"
    }))
}
