use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use time::OffsetDateTime;
use tracing::instrument;

use crate::{
    auth::{
        cookies::{cleared_session_cookie, session_cookie},
        dto::{
            LoginRequest, LoginResponse, PublicUser, RegisterRequest, UpdateProfileRequest,
            UserEnvelope, UserProfile, VerifyEmailRequest,
        },
        extractors::CurrentUser,
        jwt::JwtKeys,
        services,
    },
    error::AppResult,
    extract::JsonBody,
    response::{self, ApiResponse, Empty},
    state::AppState,
    users,
};

type ApiJson<T> = Json<ApiResponse<T>>;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout).post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/profile", put(update_profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> AppResult<(StatusCode, ApiJson<Empty>)> {
    services::register(&state, payload, OffsetDateTime::now_utc()).await?;
    Ok((StatusCode::CREATED, response::message(services::REGISTERED)))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<VerifyEmailRequest>,
) -> AppResult<ApiJson<Empty>> {
    services::verify_email(&state, payload, OffsetDateTime::now_utc()).await?;
    Ok(response::message("Email verified successfully! You can now log in."))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<(CookieJar, ApiJson<LoginResponse>)> {
    let (token, user) = services::login(&state, payload).await?;
    let ttl = JwtKeys::new(&state.config.jwt).ttl;
    let jar = jar.add(session_cookie(&token, ttl, state.config.cookie_secure));
    Ok((
        jar,
        response::ok_with(
            "Login successful",
            LoginResponse {
                token,
                user: PublicUser::from(&user),
            },
        ),
    ))
}

#[instrument(skip(state, jar))]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, ApiJson<Empty>) {
    (
        jar.add(cleared_session_cookie(state.config.cookie_secure)),
        response::message("Logged out successfully"),
    )
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_me(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<ApiJson<UserEnvelope<UserProfile>>> {
    let profile = users::services::profile(&state, user.id).await?;
    Ok(response::ok(UserEnvelope { user: profile }))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> AppResult<ApiJson<UserEnvelope<PublicUser>>> {
    let updated = users::services::update_profile(&state, &user, payload).await?;
    Ok(response::ok_with(
        "Profile updated successfully",
        UserEnvelope {
            user: PublicUser::from(&updated),
        },
    ))
}
