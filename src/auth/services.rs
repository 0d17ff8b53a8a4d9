use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::{
    dto::{LoginRequest, RegisterRequest, VerifyEmailRequest},
    jwt::JwtKeys,
    otp,
    password::{check_password_rules, hash_password, verify_password},
    repo_types::{NewUser, Role, User},
};
use crate::{
    error::{AppError, AppResult},
    mail::{verification_body, VERIFICATION_SUBJECT},
    state::AppState,
};

pub const REGISTERED: &str =
    "User registered successfully! Please check your email to verify your account.";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Creates an unverified account, or re-sends a code to an existing
/// unverified one. Both paths look the same to the caller.
#[instrument(skip(st, req), fields(email = %normalize_email(&req.email)))]
pub async fn register(st: &AppState, req: RegisterRequest, now: OffsetDateTime) -> AppResult<()> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Please provide all required fields".into()));
    }
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Please provide a valid email".into()));
    }
    check_password_rules(&req.password).map_err(|m| AppError::Validation(m.into()))?;

    if let Some(existing) = st.users.find_user_by_email(&email).await? {
        return resend_or_conflict(st, &existing, now).await;
    }

    let role = match req.role.as_deref() {
        Some("admin") if st.config.allow_admin_signup => Role::Admin,
        Some("admin") => {
            warn!("admin role requested but admin signup is disabled");
            Role::User
        }
        _ => Role::User,
    };
    let password_hash = hash_password(&req.password)?;
    let inserted = st
        .users
        .insert_user(NewUser {
            name,
            email: email.clone(),
            password_hash,
            role,
        })
        .await?;
    let Some(user) = inserted else {
        // a concurrent registration claimed the email between lookup and insert
        let existing = st
            .users
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::Conflict("User with this email already exists".into()))?;
        return resend_or_conflict(st, &existing, now).await;
    };

    info!(user_id = %user.id, role = role.as_str(), "user registered");
    issue_otp(st, &user, now).await
}

async fn resend_or_conflict(st: &AppState, existing: &User, now: OffsetDateTime) -> AppResult<()> {
    if existing.is_verified {
        warn!("email already registered");
        return Err(AppError::Conflict("User with this email already exists".into()));
    }
    info!(user_id = %existing.id, "unverified account, resending code");
    issue_otp(st, existing, now).await
}

/// Stores a fresh code, replacing any pending one, and mails it.
#[instrument(skip(st, user), fields(user_id = %user.id))]
pub async fn issue_otp(st: &AppState, user: &User, now: OffsetDateTime) -> AppResult<()> {
    let pending = otp::issue_at(now);
    st.users.set_otp(user.id, &pending).await?;

    if let Err(e) = st
        .mailer
        .send_email(&user.email, VERIFICATION_SUBJECT, &verification_body(&pending.code))
        .await
    {
        error!(error = %format!("{e:#}"), "verification email failed");
        return Err(AppError::ServiceUnavailable(
            "Could not send verification email. Please try again later.".into(),
        ));
    }
    info!(expires_at = %pending.expires_at, "verification code sent");
    Ok(())
}

#[instrument(skip(st, req), fields(email = %normalize_email(&req.email)))]
pub async fn verify_email(
    st: &AppState,
    req: VerifyEmailRequest,
    now: OffsetDateTime,
) -> AppResult<()> {
    let email = normalize_email(&req.email);
    let code = req.otp.trim();
    if email.is_empty() || code.is_empty() {
        return Err(AppError::Validation("Email and OTP are required".into()));
    }
    match st.users.consume_otp(&email, code, now).await? {
        Some(user_id) => {
            info!(%user_id, "email verified");
            Ok(())
        }
        None => {
            let reason = match st.users.find_user_by_email(&email).await? {
                None => "unknown email",
                Some(user) => match &user.pending_otp {
                    None => "no pending code",
                    Some(pending) if !pending.is_live_at(now) => "code expired",
                    Some(_) => "code mismatch",
                },
            };
            warn!(reason, "otp rejected");
            Err(AppError::InvalidOrExpiredOtp)
        }
    }
}

/// Returns a signed session token and the user it was issued for.
#[instrument(skip(st, req), fields(email = %normalize_email(&req.email)))]
pub async fn login(st: &AppState, req: LoginRequest) -> AppResult<(String, User)> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Please provide email and password".into()));
    }

    let user = st.users.find_user_by_email(&email).await?.ok_or_else(|| {
        warn!("login unknown email");
        AppError::InvalidCredentials
    })?;
    if !user.is_verified {
        warn!(user_id = %user.id, "login before verification");
        return Err(AppError::NotVerified);
    }
    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = JwtKeys::new(&st.config.jwt).sign(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok((token, user))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::fake_state;

    fn bob() -> RegisterRequest {
        RegisterRequest {
            name: "Bob".into(),
            email: "bob@x.com".into(),
            password: "pass1234".into(),
            role: None,
        }
    }

    fn verify(code: &str) -> VerifyEmailRequest {
        VerifyEmailRequest {
            email: "bob@x.com".into(),
            otp: code.into(),
        }
    }

    fn credentials(password: &str) -> LoginRequest {
        LoginRequest {
            email: "BOB@x.com".into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("bob@x.com"));
        assert!(!is_valid_email("bob@x"));
        assert!(!is_valid_email("bob x@y.com"));
    }

    #[tokio::test]
    async fn register_verify_login_scenario() {
        let (st, fakes) = fake_state();
        let now = OffsetDateTime::now_utc();

        register(&st, bob(), now).await.unwrap();
        let user = st.users.find_user_by_email("bob@x.com").await.unwrap().unwrap();
        assert!(!user.is_verified);
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "pass1234");

        let code = fakes.mailer.last_code_for("bob@x.com").unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        let wrong = if code == "111111" { "222222" } else { "111111" };
        assert!(matches!(
            verify_email(&st, verify(wrong), now).await,
            Err(AppError::InvalidOrExpiredOtp)
        ));
        verify_email(&st, verify(&code), now).await.unwrap();

        let user = st.users.find_user(user.id).await.unwrap().unwrap();
        assert!(user.is_verified);
        assert!(user.pending_otp.is_none());

        let (token, logged_in) = login(&st, credentials("pass1234")).await.unwrap();
        assert_eq!(logged_in.id, user.id);
        assert_eq!(JwtKeys::new(&st.config.jwt).verify(&token).unwrap().sub, user.id);

        // a consumed code cannot be replayed
        assert!(matches!(
            verify_email(&st, verify(&code), now).await,
            Err(AppError::InvalidOrExpiredOtp)
        ));
    }

    #[tokio::test]
    async fn register_validation() {
        let (st, _) = fake_state();
        let now = OffsetDateTime::now_utc();
        for req in [
            RegisterRequest { name: " ".into(), ..bob() },
            RegisterRequest { email: "not-an-email".into(), ..bob() },
            RegisterRequest { password: "pass123".into(), ..bob() },
            RegisterRequest { password: "password".into(), ..bob() },
        ] {
            assert!(matches!(register(&st, req, now).await, Err(AppError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn unverified_duplicate_resends_and_verified_duplicate_conflicts() {
        let (st, fakes) = fake_state();
        let now = OffsetDateTime::now_utc();

        register(&st, bob(), now).await.unwrap();
        let first = fakes.mailer.last_code_for("bob@x.com").unwrap();
        register(&st, RegisterRequest { email: " Bob@X.com ".into(), ..bob() }, now)
            .await
            .unwrap();
        assert_eq!(fakes.mailer.count(), 2);
        assert_eq!(st.users.list_users().await.unwrap().len(), 1);

        let second = fakes.mailer.last_code_for("bob@x.com").unwrap();
        if first != second {
            assert!(matches!(
                verify_email(&st, verify(&first), now).await,
                Err(AppError::InvalidOrExpiredOtp)
            ));
        }
        verify_email(&st, verify(&second), now).await.unwrap();

        assert!(matches!(
            register(&st, bob(), now).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn racing_registration_resends_instead_of_conflicting() {
        let (st, fakes) = fake_state();
        let now = OffsetDateTime::now_utc();
        register(&st, bob(), now).await.unwrap();

        // second request looked the email up before the first one committed
        fakes.store.miss_next_email_lookup.store(true, Ordering::SeqCst);
        register(&st, bob(), now).await.unwrap();
        assert_eq!(fakes.mailer.count(), 2);
        assert_eq!(st.users.list_users().await.unwrap().len(), 1);

        let code = fakes.mailer.last_code_for("bob@x.com").unwrap();
        verify_email(&st, verify(&code), now).await.unwrap();

        fakes.store.miss_next_email_lookup.store(true, Ordering::SeqCst);
        assert!(matches!(
            register(&st, bob(), now).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn otp_expires_exactly_after_ten_minutes() {
        let (st, fakes) = fake_state();
        let issued = OffsetDateTime::now_utc();
        register(&st, bob(), issued).await.unwrap();
        let code = fakes.mailer.last_code_for("bob@x.com").unwrap();

        let late = issued + otp::OTP_TTL + time::Duration::seconds(1);
        assert!(matches!(
            verify_email(&st, verify(&code), late).await,
            Err(AppError::InvalidOrExpiredOtp)
        ));
        let just_in_time = issued + otp::OTP_TTL - time::Duration::seconds(1);
        verify_email(&st, verify(&code), just_in_time).await.unwrap();
    }

    #[tokio::test]
    async fn unverified_login_fails_with_not_verified_even_with_wrong_password() {
        let (st, _) = fake_state();
        register(&st, bob(), OffsetDateTime::now_utc()).await.unwrap();
        for password in ["pass1234", "wrong999"] {
            assert!(matches!(
                login(&st, credentials(password)).await,
                Err(AppError::NotVerified)
            ));
        }
        assert!(matches!(
            login(&st, LoginRequest { email: "nobody@x.com".into(), password: "pass1234".into() }).await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn mail_failure_fails_registration() {
        let (st, fakes) = fake_state();
        fakes.mailer.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            register(&st, bob(), OffsetDateTime::now_utc()).await,
            Err(AppError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn admin_role_needs_admin_signup_enabled() {
        let (st, _) = fake_state();
        let req = RegisterRequest { role: Some("admin".into()), ..bob() };
        register(&st, req, OffsetDateTime::now_utc()).await.unwrap();
        let user = st.users.find_user_by_email("bob@x.com").await.unwrap().unwrap();
        assert_eq!(user.role, Role::User);
    }
}
