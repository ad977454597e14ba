use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{Json, extract::State, http::StatusCode};
use password_hash::rand_core::OsRng;
use serde_json::{Value, json};
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppState;
use crate::constants::*;
use crate::database::Db;
use crate::friends::load_friend_lists;
use crate::models::{LoginPayload, ProfileResponse, PublicUser, RegisterPayload, SessionUser};
use crate::utils::{
    ErrorResponse, api_error, bad_request, db_error, db_error_with_context, now_rfc3339,
    unauthorized, validate_email, validate_string_length,
};

const SESSION_USER_KEY: &str = "user";

/// Resolve the authenticated user from the session, or fail with 401.
pub async fn get_current_user(session: &Session) -> Result<SessionUser, ErrorResponse> {
    session
        .get::<SessionUser>(SESSION_USER_KEY)
        .await
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_SESSION_ACCESS))?
        .ok_or_else(unauthorized)
}

pub async fn get_user_by_username(
    db: &Db,
    username: &str,
) -> Result<Option<PublicUser>, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, username FROM users WHERE username = ?",
            [username],
        )
        .await
        .map_err(|_| db_error_with_context("failed to look up user by username"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => {
            let id: String = row.get(0).map_err(|_| db_error())?;
            let username: String = row.get(1).map_err(|_| db_error())?;
            Ok(Some(PublicUser { id, username }))
        }
        None => Ok(None),
    }
}

pub async fn get_user_by_email(db: &Db, email: &str) -> Result<Option<PublicUser>, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query("SELECT id, username FROM users WHERE email = ?", [email])
        .await
        .map_err(|_| db_error_with_context("failed to look up user by email"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => {
            let id: String = row.get(0).map_err(|_| db_error())?;
            let username: String = row.get(1).map_err(|_| db_error())?;
            Ok(Some(PublicUser { id, username }))
        }
        None => Ok(None),
    }
}

/// Resolve an invite target: treated as an email when it contains '@',
/// otherwise as a username.
pub async fn get_user_by_identifier(
    db: &Db,
    identifier: &str,
) -> Result<Option<PublicUser>, ErrorResponse> {
    if identifier.contains('@') {
        get_user_by_email(db, identifier).await
    } else {
        get_user_by_username(db, identifier).await
    }
}

fn hash_password(password: &str) -> Result<String, ErrorResponse> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_INTERNAL))?
        .to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub async fn register(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let username = payload.username.trim();
    let email = payload.email.trim();

    if username.len() < MIN_USERNAME_LENGTH {
        return Err(bad_request(format!(
            "Username must be at least {} characters long",
            MIN_USERNAME_LENGTH
        )));
    }
    validate_string_length(username, "Username", MAX_USERNAME_LENGTH)?;
    validate_email(email)?;
    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(bad_request(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        )));
    }

    let password_hash = hash_password(&payload.password)?;
    let user_id = Uuid::new_v4().to_string();
    let now = now_rfc3339()?;

    {
        let conn = app_state.db.write().await;

        let mut rows = conn
            .query(
                "SELECT id FROM users WHERE username = ? OR email = ?",
                (username, email),
            )
            .await
            .map_err(|_| db_error_with_context("failed to check user uniqueness"))?;

        if rows.next().await.map_err(|_| db_error())?.is_some() {
            return Err(bad_request("Username or email already exists"));
        }

        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
            (
                user_id.as_str(),
                username,
                email,
                password_hash.as_str(),
                now.as_str(),
            ),
        )
        .await
        .map_err(|_| db_error_with_context("user creation failed"))?;
    }

    // Registration establishes the session directly
    let session_user = SessionUser {
        id: user_id,
        username: username.to_string(),
    };
    session
        .insert(SESSION_USER_KEY, session_user)
        .await
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_SESSION_ACCESS))?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "User registered successfully" })),
    ))
}

pub async fn login(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let email = payload.email.trim();

    // One error for unknown email and bad password alike
    let invalid = || api_error(StatusCode::UNAUTHORIZED, "Invalid credentials");

    let (user_id, username, password_hash) = {
        let conn = app_state.db.read().await;
        let mut rows = conn
            .query(
                "SELECT id, username, password_hash FROM users WHERE email = ?",
                [email],
            )
            .await
            .map_err(|_| db_error_with_context("failed to look up login email"))?;

        let row = rows.next().await.map_err(|_| db_error())?.ok_or_else(invalid)?;

        let user_id: String = row.get(0).map_err(|_| db_error())?;
        let username: String = row.get(1).map_err(|_| db_error())?;
        let password_hash: String = row.get(2).map_err(|_| db_error())?;
        (user_id, username, password_hash)
    };

    if !verify_password(&payload.password, &password_hash) {
        return Err(invalid());
    }

    let session_user = SessionUser {
        id: user_id,
        username,
    };
    session
        .insert(SESSION_USER_KEY, session_user)
        .await
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_SESSION_ACCESS))?;

    Ok((StatusCode::OK, Json(json!({ "message": "Login successful" }))))
}

pub async fn logout(session: Session) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    session
        .flush()
        .await
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_SESSION_ACCESS))?;

    Ok((
        StatusCode::OK,
        Json(json!({ "success": true, "message": "User logged out" })),
    ))
}

pub async fn profile(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<ProfileResponse>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let email = {
        let conn = app_state.db.read().await;
        let mut rows = conn
            .query(
                "SELECT email FROM users WHERE id = ?",
                [current_user.id.as_str()],
            )
            .await
            .map_err(|_| db_error_with_context("failed to load profile"))?;

        let row = rows
            .next()
            .await
            .map_err(|_| db_error())?
            .ok_or_else(unauthorized)?;
        row.get::<String>(0).map_err(|_| db_error())?
    };

    let lists = load_friend_lists(&app_state.db, &current_user.id).await?;

    Ok((
        StatusCode::OK,
        Json(ProfileResponse {
            username: current_user.username,
            email,
            friends: lists.friends,
            pending_requests: lists.pending_requests,
            sent_requests: lists.sent_requests,
        }),
    ))
}
