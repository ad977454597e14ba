#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use my_trip_server::{AppState, auth, constants::*, database, details, expenses, friends, metrics, trips};
use serde_json::Value;
use time::Duration;
use tower::util::ServiceExt;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::Key};
use uuid::Uuid;

#[derive(Clone)]
pub struct TestConfig {
    pub temp_dir_path: String,
}

impl TestConfig {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let temp_dir_path = temp_dir.path().to_string_lossy().to_string();
        std::mem::forget(temp_dir);
        Ok(Self { temp_dir_path })
    }

    pub fn data_path(&self) -> String {
        self.temp_dir_path.clone()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub async fn setup_test_app() -> anyhow::Result<TestApp> {
    let test_config = TestConfig::new()?;

    let data_path = test_config.data_path();
    std::fs::create_dir_all(&data_path)?;

    let db = database::init_db(&data_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;

    let app_state = AppState { db };

    let store = MemoryStore::default();

    let session_secret = "test_secret_key_at_least_64_chars_long_test_secret_key_at_least_64_";
    let session_key = Key::try_from(session_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;

    let session_layer = SessionManagerLayer::new(store)
        .with_secure(false)
        .with_name(SESSION_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::hours(SESSION_EXPIRY_HOURS)))
        .with_signed(session_key);

    let router = Router::new()
        .route("/user/register", axum::routing::post(auth::register))
        .route("/user/login", axum::routing::post(auth::login))
        .route("/user/logout", axum::routing::get(auth::logout))
        .route("/user/profile", axum::routing::get(auth::profile))
        .route("/user/friends", axum::routing::get(friends::list_friends))
        .route(
            "/user/friends/request",
            axum::routing::post(friends::send_friend_request),
        )
        .route("/user/friends/add", axum::routing::post(friends::accept_friend))
        .route(
            "/user/friends/decline",
            axum::routing::post(friends::decline_friend),
        )
        .route(
            "/user/friends/remove",
            axum::routing::post(friends::remove_friend),
        )
        .route("/trip", axum::routing::get(trips::list_trips))
        .route("/trip/create", axum::routing::post(trips::create_trip))
        .route("/trip/join", axum::routing::post(trips::join_trip))
        .route("/trip/{code}", axum::routing::get(trips::get_trip))
        .route("/trip/update/{code}", axum::routing::post(trips::update_trip))
        .route(
            "/trip/invite/{code}",
            axum::routing::post(trips::invite_to_trip),
        )
        .route(
            "/trip/add/{code}",
            axum::routing::post(trips::accept_join_request),
        )
        .route(
            "/trip/remove/{code}",
            axum::routing::post(trips::remove_member),
        )
        .route("/trip/leave/{code}", axum::routing::get(trips::leave_trip))
        .route(
            "/trip/favorite/{code}/{value}",
            axum::routing::get(trips::set_favorite),
        )
        .route(
            "/trip/detail/new/{code}",
            axum::routing::post(details::new_detail),
        )
        .route(
            "/trip/details/edit/{code}",
            axum::routing::post(details::edit_detail),
        )
        .route(
            "/trip/details/{date}/{code}",
            axum::routing::get(details::get_detail),
        )
        .route(
            "/trip/expense/{code}",
            axum::routing::get(expenses::list_expenses),
        )
        .route(
            "/trip/expense/add/{code}",
            axum::routing::post(expenses::add_expense),
        )
        .route(
            "/trip/expense/edit/{code}",
            axum::routing::post(expenses::edit_expense),
        )
        .route(
            "/metrics/expense/balances",
            axum::routing::get(metrics::balances_all),
        )
        .route(
            "/metrics/expense/balances/{code}",
            axum::routing::get(metrics::balances_for_trip),
        )
        .route(
            "/metrics/all-trips/expense/total",
            axum::routing::get(metrics::trip_totals),
        )
        .route(
            "/metrics/all-trips/expense/split",
            axum::routing::get(metrics::split_all_trips),
        )
        .route(
            "/metrics/expense/split/{code}",
            axum::routing::get(metrics::split_for_trip),
        )
        .route(
            "/metrics/all-trips/duration",
            axum::routing::get(metrics::trip_durations),
        )
        .layer(session_layer)
        .with_state(app_state.clone());

    Ok(TestApp {
        router,
        state: app_state,
    })
}

/// Insert a user directly, bypassing the register endpoint. The email is
/// derived from the username.
pub async fn create_test_user(
    app_state: &AppState,
    username: &str,
    password: &str,
) -> anyhow::Result<String> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString},
    };
    use password_hash::rand_core::OsRng;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4().to_string();
    let email = format!("{}@example.com", username);

    let conn = app_state.db.write().await;
    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        (
            user_id.as_str(),
            username,
            email.as_str(),
            hash.as_str(),
            "2025-01-01T00:00:00Z",
        ),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create test user: {}", e))?;

    Ok(user_id)
}

/// Log in with the email derived by `create_test_user` and return the
/// session cookie.
pub async fn login_user(app: &Router, username: &str, password: &str) -> anyhow::Result<String> {
    let payload = serde_json::json!({
        "email": format!("{}@example.com", username),
        "password": password
    });

    let request = Request::builder()
        .method("POST")
        .uri("/user/login")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("No session cookie in response"))?;

    Ok(set_cookie.to_string())
}

/// Create a user and log in, returning (user_id, session cookie).
pub async fn register_and_login(
    app: &TestApp,
    username: &str,
) -> anyhow::Result<(String, String)> {
    let user_id = create_test_user(&app.state, username, "password123").await?;
    let cookie = login_user(&app.router, username, "password123").await?;
    Ok((user_id, cookie))
}

/// POST a JSON body with a session cookie; returns status and parsed body.
pub async fn post_json(
    app: &Router,
    uri: &str,
    cookie: &str,
    body: Value,
) -> anyhow::Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", cookie)
        .body(Body::from(body.to_string()))
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    send(app, request).await
}

/// GET with a session cookie; returns status and parsed body.
pub async fn get_json(app: &Router, uri: &str, cookie: &str) -> anyhow::Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .header("cookie", cookie)
        .body(Body::empty())
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read response body: {}", e))?;

    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };

    Ok((status, value))
}

/// Establish an accepted friendship between two logged-in users through the
/// API.
pub async fn befriend(
    app: &Router,
    cookie_a: &str,
    username_b: &str,
    cookie_b: &str,
    username_a: &str,
) -> anyhow::Result<()> {
    let (status, _) = post_json(
        app,
        "/user/friends/request",
        cookie_a,
        serde_json::json!({ "username": username_b }),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "friend request failed: {}", status);

    let (status, _) = post_json(
        app,
        "/user/friends/add",
        cookie_b,
        serde_json::json!({ "username": username_a }),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK, "friend accept failed: {}", status);

    Ok(())
}

/// Create a trip through the API and return its code.
pub async fn create_test_trip(
    app: &Router,
    cookie: &str,
    location: &str,
    start_date: &str,
    end_date: Option<&str>,
    visibility: &str,
) -> anyhow::Result<String> {
    let mut body = serde_json::json!({
        "location": location,
        "start_date": start_date,
        "visibility": visibility,
    });
    if let Some(end) = end_date {
        body["end_date"] = Value::String(end.to_string());
    }

    let (status, value) = post_json(app, "/trip/create", cookie, body).await?;
    anyhow::ensure!(status == StatusCode::CREATED, "trip create failed: {}", status);

    value["trip"]["trip_code"]
        .as_str()
        .map(|code| code.to_string())
        .ok_or_else(|| anyhow::anyhow!("No trip code in response"))
}
