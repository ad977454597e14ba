use axum::{
    Router,
    response::Html,
    routing::{get, post},
};
use time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::Key};
use tracing_subscriber::EnvFilter;

use my_trip_server::{
    AppState, auth, config::Config, constants::*, database, details, expenses, friends, metrics,
    trips,
};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load and validate configuration
    let config = Config::from_env().map_err(|e| format!("Configuration error: {}", e))?;

    // Initialize database
    let db = database::init_db(&config.data_path)
        .await
        .map_err(|e| format!("Failed to initialize database: {}", e))?;

    let app_state = AppState { db };

    // Create session store
    let store = MemoryStore::default();

    let session_key = Key::try_from(config.session_secret.as_bytes())
        .map_err(|e| format!("Invalid session secret: {}", e))?;

    // Only use secure cookies when explicitly in production with HTTPS
    let is_production = std::env::var("PRODUCTION")
        .map(|val| val.to_lowercase() == "true")
        .unwrap_or(false);

    let session_layer = SessionManagerLayer::new(store)
        .with_secure(is_production)
        .with_name(SESSION_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::hours(SESSION_EXPIRY_HOURS)))
        .with_signed(session_key);

    // Configure CORS to allow frontend requests
    let frontend_origin =
        std::env::var("FRONTEND_ORIGIN").unwrap_or_else(|_| "http://localhost:8080".to_string());

    let frontend_origin_header = frontend_origin
        .parse::<axum::http::HeaderValue>()
        .map_err(|e| format!("Invalid FRONTEND_ORIGIN '{}': {}", frontend_origin, e))?;

    let cors = CorsLayer::new()
        .allow_origin(frontend_origin_header)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::COOKIE,
        ])
        .allow_credentials(true);

    // Build application router
    let app = Router::new()
        .route("/", get(root))
        .route("/user/register", post(auth::register))
        .route("/user/login", post(auth::login))
        .route("/user/logout", get(auth::logout))
        .route("/user/profile", get(auth::profile))
        .route("/user/friends", get(friends::list_friends))
        .route("/user/friends/request", post(friends::send_friend_request))
        .route("/user/friends/add", post(friends::accept_friend))
        .route("/user/friends/decline", post(friends::decline_friend))
        .route("/user/friends/remove", post(friends::remove_friend))
        .route("/trip", get(trips::list_trips))
        .route("/trip/create", post(trips::create_trip))
        .route("/trip/join", post(trips::join_trip))
        .route("/trip/{code}", get(trips::get_trip))
        .route("/trip/update/{code}", post(trips::update_trip))
        .route("/trip/invite/{code}", post(trips::invite_to_trip))
        .route("/trip/add/{code}", post(trips::accept_join_request))
        .route("/trip/remove/{code}", post(trips::remove_member))
        .route("/trip/leave/{code}", get(trips::leave_trip))
        .route("/trip/favorite/{code}/{value}", get(trips::set_favorite))
        .route("/trip/detail/new/{code}", post(details::new_detail))
        .route("/trip/details/edit/{code}", post(details::edit_detail))
        .route("/trip/details/{date}/{code}", get(details::get_detail))
        .route("/trip/expense/{code}", get(expenses::list_expenses))
        .route("/trip/expense/add/{code}", post(expenses::add_expense))
        .route("/trip/expense/edit/{code}", post(expenses::edit_expense))
        .route("/metrics/expense/balances", get(metrics::balances_all))
        .route(
            "/metrics/expense/balances/{code}",
            get(metrics::balances_for_trip),
        )
        .route(
            "/metrics/all-trips/expense/total",
            get(metrics::trip_totals),
        )
        .route(
            "/metrics/all-trips/expense/split",
            get(metrics::split_all_trips),
        )
        .route("/metrics/expense/split/{code}", get(metrics::split_for_trip))
        .route("/metrics/all-trips/duration", get(metrics::trip_durations))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(session_layer)
        .with_state(app_state);

    // Create TCP listener with proper error handling
    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", bind_address, e))?;

    tracing::info!(address = %bind_address, "server running");

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}

async fn root() -> Html<&'static str> {
    Html("<h1>My Trip Server</h1><p>API Ready</p>")
}
