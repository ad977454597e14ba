use anyhow::Result;
use libsql::{Builder, Connection};
use std::future::Future;
use std::pin::Pin;
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id             TEXT    PRIMARY KEY,
    username       TEXT    UNIQUE NOT NULL,
    email          TEXT    UNIQUE NOT NULL,
    password_hash  TEXT    NOT NULL,
    created_at     TEXT    NOT NULL
);
"#;

// Two directed rows per relationship; both flipped or deleted together so
// the friendship graph stays symmetric.
const CREATE_FRIEND_LINKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS friend_links (
    id                TEXT PRIMARY KEY,
    from_user_id      TEXT NOT NULL,
    to_user_id        TEXT NOT NULL,
    status            TEXT NOT NULL,
    requester_user_id TEXT NOT NULL,
    requested_at      TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE (from_user_id, to_user_id),
    FOREIGN KEY (from_user_id) REFERENCES users(id),
    FOREIGN KEY (to_user_id) REFERENCES users(id)
);
"#;

const CREATE_TRIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trips (
    id            TEXT PRIMARY KEY,
    trip_code     TEXT UNIQUE NOT NULL,
    name          TEXT NOT NULL,
    location      TEXT NOT NULL,
    start_date    TEXT NOT NULL,
    end_date      TEXT,
    owner_user_id TEXT NOT NULL,
    visibility    TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    FOREIGN KEY (owner_user_id) REFERENCES users(id)
);
"#;

// One row per (trip, user): a user holds at most one membership state at a
// time (requested, invited, participant, admin).
const CREATE_TRIP_MEMBERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trip_members (
    trip_id    TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    state      TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (trip_id, user_id),
    FOREIGN KEY (trip_id) REFERENCES trips(id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

const CREATE_TRIP_FAVORITES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trip_favorites (
    trip_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    PRIMARY KEY (trip_id, user_id),
    FOREIGN KEY (trip_id) REFERENCES trips(id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

// notes/activities hold JSON-encoded ordered string lists; one entry per
// calendar day per trip.
const CREATE_TRIP_DETAILS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS trip_details (
    id         TEXT PRIMARY KEY,
    trip_id    TEXT NOT NULL,
    date       TEXT NOT NULL,
    location   TEXT NOT NULL,
    notes      TEXT NOT NULL,
    activities TEXT NOT NULL,
    UNIQUE (trip_id, date),
    FOREIGN KEY (trip_id) REFERENCES trips(id)
);
"#;

const CREATE_EXPENSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS expenses (
    id            TEXT PRIMARY KEY,
    trip_id       TEXT NOT NULL,
    payer_user_id TEXT NOT NULL,
    amount        REAL NOT NULL,
    description   TEXT NOT NULL,
    date          TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    FOREIGN KEY (trip_id) REFERENCES trips(id),
    FOREIGN KEY (payer_user_id) REFERENCES users(id)
);
"#;

const CREATE_EXPENSE_SPLITS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS expense_splits (
    expense_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    PRIMARY KEY (expense_id, user_id),
    FOREIGN KEY (expense_id) REFERENCES expenses(id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

const CREATE_TRIP_MEMBERS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_trip_members_user ON trip_members(user_id);
"#;

const CREATE_EXPENSES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_expenses_trip_date ON expenses(trip_id, date);
"#;

const CREATE_FRIEND_LINKS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_friend_links_from ON friend_links(from_user_id, status);
"#;

pub type Db = Arc<RwLock<Connection>>;

/// Open (or create) the application database and ensure the schema exists.
pub async fn init_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join("trips.db");
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute(CREATE_USERS_TABLE, ()).await?;
    conn.execute(CREATE_FRIEND_LINKS_TABLE, ()).await?;
    conn.execute(CREATE_TRIPS_TABLE, ()).await?;
    conn.execute(CREATE_TRIP_MEMBERS_TABLE, ()).await?;
    conn.execute(CREATE_TRIP_FAVORITES_TABLE, ()).await?;
    conn.execute(CREATE_TRIP_DETAILS_TABLE, ()).await?;
    conn.execute(CREATE_EXPENSES_TABLE, ()).await?;
    conn.execute(CREATE_EXPENSE_SPLITS_TABLE, ()).await?;
    conn.execute(CREATE_TRIP_MEMBERS_INDEX, ()).await?;
    conn.execute(CREATE_EXPENSES_INDEX, ()).await?;
    conn.execute(CREATE_FRIEND_LINKS_INDEX, ()).await?;

    Ok(Arc::new(RwLock::new(conn)))
}

/// Errors that can occur during transaction management
#[derive(Debug)]
pub enum TransactionError {
    Begin,
    Commit,
}

/// Execute a function within a database transaction, returning handler-compatible errors.
///
/// The closure must return a boxed future to handle lifetime issues with async closures.
pub async fn with_transaction<F, T, E>(db: &Db, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a Connection) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>,
    E: From<TransactionError>,
{
    // Acquire write lock for exclusive access during transaction
    let conn = db.write().await;

    conn.execute("BEGIN TRANSACTION", ())
        .await
        .map_err(|_| TransactionError::Begin)?;

    match f(&conn).await {
        Ok(result) => {
            conn.execute("COMMIT", ())
                .await
                .map_err(|_| TransactionError::Commit)?;
            Ok(result)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(e)
        }
    }
}
