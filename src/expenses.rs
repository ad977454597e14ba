use std::collections::{HashMap, HashSet};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppState;
use crate::auth::{get_current_user, get_user_by_username};
use crate::constants::*;
use crate::database::{Db, TransactionError, with_transaction};
use crate::models::{CreateExpensePayload, EditExpensePayload, ExpenseEntry, PublicUser, Trip};
use crate::trips::{get_trip_by_code, has_participant_standing, member_state, require_admin, require_participant};
use crate::utils::{
    ErrorResponse, bad_request, db_error, db_error_with_context, format_day, not_found,
    now_rfc3339, parse_day, validate_string_length,
};

#[derive(Debug)]
enum ExpenseWriteError {
    Transaction(TransactionError),
    Db(&'static str),
}

impl From<TransactionError> for ExpenseWriteError {
    fn from(value: TransactionError) -> Self {
        Self::Transaction(value)
    }
}

impl From<ExpenseWriteError> for ErrorResponse {
    fn from(value: ExpenseWriteError) -> Self {
        match value {
            ExpenseWriteError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            ExpenseWriteError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            ExpenseWriteError::Db(ctx) => db_error_with_context(ctx),
        }
    }
}

/// Validated expense fields shared by create and edit.
struct ExpenseInput {
    payer: PublicUser,
    split_between: Vec<PublicUser>,
    amount: f64,
    description: String,
    date: String,
}

/// Resolve usernames and check every rule: finite positive amount, valid
/// date on or after the trip start, non-empty duplicate-free split, and
/// participant standing for the payer and every split member. The payer
/// need not appear in its own split.
async fn validate_expense_input(
    db: &Db,
    trip: &Trip,
    paid_by: &str,
    split_between: &[String],
    amount: f64,
    description: Option<String>,
    date: &str,
) -> Result<ExpenseInput, ErrorResponse> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(bad_request("Invalid amount. Must be a positive number"));
    }

    let description = description.unwrap_or_default().trim().to_string();
    if !description.is_empty() && description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(bad_request(format!(
            "Description must be less than {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }

    let day = parse_day(date)?;
    if day < parse_day(&trip.start_date)? {
        return Err(bad_request("Expense date cannot be before trip start date"));
    }
    let date = format_day(day)?;

    if split_between.is_empty() {
        return Err(bad_request("Split must include at least one user"));
    }

    let payer = get_user_by_username(db, paid_by.trim())
        .await?
        .ok_or_else(|| bad_request("User not found"))?;

    let mut seen_ids = HashSet::new();
    let mut split = Vec::new();
    for username in split_between {
        let user = get_user_by_username(db, username.trim())
            .await?
            .ok_or_else(|| bad_request("Invalid user in split"))?;
        if !seen_ids.insert(user.id.clone()) {
            return Err(bad_request(format!("Duplicate user in split: {}", user.username)));
        }
        split.push(user);
    }

    // Everyone involved must hold participant standing on the trip
    for user in std::iter::once(&payer).chain(split.iter()) {
        let state = member_state(db, &trip.id, &user.id).await?;
        if !has_participant_standing(state.as_deref()) {
            return Err(bad_request(
                "All users involved must be participants of the trip",
            ));
        }
    }

    Ok(ExpenseInput {
        payer,
        split_between: split,
        amount,
        description,
        date,
    })
}

/// Attach resolved split members to expense rows, preserving row order.
async fn collect_entries(
    rows: &mut libsql::Rows,
    split_rows: &mut libsql::Rows,
) -> Result<Vec<ExpenseEntry>, ErrorResponse> {
    let mut splits: HashMap<String, Vec<PublicUser>> = HashMap::new();
    while let Some(row) = split_rows.next().await.map_err(|_| db_error())? {
        let expense_id: String = row.get(0).map_err(|_| db_error())?;
        let id: String = row.get(1).map_err(|_| db_error())?;
        let username: String = row.get(2).map_err(|_| db_error())?;
        splits
            .entry(expense_id)
            .or_default()
            .push(PublicUser { id, username });
    }

    let mut entries = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let id: String = row.get(0).map_err(|_| db_error())?;
        let trip_code: String = row.get(1).map_err(|_| db_error())?;
        let trip_name: String = row.get(2).map_err(|_| db_error())?;
        let payer_id: String = row.get(3).map_err(|_| db_error())?;
        let payer_username: String = row.get(4).map_err(|_| db_error())?;
        let amount: f64 = row.get(5).map_err(|_| db_error())?;
        let description: String = row.get(6).map_err(|_| db_error())?;
        let date: String = row.get(7).map_err(|_| db_error())?;

        let split_between = splits.remove(&id).unwrap_or_default();
        entries.push(ExpenseEntry {
            id,
            trip_code,
            trip_name,
            paid_by: PublicUser {
                id: payer_id,
                username: payer_username,
            },
            amount,
            description,
            date,
            split_between,
        });
    }

    Ok(entries)
}

/// All expenses of one trip, newest first.
pub async fn load_expenses_for_trip(
    db: &Db,
    trip_id: &str,
) -> Result<Vec<ExpenseEntry>, ErrorResponse> {
    let conn = db.read().await;

    let mut rows = conn
        .query(
            "SELECT e.id, t.trip_code, t.name, e.payer_user_id, u.username, e.amount, e.description, e.date
             FROM expenses e
             JOIN trips t ON t.id = e.trip_id
             JOIN users u ON u.id = e.payer_user_id
             WHERE e.trip_id = ?
             ORDER BY e.date DESC, e.created_at DESC",
            [trip_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to load trip expenses"))?;

    let mut split_rows = conn
        .query(
            "SELECT es.expense_id, u.id, u.username
             FROM expense_splits es
             JOIN expenses e ON e.id = es.expense_id
             JOIN users u ON u.id = es.user_id
             WHERE e.trip_id = ?
             ORDER BY u.username",
            [trip_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to load expense splits"))?;

    collect_entries(&mut rows, &mut split_rows).await
}

/// All expenses visible to a user: every expense of every trip where the
/// user holds participant standing.
pub async fn load_expenses_for_user(
    db: &Db,
    user_id: &str,
) -> Result<Vec<ExpenseEntry>, ErrorResponse> {
    let conn = db.read().await;

    let mut rows = conn
        .query(
            "SELECT e.id, t.trip_code, t.name, e.payer_user_id, u.username, e.amount, e.description, e.date
             FROM expenses e
             JOIN trips t ON t.id = e.trip_id
             JOIN users u ON u.id = e.payer_user_id
             WHERE e.trip_id IN (SELECT trip_id FROM trip_members WHERE user_id = ? AND state IN (?, ?))
             ORDER BY e.date DESC, e.created_at DESC",
            (user_id, MEMBER_STATE_PARTICIPANT, MEMBER_STATE_ADMIN),
        )
        .await
        .map_err(|_| db_error_with_context("failed to load user expenses"))?;

    let mut split_rows = conn
        .query(
            "SELECT es.expense_id, u.id, u.username
             FROM expense_splits es
             JOIN expenses e ON e.id = es.expense_id
             JOIN users u ON u.id = es.user_id
             WHERE e.trip_id IN (SELECT trip_id FROM trip_members WHERE user_id = ? AND state IN (?, ?))
             ORDER BY u.username",
            (user_id, MEMBER_STATE_PARTICIPANT, MEMBER_STATE_ADMIN),
        )
        .await
        .map_err(|_| db_error_with_context("failed to load expense splits"))?;

    collect_entries(&mut rows, &mut split_rows).await
}

pub async fn list_expenses(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_participant(&app_state.db, &trip.id, &current_user.id).await?;

    let expenses = load_expenses_for_trip(&app_state.db, &trip.id).await?;
    Ok((StatusCode::OK, Json(json!({ "expenses": expenses }))))
}

/// Any participant can record an expense for the trip.
pub async fn add_expense(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
    Json(payload): Json<CreateExpensePayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_participant(&app_state.db, &trip.id, &current_user.id).await?;

    let input = validate_expense_input(
        &app_state.db,
        &trip,
        &payload.paid_by,
        &payload.split_between,
        payload.amount,
        payload.description,
        &payload.date,
    )
    .await?;

    let expense_id = Uuid::new_v4().to_string();
    let now = now_rfc3339()?;

    let trip_id = trip.id.clone();
    let insert_id = expense_id.clone();
    with_transaction::<_, (), ExpenseWriteError>(&app_state.db, move |conn| {
        Box::pin(async move {
            conn.execute(
                "INSERT INTO expenses (id, trip_id, payer_user_id, amount, description, date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    insert_id.as_str(),
                    trip_id.as_str(),
                    input.payer.id.as_str(),
                    input.amount,
                    input.description.as_str(),
                    input.date.as_str(),
                    now.as_str(),
                    now.as_str(),
                ),
            )
            .await
            .map_err(|_| ExpenseWriteError::Db("expense insert failed"))?;

            for user in &input.split_between {
                conn.execute(
                    "INSERT INTO expense_splits (expense_id, user_id) VALUES (?, ?)",
                    (insert_id.as_str(), user.id.as_str()),
                )
                .await
                .map_err(|_| ExpenseWriteError::Db("expense split insert failed"))?;
            }

            Ok(())
        })
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Expense added successfully", "expense_id": expense_id })),
    ))
}

/// Admin-only full-record replacement: payer, split, amount, description and
/// date change as a unit.
pub async fn edit_expense(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
    Json(payload): Json<EditExpensePayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_admin(&app_state.db, &trip.id, &current_user.id).await?;

    {
        let conn = app_state.db.read().await;
        let mut rows = conn
            .query(
                "SELECT id FROM expenses WHERE id = ? AND trip_id = ?",
                (payload.expense_id.as_str(), trip.id.as_str()),
            )
            .await
            .map_err(|_| db_error_with_context("failed to look up expense"))?;
        if rows.next().await.map_err(|_| db_error())?.is_none() {
            return Err(not_found("Expense not found"));
        }
    }

    let input = validate_expense_input(
        &app_state.db,
        &trip,
        &payload.paid_by,
        &payload.split_between,
        payload.amount,
        payload.description,
        &payload.date,
    )
    .await?;

    let now = now_rfc3339()?;
    let expense_id = payload.expense_id.clone();

    with_transaction::<_, (), ExpenseWriteError>(&app_state.db, move |conn| {
        Box::pin(async move {
            conn.execute(
                "UPDATE expenses SET payer_user_id = ?, amount = ?, description = ?, date = ?, updated_at = ? WHERE id = ?",
                (
                    input.payer.id.as_str(),
                    input.amount,
                    input.description.as_str(),
                    input.date.as_str(),
                    now.as_str(),
                    expense_id.as_str(),
                ),
            )
            .await
            .map_err(|_| ExpenseWriteError::Db("expense update failed"))?;

            conn.execute(
                "DELETE FROM expense_splits WHERE expense_id = ?",
                [expense_id.as_str()],
            )
            .await
            .map_err(|_| ExpenseWriteError::Db("expense split delete failed"))?;

            for user in &input.split_between {
                conn.execute(
                    "INSERT INTO expense_splits (expense_id, user_id) VALUES (?, ?)",
                    (expense_id.as_str(), user.id.as_str()),
                )
                .await
                .map_err(|_| ExpenseWriteError::Db("expense split insert failed"))?;
            }

            Ok(())
        })
    })
    .await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Expense updated successfully" })),
    ))
}
