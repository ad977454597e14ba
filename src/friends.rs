use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppState;
use crate::auth::{get_current_user, get_user_by_username};
use crate::constants::*;
use crate::database::Db;
use crate::models::{FriendActionPayload, FriendListsResponse, PublicUser};
use crate::utils::{
    ErrorResponse, api_error, bad_request, db_error, db_error_with_context, not_found,
    now_rfc3339, validate_string_length,
};

/// The three friendship views of a user: accepted links, requests received,
/// requests sent. Directions are recovered from `requester_user_id` on the
/// pending rows.
pub async fn load_friend_lists(
    db: &Db,
    user_id: &str,
) -> Result<FriendListsResponse, ErrorResponse> {
    let conn = db.read().await;

    let mut lists = FriendListsResponse {
        friends: Vec::new(),
        pending_requests: Vec::new(),
        sent_requests: Vec::new(),
    };

    let mut rows = conn
        .query(
            "SELECT u.id, u.username, fl.status, fl.requester_user_id
             FROM friend_links fl JOIN users u ON u.id = fl.to_user_id
             WHERE fl.from_user_id = ?
             ORDER BY u.username",
            [user_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to load friend lists"))?;

    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let id: String = row.get(0).map_err(|_| db_error())?;
        let username: String = row.get(1).map_err(|_| db_error())?;
        let status: String = row.get(2).map_err(|_| db_error())?;
        let requester: String = row.get(3).map_err(|_| db_error())?;

        let user = PublicUser { id, username };
        if status == FRIEND_STATUS_ACCEPTED {
            lists.friends.push(user);
        } else if requester == user_id {
            lists.sent_requests.push(user);
        } else {
            lists.pending_requests.push(user);
        }
    }

    Ok(lists)
}

/// Status and requester of the directed link from `from_id` to `to_id`.
async fn load_link(
    db: &Db,
    from_id: &str,
    to_id: &str,
) -> Result<Option<(String, String)>, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT status, requester_user_id FROM friend_links WHERE from_user_id = ? AND to_user_id = ?",
            (from_id, to_id),
        )
        .await
        .map_err(|_| db_error_with_context("failed to load friend link"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => {
            let status: String = row.get(0).map_err(|_| db_error())?;
            let requester: String = row.get(1).map_err(|_| db_error())?;
            Ok(Some((status, requester)))
        }
        None => Ok(None),
    }
}

pub async fn list_friends(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<FriendListsResponse>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;
    let lists = load_friend_lists(&app_state.db, &current_user.id).await?;
    Ok((StatusCode::OK, Json(lists)))
}

pub async fn send_friend_request(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<FriendActionPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;
    let target_name = payload.username.trim();

    validate_string_length(target_name, "Username", MAX_USERNAME_LENGTH)?;
    if target_name == current_user.username {
        return Err(bad_request("Cannot send friend request to yourself"));
    }

    let friend = get_user_by_username(&app_state.db, target_name)
        .await?
        .ok_or_else(|| not_found("User not found"))?;

    let now = now_rfc3339()?;
    let a_to_b_id = Uuid::new_v4().to_string();
    let b_to_a_id = Uuid::new_v4().to_string();

    let conn = app_state.db.write().await;

    conn.execute("BEGIN TRANSACTION", ())
        .await
        .map_err(|_| db_error_with_context("failed to begin transaction"))?;

    // Inner result to distinguish an existing link from other DB errors
    let tx_result: Result<(), String> = async {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM friend_links WHERE from_user_id = ? AND to_user_id = ?",
                (current_user.id.as_str(), friend.id.as_str()),
            )
            .await
            .map_err(|e| e.to_string())?;

        if let Some(row) = rows.next().await.map_err(|e| e.to_string())? {
            let count: i64 = row.get(0).map_err(|e| e.to_string())?;
            if count > 0 {
                return Err("LINK_EXISTS".to_string());
            }
        }

        for (id, from_id, to_id) in [
            (&a_to_b_id, &current_user.id, &friend.id),
            (&b_to_a_id, &friend.id, &current_user.id),
        ] {
            conn.execute(
                "INSERT INTO friend_links (id, from_user_id, to_user_id, status, requester_user_id, requested_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    id.as_str(),
                    from_id.as_str(),
                    to_id.as_str(),
                    FRIEND_STATUS_PENDING,
                    current_user.id.as_str(),
                    now.as_str(),
                    now.as_str(),
                ),
            )
            .await
            .map_err(|e| e.to_string())?;
        }

        Ok(())
    }
    .await;

    match tx_result {
        Ok(_) => {
            conn.execute("COMMIT", ())
                .await
                .map_err(|_| db_error_with_context("failed to commit transaction"))?;
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            drop(conn);
            if e == "LINK_EXISTS" {
                return Err(api_error(
                    StatusCode::CONFLICT,
                    "Friend request or friendship already exists",
                ));
            }
            return Err(db_error_with_context("friend request insert failed"));
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Friend request sent" })),
    ))
}

pub async fn accept_friend(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<FriendActionPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let friend = get_user_by_username(&app_state.db, payload.username.trim())
        .await?
        .ok_or_else(|| not_found("User not found"))?;

    let (status, requester) = load_link(&app_state.db, &current_user.id, &friend.id)
        .await?
        .ok_or_else(|| not_found("Friend request not found"))?;

    // Only the recipient of a pending request can accept
    if status != FRIEND_STATUS_PENDING || requester == current_user.id {
        return Err(not_found("Friend request not found"));
    }

    let now = now_rfc3339()?;
    accept_link_pair(&app_state.db, &current_user.id, &friend.id, &now).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Friend request accepted" })),
    ))
}

pub async fn decline_friend(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<FriendActionPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let friend = get_user_by_username(&app_state.db, payload.username.trim())
        .await?
        .ok_or_else(|| not_found("User not found"))?;

    let (status, requester) = load_link(&app_state.db, &current_user.id, &friend.id)
        .await?
        .ok_or_else(|| not_found("Friend request not found"))?;

    if status != FRIEND_STATUS_PENDING || requester == current_user.id {
        return Err(not_found("Friend request not found"));
    }

    // Declining removes the request from both sides; a later re-request
    // starts fresh
    delete_link_pair(&app_state.db, &current_user.id, &friend.id).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Friend request declined" })),
    ))
}

pub async fn remove_friend(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<FriendActionPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let friend = get_user_by_username(&app_state.db, payload.username.trim())
        .await?
        .ok_or_else(|| not_found("User not found"))?;

    let (status, _requester) = load_link(&app_state.db, &current_user.id, &friend.id)
        .await?
        .ok_or_else(|| not_found("Friendship not found"))?;

    if status != FRIEND_STATUS_ACCEPTED {
        return Err(not_found("Friendship not found"));
    }

    delete_link_pair(&app_state.db, &current_user.id, &friend.id).await?;

    Ok((StatusCode::OK, Json(json!({ "message": "Friend removed" }))))
}

/// Flip both directed rows of a pending link to accepted inside one
/// transaction, keeping the graph symmetric.
async fn accept_link_pair(
    db: &Db,
    user_a: &str,
    user_b: &str,
    now: &str,
) -> Result<(), ErrorResponse> {
    let conn = db.write().await;

    conn.execute("BEGIN TRANSACTION", ())
        .await
        .map_err(|_| db_error_with_context("failed to begin transaction"))?;

    let tx_result: Result<(), libsql::Error> = async {
        for (from_id, to_id) in [(user_a, user_b), (user_b, user_a)] {
            conn.execute(
                "UPDATE friend_links SET status = ?, updated_at = ? WHERE from_user_id = ? AND to_user_id = ?",
                (FRIEND_STATUS_ACCEPTED, now, from_id, to_id),
            )
            .await?;
        }
        Ok(())
    }
    .await;

    finish_link_tx(&conn, tx_result).await
}

/// Delete both directed rows of a link inside one transaction.
async fn delete_link_pair(db: &Db, user_a: &str, user_b: &str) -> Result<(), ErrorResponse> {
    let conn = db.write().await;

    conn.execute("BEGIN TRANSACTION", ())
        .await
        .map_err(|_| db_error_with_context("failed to begin transaction"))?;

    let tx_result: Result<(), libsql::Error> = async {
        for (from_id, to_id) in [(user_a, user_b), (user_b, user_a)] {
            conn.execute(
                "DELETE FROM friend_links WHERE from_user_id = ? AND to_user_id = ?",
                (from_id, to_id),
            )
            .await?;
        }
        Ok(())
    }
    .await;

    finish_link_tx(&conn, tx_result).await
}

async fn finish_link_tx(
    conn: &libsql::Connection,
    tx_result: Result<(), libsql::Error>,
) -> Result<(), ErrorResponse> {
    match tx_result {
        Ok(_) => {
            conn.execute("COMMIT", ())
                .await
                .map_err(|_| db_error_with_context("failed to commit transaction"))?;
            Ok(())
        }
        Err(_) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(db_error_with_context("friend link update failed"))
        }
    }
}
