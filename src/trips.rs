use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppState;
use crate::auth::{get_current_user, get_user_by_identifier, get_user_by_username};
use crate::constants::*;
use crate::database::Db;
use crate::details::load_details;
use crate::models::{
    CreateTripPayload, InvitePayload, JoinTripPayload, MemberActionPayload, PublicUser, Trip,
    TripMembers, TripPatch, TripSummary,
};
use crate::utils::{
    ErrorResponse, bad_request, db_error, db_error_with_context, forbidden, format_day,
    generate_trip_code, not_found, now_rfc3339, parse_day, validate_string_length,
};

fn extract_trip_from_row(row: &libsql::Row) -> Result<Trip, ErrorResponse> {
    let invalid = || db_error_with_context("invalid trip data");
    Ok(Trip {
        id: row.get(0).map_err(|_| invalid())?,
        trip_code: row.get(1).map_err(|_| invalid())?,
        name: row.get(2).map_err(|_| invalid())?,
        location: row.get(3).map_err(|_| invalid())?,
        start_date: row.get(4).map_err(|_| invalid())?,
        end_date: row.get(5).map_err(|_| invalid())?,
        owner_user_id: row.get(6).map_err(|_| invalid())?,
        visibility: row.get(7).map_err(|_| invalid())?,
    })
}

const TRIP_COLUMNS: &str =
    "id, trip_code, name, location, start_date, end_date, owner_user_id, visibility";

pub async fn get_trip_by_code(db: &Db, code: &str) -> Result<Option<Trip>, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            &format!("SELECT {} FROM trips WHERE trip_code = ?", TRIP_COLUMNS),
            [code],
        )
        .await
        .map_err(|_| db_error_with_context("failed to look up trip by code"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => Ok(Some(extract_trip_from_row(&row)?)),
        None => Ok(None),
    }
}

/// Current membership state of a user on a trip, if any.
pub async fn member_state(
    db: &Db,
    trip_id: &str,
    user_id: &str,
) -> Result<Option<String>, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT state FROM trip_members WHERE trip_id = ? AND user_id = ?",
            (trip_id, user_id),
        )
        .await
        .map_err(|_| db_error_with_context("failed to load membership state"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => Ok(Some(row.get(0).map_err(|_| db_error())?)),
        None => Ok(None),
    }
}

pub fn has_participant_standing(state: Option<&str>) -> bool {
    matches!(
        state,
        Some(MEMBER_STATE_PARTICIPANT) | Some(MEMBER_STATE_ADMIN)
    )
}

/// Guard: the user holds participant standing on the trip (admins included).
pub async fn require_participant(
    db: &Db,
    trip_id: &str,
    user_id: &str,
) -> Result<(), ErrorResponse> {
    let state = member_state(db, trip_id, user_id).await?;
    if has_participant_standing(state.as_deref()) {
        Ok(())
    } else {
        Err(forbidden())
    }
}

/// Guard: the user is an admin of the trip.
pub async fn require_admin(db: &Db, trip_id: &str, user_id: &str) -> Result<(), ErrorResponse> {
    match member_state(db, trip_id, user_id).await?.as_deref() {
        Some(MEMBER_STATE_ADMIN) => Ok(()),
        _ => Err(forbidden()),
    }
}

/// Whether some participant of the trip is an accepted friend of the user.
/// Trips are discoverable only through the social graph or an explicit
/// invite, never by search.
async fn has_participant_friend(
    db: &Db,
    trip_id: &str,
    user_id: &str,
) -> Result<bool, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT 1 FROM trip_members tm
             JOIN friend_links fl ON fl.to_user_id = tm.user_id
             WHERE tm.trip_id = ?
               AND tm.state IN (?, ?)
               AND fl.from_user_id = ?
               AND fl.status = ?
             LIMIT 1",
            (
                trip_id,
                MEMBER_STATE_PARTICIPANT,
                MEMBER_STATE_ADMIN,
                user_id,
                FRIEND_STATUS_ACCEPTED,
            ),
        )
        .await
        .map_err(|_| db_error_with_context("failed to check participant friendship"))?;

    Ok(rows.next().await.map_err(|_| db_error())?.is_some())
}

async fn is_favorited(db: &Db, trip_id: &str, user_id: &str) -> Result<bool, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT 1 FROM trip_favorites WHERE trip_id = ? AND user_id = ?",
            (trip_id, user_id),
        )
        .await
        .map_err(|_| db_error_with_context("failed to check favorite"))?;
    Ok(rows.next().await.map_err(|_| db_error())?.is_some())
}

fn validate_visibility(visibility: &str) -> Result<(), ErrorResponse> {
    match visibility {
        VISIBILITY_PRIVATE | VISIBILITY_FRIENDS => Ok(()),
        _ => Err(bad_request(format!("Invalid visibility: {}", visibility))),
    }
}

fn validate_date_order(start: &str, end: Option<&str>) -> Result<(), ErrorResponse> {
    if let Some(end) = end {
        let start_day = parse_day(start)?;
        let end_day = parse_day(end)?;
        if end_day < start_day {
            return Err(bad_request("End date cannot be before start date"));
        }
    }
    Ok(())
}

pub async fn create_trip(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateTripPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    validate_string_length(&payload.location, "Location", MAX_LOCATION_LENGTH)?;
    let location = payload.location.trim().to_string();

    // Unset name defaults to "<location> trip"
    let name = match payload.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            validate_string_length(name, "Trip name", MAX_TRIP_NAME_LENGTH)?;
            name.to_string()
        }
        _ => format!("{} trip", location),
    };

    let start_date = format_day(parse_day(&payload.start_date)?)?;
    let end_date = match payload.end_date.as_deref().map(str::trim) {
        Some(end) if !end.is_empty() => Some(format_day(parse_day(end)?)?),
        _ => None,
    };
    validate_date_order(&start_date, end_date.as_deref())?;

    let visibility = payload
        .visibility
        .unwrap_or_else(|| VISIBILITY_PRIVATE.to_string());
    validate_visibility(&visibility)?;

    // Collision-checked short shareable code
    let trip_code = loop {
        let candidate = generate_trip_code();
        if get_trip_by_code(&app_state.db, &candidate).await?.is_none() {
            break candidate;
        }
    };

    let trip = Trip {
        id: Uuid::new_v4().to_string(),
        trip_code,
        name,
        location,
        start_date,
        end_date,
        owner_user_id: current_user.id.clone(),
        visibility,
    };
    let now = now_rfc3339()?;

    let conn = app_state.db.write().await;

    conn.execute("BEGIN TRANSACTION", ())
        .await
        .map_err(|_| db_error_with_context("failed to begin transaction"))?;

    // Creator becomes owner and admin in the same transaction
    let tx_result: Result<(), libsql::Error> = async {
        conn.execute(
            "INSERT INTO trips (id, trip_code, name, location, start_date, end_date, owner_user_id, visibility, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                trip.id.as_str(),
                trip.trip_code.as_str(),
                trip.name.as_str(),
                trip.location.as_str(),
                trip.start_date.as_str(),
                trip.end_date.as_deref(),
                trip.owner_user_id.as_str(),
                trip.visibility.as_str(),
                now.as_str(),
            ),
        )
        .await?;

        conn.execute(
            "INSERT INTO trip_members (trip_id, user_id, state, updated_at) VALUES (?, ?, ?, ?)",
            (
                trip.id.as_str(),
                current_user.id.as_str(),
                MEMBER_STATE_ADMIN,
                now.as_str(),
            ),
        )
        .await?;

        Ok(())
    }
    .await;

    match tx_result {
        Ok(_) => {
            conn.execute("COMMIT", ())
                .await
                .map_err(|_| db_error_with_context("failed to commit transaction"))?;
        }
        Err(_) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            return Err(db_error_with_context("trip creation failed"));
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Trip created", "trip": trip })),
    ))
}

pub async fn list_trips(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let conn = app_state.db.read().await;
    let mut rows = conn
        .query(
            "SELECT t.trip_code, t.name, t.location, t.start_date, t.end_date,
                    CASE WHEN f.user_id IS NULL THEN 0 ELSE 1 END
             FROM trips t
             JOIN trip_members tm ON tm.trip_id = t.id AND tm.user_id = ? AND tm.state IN (?, ?)
             LEFT JOIN trip_favorites f ON f.trip_id = t.id AND f.user_id = ?
             ORDER BY t.start_date DESC",
            (
                current_user.id.as_str(),
                MEMBER_STATE_PARTICIPANT,
                MEMBER_STATE_ADMIN,
                current_user.id.as_str(),
            ),
        )
        .await
        .map_err(|_| db_error_with_context("failed to list trips"))?;

    let mut trips = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let favorited: i64 = row.get(5).map_err(|_| db_error())?;
        trips.push(TripSummary {
            trip_code: row.get(0).map_err(|_| db_error())?,
            name: row.get(1).map_err(|_| db_error())?,
            location: row.get(2).map_err(|_| db_error())?,
            start_date: row.get(3).map_err(|_| db_error())?,
            end_date: row.get(4).map_err(|_| db_error())?,
            favorited: favorited != 0,
        });
    }

    Ok((StatusCode::OK, Json(json!({ "trips": trips }))))
}

/// Full member roster of a trip, bucketed by membership state.
async fn load_members(db: &Db, trip_id: &str) -> Result<TripMembers, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT u.id, u.username, tm.state
             FROM trip_members tm JOIN users u ON u.id = tm.user_id
             WHERE tm.trip_id = ?
             ORDER BY u.username",
            [trip_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to load trip members"))?;

    let mut members = TripMembers {
        participants: Vec::new(),
        admins: Vec::new(),
        invited: Vec::new(),
        join_requests: Vec::new(),
    };

    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let id: String = row.get(0).map_err(|_| db_error())?;
        let username: String = row.get(1).map_err(|_| db_error())?;
        let state: String = row.get(2).map_err(|_| db_error())?;
        let user = PublicUser { id, username };

        match state.as_str() {
            MEMBER_STATE_ADMIN => {
                members.admins.push(user.clone());
                members.participants.push(user);
            }
            MEMBER_STATE_PARTICIPANT => members.participants.push(user),
            MEMBER_STATE_INVITED => members.invited.push(user),
            MEMBER_STATE_REQUESTED => members.join_requests.push(user),
            _ => {}
        }
    }

    Ok(members)
}

pub async fn get_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_participant(&app_state.db, &trip.id, &current_user.id).await?;

    let members = load_members(&app_state.db, &trip.id).await?;
    let details = load_details(&app_state.db, &trip.id).await?;
    let favorited = is_favorited(&app_state.db, &trip.id, &current_user.id).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "trip": trip,
            "members": members,
            "details": details,
            "favorited": favorited,
        })),
    ))
}

/// Explicit merge of a partial update onto a trip; absent fields stay as
/// they are, and the resulting date ordering is re-validated.
pub fn apply_trip_patch(trip: &Trip, patch: TripPatch) -> Result<Trip, ErrorResponse> {
    let mut updated = trip.clone();

    if let Some(name) = patch.name.as_deref().map(str::trim) {
        validate_string_length(name, "Trip name", MAX_TRIP_NAME_LENGTH)?;
        updated.name = name.to_string();
    }
    if let Some(location) = patch.location.as_deref().map(str::trim) {
        validate_string_length(location, "Location", MAX_LOCATION_LENGTH)?;
        updated.location = location.to_string();
    }
    if let Some(start) = patch.start_date.as_deref().map(str::trim) {
        updated.start_date = format_day(parse_day(start)?)?;
    }
    if let Some(end) = patch.end_date.as_deref().map(str::trim) {
        // Empty end date makes the trip ongoing again
        updated.end_date = if end.is_empty() {
            None
        } else {
            Some(format_day(parse_day(end)?)?)
        };
    }
    if let Some(visibility) = patch.visibility.as_deref().map(str::trim) {
        validate_visibility(visibility)?;
        updated.visibility = visibility.to_string();
    }

    validate_date_order(&updated.start_date, updated.end_date.as_deref())?;
    Ok(updated)
}

pub async fn update_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
    Json(patch): Json<TripPatch>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_admin(&app_state.db, &trip.id, &current_user.id).await?;

    let updated = apply_trip_patch(&trip, patch)?;

    let conn = app_state.db.write().await;
    conn.execute(
        "UPDATE trips SET name = ?, location = ?, start_date = ?, end_date = ?, visibility = ? WHERE id = ?",
        (
            updated.name.as_str(),
            updated.location.as_str(),
            updated.start_date.as_str(),
            updated.end_date.as_deref(),
            updated.visibility.as_str(),
            updated.id.as_str(),
        ),
    )
    .await
    .map_err(|_| db_error_with_context("trip update failed"))?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Trip updated", "trip": updated })),
    ))
}

async fn set_member_state(
    db: &Db,
    trip_id: &str,
    user_id: &str,
    state: &str,
) -> Result<(), ErrorResponse> {
    let now = now_rfc3339()?;
    let conn = db.write().await;
    conn.execute(
        "INSERT INTO trip_members (trip_id, user_id, state, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (trip_id, user_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
        (trip_id, user_id, state, now.as_str()),
    )
    .await
    .map_err(|_| db_error_with_context("membership update failed"))?;
    Ok(())
}

async fn remove_membership(db: &Db, trip_id: &str, user_id: &str) -> Result<bool, ErrorResponse> {
    let conn = db.write().await;
    let removed = conn
        .execute(
            "DELETE FROM trip_members WHERE trip_id = ? AND user_id = ?",
            (trip_id, user_id),
        )
        .await
        .map_err(|_| db_error_with_context("membership removal failed"))?;
    Ok(removed > 0)
}

/// Join by trip code. Invited users and friends of participants on a
/// friends-visible trip join directly; friends of participants on a private
/// trip queue a join request; everyone else is denied.
pub async fn join_trip(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<JoinTripPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, payload.trip_code.trim())
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;

    let state = member_state(&app_state.db, &trip.id, &current_user.id).await?;
    match state.as_deref() {
        Some(MEMBER_STATE_PARTICIPANT) | Some(MEMBER_STATE_ADMIN) => {
            return Err(bad_request("Already a participant of this trip"));
        }
        Some(MEMBER_STATE_REQUESTED) => {
            return Err(bad_request("Join request already pending"));
        }
        Some(MEMBER_STATE_INVITED) => {
            // Consuming the invite clears it; one row per (trip, user)
            set_member_state(
                &app_state.db,
                &trip.id,
                &current_user.id,
                MEMBER_STATE_PARTICIPANT,
            )
            .await?;
            return Ok((
                StatusCode::OK,
                Json(json!({ "message": "Joined trip", "trip_code": trip.trip_code })),
            ));
        }
        _ => {}
    }

    let knows_participant =
        has_participant_friend(&app_state.db, &trip.id, &current_user.id).await?;

    if knows_participant && trip.visibility == VISIBILITY_FRIENDS {
        set_member_state(
            &app_state.db,
            &trip.id,
            &current_user.id,
            MEMBER_STATE_PARTICIPANT,
        )
        .await?;
        Ok((
            StatusCode::OK,
            Json(json!({ "message": "Joined trip", "trip_code": trip.trip_code })),
        ))
    } else if knows_participant {
        set_member_state(
            &app_state.db,
            &trip.id,
            &current_user.id,
            MEMBER_STATE_REQUESTED,
        )
        .await?;
        Ok((
            StatusCode::OK,
            Json(json!({ "message": "Join request sent", "trip_code": trip.trip_code })),
        ))
    } else {
        Err(forbidden())
    }
}

/// Participant-initiated invite by username or email.
pub async fn invite_to_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
    Json(payload): Json<InvitePayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_participant(&app_state.db, &trip.id, &current_user.id).await?;

    let target = get_user_by_identifier(&app_state.db, payload.identifier.trim())
        .await?
        .ok_or_else(|| not_found("User not found"))?;

    match member_state(&app_state.db, &trip.id, &target.id).await?.as_deref() {
        Some(MEMBER_STATE_PARTICIPANT) | Some(MEMBER_STATE_ADMIN) => {
            return Err(bad_request("User is already a participant"));
        }
        Some(MEMBER_STATE_INVITED) => {
            return Err(bad_request("User is already invited"));
        }
        Some(MEMBER_STATE_REQUESTED) => {
            return Err(bad_request(
                "User has already requested to join; accept the request instead",
            ));
        }
        _ => {}
    }

    set_member_state(&app_state.db, &trip.id, &target.id, MEMBER_STATE_INVITED).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Invitation sent" })),
    ))
}

/// Admin accepts a pending join request.
pub async fn accept_join_request(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
    Json(payload): Json<MemberActionPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_admin(&app_state.db, &trip.id, &current_user.id).await?;

    let target = get_user_by_username(&app_state.db, payload.username.trim())
        .await?
        .ok_or_else(|| not_found("User not found"))?;

    match member_state(&app_state.db, &trip.id, &target.id).await?.as_deref() {
        Some(MEMBER_STATE_REQUESTED) => {}
        _ => return Err(not_found("Join request not found")),
    }

    set_member_state(
        &app_state.db,
        &trip.id,
        &target.id,
        MEMBER_STATE_PARTICIPANT,
    )
    .await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Join request accepted" })),
    ))
}

/// Admin removes a user from the trip, whatever their membership state.
pub async fn remove_member(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
    Json(payload): Json<MemberActionPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_admin(&app_state.db, &trip.id, &current_user.id).await?;

    let target = get_user_by_username(&app_state.db, payload.username.trim())
        .await?
        .ok_or_else(|| not_found("User not found"))?;

    if !remove_membership(&app_state.db, &trip.id, &target.id).await? {
        return Err(not_found("User has no membership in this trip"));
    }

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "User removed from trip" })),
    ))
}

/// Self-initiated leave; same removal as an admin removal, only the guard
/// differs.
pub async fn leave_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;

    if !remove_membership(&app_state.db, &trip.id, &current_user.id).await? {
        return Err(not_found("No membership in this trip"));
    }

    Ok((StatusCode::OK, Json(json!({ "message": "Left trip" }))))
}

/// Idempotent favorite toggle; participant standing required.
pub async fn set_favorite(
    State(app_state): State<AppState>,
    session: Session,
    Path((code, value)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let favorited = match value.as_str() {
        "true" => true,
        "false" => false,
        _ => return Err(bad_request("Favorite value must be 'true' or 'false'")),
    };

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_participant(&app_state.db, &trip.id, &current_user.id).await?;

    let conn = app_state.db.write().await;
    if favorited {
        conn.execute(
            "INSERT OR IGNORE INTO trip_favorites (trip_id, user_id) VALUES (?, ?)",
            (trip.id.as_str(), current_user.id.as_str()),
        )
        .await
        .map_err(|_| db_error_with_context("favorite insert failed"))?;
    } else {
        conn.execute(
            "DELETE FROM trip_favorites WHERE trip_id = ? AND user_id = ?",
            (trip.id.as_str(), current_user.id.as_str()),
        )
        .await
        .map_err(|_| db_error_with_context("favorite removal failed"))?;
    }

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Favorite updated", "favorited": favorited })),
    ))
}
