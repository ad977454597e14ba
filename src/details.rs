use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppState;
use crate::auth::get_current_user;
use crate::constants::*;
use crate::database::Db;
use crate::models::{EditDetailPayload, NewDetailPayload, Trip, TripDetail};
use crate::trips::{get_trip_by_code, require_admin, require_participant};
use crate::utils::{
    ErrorResponse, bad_request, db_error, db_error_with_context, format_day, not_found,
    parse_day, validate_string_length,
};

fn decode_list(raw: &str) -> Result<Vec<String>, ErrorResponse> {
    serde_json::from_str(raw).map_err(|_| db_error_with_context("invalid detail list data"))
}

fn encode_list(list: &[String]) -> Result<String, ErrorResponse> {
    serde_json::to_string(list).map_err(|_| db_error_with_context("detail list encoding failed"))
}

/// All detail entries of a trip, ordered by day.
pub async fn load_details(db: &Db, trip_id: &str) -> Result<Vec<TripDetail>, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT date, location, notes, activities FROM trip_details WHERE trip_id = ? ORDER BY date",
            [trip_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to load trip details"))?;

    let mut details = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let date: String = row.get(0).map_err(|_| db_error())?;
        let location: String = row.get(1).map_err(|_| db_error())?;
        let notes: String = row.get(2).map_err(|_| db_error())?;
        let activities: String = row.get(3).map_err(|_| db_error())?;
        details.push(TripDetail {
            date,
            location,
            notes: decode_list(&notes)?,
            activities: decode_list(&activities)?,
        });
    }
    Ok(details)
}

/// The detail entry for one calendar day, with its row id.
async fn load_detail_for_day(
    db: &Db,
    trip_id: &str,
    day: &str,
) -> Result<Option<(String, TripDetail)>, ErrorResponse> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, date, location, notes, activities FROM trip_details WHERE trip_id = ? AND date = ?",
            (trip_id, day),
        )
        .await
        .map_err(|_| db_error_with_context("failed to load detail entry"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => {
            let id: String = row.get(0).map_err(|_| db_error())?;
            let date: String = row.get(1).map_err(|_| db_error())?;
            let location: String = row.get(2).map_err(|_| db_error())?;
            let notes: String = row.get(3).map_err(|_| db_error())?;
            let activities: String = row.get(4).map_err(|_| db_error())?;
            Ok(Some((
                id,
                TripDetail {
                    date,
                    location,
                    notes: decode_list(&notes)?,
                    activities: decode_list(&activities)?,
                },
            )))
        }
        None => Ok(None),
    }
}

/// The submitted day must fall inside the trip's date window; an ongoing
/// trip has no upper bound.
fn validate_day_in_trip(trip: &Trip, day: time::Date) -> Result<(), ErrorResponse> {
    let start = parse_day(&trip.start_date)?;
    if day < start {
        return Err(bad_request("Detail date cannot be before trip start date"));
    }
    if let Some(end) = trip.end_date.as_deref() {
        if day > parse_day(end)? {
            return Err(bad_request("Detail date cannot be after trip end date"));
        }
    }
    Ok(())
}

/// Submit a day's itinerary entry. An existing entry for the same calendar
/// day is merged: notes and activities are appended, the location is
/// overwritten only by a non-empty value. A new entry falls back to the
/// trip's location when none is supplied.
pub async fn new_detail(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
    Json(payload): Json<NewDetailPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_admin(&app_state.db, &trip.id, &current_user.id).await?;

    let day = parse_day(&payload.date)?;
    validate_day_in_trip(&trip, day)?;
    let day = format_day(day)?;

    let note = match payload.note.as_deref().map(str::trim) {
        Some(note) if !note.is_empty() => {
            validate_string_length(note, "Note", MAX_NOTE_LENGTH)?;
            Some(note.to_string())
        }
        _ => None,
    };

    let mut activities = Vec::new();
    for activity in payload.activities.unwrap_or_default() {
        let activity = activity.trim();
        if activity.is_empty() {
            continue;
        }
        validate_string_length(activity, "Activity", MAX_NOTE_LENGTH)?;
        activities.push(activity.to_string());
    }

    let location = match payload.location.as_deref().map(str::trim) {
        Some(location) if !location.is_empty() => {
            validate_string_length(location, "Location", MAX_LOCATION_LENGTH)?;
            Some(location.to_string())
        }
        _ => None,
    };

    let detail = match load_detail_for_day(&app_state.db, &trip.id, &day).await? {
        Some((id, mut existing)) => {
            // Merge: append, never replace
            if let Some(note) = note {
                existing.notes.push(note);
            }
            existing.activities.extend(activities);
            if let Some(location) = location {
                existing.location = location;
            }

            let conn = app_state.db.write().await;
            conn.execute(
                "UPDATE trip_details SET location = ?, notes = ?, activities = ? WHERE id = ?",
                (
                    existing.location.as_str(),
                    encode_list(&existing.notes)?.as_str(),
                    encode_list(&existing.activities)?.as_str(),
                    id.as_str(),
                ),
            )
            .await
            .map_err(|_| db_error_with_context("detail merge failed"))?;

            existing
        }
        None => {
            let detail = TripDetail {
                date: day.clone(),
                location: location.unwrap_or_else(|| trip.location.clone()),
                notes: note.into_iter().collect(),
                activities,
            };

            let conn = app_state.db.write().await;
            conn.execute(
                "INSERT INTO trip_details (id, trip_id, date, location, notes, activities) VALUES (?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string().as_str(),
                    trip.id.as_str(),
                    detail.date.as_str(),
                    detail.location.as_str(),
                    encode_list(&detail.notes)?.as_str(),
                    encode_list(&detail.activities)?.as_str(),
                ),
            )
            .await
            .map_err(|_| db_error_with_context("detail insert failed"))?;

            detail
        }
    };

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Detail saved", "detail": detail })),
    ))
}

/// Replace one note or activity value in place. The old value must match
/// verbatim; the entry keeps its position in the list.
pub async fn edit_detail(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
    Json(payload): Json<EditDetailPayload>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_admin(&app_state.db, &trip.id, &current_user.id).await?;

    let day = format_day(parse_day(&payload.date)?)?;
    let new_value = payload.new_value.trim();
    validate_string_length(new_value, "New value", MAX_NOTE_LENGTH)?;

    let (id, mut detail) = load_detail_for_day(&app_state.db, &trip.id, &day)
        .await?
        .ok_or_else(|| not_found("No detail entry for this date"))?;

    let list = match payload.target.as_str() {
        "note" => &mut detail.notes,
        "activity" => &mut detail.activities,
        _ => return Err(bad_request("Target must be 'note' or 'activity'")),
    };

    let position = list
        .iter()
        .position(|value| value == &payload.old_value)
        .ok_or_else(|| bad_request("Value to edit not found"))?;
    list[position] = new_value.to_string();

    let conn = app_state.db.write().await;
    conn.execute(
        "UPDATE trip_details SET notes = ?, activities = ? WHERE id = ?",
        (
            encode_list(&detail.notes)?.as_str(),
            encode_list(&detail.activities)?.as_str(),
            id.as_str(),
        ),
    )
    .await
    .map_err(|_| db_error_with_context("detail edit failed"))?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Detail updated", "detail": detail })),
    ))
}

pub async fn get_detail(
    State(app_state): State<AppState>,
    session: Session,
    Path((date, code)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_participant(&app_state.db, &trip.id, &current_user.id).await?;

    let day = format_day(parse_day(&date)?)?;
    let (_, detail) = load_detail_for_day(&app_state.db, &trip.id, &day)
        .await?
        .ok_or_else(|| not_found("No detail entry for this date"))?;

    Ok((StatusCode::OK, Json(json!({ "detail": detail }))))
}
