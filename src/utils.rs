use axum::{Json, http::StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::constants::*;

/// Uniform error shape: status code plus a `{"message": ...}` body.
pub type ErrorResponse = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ErrorResponse {
    (status, Json(json!({ "message": message.into() })))
}

pub fn bad_request(message: impl Into<String>) -> ErrorResponse {
    api_error(StatusCode::BAD_REQUEST, message)
}

pub fn unauthorized() -> ErrorResponse {
    api_error(StatusCode::UNAUTHORIZED, ERR_UNAUTHORIZED)
}

pub fn forbidden() -> ErrorResponse {
    api_error(StatusCode::FORBIDDEN, ERR_PERMISSION_DENIED)
}

pub fn not_found(message: impl Into<String>) -> ErrorResponse {
    api_error(StatusCode::NOT_FOUND, message)
}

pub fn db_error() -> ErrorResponse {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_DATABASE_OPERATION)
}

/// 500 with a generic body; the context is logged server-side only.
pub fn db_error_with_context(context: &str) -> ErrorResponse {
    tracing::error!(context, "database operation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_DATABASE_OPERATION)
}

pub fn validate_string_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), ErrorResponse> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} cannot be empty", field_name)));
    }
    if value.len() > max_length {
        return Err(bad_request(format!(
            "{} must be less than {} characters",
            field_name, max_length
        )));
    }
    Ok(())
}

/// Structural email check: non-empty local part, a domain with a dot, no
/// whitespace.
pub fn validate_email(email: &str) -> Result<(), ErrorResponse> {
    let invalid = || bad_request("Invalid email address");

    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return Err(invalid());
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid());
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(invalid());
    }
    Ok(())
}

/// Parse a calendar date at day granularity. Accepts `YYYY-MM-DD`, and
/// discards any time-of-day suffix (`YYYY-MM-DDTHH:MM:SSZ` and friends) so
/// entries submitted with timestamps still key on the day.
pub fn parse_day(value: &str) -> Result<time::Date, ErrorResponse> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request("Date cannot be empty"));
    }

    let day_part = trimmed.split('T').next().unwrap_or(trimmed);

    let format = time::format_description::parse("[year]-[month]-[day]")
        .map_err(|_| bad_request("Invalid date format"))?;

    time::Date::parse(day_part, &format).map_err(|_| bad_request("Invalid date format"))
}

/// Canonical `YYYY-MM-DD` rendering of a parsed day.
pub fn format_day(date: time::Date) -> Result<String, ErrorResponse> {
    let format = time::format_description::parse("[year]-[month]-[day]")
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_INTERNAL))?;
    date.format(&format)
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_INTERNAL))
}

pub fn today() -> time::Date {
    time::OffsetDateTime::now_utc().date()
}

pub fn now_rfc3339() -> Result<String, ErrorResponse> {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, ERR_INTERNAL))
}

/// One candidate trip code: TRIP_CODE_LENGTH uppercase base-36 characters
/// drawn from fresh UUID bytes. Uniqueness is checked against the trips
/// table by the caller.
pub fn generate_trip_code() -> String {
    let bytes = *Uuid::new_v4().as_bytes();
    bytes
        .iter()
        .take(TRIP_CODE_LENGTH)
        .map(|b| TRIP_CODE_ALPHABET[*b as usize % TRIP_CODE_ALPHABET.len()] as char)
        .collect()
}

/// Round a currency amount to two decimals.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
