use std::collections::{BTreeMap, HashMap};

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tower_sessions::Session;

use crate::AppState;
use crate::auth::get_current_user;
use crate::constants::*;
use crate::expenses::{load_expenses_for_trip, load_expenses_for_user};
use crate::models::{
    BalanceEntry, ExpenseEntry, NetBalances, PayerSplit, TripDuration, TripExpenseTotal,
    TripSplitSummary,
};
use crate::trips::{get_trip_by_code, require_participant};
use crate::utils::{
    ErrorResponse, db_error, db_error_with_context, not_found, parse_day, round_cents, today,
};

/// Net pairwise balances for one user over a set of expenses.
///
/// Each expense credits its payer and debits every split member by an even
/// share (an empty split falls back to a divisor of one). Opposing amounts
/// per counterparty are then netted into a single direction: after this, a
/// counterparty owes the user or is owed by them, never both; settled pairs
/// disappear.
pub fn net_balances(entries: &[ExpenseEntry], user_id: &str) -> NetBalances {
    // counterparty id -> (username, accumulated amount)
    let mut owe: HashMap<String, (String, f64)> = HashMap::new();
    let mut owed: HashMap<String, (String, f64)> = HashMap::new();

    for entry in entries {
        let share = entry.amount / entry.split_between.len().max(1) as f64;

        for member in &entry.split_between {
            if member.id == user_id {
                if entry.paid_by.id != user_id {
                    let slot = owe
                        .entry(entry.paid_by.id.clone())
                        .or_insert_with(|| (entry.paid_by.username.clone(), 0.0));
                    slot.1 += share;
                }
            } else if entry.paid_by.id == user_id {
                let slot = owed
                    .entry(member.id.clone())
                    .or_insert_with(|| (member.username.clone(), 0.0));
                slot.1 += share;
            }
        }
    }

    // Collapse counterparties present in both directions to a single net
    // entry
    let owe_ids: Vec<String> = owe.keys().cloned().collect();
    for id in owe_ids {
        let Some(owed_amount) = owed.get(&id).map(|(_, amount)| *amount) else {
            continue;
        };
        let owe_amount = owe[&id].1;
        let diff = round_cents(owe_amount - owed_amount);

        if diff > 0.0 {
            owe.get_mut(&id).unwrap().1 = diff;
            owed.remove(&id);
        } else if diff < 0.0 {
            owed.get_mut(&id).unwrap().1 = -diff;
            owe.remove(&id);
        } else {
            owe.remove(&id);
            owed.remove(&id);
        }
    }

    let collect = |map: HashMap<String, (String, f64)>| {
        let mut entries: Vec<BalanceEntry> = map
            .into_values()
            .map(|(username, amount)| BalanceEntry {
                username,
                amount: round_cents(amount),
            })
            .collect();
        entries.sort_by(|a, b| a.username.cmp(&b.username));
        entries
    };

    NetBalances {
        owe: collect(owe),
        owed: collect(owed),
    }
}

/// "Who paid how much" for a set of expenses: raw amounts grouped by payer,
/// not per-share attribution.
pub fn payer_split(entries: &[ExpenseEntry]) -> Vec<PayerSplit> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for entry in entries {
        *totals.entry(entry.paid_by.username.clone()).or_default() += entry.amount;
    }

    let mut split: Vec<PayerSplit> = totals
        .into_iter()
        .map(|(username, amount)| PayerSplit {
            username,
            amount: round_cents(amount),
        })
        .collect();
    split.sort_by(|a, b| {
        b.amount
            .partial_cmp(&a.amount)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.username.cmp(&b.username))
    });
    split
}

/// Netted balances across every trip the caller participates in.
pub async fn balances_all(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<NetBalances>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;
    let entries = load_expenses_for_user(&app_state.db, &current_user.id).await?;
    Ok((
        StatusCode::OK,
        Json(net_balances(&entries, &current_user.id)),
    ))
}

/// Netted balances scoped to one trip.
pub async fn balances_for_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
) -> Result<(StatusCode, Json<NetBalances>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_participant(&app_state.db, &trip.id, &current_user.id).await?;

    let entries = load_expenses_for_trip(&app_state.db, &trip.id).await?;
    Ok((
        StatusCode::OK,
        Json(net_balances(&entries, &current_user.id)),
    ))
}

/// Per-trip totals of the caller's own share, descending.
pub async fn trip_totals(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;
    let entries = load_expenses_for_user(&app_state.db, &current_user.id).await?;

    // trip code -> (name, total of this user's shares)
    let mut totals: BTreeMap<String, (String, f64)> = BTreeMap::new();
    for entry in &entries {
        if !entry
            .split_between
            .iter()
            .any(|user| user.id == current_user.id)
        {
            continue;
        }
        let share = entry.amount / entry.split_between.len().max(1) as f64;
        let slot = totals
            .entry(entry.trip_code.clone())
            .or_insert_with(|| (entry.trip_name.clone(), 0.0));
        slot.1 += share;
    }

    let mut trip_expenses: Vec<TripExpenseTotal> = totals
        .into_iter()
        .map(|(trip_code, (trip_name, total))| TripExpenseTotal {
            trip_code,
            trip_name,
            total: round_cents(total),
        })
        .collect();
    trip_expenses.sort_by(|a, b| {
        b.total
            .partial_cmp(&a.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.trip_code.cmp(&b.trip_code))
    });

    Ok((
        StatusCode::OK,
        Json(json!({ "trip_expenses": trip_expenses })),
    ))
}

/// Per-trip payer breakdown across every trip the caller participates in.
pub async fn split_all_trips(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;
    let entries = load_expenses_for_user(&app_state.db, &current_user.id).await?;

    let mut by_trip: BTreeMap<String, (String, Vec<ExpenseEntry>)> = BTreeMap::new();
    for entry in entries {
        by_trip
            .entry(entry.trip_code.clone())
            .or_insert_with(|| (entry.trip_name.clone(), Vec::new()))
            .1
            .push(entry);
    }

    let mut splits = serde_json::Map::new();
    for (trip_code, (trip_name, trip_entries)) in by_trip {
        splits.insert(
            trip_code,
            json!({
                "trip_name": trip_name,
                "expense_split": payer_split(&trip_entries),
            }),
        );
    }

    Ok((StatusCode::OK, Json(json!({ "splits": splits }))))
}

/// Payer breakdown for one trip.
pub async fn split_for_trip(
    State(app_state): State<AppState>,
    session: Session,
    Path(code): Path<String>,
) -> Result<(StatusCode, Json<TripSplitSummary>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let trip = get_trip_by_code(&app_state.db, &code)
        .await?
        .ok_or_else(|| not_found("Trip not found"))?;
    require_participant(&app_state.db, &trip.id, &current_user.id).await?;

    let entries = load_expenses_for_trip(&app_state.db, &trip.id).await?;

    Ok((
        StatusCode::OK,
        Json(TripSplitSummary {
            trip_name: trip.name,
            trip_code: trip.trip_code,
            expense_split: payer_split(&entries),
        }),
    ))
}

/// Whole-day durations of the caller's trips, longest first. Ongoing trips
/// count up to today.
pub async fn trip_durations(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<Value>), ErrorResponse> {
    let current_user = get_current_user(&session).await?;

    let rows = {
        let conn = app_state.db.read().await;
        let mut rows = conn
            .query(
                "SELECT t.trip_code, t.name, t.start_date, t.end_date
                 FROM trips t
                 JOIN trip_members tm ON tm.trip_id = t.id AND tm.user_id = ? AND tm.state IN (?, ?)",
                (
                    current_user.id.as_str(),
                    MEMBER_STATE_PARTICIPANT,
                    MEMBER_STATE_ADMIN,
                ),
            )
            .await
            .map_err(|_| db_error_with_context("failed to load trip durations"))?;

        let mut collected = Vec::new();
        while let Some(row) = rows.next().await.map_err(|_| db_error())? {
            let trip_code: String = row.get(0).map_err(|_| db_error())?;
            let name: String = row.get(1).map_err(|_| db_error())?;
            let start_date: String = row.get(2).map_err(|_| db_error())?;
            let end_date: Option<String> = row.get(3).map_err(|_| db_error())?;
            collected.push((trip_code, name, start_date, end_date));
        }
        collected
    };

    let mut trips = Vec::new();
    for (trip_code, trip_name, start_date, end_date) in rows {
        let start = parse_day(&start_date)?;
        let end = match end_date.as_deref() {
            Some(end) => parse_day(end)?,
            None => today(),
        };
        let duration_days = (end - start).whole_days();

        trips.push(TripDuration {
            trip_code,
            trip_name,
            start_date,
            end_date,
            duration_days,
        });
    }
    trips.sort_by(|a, b| {
        b.duration_days
            .cmp(&a.duration_days)
            .then_with(|| a.trip_code.cmp(&b.trip_code))
    });

    Ok((StatusCode::OK, Json(json!({ "trips": trips }))))
}
