use serde::{Deserialize, Serialize};

/// Authenticated identity stored in the session cookie.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
}

#[derive(Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub username: String,
    pub email: String,
    pub friends: Vec<PublicUser>,
    pub pending_requests: Vec<PublicUser>,
    pub sent_requests: Vec<PublicUser>,
}

/// Friend operations address the counterparty by username.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FriendActionPayload {
    pub username: String,
}

#[derive(Serialize)]
pub struct FriendListsResponse {
    pub friends: Vec<PublicUser>,
    pub pending_requests: Vec<PublicUser>,
    pub sent_requests: Vec<PublicUser>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Trip {
    pub id: String,
    pub trip_code: String,
    pub name: String,
    pub location: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub owner_user_id: String,
    pub visibility: String,
}

#[derive(Deserialize)]
pub struct CreateTripPayload {
    pub name: Option<String>,
    pub location: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub visibility: Option<String>,
}

/// Partial update for trip metadata; absent fields are left unchanged.
/// An empty `end_date` clears it (the trip becomes ongoing).
#[derive(Deserialize, Default)]
pub struct TripPatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub visibility: Option<String>,
}

#[derive(Serialize)]
pub struct TripSummary {
    pub trip_code: String,
    pub name: String,
    pub location: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub favorited: bool,
}

#[derive(Serialize)]
pub struct TripMembers {
    pub participants: Vec<PublicUser>,
    pub admins: Vec<PublicUser>,
    pub invited: Vec<PublicUser>,
    pub join_requests: Vec<PublicUser>,
}

#[derive(Deserialize)]
pub struct JoinTripPayload {
    pub trip_code: String,
}

/// Invite target: username, or email when the identifier contains '@'.
#[derive(Deserialize)]
pub struct InvitePayload {
    pub identifier: String,
}

#[derive(Deserialize)]
pub struct MemberActionPayload {
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TripDetail {
    pub date: String,
    pub location: String,
    pub notes: Vec<String>,
    pub activities: Vec<String>,
}

#[derive(Deserialize)]
pub struct NewDetailPayload {
    pub date: String,
    pub location: Option<String>,
    pub note: Option<String>,
    pub activities: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct EditDetailPayload {
    pub date: String,
    /// "note" or "activity"
    pub target: String,
    pub old_value: String,
    pub new_value: String,
}

#[derive(Deserialize)]
pub struct CreateExpensePayload {
    pub paid_by: String,
    pub split_between: Vec<String>,
    pub amount: f64,
    pub description: Option<String>,
    pub date: String,
}

#[derive(Deserialize)]
pub struct EditExpensePayload {
    pub expense_id: String,
    pub paid_by: String,
    pub split_between: Vec<String>,
    pub amount: f64,
    pub description: Option<String>,
    pub date: String,
}

/// A fully resolved expense row: payer and split members joined to usernames,
/// trip metadata attached. Shared by the expense listing and every metrics
/// aggregation.
#[derive(Serialize, Debug, Clone)]
pub struct ExpenseEntry {
    pub id: String,
    pub trip_code: String,
    pub trip_name: String,
    pub paid_by: PublicUser,
    pub amount: f64,
    pub description: String,
    pub date: String,
    pub split_between: Vec<PublicUser>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BalanceEntry {
    pub username: String,
    pub amount: f64,
}

/// Netted pairwise balances for one user: a counterparty appears in at most
/// one of the two lists.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NetBalances {
    pub owe: Vec<BalanceEntry>,
    pub owed: Vec<BalanceEntry>,
}

#[derive(Serialize)]
pub struct TripExpenseTotal {
    pub trip_code: String,
    pub trip_name: String,
    pub total: f64,
}

#[derive(Serialize, Debug, Clone)]
pub struct PayerSplit {
    pub username: String,
    pub amount: f64,
}

#[derive(Serialize)]
pub struct TripSplitSummary {
    pub trip_name: String,
    pub trip_code: String,
    pub expense_split: Vec<PayerSplit>,
}

#[derive(Serialize)]
pub struct TripDuration {
    pub trip_code: String,
    pub trip_name: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub duration_days: i64,
}
