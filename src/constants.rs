// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "5050";
pub const DEFAULT_DATA_PATH: &str = "data";

// Session configuration
pub const SESSION_NAME: &str = "trip_session";
pub const SESSION_EXPIRY_HOURS: i64 = 1;
pub const MIN_SESSION_SECRET_LENGTH: usize = 64;

// Validation limits
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_TRIP_NAME_LENGTH: usize = 100;
pub const MAX_LOCATION_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 255;
pub const MAX_NOTE_LENGTH: usize = 1000;

// Trip codes: short shareable identifiers, collision-checked at creation
pub const TRIP_CODE_LENGTH: usize = 6;
pub const TRIP_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// Friendship link status
pub const FRIEND_STATUS_PENDING: &str = "pending";
pub const FRIEND_STATUS_ACCEPTED: &str = "accepted";

// Trip membership state machine
pub const MEMBER_STATE_REQUESTED: &str = "requested";
pub const MEMBER_STATE_INVITED: &str = "invited";
pub const MEMBER_STATE_PARTICIPANT: &str = "participant";
pub const MEMBER_STATE_ADMIN: &str = "admin";

// Trip visibility
pub const VISIBILITY_PRIVATE: &str = "private";
pub const VISIBILITY_FRIENDS: &str = "friends";

// Error messages
pub const ERR_DATABASE_OPERATION: &str = "Database operation failed";
pub const ERR_SESSION_ACCESS: &str = "Session access error";
pub const ERR_UNAUTHORIZED: &str = "Not logged in";
pub const ERR_PERMISSION_DENIED: &str = "Permission denied";
pub const ERR_INTERNAL: &str = "Internal server error";
