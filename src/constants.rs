//! Defaults shared by the HTTP layer, the loader and the ticketing client

// Ticketing API
pub const TICKETMASTER_BASE_URL: &str = "https://app.ticketmaster.com/discovery/v2/events.json";
pub const REMOTE_TIMEOUT_SECONDS: u64 = 30;
/// Hard upper bound on page size, both for the remote API and for stored listings
pub const MAX_PAGE_SIZE: u32 = 200;

// Listing defaults
pub const DEFAULT_DAYS_AHEAD: i64 = 90;
/// Longest accepted look-ahead, about ten years
pub const MAX_DAYS_AHEAD: i64 = 3650;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_CLASSIFICATIONS: &str = "music,sports";
/// Classification value that disables segment filtering
pub const ALL_CLASSIFICATIONS: &str = "all";

// Batch load defaults (Prague center, 25 km)
pub const DEFAULT_LAT_LONG: &str = "50.0755,14.4378";
pub const DEFAULT_RADIUS: u32 = 25;
pub const DEFAULT_RADIUS_UNIT: &str = "km";
pub const DEFAULT_MAX_PAGES: u32 = 5;

// Storage
pub const EVENTS_TABLE: &str = "events";
pub const USERS_TABLE: &str = "users";
pub const USER_EVENTS_TABLE: &str = "user_events";
pub const DEFAULT_DATABASE_PATH: &str = "data/events.db";

/// Tables an administrator may drop
pub fn droppable_tables() -> Vec<&'static str> {
    vec![EVENTS_TABLE, USERS_TABLE, USER_EVENTS_TABLE]
}
