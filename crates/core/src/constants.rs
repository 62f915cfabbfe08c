//! Constants used throughout the dispatch core.

/// Directory holding the database file.
pub const DATABASE_DIR_VAR: &str = "APP_DATABASE_DIR";
pub const DATABASE_DIR_DEFAULT: &str = ".";

/// Database name; the file on disk is `<name>.db`.
pub const DATABASE_NAME_VAR: &str = "APP_DATABASE_NAME";
pub const DATABASE_NAME_DEFAULT: &str = "kwikmedical";

/// How long a scope waits on a locked database before failing with `Busy`.
pub const DATABASE_BUSY_TIMEOUT_VAR: &str = "APP_DATABASE_BUSY_TIMEOUT_MS";
pub const DATABASE_BUSY_TIMEOUT_DEFAULT_MS: u64 = 5_000;

/// File extension appended to the database name.
pub const DATABASE_FILE_EXTENSION: &str = "db";

/// Mean earth radius in metres (IUGG), used for great-circle distances.
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Number of times a dispatch transaction is attempted when it hits a serialization conflict.
pub const DISPATCH_ATTEMPTS: usize = 2;
