//! # Primitives
//!
//! Fixed constants for the campus store.
//!
//! These are compiled into the binary and immutable at runtime. Tunable
//! values (session lifetime, retention cap, ...) live in `CampusConfig`;
//! the `DEFAULT_*` constants here are their defaults.

/// Current persisted-layout version.
///
/// Bumps are additive only: new collections or indexes, never a destructive
/// migration. A store stamped with a higher version is refused on open.
pub const SCHEMA_VERSION: u64 = 1;

/// Snapshot document version written by `export()`.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Magic bytes at the start of a backup-registry envelope.
pub const BACKUP_MAGIC: [u8; 4] = *b"CMPB";

/// Backup envelope format version.
pub const BACKUP_FORMAT_VERSION: u8 = 1;

/// Maximum size of a backup envelope accepted for restore (256 MB).
///
/// Checked before the payload is parsed.
pub const MAX_BACKUP_SIZE: usize = 256 * 1024 * 1024;

/// Primary-key field shared by every collection.
pub const KEY_FIELD: &str = "id";

/// Separator between components of a composite index value.
pub const COMPOSITE_SEPARATOR: char = '\u{1f}';

/// Upper sentinel for string ranges in the index table.
pub const KEY_MAX: &str = "\u{10FFFF}";

// =============================================================================
// WORKFLOW DEFAULTS
// =============================================================================

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Longest configurable session lifetime (one year).
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

/// Default alert lifetime when the creator gives no expiry.
pub const DEFAULT_ALERT_TTL_DAYS: i64 = 7;

/// Longest configurable default alert lifetime (ten years).
pub const MAX_ALERT_TTL_DAYS: i64 = 3660;

/// Default number of activity-log entries retained.
pub const DEFAULT_ACTIVITY_LOG_CAP: usize = 1000;

/// Default maintenance interval (one hour).
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 3600;

/// Default scrypt cost (log2 N).
pub const DEFAULT_PASSWORD_COST: u8 = 15;

/// Output length of the password hash.
pub const CREDENTIAL_HASH_LEN: usize = 32;

/// Random bytes in a session token before encoding.
pub const SESSION_TOKEN_BYTES: usize = 32;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum credits of one subject in a result record.
pub const MAX_SUBJECT_CREDITS: u32 = 40;

/// Minimum password length accepted at registration and password change.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum length of free-text fields (comments, messages, notes).
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Lowest accepted mess feedback rating.
pub const MIN_RATING: u8 = 1;

/// Highest accepted mess feedback rating.
pub const MAX_RATING: u8 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_magic_correct() {
        assert_eq!(&BACKUP_MAGIC, b"CMPB");
    }

    #[test]
    fn key_max_sorts_after_printable_text() {
        assert!("zzzz" < KEY_MAX);
        assert!("\u{FFFF}" < KEY_MAX);
    }
}
