//! Hard input bounds. Everything crossing the wire is untrusted.

/// Spaces a single tenant may hold.
pub const MAX_SPACES_PER_TENANT: usize = 50_000;

/// Calendar entries (windows + bookings) per space.
pub const MAX_ENTRIES_PER_SPACE: usize = 10_000;

/// Space name length in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Space description length in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 4_096;

/// Widest date range a window or booking may span, in days (inclusive count).
pub const MAX_RANGE_DAYS: i64 = 1_000;

/// Widest calendar query window, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 3_700;

/// Tenants (databases) a single server will lazily create.
pub const MAX_TENANTS: usize = 64;

/// Tenant name length in bytes. Kept well under OS filename limits since the
/// sanitized name becomes the WAL filename.
pub const MAX_TENANT_NAME_LEN: usize = 64;
