pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

pub const DEFAULT_TOP_LIMIT: i64 = 5;
pub const DEFAULT_TREND_MONTHS: u32 = 12;

/// 10 MiB upload limit
pub const DEFAULT_IMPORT_MAX_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_IMPORT_MAX_ROW_ATTEMPTS: u32 = 3;
pub const DEFAULT_IMPORT_RETRY_DELAY_MS: u64 = 50;

pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
