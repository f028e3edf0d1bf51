// src/config.rs

use std::env;
use std::time::Duration;

use dotenvy::dotenv;

/// Bounds accepted for a mock exam's question budget.
pub const MIN_EXAM_QUESTIONS: i32 = 20;
pub const MAX_EXAM_QUESTIONS: i32 = 120;

/// Bounds accepted for a mock exam's time limit, in seconds (5 minutes to 2 hours).
pub const MIN_EXAM_DURATION_SECS: i64 = 5 * 60;
pub const MAX_EXAM_DURATION_SECS: i64 = 2 * 60 * 60;

/// How many questions of each category end up in the free pool.
pub const FREE_QUESTIONS_PER_CATEGORY: usize = 2;

/// Page size of the finished mock exam history.
pub const HISTORY_PAGE_SIZE: i64 = 15;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    /// Cadence of the free question pool refresh job.
    pub pool_refresh_interval: Duration,
    /// Delay before a failed forced finish is attempted again.
    pub timer_retry_backoff: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let pool_refresh_interval = refresh_interval(env::var("POOL_REFRESH_HOURS").ok().as_deref());
        let timer_retry_backoff = retry_backoff(env::var("TIMER_RETRY_SECS").ok().as_deref());

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            pool_refresh_interval,
            timer_retry_backoff,
        }
    }
}

const DEFAULT_REFRESH_HOURS: u64 = 24;
const DEFAULT_RETRY_SECS: u64 = 5;

/// Zero and unparsable values fall back to the default.
fn positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|v| v.trim().parse::<u64>().ok()).filter(|v| *v > 0)
}

fn refresh_interval(raw: Option<&str>) -> Duration {
    let secs = positive(raw)
        .and_then(|hours| hours.checked_mul(60 * 60))
        .unwrap_or(DEFAULT_REFRESH_HOURS * 60 * 60);
    Duration::from_secs(secs)
}

fn retry_backoff(raw: Option<&str>) -> Duration {
    Duration::from_secs(positive(raw).unwrap_or(DEFAULT_RETRY_SECS))
}
