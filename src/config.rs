use crate::error::{AppError, Result};

/// Minimum listings a (town, type, band) cell needs before a baseline is written.
/// Cells below this are skipped, and listings in them never receive signals.
pub const MIN_BASELINE_SAMPLE: usize = 5;

/// Lookback window used when LOOKBACK_DAYS is not set.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 180;

/// Median DOM assumed when a baseline has no DOM data.
pub const DEFAULT_MEDIAN_DOM: f64 = 21.0;

/// Trailing window (days) searched for the two most recent snapshots.
pub const RECENT_DROP_WINDOW_DAYS: i64 = 14;

/// Minimum percentage decrease between the two latest snapshots for `recent_drop`.
pub const RECENT_DROP_MIN_PCT: f64 = 2.0;

/// Pipeline interval (seconds) in serve mode.
pub const PIPELINE_INTERVAL_SECS: u64 = 3_600;

/// Page size when walking every qualifying listing.
pub const SIGNAL_PAGE_SIZE: i64 = 500;

/// Number of score computations in flight during a backfill.
pub const SCORE_CONCURRENCY: usize = 8;

/// Data-quality guards for the score path. Values outside these ranges are
/// treated as absent.
pub mod validation_ranges {
    pub const PRICE_MIN: f64 = 20_000.0;
    pub const PRICE_MAX: f64 = 50_000_000.0;
    pub const SQFT_MIN: f64 = 100.0;
    pub const SQFT_MAX: f64 = 20_000.0;
    pub const PPS_MIN: f64 = 5.0;
    pub const PPS_MAX: f64 = 5_000.0;
    /// Narrow cohort keeps listings within ±25% of the subject's living area.
    pub const SIZE_WINDOW: f64 = 0.25;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run baselines, signals and the score backfill once, then exit.
    Once,
    /// Run the pipeline on an interval and serve the read API.
    Serve,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub run_mode: RunMode,
    /// Baseline lookback window in days (LOOKBACK_DAYS)
    pub lookback_days: i64,
    /// Seconds between pipeline runs in serve mode (PIPELINE_INTERVAL_SECS)
    pub pipeline_interval_secs: u64,
    /// Cap on listings processed per signal run (SIGNAL_BATCH_LIMIT).
    /// None walks every qualifying listing.
    pub signal_batch_limit: Option<i64>,
    /// Keyset page size when walking all listings (SIGNAL_PAGE_SIZE)
    pub signal_page_size: i64,
    /// Concurrent score computations during backfill (SCORE_CONCURRENCY)
    pub score_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let run_mode = match std::env::var("RUN_MODE")
            .unwrap_or_else(|_| "once".to_string())
            .to_lowercase()
            .as_str()
        {
            "once" => RunMode::Once,
            "serve" => RunMode::Serve,
            other => {
                return Err(AppError::Config(format!(
                    "RUN_MODE must be 'once' or 'serve', got '{other}'"
                )))
            }
        };

        let lookback_days = std::env::var("LOOKBACK_DAYS")
            .unwrap_or_else(|_| DEFAULT_LOOKBACK_DAYS.to_string())
            .parse::<i64>()
            .map_err(|_| AppError::Config("LOOKBACK_DAYS must be an integer".to_string()))?;
        if lookback_days <= 0 {
            return Err(AppError::Config("LOOKBACK_DAYS must be positive".to_string()));
        }

        let signal_batch_limit = parse_batch_limit(std::env::var("SIGNAL_BATCH_LIMIT").ok())?;

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "signals.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            run_mode,
            lookback_days,
            pipeline_interval_secs: std::env::var("PIPELINE_INTERVAL_SECS")
                .unwrap_or_else(|_| PIPELINE_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(PIPELINE_INTERVAL_SECS),
            signal_batch_limit,
            signal_page_size: std::env::var("SIGNAL_PAGE_SIZE")
                .unwrap_or_else(|_| SIGNAL_PAGE_SIZE.to_string())
                .parse::<i64>()
                .unwrap_or(SIGNAL_PAGE_SIZE)
                .max(1),
            score_concurrency: std::env::var("SCORE_CONCURRENCY")
                .unwrap_or_else(|_| SCORE_CONCURRENCY.to_string())
                .parse::<usize>()
                .unwrap_or(SCORE_CONCURRENCY)
                .max(1),
        })
    }
}

/// Unset or blank means no limit. Anything else must be a positive integer.
fn parse_batch_limit(raw: Option<String>) -> Result<Option<i64>> {
    let Some(v) = raw.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let limit = v
        .trim()
        .parse::<i64>()
        .map_err(|_| AppError::Config("SIGNAL_BATCH_LIMIT must be an integer".to_string()))?;
    if limit <= 0 {
        return Err(AppError::Config("SIGNAL_BATCH_LIMIT must be positive".to_string()));
    }
    Ok(Some(limit))
}
