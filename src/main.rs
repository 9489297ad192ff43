use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use listing_signals::api::health::HealthState;
use listing_signals::api::routes::{router, ApiState};
use listing_signals::config::{Config, RunMode};
use listing_signals::db;
use listing_signals::error::Result;
use listing_signals::pipeline::Pipeline;
use listing_signals::scorer::ScoreEngine;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup (the only fatal failure) ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);
    info!(
        "Config: mode={:?} lookback={}d batch_limit={} page_size={} score_concurrency={}",
        cfg.run_mode,
        cfg.lookback_days,
        cfg.signal_batch_limit
            .map(|n| n.to_string())
            .unwrap_or_else(|| "all".to_string()),
        cfg.signal_page_size,
        cfg.score_concurrency,
    );

    let health = Arc::new(HealthState::new());
    let pipeline = Pipeline::new(cfg.clone(), pool.clone(), Arc::clone(&health));

    match cfg.run_mode {
        RunMode::Once => {
            let report = pipeline.run_once().await?;
            info!(
                "Run finished | baselines: {}/{} cells | signals: {} over {} listings | scores: {} | failures: {}",
                report.baselines.written,
                report.baselines.attempted,
                report.signals.written,
                report.signals.attempted,
                report.scores.written,
                report.baselines.failed + report.signals.failed + report.scores.failed,
            );
        }
        RunMode::Serve => {
            // Pipeline (background, every PIPELINE_INTERVAL_SECS)
            tokio::spawn(async move { pipeline.run().await });

            // HTTP API server
            let api_state = ApiState {
                pool: pool.clone(),
                health,
                scorer: ScoreEngine::new(pool.clone()),
            };
            let app = router(api_state);
            let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            info!("HTTP API listening on {bind_addr}");

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
