use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::aggregator::BaselineAggregator;
use crate::api::health::HealthState;
use crate::config::Config;
use crate::detector::{SignalDetector, SignalScope};
use crate::error::Result;
use crate::scorer::ScoreEngine;
use crate::types::{now_ns, BatchReport};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineReport {
    pub baselines: BatchReport,
    pub signals: BatchReport,
    pub scores: BatchReport,
}

/// Baselines, then signals, then score backfill. The phases never overlap, so
/// signal detection only sees a fully written baseline set.
pub struct Pipeline {
    cfg: Config,
    pool: SqlitePool,
    health: Arc<HealthState>,
}

impl Pipeline {
    pub fn new(cfg: Config, pool: SqlitePool, health: Arc<HealthState>) -> Self {
        Self { cfg, pool, health }
    }

    /// Runs on `pipeline_interval_secs`, starting immediately.
    pub async fn run(self) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.cfg.pipeline_interval_secs.max(1)));

        loop {
            interval.tick().await;
            if let Err(e) = self.run_once().await {
                error!("Pipeline run failed: {e}");
            }
        }
    }

    pub async fn run_once(&self) -> Result<PipelineReport> {
        if !self.health.try_start_run() {
            warn!("Pipeline run skipped: previous run still in progress");
            return Ok(PipelineReport::default());
        }
        let result = self.run_phases().await;
        self.health.finish_run(result.as_ref().ok(), now_ns() as u64);
        result
    }

    async fn run_phases(&self) -> Result<PipelineReport> {
        let lookback = self.cfg.lookback_days;

        let baselines = BaselineAggregator::new(self.pool.clone())
            .compute_baselines(lookback)
            .await?;

        let scope = match self.cfg.signal_batch_limit {
            Some(limit) => SignalScope::Limit(limit),
            None => SignalScope::All {
                page_size: self.cfg.signal_page_size,
            },
        };
        let signals = SignalDetector::new(self.pool.clone(), lookback)
            .compute_signals(scope)
            .await?;

        let scores = ScoreEngine::new(self.pool.clone())
            .backfill(self.cfg.score_concurrency)
            .await?;

        info!(
            event = "PIPELINE_DONE",
            baselines = baselines.written,
            signals = signals.written,
            scores = scores.written,
            "Pipeline complete | baselines: {} | signals: {} | scores: {}",
            baselines.written,
            signals.written,
            scores.written,
        );

        Ok(PipelineReport {
            baselines,
            signals,
            scores,
        })
    }
}
