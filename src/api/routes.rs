use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::health::{HealthSnapshot, HealthState};
use crate::db::store;
use crate::error::AppError;
use crate::scorer::ScoreEngine;
use crate::types::{Baseline, PropertyType, ScoreComponents, Signal};

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub health: Arc<HealthState>,
    pub scorer: ScoreEngine,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/listings/:id/signals", get(get_listing_signals))
        .route("/listings/:id/score", get(get_listing_score))
        .route("/baselines", get(get_baselines))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct BaselinesQuery {
    pub town: Option<String>,
    pub property_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}

async fn get_listing_signals(
    State(state): State<ApiState>,
    Path(listing_id): Path<String>,
) -> Result<Json<Vec<Signal>>, AppError> {
    if store::get_listing(&state.pool, &listing_id).await?.is_none() {
        return Err(AppError::NotFound(format!("listing {listing_id}")));
    }
    let signals = store::listing_signals(&state.pool, &listing_id).await?;
    Ok(Json(signals))
}

/// Scores on demand, the same path a listing page view takes.
async fn get_listing_score(
    State(state): State<ApiState>,
    Path(listing_id): Path<String>,
) -> Result<Json<ScoreComponents>, AppError> {
    let components = state.scorer.score_listing(&listing_id).await?;
    Ok(Json(components))
}

async fn get_baselines(
    State(state): State<ApiState>,
    Query(params): Query<BaselinesQuery>,
) -> Result<Json<Vec<Baseline>>, AppError> {
    let property_type = params
        .property_type
        .as_deref()
        .map(str::parse::<PropertyType>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let baselines = store::list_baselines(&state.pool, params.town.as_deref(), property_type).await?;
    Ok(Json(baselines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::BaselineAggregator;
    use crate::db::fixtures::{insert_all, listing};
    use crate::db::test_pool;

    async fn state() -> ApiState {
        let pool = test_pool().await;
        let listings: Vec<_> = (0..5)
            .map(|i| listing(&format!("C{i}"), "Newton", PropertyType::Condo, 300_000.0 + i as f64 * 10_000.0, 20))
            .collect();
        insert_all(&pool, &listings).await;
        BaselineAggregator::new(pool.clone()).compute_baselines(180).await.unwrap();
        ApiState {
            scorer: ScoreEngine::new(pool.clone()),
            pool,
            health: Arc::new(HealthState::new()),
        }
    }

    #[tokio::test]
    async fn baselines_filter_by_town_case_insensitively() {
        let st = state().await;
        let query = BaselinesQuery {
            town: Some("newton".into()),
            property_type: Some("CC".into()),
        };
        let Json(rows) = get_baselines(State(st.clone()), Query(query)).await.unwrap();
        assert_eq!(rows.len(), 1);

        let query = BaselinesQuery {
            town: None,
            property_type: Some("SF".into()),
        };
        let Json(rows) = get_baselines(State(st), Query(query)).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn bad_property_type_is_rejected() {
        let st = state().await;
        let query = BaselinesQuery {
            town: None,
            property_type: Some("castle".into()),
        };
        let err = get_baselines(State(st), Query(query)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn unknown_listing_is_not_found() {
        let st = state().await;
        let err = get_listing_score(State(st.clone()), Path("nope".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = get_listing_signals(State(st), Path("nope".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn score_endpoint_persists_components() {
        let st = state().await;
        let Json(c) = get_listing_score(State(st.clone()), Path("C0".into())).await.unwrap();
        let stored = store::get_score(&st.pool, "C0").await.unwrap();
        assert_eq!(stored, Some(c));
    }
}
