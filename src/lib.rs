//! Market signal analytics over a listing store: per-cell baselines, rule-based
//! listing signals and a per-listing opportunity score.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod pipeline;
pub mod scorer;
pub mod stats;
pub mod types;
