pub mod score_engine;
pub mod validation;

pub use score_engine::ScoreEngine;
