pub mod rules;
pub mod signals;

pub use signals::{SignalDetector, SignalScope};
