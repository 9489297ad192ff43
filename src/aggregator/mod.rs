pub mod baseline;

pub use baseline::BaselineAggregator;
