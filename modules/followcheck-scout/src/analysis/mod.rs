pub mod benford;
pub mod scorer;

pub use benford::{analyze, expected_pct};
pub use scorer::BotLikelihoodScorer;
