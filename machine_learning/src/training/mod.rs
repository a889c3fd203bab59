mod evaluator;
mod trainer;

pub use evaluator::{EvaluationMetrics, Evaluator};
pub use trainer::Trainer;
