//! Match pipeline: capabilities and the tick-driven director

pub mod director;
pub mod functions;

// Re-export commonly used types
pub use director::MatchPipeline;
pub use functions::{
    Assigner, AssignerFn, Evaluator, EvaluatorFn, MatchFunction, MatchFunctionFn,
    RandomAssigner, Simple1v1MatchFunction,
};
