//! Policy compilation and evaluation.

pub mod compiler;
pub mod evaluator;

pub use compiler::{CompiledPolicy, CompiledRule, compile, compile_all};
pub use evaluator::{PolicyDecision, evaluate, evaluate_rule};
