//! # Profiling
//!
//! Rule definitions and the classifier that applies them to session history.

pub mod profiler;
pub mod rules;

pub use profiler::{evaluate, first_satisfied_rule, ClassificationResult, SessionProfiler};
pub use rules::{MethodMatcher, Rule, RuleError, RuleSet};
