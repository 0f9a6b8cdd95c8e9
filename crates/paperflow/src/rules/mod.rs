//! User-defined document rules: conditions, actions and their evaluation.

pub mod action;
pub mod automatch;
pub mod condition;
pub mod engine;
pub mod model;

pub use action::ActionFn;
pub use automatch::{apply_auto_matching, AutoMatchValue, MatchType};
pub use condition::ConditionFn;
pub use engine::{
    validate_rule, ActionTrace, ConditionTrace, Evaluation, Registry, RuleEngine, RuleTrace,
};
pub use model::{Action, ActionKind, Condition, ConditionKind, Rule, RuleMode};
