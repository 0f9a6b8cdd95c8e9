//! Rule evaluation with a per-condition and per-action trace.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::document::Document;
use crate::error::RuleError;

use super::action::{self, ActionFn};
use super::condition::{self, compile_regex, parse_count, parse_date, ConditionFn};
use super::model::{
    Action, ActionKind, Condition, ConditionKind, Rule, RuleMode, DEFAULT_DATE_FORMAT,
};

pub const CONDITION_MATCHED: &str = "condition matched";
pub const CONDITION_NOT_MATCHED: &str = "condition didn't match";
pub const CONDITION_DISABLED: &str = "condition is disabled";
pub const CONDITION_INVERTED: &str = "condition is inverted";
pub const CONDITION_SKIPPED: &str = "condition skipped";
pub const MATCH_ANY_SHORT_CIRCUIT: &str = "rule mode is set to 'match any', skip rest conditions";
pub const MATCH_ALL_STOPPED: &str = "rule mode is set to 'match all', stopping execution";
pub const ACTION_DISABLED: &str = "action is disabled";
pub const ACTION_NOT_MATCHED: &str = "rule did not match, action skipped";
pub const ACTION_APPLIED: &str = "action applied";

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConditionTrace {
    pub condition_id: i64,
    pub matched: bool,
    pub skipped: bool,
    pub log: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionTrace {
    pub action_id: i64,
    pub applied: bool,
    pub skipped: bool,
    pub log: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleTrace {
    pub rule_id: i64,
    pub matched: bool,
    pub conditions: Vec<ConditionTrace>,
    pub actions: Vec<ActionTrace>,
}

/// Result of running one rule against one document.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub matched: bool,
    pub trace: RuleTrace,
    /// The document after the applicable actions ran.
    pub document: Document,
}

/// Maps kind identifiers to their evaluator or mutator.
#[derive(Clone)]
pub struct Registry {
    conditions: HashMap<ConditionKind, ConditionFn>,
    actions: HashMap<ActionKind, ActionFn>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            conditions: HashMap::new(),
            actions: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for (kind, f) in condition::builtin() {
            registry.register_condition(kind, f);
        }
        for (kind, f) in action::builtin() {
            registry.register_action(kind, f);
        }
        registry
    }

    /// Registers (or replaces) the evaluator for a condition kind.
    pub fn register_condition(&mut self, kind: ConditionKind, f: ConditionFn) {
        self.conditions.insert(kind, f);
    }

    pub fn register_action(&mut self, kind: ActionKind, f: ActionFn) {
        self.actions.insert(kind, f);
    }

    fn condition(&self, kind: ConditionKind) -> Result<ConditionFn, RuleError> {
        self.conditions
            .get(&kind)
            .copied()
            .ok_or_else(|| RuleError::NotRegistered(kind.to_string()))
    }

    fn action(&self, kind: ActionKind) -> Result<ActionFn, RuleError> {
        self.actions
            .get(&kind)
            .copied()
            .ok_or_else(|| RuleError::NotRegistered(kind.to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Clone, Default)]
pub struct RuleEngine {
    registry: Registry,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    /// Evaluates the rule against a copy of the document and applies the
    /// actions that qualify.
    pub fn evaluate(&self, rule: &Rule, document: &Document) -> Evaluation {
        let mut trace = RuleTrace {
            rule_id: rule.id,
            ..Default::default()
        };

        let matched = self.evaluate_conditions(rule, document, &mut trace.conditions);
        trace.matched = matched;

        let mut document = document.clone();
        for action in &rule.actions {
            trace
                .actions
                .push(self.apply_action(action, matched, &mut document));
        }

        debug!(
            rule_id = rule.id,
            matched,
            conditions = rule.conditions.len(),
            actions = rule.actions.len(),
            "Evaluated rule"
        );

        Evaluation {
            matched,
            trace,
            document,
        }
    }

    /// Dry run: same evaluation, the caller's document is untouched.
    pub fn test_rule(&self, rule: &Rule, document: &Document) -> Evaluation {
        self.evaluate(rule, document)
    }

    fn evaluate_conditions(
        &self,
        rule: &Rule,
        document: &Document,
        traces: &mut Vec<ConditionTrace>,
    ) -> bool {
        let mut matched = rule.mode == RuleMode::MatchAll;
        let mut finished = false;

        for condition in &rule.conditions {
            let mut trace = ConditionTrace {
                condition_id: condition.id,
                ..Default::default()
            };

            if finished {
                trace.skipped = true;
                trace.log.push(CONDITION_SKIPPED.to_string());
                traces.push(trace);
                continue;
            }

            if !condition.enabled {
                trace.skipped = true;
                trace.log.push(CONDITION_DISABLED.to_string());
                traces.push(trace);
                continue;
            }

            let ok = match self.check_condition(condition, document) {
                Ok(raw) => {
                    if condition.inverted {
                        trace.log.push(CONDITION_INVERTED.to_string());
                    }
                    raw != condition.inverted
                }
                Err(e) => {
                    trace.log.push(format!("failed to evaluate condition: {}", e));
                    false
                }
            };

            trace.matched = ok;
            trace.log.push(
                if ok {
                    CONDITION_MATCHED
                } else {
                    CONDITION_NOT_MATCHED
                }
                .to_string(),
            );

            match rule.mode {
                RuleMode::MatchAny if ok => {
                    matched = true;
                    finished = true;
                    trace.log.push(MATCH_ANY_SHORT_CIRCUIT.to_string());
                }
                RuleMode::MatchAll if !ok => {
                    matched = false;
                    finished = true;
                    trace.log.push(MATCH_ALL_STOPPED.to_string());
                }
                _ => {}
            }

            traces.push(trace);
        }

        matched
    }

    fn check_condition(&self, condition: &Condition, document: &Document) -> Result<bool, RuleError> {
        let evaluate = self.registry.condition(condition.kind)?;
        evaluate(condition, document)
    }

    fn apply_action(&self, action: &Action, matched: bool, document: &mut Document) -> ActionTrace {
        let mut trace = ActionTrace {
            action_id: action.id,
            ..Default::default()
        };

        if !action.enabled {
            trace.skipped = true;
            trace.log.push(ACTION_DISABLED.to_string());
            return trace;
        }

        if action.on_condition && !matched {
            trace.skipped = true;
            trace.log.push(ACTION_NOT_MATCHED.to_string());
            return trace;
        }

        match self
            .registry
            .action(action.kind)
            .and_then(|apply| apply(action, document))
        {
            Ok(()) => {
                trace.applied = true;
                trace.log.push(ACTION_APPLIED.to_string());
            }
            Err(e) => {
                trace.log.push(format!("failed to apply action: {}", e));
            }
        }
        trace
    }
}

/// Checks a rule before it is saved, so evaluation never meets a malformed
/// pattern, date or count.
pub fn validate_rule(rule: &Rule) -> Result<(), RuleError> {
    for condition in &rule.conditions {
        validate_condition(condition)?;
    }
    for action in &rule.actions {
        validate_action(action)?;
    }
    Ok(())
}

fn validate_condition(condition: &Condition) -> Result<(), RuleError> {
    let kind = condition.kind;
    if kind.is_textual() && condition.is_regex {
        compile_regex(&condition.value, condition.case_insensitive)?;
    }
    if kind.is_date() {
        parse_date(&condition.value, condition.date_format())?;
    }
    if kind.is_metadata_count() {
        parse_count(&condition.value)?;
    }
    match kind {
        ConditionKind::MetadataHasKey if condition.metadata_key.is_none() => {
            Err(RuleError::MissingMetadataKey(kind.to_string()))
        }
        ConditionKind::MetadataHasKeyValue
            if condition.metadata_key.is_none() || condition.metadata_value.is_none() =>
        {
            Err(RuleError::MissingMetadataValue(kind.to_string()))
        }
        _ => Ok(()),
    }
}

fn validate_action(action: &Action) -> Result<(), RuleError> {
    match action.kind {
        ActionKind::DateSet => parse_date(&action.value, DEFAULT_DATE_FORMAT).map(|_| ()),
        ActionKind::MetadataAdd | ActionKind::MetadataRemove
            if action.metadata_key.is_none() || action.metadata_value.is_none() =>
        {
            Err(RuleError::MissingMetadataValue(action.kind.to_string()))
        }
        _ => Ok(()),
    }
}
