use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    #[default]
    MatchAll,
    MatchAny,
}

impl RuleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleMode::MatchAll => "match_all",
            RuleMode::MatchAny => "match_any",
        }
    }
}

impl FromStr for RuleMode {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "match_all" => Ok(RuleMode::MatchAll),
            "match_any" => Ok(RuleMode::MatchAny),
            other => Err(RuleError::UnknownMode(other.to_string())),
        }
    }
}

macro_rules! kind_enum {
    ($name:ident, $err:ident, { $($variant:ident => $id:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $id),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = RuleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($id => Ok($name::$variant),)+
                    other => Err(RuleError::$err(other.to_string())),
                }
            }
        }
    };
}

kind_enum!(ConditionKind, UnknownCondition, {
    NameIs => "name_is",
    NameStarts => "name_starts",
    NameContains => "name_contains",
    DescriptionIs => "description_is",
    DescriptionStarts => "description_starts",
    DescriptionContains => "description_contains",
    ContentIs => "content_is",
    ContentStarts => "content_starts",
    ContentContains => "content_contains",
    DateIs => "date_is",
    DateAfter => "date_after",
    DateBefore => "date_before",
    MetadataHasKey => "metadata_has_key",
    MetadataHasKeyValue => "metadata_has_key_value",
    MetadataCount => "metadata_count",
    MetadataCountLessThan => "metadata_count_less_than",
    MetadataCountMoreThan => "metadata_count_more_than",
});

kind_enum!(ActionKind, UnknownAction, {
    NameSet => "name_set",
    NameAppend => "name_append",
    DescriptionSet => "description_set",
    DescriptionAppend => "description_append",
    DateSet => "date_set",
    MetadataAdd => "metadata_add",
    MetadataRemove => "metadata_remove",
});

impl ConditionKind {
    pub fn is_date(&self) -> bool {
        matches!(
            self,
            ConditionKind::DateIs | ConditionKind::DateAfter | ConditionKind::DateBefore
        )
    }

    pub fn is_metadata_count(&self) -> bool {
        matches!(
            self,
            ConditionKind::MetadataCount
                | ConditionKind::MetadataCountLessThan
                | ConditionKind::MetadataCountMoreThan
        )
    }

    /// Kinds compared as text, where the regex flag applies.
    pub fn is_textual(&self) -> bool {
        !self.is_date() && !self.is_metadata_count() && !self.is_metadata_presence()
    }

    pub fn is_metadata_presence(&self) -> bool {
        matches!(
            self,
            ConditionKind::MetadataHasKey | ConditionKind::MetadataHasKeyValue
        )
    }
}

/// Date format used when a condition or action does not carry one.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub id: i64,
    pub kind: ConditionKind,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub metadata_key: Option<i64>,
    #[serde(default)]
    pub metadata_value: Option<i64>,
}

impl Condition {
    pub fn new(kind: ConditionKind, value: &str) -> Self {
        Self {
            id: 0,
            kind,
            value: value.to_string(),
            enabled: true,
            case_insensitive: false,
            inverted: false,
            is_regex: false,
            date_format: None,
            metadata_key: None,
            metadata_value: None,
        }
    }

    pub fn date_format(&self) -> &str {
        self.date_format
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_DATE_FORMAT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub id: i64,
    pub kind: ActionKind,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Apply only when the rule matched.
    #[serde(default = "default_true")]
    pub on_condition: bool,
    #[serde(default)]
    pub metadata_key: Option<i64>,
    #[serde(default)]
    pub metadata_value: Option<i64>,
}

impl Action {
    pub fn new(kind: ActionKind, value: &str) -> Self {
        Self {
            id: 0,
            kind,
            value: value.to_string(),
            enabled: true,
            on_condition: true,
            metadata_key: None,
            metadata_value: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Priority; lower runs first. Unique per user.
    pub order: i64,
    #[serde(default)]
    pub mode: RuleMode,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_identifiers_round_trip() {
        for kind in ConditionKind::ALL {
            assert_eq!(kind.as_str().parse::<ConditionKind>().unwrap(), *kind);
        }
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        match "content_sounds_like".parse::<ConditionKind>() {
            Err(RuleError::UnknownCondition(kind)) => assert_eq!(kind, "content_sounds_like"),
            other => panic!("expected UnknownCondition, got {:?}", other),
        }
        assert!(matches!(
            "tag_add".parse::<ActionKind>(),
            Err(RuleError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_condition_json_defaults() {
        let cond: Condition =
            serde_json::from_str(r#"{"kind": "content_contains", "value": "invoice"}"#).unwrap();
        assert!(cond.enabled);
        assert!(!cond.inverted);
        assert_eq!(cond.date_format(), DEFAULT_DATE_FORMAT);
    }

    #[test]
    fn test_rule_mode_parse() {
        assert_eq!("match_any".parse::<RuleMode>().unwrap(), RuleMode::MatchAny);
        assert!("match_some".parse::<RuleMode>().is_err());
    }
}
