//! # Classification Rules
//!
//! A [`Rule`] counts session requests matching a method and an exact path; once
//! the count reaches its threshold the rule's priority applies. A [`RuleSet`]
//! is the ordered, immutable list of rules loaded at startup. Configuration
//! order is evaluation order, so the most specific rules belong first.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{RuleConfig, ValidationIssue};
use crate::history::{normalize_path, SessionRequestEvent};
use crate::priority::Priority;

/// HTTP method predicate of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    /// Matches every method
    Any,
    /// Case-insensitive match on a single method
    Exact(String),
}

impl MethodMatcher {
    pub fn exact(method: impl Into<String>) -> Self {
        Self::Exact(method.into())
    }

    pub fn matches(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected.eq_ignore_ascii_case(method),
        }
    }
}

impl fmt::Display for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Exact(method) => write!(f, "{}", method.to_uppercase()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("occurrences must be at least 1")]
    ZeroOccurrences,
    #[error("result must be 'high' or 'low', got '{0}'")]
    NonClassifyingResult(Priority),
    #[error("exact method matcher requires a method name")]
    EmptyMethod,
}

/// One behavioral classification rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    description: String,
    method: MethodMatcher,
    path: String,
    occurrences: NonZeroU32,
    result: Priority,
}

impl Rule {
    pub fn new(
        description: impl Into<String>,
        method: MethodMatcher,
        path: &str,
        occurrences: u32,
        result: Priority,
    ) -> Result<Self, RuleError> {
        let occurrences = NonZeroU32::new(occurrences).ok_or(RuleError::ZeroOccurrences)?;
        if !result.is_rule_result() {
            return Err(RuleError::NonClassifyingResult(result));
        }
        if let MethodMatcher::Exact(m) = &method {
            if m.trim().is_empty() {
                return Err(RuleError::EmptyMethod);
            }
        }

        Ok(Self {
            description: description.into(),
            method,
            path: normalize_path(path),
            occurrences,
            result,
        })
    }

    /// Compile a raw rule, reporting every problem under `rules[index]`
    pub fn from_config(index: usize, raw: &RuleConfig) -> Result<Self, Vec<ValidationIssue>> {
        let field = |name: &str| format!("rules[{index}].{name}");
        let mut issues = Vec::new();

        let description = match raw.description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => Some(d.to_string()),
            _ => {
                issues.push(ValidationIssue::new(field("description"), "is required"));
                None
            }
        };

        let method = match &raw.method {
            None => {
                issues.push(ValidationIssue::new(field("method"), "is required"));
                None
            }
            Some(m) if m.should_match_all.unwrap_or(false) => Some(MethodMatcher::Any),
            Some(m) => match m.method.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => Some(MethodMatcher::exact(name)),
                _ => {
                    issues.push(ValidationIssue::new(
                        field("method.method"),
                        "is required unless should_match_all is true",
                    ));
                    None
                }
            },
        };

        let path = match raw.path.as_deref() {
            Some(path) => Some(path),
            None => {
                issues.push(ValidationIssue::new(field("path"), "is required"));
                None
            }
        };

        let occurrences = match raw.occurrences {
            None => {
                issues.push(ValidationIssue::new(field("occurrences"), "is required"));
                None
            }
            Some(n) if n <= 0 => {
                issues.push(ValidationIssue::new(
                    field("occurrences"),
                    format!("must be at least 1, got {n}"),
                ));
                None
            }
            Some(n) => match u32::try_from(n) {
                Ok(n) => Some(n),
                Err(_) => {
                    issues.push(ValidationIssue::new(
                        field("occurrences"),
                        format!("must not exceed {}, got {n}", u32::MAX),
                    ));
                    None
                }
            },
        };

        let result = match raw.result.as_deref() {
            None => {
                issues.push(ValidationIssue::new(field("result"), "is required"));
                None
            }
            Some(value) => match Priority::from_str(value) {
                Ok(priority) if priority.is_rule_result() => Some(priority),
                _ => {
                    issues.push(ValidationIssue::new(
                        field("result"),
                        format!("must be 'high' or 'low', got '{value}'"),
                    ));
                    None
                }
            },
        };

        match (description, method, path, occurrences, result) {
            (Some(description), Some(method), Some(path), Some(occurrences), Some(result))
                if issues.is_empty() =>
            {
                Rule::new(description, method, path, occurrences, result)
                    .map_err(|e| vec![ValidationIssue::new(format!("rules[{index}]"), e.to_string())])
            }
            _ => Err(issues),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn method(&self) -> &MethodMatcher {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn occurrences(&self) -> NonZeroU32 {
        self.occurrences
    }

    pub fn result(&self) -> Priority {
        self.result
    }

    /// Method predicate and exact path both hold
    pub fn matches(&self, event: &SessionRequestEvent) -> bool {
        self.method.matches(&event.method) && self.path == event.path
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} x{} => {}",
            self.method, self.path, self.occurrences, self.result
        )?;
        if !self.description.is_empty() {
            write!(f, " ({})", self.description)?;
        }
        Ok(())
    }
}

/// Ordered, immutable rule list; cheap to clone and share across tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Arc<[Rule]>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// Compile raw rules in order, collecting issues from every rule
    pub fn from_configs(raw: &[RuleConfig]) -> Result<Self, Vec<ValidationIssue>> {
        let mut rules = Vec::with_capacity(raw.len());
        let mut issues = Vec::new();

        for (index, rule) in raw.iter().enumerate() {
            match Rule::from_config(index, rule) {
                Ok(rule) => rules.push(rule),
                Err(rule_issues) => issues.extend(rule_issues),
            }
        }

        if issues.is_empty() {
            Ok(Self::new(rules))
        } else {
            Err(issues)
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}. {}", i + 1, rule)?;
        }
        Ok(())
    }
}
