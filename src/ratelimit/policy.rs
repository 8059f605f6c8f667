//! Rate limit policies and named policy rules.
//!
//! A [`RatePolicy`] is the pair the limiter enforces: how many calls are
//! allowed, and how long a window lasts. Named rules let a deployment define
//! one policy per throttled action in YAML.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Result, WindowgateError};

/// Default number of calls allowed per window.
pub const DEFAULT_MAX_CALLS: u32 = 5;
/// Default window length in milliseconds.
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// A validated fixed-window policy.
///
/// Both values are strictly positive; there is no way to build a policy that
/// allows zero calls or has an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RatePolicy {
    max_calls: u32,
    window_ms: u64,
}

impl RatePolicy {
    /// Create a policy allowing `max_calls` per `window_ms` milliseconds.
    pub fn new(max_calls: u32, window_ms: u64) -> Result<Self> {
        if max_calls == 0 {
            return Err(WindowgateError::InvalidArgument(
                "max_calls must be greater than zero".to_string(),
            ));
        }
        if window_ms == 0 {
            return Err(WindowgateError::InvalidArgument(
                "window must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_calls,
            window_ms,
        })
    }

    /// Create a policy from a `Duration` window.
    pub fn per(max_calls: u32, window: Duration) -> Result<Self> {
        Self::new(max_calls, window.as_millis() as u64)
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_MAX_CALLS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

/// Time unit shorthand for policy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// A named policy as written in configuration.
///
/// Exactly one of `unit` and `window_ms` sets the window length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Calls allowed per window
    pub max_calls: u32,
    /// Window length as a unit of time
    #[serde(default)]
    pub unit: Option<TimeUnit>,
    /// Window length in milliseconds
    #[serde(default)]
    pub window_ms: Option<u64>,
}

impl PolicyRule {
    /// Resolve this rule into an enforceable policy.
    pub fn to_policy(&self) -> Result<RatePolicy> {
        let window_ms = match (self.unit, self.window_ms) {
            (Some(unit), None) => unit.duration().as_millis() as u64,
            (None, Some(ms)) => ms,
            (Some(_), Some(_)) => {
                return Err(WindowgateError::Config(
                    "policy rule sets both unit and window_ms".to_string(),
                ))
            }
            (None, None) => {
                return Err(WindowgateError::Config(
                    "policy rule needs either unit or window_ms".to_string(),
                ))
            }
        };
        RatePolicy::new(self.max_calls, window_ms)
            .map_err(|e| WindowgateError::Config(e.to_string()))
    }
}

/// A table of named policies, one per throttled action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRules {
    #[serde(default)]
    pub policies: HashMap<String, PolicyRule>,
}

fn parse_err(e: serde_yaml::Error) -> WindowgateError {
    WindowgateError::Config(format!("Failed to parse policy rules: {}", e))
}

impl PolicyRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML string.
    ///
    /// See [`from_value`](Self::from_value) for the accepted shapes.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(parse_err)?;
        Self::from_value(value)
    }

    /// Build rules from an already parsed YAML value.
    ///
    /// Accepts either a document whose only key is `policies` or a bare map
    /// of name to rule. A lone entry named `policies` that is itself a rule
    /// is read as a bare map. Every rule is resolved once so a bad entry
    /// fails here rather than at first use.
    pub fn from_value(value: serde_yaml::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(PolicyRules::new());
        }

        let wrapped = value
            .as_mapping()
            .is_some_and(|m| m.len() == 1 && m.get("policies").is_some());

        let rules = if wrapped {
            match serde_yaml::from_value::<PolicyRules>(value.clone()) {
                Ok(rules) => rules,
                Err(_) => Self::from_bare_map(value)?,
            }
        } else {
            Self::from_bare_map(value)?
        };

        rules.validate()?;
        Ok(rules)
    }

    fn from_bare_map(value: serde_yaml::Value) -> Result<Self> {
        let policies =
            serde_yaml::from_value::<HashMap<String, PolicyRule>>(value).map_err(parse_err)?;
        Ok(PolicyRules { policies })
    }

    /// Check that every rule resolves to a valid policy.
    pub fn validate(&self) -> Result<()> {
        for (name, rule) in &self.policies {
            rule.to_policy()
                .map_err(|e| WindowgateError::Config(format!("policy '{}': {}", name, e)))?;
        }
        Ok(())
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Result<RatePolicy> {
        let rule = self
            .policies
            .get(name)
            .ok_or_else(|| WindowgateError::Config(format!("unknown policy '{}'", name)))?;
        rule.to_policy()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RatePolicy::default();
        assert_eq!(policy.max_calls(), 5);
        assert_eq!(policy.window_ms(), 60_000);
        assert_eq!(policy.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_policy_rejects_zero_values() {
        assert!(matches!(
            RatePolicy::new(0, 1000),
            Err(WindowgateError::InvalidArgument(_))
        ));
        assert!(matches!(
            RatePolicy::new(3, 0),
            Err(WindowgateError::InvalidArgument(_))
        ));
        assert!(RatePolicy::per(3, Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_time_unit_duration() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_parse_policies_document() {
        let yaml = r#"
policies:
  moderation:
    max_calls: 5
    unit: minute
  comment:
    max_calls: 20
    window_ms: 3600000
"#;
        let rules = PolicyRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 2);

        let moderation = rules.get("moderation").unwrap();
        assert_eq!(moderation.max_calls(), 5);
        assert_eq!(moderation.window_ms(), 60_000);

        let comment = rules.get("comment").unwrap();
        assert_eq!(comment.max_calls(), 20);
        assert_eq!(comment.window(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_bare_map() {
        let yaml = r#"
upload:
  max_calls: 2
  unit: second
"#;
        let rules = PolicyRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.get("upload").unwrap().window_ms(), 1000);
    }

    #[test]
    fn test_bare_map_with_policy_named_policies() {
        let yaml = r#"
policies:
  max_calls: 3
  unit: second
upload:
  max_calls: 2
  unit: minute
"#;
        let rules = PolicyRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.get("policies").unwrap().max_calls(), 3);
        assert_eq!(rules.get("upload").unwrap().window_ms(), 60_000);
    }

    #[test]
    fn test_lone_rule_named_policies() {
        let yaml = r#"
policies:
  max_calls: 4
  window_ms: 250
"#;
        let rules = PolicyRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.get("policies").unwrap().window_ms(), 250);
    }

    #[test]
    fn test_rule_with_both_windows_rejected() {
        let yaml = r#"
policies:
  broken:
    max_calls: 2
    unit: second
    window_ms: 500
"#;
        let err = PolicyRules::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_rule_with_zero_calls_rejected() {
        let yaml = r#"
policies:
  locked:
    max_calls: 0
    unit: minute
"#;
        assert!(matches!(
            PolicyRules::from_yaml(yaml),
            Err(WindowgateError::Config(_))
        ));
    }

    #[test]
    fn test_empty_document() {
        let rules = PolicyRules::from_yaml("").unwrap();
        assert!(rules.is_empty());

        let rules = PolicyRules::from_yaml("policies: {}").unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_unknown_policy() {
        let rules = PolicyRules::new();
        assert!(rules.is_empty());
        assert!(matches!(
            rules.get("missing"),
            Err(WindowgateError::Config(_))
        ));
    }
}
