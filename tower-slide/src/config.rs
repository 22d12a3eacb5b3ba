use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use slide_limit::Limit;

use crate::error::LimitError;
use crate::request::sanitize_path;
use crate::rule::LimitRule;
use crate::rule::RuleSet;

/// Limiter settings, typically loaded from a `[rate_limit]`-style TOML table.
///
/// ```toml
/// global_request_limit = 100
/// global_limit_period_secs = 60
///
/// [[rules]]
/// route = "/api/login"
/// request_limit = 5
/// limit_period_secs = 300
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimiterConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub global_request_limit: u64,
    #[serde(default)]
    pub global_limit_period_secs: u64,
    #[serde(default)]
    pub rules: Vec<RouteRuleConfig>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteRuleConfig {
    pub route: String,
    #[serde(default)]
    pub request_limit: u64,
    #[serde(default)]
    pub limit_period_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            global_request_limit: 0,
            global_limit_period_secs: 0,
            rules: Vec::new(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RouteRuleConfig {
    pub fn limit(&self) -> Limit {
        Limit::new(
            self.request_limit,
            Duration::from_secs(self.limit_period_secs),
        )
    }
}

impl LimiterConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, LimitError> {
        toml::from_str(input).map_err(|e| LimitError::Config(e.to_string()))
    }

    pub fn global_limit(&self) -> Limit {
        Limit::new(
            self.global_request_limit,
            Duration::from_secs(self.global_limit_period_secs),
        )
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), LimitError> {
        if self.sweep_interval_secs == 0 {
            return Err(LimitError::Config(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.route.is_empty() {
                return Err(LimitError::Config("rule route must not be empty".to_string()));
            }
            if !rule.route.starts_with('/') {
                return Err(LimitError::Config(format!(
                    "rule route '{}' must start with '/'",
                    rule.route
                )));
            }
            if !seen.insert(sanitize_path(&rule.route)) {
                return Err(LimitError::Config(format!(
                    "duplicate rule route '{}'",
                    rule.route
                )));
            }
        }
        Ok(())
    }

    /// Validates the settings and builds the matching [`RuleSet`].
    pub fn into_rule_set<Req>(self) -> Result<RuleSet<Req>, LimitError> {
        self.validate()?;

        let global = self.global_limit();
        let rules = self
            .rules
            .into_iter()
            .fold(RuleSet::new(global), |set, rule| {
                let limit = rule.limit();
                set.with_rule(LimitRule::for_route(rule.route, limit))
            });
        Ok(rules.with_enabled(self.enabled))
    }
}
