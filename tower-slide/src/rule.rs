use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use slide_limit::Limit;
use slide_limit::Reason;
use tower::BoxError;

use crate::error::LimitError;
use crate::request::RoutedRequest;
use crate::request::sanitize_path;

/// Prefix shared by every counter key the middleware derives.
pub const KEY_PREFIX: &str = "RateLimiter-";

/// Client identifier used when a request carries none.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Name of the rule used when no other rule matches.
pub const GLOBAL_RULE: &str = "global";

pub type Predicate<Req> = Arc<dyn Fn(&Req) -> bool + Send + Sync>;
pub type LimitBreakHandler<Req> = Arc<dyn Fn(&Req, &Reason) -> BoxError + Send + Sync>;
pub type ClientKeyFn<Req> = Arc<dyn Fn(&Req) -> Option<String> + Send + Sync>;

/// A [`Limit`] plus the requests it applies to.
///
/// A rule with a route matches any request whose path starts with that route
/// and counts each distinct path under its own key. A rule with a predicate
/// matches whatever the predicate accepts and counts per client only.
pub struct LimitRule<Req> {
    name: String,
    limit: Limit,
    route: Option<String>,
    predicate: Option<Predicate<Req>>,
    on_limit: Option<LimitBreakHandler<Req>>,
}

impl<Req> Clone for LimitRule<Req> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            limit: self.limit,
            route: self.route.clone(),
            predicate: self.predicate.clone(),
            on_limit: self.on_limit.clone(),
        }
    }
}

impl<Req> fmt::Debug for LimitRule<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimitRule")
            .field("name", &self.name)
            .field("limit", &self.limit)
            .field("route", &self.route)
            .field("predicate", &self.predicate.is_some())
            .field("on_limit", &self.on_limit.is_some())
            .finish()
    }
}

impl<Req> LimitRule<Req> {
    /// A rule that matches nothing until given a predicate.
    pub fn new(name: impl Into<String>, limit: Limit) -> Self {
        Self {
            name: name.into(),
            limit,
            route: None,
            predicate: None,
            on_limit: None,
        }
    }

    /// A rule for every path under `route`, named after the route.
    pub fn for_route(route: impl Into<String>, limit: Limit) -> Self {
        let route = route.into();
        Self {
            name: route.clone(),
            limit,
            route: Some(route),
            predicate: None,
            on_limit: None,
        }
    }

    /// Replaces route matching with `predicate`.
    ///
    /// Keys still include the request path if the rule has a route.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Req) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Builds the error returned for requests this rule rejects.
    ///
    /// Without a handler, rejections produce [`LimitError::RateLimited`].
    pub fn with_limit_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Req, &Reason) -> BoxError + Send + Sync + 'static,
    {
        self.on_limit = Some(Arc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub(crate) fn rejection(&self, req: &Req, reason: &Reason) -> BoxError {
        match &self.on_limit {
            Some(handler) => handler(req, reason),
            None => {
                let Reason::Exceeded { retry_after, .. } = reason;
                Box::new(LimitError::RateLimited {
                    retry_after: *retry_after,
                })
            }
        }
    }
}

impl<Req: RoutedRequest> LimitRule<Req> {
    pub fn matches(&self, req: &Req) -> bool {
        if let Some(predicate) = &self.predicate {
            return predicate(req);
        }
        match &self.route {
            Some(route) => sanitize_path(req.path()).starts_with(sanitize_path(route)),
            None => false,
        }
    }
}

/// An ordered list of rules backed by a global fallback.
pub struct RuleSet<Req> {
    enabled: bool,
    rules: Vec<LimitRule<Req>>,
    global: LimitRule<Req>,
    client_key: Option<ClientKeyFn<Req>>,
}

impl<Req> Clone for RuleSet<Req> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            rules: self.rules.clone(),
            global: self.global.clone(),
            client_key: self.client_key.clone(),
        }
    }
}

impl<Req> fmt::Debug for RuleSet<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("enabled", &self.enabled)
            .field("rules", &self.rules)
            .field("global", &self.global)
            .field("client_key", &self.client_key.is_some())
            .finish()
    }
}

impl<Req> RuleSet<Req> {
    pub fn new(global: Limit) -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
            global: LimitRule::new(GLOBAL_RULE, global),
            client_key: None,
        }
    }

    /// A rule set that admits everything.
    pub fn disabled() -> Self {
        Self::new(Limit::new(0, Duration::ZERO)).with_enabled(false)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Appends a rule. Rules are tried in insertion order.
    pub fn with_rule(mut self, rule: LimitRule<Req>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Replaces the global fallback rule, keeping its name.
    pub fn with_global_rule(mut self, rule: LimitRule<Req>) -> Self {
        self.global = rule;
        self
    }

    /// Overrides how the client part of a key is derived.
    pub fn with_client_key<F>(mut self, client_key: F) -> Self
    where
        F: Fn(&Req) -> Option<String> + Send + Sync + 'static,
    {
        self.client_key = Some(Arc::new(client_key));
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn rules(&self) -> &[LimitRule<Req>] {
        &self.rules
    }

    pub fn global(&self) -> &LimitRule<Req> {
        &self.global
    }
}

impl<Req: RoutedRequest> RuleSet<Req> {
    /// The first matching rule, or the global rule.
    pub fn select(&self, req: &Req) -> &LimitRule<Req> {
        self.rules
            .iter()
            .find(|rule| rule.matches(req))
            .unwrap_or(&self.global)
    }

    /// The counter key for `req` under `rule`.
    ///
    /// `RateLimiter-{client}` for rules without a route and
    /// `RateLimiter-{client}-{path}` for rules with one.
    pub fn key_for(&self, rule: &LimitRule<Req>, req: &Req) -> String {
        let client = match &self.client_key {
            Some(derive) => derive(req),
            None => req.client_key(),
        };
        let client = client.as_deref().unwrap_or(UNKNOWN_CLIENT);

        match rule.route() {
            Some(_) => format!("{KEY_PREFIX}{client}-{}", sanitize_path(req.path())),
            None => format!("{KEY_PREFIX}{client}"),
        }
    }
}
