use std::sync::Arc;

use slide_limit::Admission;
use tower::Layer;

use crate::rule::RuleSet;
use crate::service::RateLimitService;

/// Applies per-client sliding window limits to requests.
///
/// Every service produced by a layer (and every clone of it) shares one
/// [`Admission`], so limits hold across connections.
#[derive(Debug)]
pub struct RateLimitLayer<Req> {
    rules: Arc<RuleSet<Req>>,
    admission: Arc<Admission>,
}

impl<Req> Clone for RateLimitLayer<Req> {
    fn clone(&self) -> Self {
        Self {
            rules: Arc::clone(&self.rules),
            admission: Arc::clone(&self.admission),
        }
    }
}

impl<Req> RateLimitLayer<Req> {
    /// Create a RateLimitLayer with its own counter cache.
    pub fn new(rules: RuleSet<Req>) -> Self {
        Self::with_admission(rules, Arc::new(Admission::new()))
    }

    /// Create a RateLimitLayer over an existing [`Admission`].
    ///
    /// Useful to share counters between layers or drive them with a mock clock.
    pub fn with_admission(rules: RuleSet<Req>, admission: Arc<Admission>) -> Self {
        Self {
            rules: Arc::new(rules),
            admission,
        }
    }

    /// The admission state, e.g. for [`spawn_sweeper`](crate::spawn_sweeper).
    pub fn admission(&self) -> &Arc<Admission> {
        &self.admission
    }

    pub fn rules(&self) -> &RuleSet<Req> {
        &self.rules
    }
}

impl<S, Req> Layer<S> for RateLimitLayer<Req> {
    type Service = RateLimitService<S, Req>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService::new(service, Arc::clone(&self.rules), Arc::clone(&self.admission))
    }
}
