use std::fmt;
use std::future::Future;
use std::future::Ready;
use std::future::ready;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use slide_limit::Admission;
use tower::BoxError;
use tower::Service;

use crate::error::LimitError;
use crate::request::RoutedRequest;
use crate::rule::RuleSet;

#[derive(Clone, Debug)]
struct RateLimitServiceMetrics {
    admitted: Counter<u64>,
    rejected: Counter<u64>,
}

pub struct RateLimitService<S, Req> {
    inner: S,
    rules: Arc<RuleSet<Req>>,
    admission: Arc<Admission>,
    instruments: RateLimitServiceMetrics,
}

pin_project! {
    /// Either the inner service's future or an immediate rejection.
    #[project = ResponseFutureProj]
    pub enum ResponseFuture<F, R> {
        Forward {
            #[pin]
            inner: F,
        },
        Rejected {
            #[pin]
            rejection: Ready<R>,
        },
    }
}

impl<F, R> Future for ResponseFuture<F, R>
where
    F: Future<Output = R>,
{
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            ResponseFutureProj::Forward { inner } => inner.poll(cx),
            ResponseFutureProj::Rejected { rejection } => rejection.poll(cx),
        }
    }
}

impl<S, Req> Clone for RateLimitService<S, Req>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            rules: Arc::clone(&self.rules),
            admission: Arc::clone(&self.admission),
            instruments: self.instruments.clone(),
        }
    }
}

impl<S, Req> fmt::Debug for RateLimitService<S, Req>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitService")
            .field("inner", &self.inner)
            .field("rules", &self.rules)
            .field("admission", &self.admission)
            .finish()
    }
}

impl<S, Req> Service<Req> for RateLimitService<S, Req>
where
    S: Service<Req, Error = BoxError>,
    Req: RoutedRequest,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        match self.admit(&req) {
            Ok(()) => ResponseFuture::Forward {
                inner: self.inner.call(req),
            },
            Err(err) => ResponseFuture::Rejected {
                rejection: ready(Err(err)),
            },
        }
    }
}

impl<S, Req> RateLimitService<S, Req> {
    pub fn new(inner: S, rules: Arc<RuleSet<Req>>, admission: Arc<Admission>) -> Self {
        let meter = global::meter("rate_limit_service");
        let instruments = RateLimitServiceMetrics {
            admitted: meter.u64_counter("admitted").build(),
            rejected: meter.u64_counter("rejected").build(),
        };

        Self {
            inner,
            rules,
            admission,
            instruments,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, Req: RoutedRequest> RateLimitService<S, Req> {
    fn admit(&self, req: &Req) -> Result<(), BoxError> {
        if !self.rules.is_enabled() {
            return Ok(());
        }

        let rule = self.rules.select(req);
        if rule.limit().is_exempt() {
            return Ok(());
        }

        let key = self.rules.key_for(rule, req);
        let labels = [KeyValue::new("rule", rule.name().to_owned())];
        match self.admission.check(&key, rule.limit()) {
            Ok(ControlFlow::Continue(())) => {
                self.instruments.admitted.add(1, &labels);
                Ok(())
            }
            Ok(ControlFlow::Break(reason)) => {
                tracing::info!(key, rule = rule.name(), ?reason, "request rate limited");
                self.instruments.rejected.add(1, &labels);
                Err(rule.rejection(req, &reason))
            }
            Err(err) => {
                tracing::warn!(key, rule = rule.name(), %err, "no counter for rule");
                Err(Box::new(LimitError::from(err)))
            }
        }
    }
}
