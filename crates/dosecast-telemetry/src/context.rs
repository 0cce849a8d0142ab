//! Span context shared between the HTTP stack and the code it calls.
//!
//! A [`RequestContext`] is stored in task-local storage for the lifetime of a
//! request, so deep callers (error rendering, the prediction service) can log
//! the request id and route without threading them through every signature.

use std::future::Future;
use std::sync::Arc;

use tracing::{Span, field, span::Entered};

use crate::init::build_sha;

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Keeps a process-wide `service` span entered until dropped.
pub struct ServiceSpan {
    _entered: Entered<'static>,
}

impl ServiceSpan {
    /// Enter a root span tagging every event with the service name and build SHA.
    ///
    /// The span lives for the rest of the process; create one per binary.
    #[must_use]
    pub fn enter(service: &str) -> Self {
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "service",
            service = service,
            build_sha = build_sha()
        )));
        Self {
            _entered: span.enter(),
        }
    }
}

/// Identifiers describing the request being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: Arc<str>,
    route: Arc<str>,
}

impl RequestContext {
    /// Context for one request; `route` is the matched template, not the raw path.
    #[must_use]
    pub fn new(request_id: &str, route: &str) -> Self {
        Self {
            request_id: Arc::from(request_id),
            route: Arc::from(route),
        }
    }

    /// Correlation id from the `x-request-id` header.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Matched route template.
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Context of the request the calling task is serving, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT.try_with(Clone::clone).ok()
    }

    /// Write `request_id` and `route` onto `span`. Fields the span did not
    /// declare are ignored.
    pub fn record_on(&self, span: &Span) {
        span.record("request_id", field::display(&self.request_id));
        span.record("route", field::display(&self.route));
    }

    /// Run `fut` with this context visible through [`RequestContext::current`].
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(self, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_span_can_be_entered() {
        drop(ServiceSpan::enter("dosecast-test"));
    }

    #[tokio::test]
    async fn context_is_visible_only_inside_scope() {
        let ctx = RequestContext::new("req-42", "/api/images/{patient_id}");
        let seen = ctx
            .clone()
            .scope(async { RequestContext::current() })
            .await;
        assert_eq!(seen, Some(ctx));
        assert!(RequestContext::current().is_none());
    }

    #[test]
    fn record_on_accepts_undeclared_fields() {
        let span = tracing::info_span!("request", request_id = field::Empty);
        let ctx = RequestContext::new("req-1", "/health");
        ctx.record_on(&span);
        assert_eq!(ctx.route(), "/health");
        assert_eq!(ctx.request_id(), "req-1");
    }
}
