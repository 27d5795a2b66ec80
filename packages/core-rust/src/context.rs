use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::Principal;

/// Per-request context carrying identity, tenancy, correlation and cancellation.
///
/// Threaded by reference through every behavior, the handler and every event
/// listener of a single request. Cancellation is cooperative: the core only
/// observes the token at suspension points it owns (timeouts, retry backoff).
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation identifier shared by the request and all events it causes.
    pub correlation_id: String,
    /// Tenant scope for multi-tenant isolation. `None` for single-tenant deployments.
    pub tenant_id: Option<String>,
    /// Authenticated principal, if the request is authenticated.
    pub principal: Option<Principal>,
    /// Per-request timeout overriding the configured default.
    pub timeout: Option<Duration>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Creates an anonymous context with a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            tenant_id: None,
            principal: None,
            timeout: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Replaces the generated correlation id with one supplied by the caller
    /// (typically propagated from an inbound transport header).
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Uses an externally owned cancellation token (e.g. one tied to the
    /// client connection) instead of the context's private one.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Derives a context for nested work. Identity and correlation are shared;
    /// the cancellation token is a child, so cancelling the parent cancels it
    /// but not the other way round.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            tenant_id: self.tenant_id.clone(),
            principal: self.principal.clone(),
            timeout: self.timeout,
            cancellation: self.cancellation.child_token(),
        }
    }

    /// The token observed by behaviors, handlers and listeners.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Signals cancellation to everything observing this context.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
