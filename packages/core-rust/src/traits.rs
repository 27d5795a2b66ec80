//! Contracts for collaborators the core calls but does not implement.

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::types::Principal;

/// An open transactional unit against the persistence layer.
///
/// Exactly one of `commit` or `rollback` is called per unit.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn commit(self: Box<Self>) -> anyhow::Result<()>;

    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}

/// Opens units of work. Supplied by the persistence layer.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    async fn begin(&self, ctx: &RequestContext) -> anyhow::Result<Box<dyn UnitOfWork>>;
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    /// No principal, or the principal could not be verified.
    Unauthenticated,
    Forbidden { reason: String },
}

/// Authorization provider consulted for requests that name a permission.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, principal: Option<&Principal>, permission: &str) -> AuthDecision;
}

/// Authorizer that grants a permission to principals holding a role of the same name.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAuthorizer;

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn authorize(&self, principal: Option<&Principal>, permission: &str) -> AuthDecision {
        match principal {
            None => AuthDecision::Unauthenticated,
            Some(p) if p.has_role(permission) => AuthDecision::Allow,
            Some(p) => AuthDecision::Forbidden {
                reason: format!("principal {} lacks {permission}", p.id),
            },
        }
    }
}
