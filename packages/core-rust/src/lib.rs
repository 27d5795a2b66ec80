//! Courier Core — request and event model, request context, and the contracts
//! of the collaborators the runtime calls into.

pub mod clock;
pub mod context;
pub mod event;
pub mod request;
pub mod traits;
pub mod types;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use context::RequestContext;
pub use event::{DomainEvent, EventId, EventMetadata};
pub use request::{FieldError, Request, RequestKind, ValidationErrors};
pub use traits::{AuthDecision, Authorizer, RoleAuthorizer, UnitOfWork, UnitOfWorkFactory};
pub use types::Principal;
