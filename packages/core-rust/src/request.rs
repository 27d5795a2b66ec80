//! Typed business requests routed through the execution pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a request, used by behaviors that only apply to some kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Mutates state. Runs inside a unit of work.
    Command,
    /// Reads state. Eligible for response caching.
    Query,
    /// One-shot action that is neither a plain read nor a plain write.
    Operation,
}

impl RequestKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Query => "query",
            Self::Operation => "operation",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business request handled by exactly one handler.
///
/// The provided methods are hooks read by the standard behaviors
/// (validation, authorization, caching). Their defaults opt out.
pub trait Request: Send + Sync + 'static {
    /// Value produced by the handler.
    type Response: Send + 'static;

    const KIND: RequestKind;

    /// Name used in logs, metrics and registry diagnostics.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Structural validation run before authorization-sensitive work.
    ///
    /// # Errors
    ///
    /// Returns every field failure found, not just the first.
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }

    /// Permission the caller's principal must hold, if any.
    fn required_permission(&self) -> Option<&str> {
        None
    }

    /// Key under which a query response may be cached. `None` disables caching.
    fn cache_key(&self) -> Option<String> {
        None
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Ordered collection of validation failures for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a single failure.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing was pushed, otherwise `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns `self` if at least one failure was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
