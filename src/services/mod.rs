pub mod access;
pub mod calendar;
pub mod cases;
pub mod clock;
pub mod invitations;
pub mod notifications;
pub mod postponement;

pub use access::AccessService;
pub use calendar::CalendarService;
pub use cases::CaseService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use invitations::InvitationService;
pub use notifications::NotificationService;
pub use postponement::PostponementService;

use std::collections::HashMap;
use std::fmt;

use crate::database::models::ChainError;
use crate::database::DatabaseError;

/// Why an authorization gate refused an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenial {
    NoAccess,
    InsufficientLevel,
}

impl fmt::Display for AccessDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDenial::NoAccess => f.write_str("You do not have access to this case"),
            AccessDenial::InsufficientLevel => {
                f.write_str("Your access level does not allow this action")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    AccessDenied(AccessDenial),

    #[error("{0}")]
    InvalidState(String),

    #[error("{message}")]
    Validation {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    #[error(transparent)]
    Database(DatabaseError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ServiceError::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation { message: message.into(), field_errors: None }
    }

    /// Validation failure pinned to one input field
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.clone());
        ServiceError::Validation { message, field_errors: Some(field_errors) }
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(what) => ServiceError::NotFound(what),
            DatabaseError::Duplicate(what) => {
                ServiceError::validation(format!("A {} already exists", what))
            }
            DatabaseError::StaleState(message) => ServiceError::InvalidState(message),
            DatabaseError::Chain(chain) => chain.into(),
            other => ServiceError::Database(other),
        }
    }
}

impl From<ChainError> for ServiceError {
    fn from(err: ChainError) -> Self {
        ServiceError::InvalidState(format!("malformed chain: {}", err))
    }
}
