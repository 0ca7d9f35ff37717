use thiserror::Error;

use crate::doc::{DocType, InvalidName};

/// Errors of document operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested document does not exist in the store.
    #[error("{doctype} {name} not found")]
    NotFound { doctype: DocType, name: String },

    /// A precondition of the operation does not hold, or a hook rejected
    /// the document.
    #[error("{0}")]
    Validation(String),

    /// The caller lacks the capability the operation requires.
    #[error("Not permitted: {user} cannot {action} {doctype}")]
    Permission {
        user: String,
        doctype: DocType,
        action: String,
    },

    /// A field map names a field the target doctype does not have.
    #[error("Field `{field}` does not exist on {doctype}")]
    Mapping { doctype: DocType, field: String },

    /// The mapping spec does not fit the documents it was given.
    #[error("Mapping spec expects {expected}, got {found}")]
    SpecMismatch { expected: DocType, found: DocType },

    /// No mapping of that name is loaded.
    #[error("Unknown mapping `{0}`")]
    UnknownMapping(String),

    #[error(transparent)]
    InvalidName(#[from] InvalidName),

    /// Failure reported by the document store itself.
    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    pub fn not_found(doctype: &DocType, name: impl Into<String>) -> Self {
        Error::NotFound {
            doctype: doctype.clone(),
            name: name.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
