//! Collaborators owned by the host application: the document store, the
//! permission checker and the realtime notification channel.
//!
//! The crate never reaches these through globals; every operation gets them
//! from the request-scoped [crate::ctx::Ctx].

use crate::doc::{DocType, Document, FieldName, InvalidName};
use crate::error::{Error, Result};
use crate::expr::Op;
use crate::value::Value;

/// In-memory implementations of the collaborators.
pub mod memory;

/// Condition on a single field, as used by store queries and by mapping
/// validations: `docstatus = 1`, `status != "Closed"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: FieldName,
    pub op: Op,
    pub value: Value,
}

impl Filter {
    pub fn new(field: &str, op: Op, value: impl Into<Value>) -> Result<Self, InvalidName> {
        Ok(Self {
            field: FieldName::new(field)?,
            op,
            value: value.into(),
        })
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Result<Self, InvalidName> {
        Self::new(field, Op::Eq, value)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.op.apply(&doc.get(&self.field), &self.value)
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

/// Whether a document satisfies all filters.
pub fn matches_all(filters: &[Filter], doc: &Document) -> bool {
    filters.iter().all(|f| f.matches(doc))
}

/// Document persistence and query primitives of the host.
///
/// Child rows are stored inside their parent documents but can be listed by
/// their own doctype; listed rows carry `parent`, `parenttype` and the
/// parent's docstatus.
pub trait DocumentStore {
    /// Load a document. Fails with [Error::NotFound] if it does not exist.
    fn load(&self, doctype: &DocType, name: &str) -> Result<Document>;

    fn exists(&self, doctype: &DocType, name: &str) -> Result<bool> {
        match self.load(doctype, name) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// A new unsaved document of the doctype.
    fn new_doc(&self, doctype: &DocType) -> Document {
        Document::new(doctype.clone())
    }

    /// Insert or update a document. New documents get a name.
    fn save(&self, doc: &mut Document) -> Result<()>;

    /// Move a draft to submitted and persist it.
    fn submit(&self, doc: &mut Document) -> Result<()>;

    /// Write one field of a stored document without running a full save.
    fn set_value(&self, doctype: &DocType, name: &str, field: &str, value: Value) -> Result<()>;

    /// Documents (or child rows) of the doctype matching all filters.
    fn get_list(&self, doctype: &DocType, filters: &[Filter]) -> Result<Vec<Document>>;

    fn count(&self, doctype: &DocType, filters: &[Filter]) -> Result<usize> {
        Ok(self.get_list(doctype, filters)?.len())
    }

    /// Field of the first matching document, `None` when nothing matches.
    fn get_value(&self, doctype: &DocType, filters: &[Filter], field: &str) -> Result<Option<Value>> {
        Ok(self
            .get_list(doctype, filters)?
            .first()
            .map(|doc| doc.get(field)))
    }

    /// Field of a single (settings) doctype. Unset fields and a missing
    /// settings record both read as `None`.
    fn get_single_value(&self, doctype: &DocType, field: &str) -> Result<Option<Value>> {
        match self.load(doctype, doctype.as_str()) {
            Ok(doc) => Ok(Some(doc.get(field)).filter(|v| !v.is_null())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Run a business-rule method of the host on an in-memory document,
    /// like recomputing rates. Unknown methods do nothing.
    fn run_method(&self, doc: &mut Document, method: &str) -> Result<()>;

    /// Next value of a naming series, starting at 1.
    fn next_series(&self, prefix: &str) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Write,
    Create,
    Submit,
    Cancel,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Create => "create",
            Action::Submit => "submit",
            Action::Cancel => "cancel",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait PermissionChecker {
    fn has_permission(&self, user: &str, roles: &[String], doctype: &DocType, action: Action) -> bool;
}

/// Grants everything. Used when the host enforces permissions itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionChecker for AllowAll {
    fn has_permission(&self, _: &str, _: &[String], _: &DocType, _: Action) -> bool {
        true
    }
}

/// Fire-and-forget channel to the user's browser session.
pub trait Notifier {
    /// Push a realtime event to one user.
    fn publish_realtime(&self, event: &str, payload: serde_json::Value, user: &str);

    /// Show a message to the user at the end of the request.
    fn msgprint(&self, user: &str, message: &str);
}

/// Drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl Notifier for Discard {
    fn publish_realtime(&self, _: &str, _: serde_json::Value, _: &str) {}

    fn msgprint(&self, _: &str, _: &str) {}
}

/// Map a missing-document error of a lookup into `None`.
pub fn optional(result: Result<Document>) -> Result<Option<Document>> {
    match result {
        Ok(doc) => Ok(Some(doc)),
        Err(Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
