use std::collections::BTreeMap;

use lazy_regex::regex_is_match;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidName {
    #[error("Invalid doctype name: `{0}`")]
    DocType(String),

    #[error("Invalid field name: `{0}`")]
    Field(String),
}

/// Name of a document schema, like `Purchase Receipt` or `Stock Entry Detail`.
#[derive(Clone, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct DocType(String);

impl DocType {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidName> {
        let name = name.into();
        if regex_is_match!(r"^[A-Za-z][A-Za-z0-9 _\-]{0,139}$", &name) && !name.ends_with(' ') {
            Ok(Self(name))
        } else {
            Err(InvalidName::DocType(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Name of a document field or child table, like `qty` or `items`.
#[derive(Clone, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct FieldName(String);

impl FieldName {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidName> {
        let name = name.into();
        if regex_is_match!(r"^[a-zA-Z_][a-zA-Z0-9_]{0,63}$", &name) {
            Ok(Self(name))
        } else {
            Err(InvalidName::Field(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! name_impls {
    ($ty:ident) => {
        impl TryFrom<String> for $ty {
            type Error = InvalidName;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                $ty::new(s)
            }
        }

        impl TryFrom<&str> for $ty {
            type Error = InvalidName;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                $ty::new(s)
            }
        }

        impl From<$ty> for String {
            fn from(name: $ty) -> String {
                name.0
            }
        }

        impl std::str::FromStr for $ty {
            type Err = InvalidName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::new(s)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $ty {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(&self.0, f)
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.0 == other.0
            }
        }

        impl PartialEq<str> for $ty {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $ty {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

name_impls!(DocType);
name_impls!(FieldName);

/// Lifecycle status of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum DocStatus {
    #[default]
    Draft = 0,
    Submitted = 1,
    Cancelled = 2,
}

#[derive(Debug, Error)]
#[error("Invalid docstatus: {0}")]
pub struct InvalidDocStatus(i64);

impl TryFrom<i64> for DocStatus {
    type Error = InvalidDocStatus;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(DocStatus::Draft),
            1 => Ok(DocStatus::Submitted),
            2 => Ok(DocStatus::Cancelled),
            other => Err(InvalidDocStatus(other)),
        }
    }
}

impl From<DocStatus> for i64 {
    fn from(s: DocStatus) -> i64 {
        s as i64
    }
}

/// Field names held in typed slots of [Document] rather than in its open field map.
pub const STANDARD_FIELDS: &[&str] = &[
    "doctype",
    "name",
    "docstatus",
    "idx",
    "parent",
    "parentfield",
    "parenttype",
];

pub fn is_standard_field(field: &str) -> bool {
    STANDARD_FIELDS.contains(&field)
}

/// A business document: either a root document or a row of a child table.
///
/// The standard fields listed in [STANDARD_FIELDS] live in typed slots. All
/// other scalar fields live in an open map; [Document::get] and
/// [Document::set] route between the two, so callers can treat a document
/// as a plain record. Child tables are named lists of row documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    doctype: DocType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    #[serde(default)]
    docstatus: DocStatus,

    #[serde(default, skip_serializing_if = "is_zero")]
    idx: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    parentfield: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    parenttype: Option<DocType>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    tables: BTreeMap<String, Vec<Document>>,

    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Document {
    /// A new, unsaved draft of the given doctype.
    pub fn new(doctype: DocType) -> Self {
        Self {
            doctype,
            name: None,
            docstatus: DocStatus::Draft,
            idx: 0,
            parent: None,
            parentfield: None,
            parenttype: None,
            tables: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn doctype(&self) -> &DocType {
        &self.doctype
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Whether the document was never persisted.
    pub fn is_new(&self) -> bool {
        self.name.is_none()
    }

    pub fn docstatus(&self) -> DocStatus {
        self.docstatus
    }

    pub fn set_docstatus(&mut self, status: DocStatus) {
        self.docstatus = status;
    }

    pub fn idx(&self) -> u32 {
        self.idx
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn parentfield(&self) -> Option<&str> {
        self.parentfield.as_deref()
    }

    pub fn parenttype(&self) -> Option<&DocType> {
        self.parenttype.as_ref()
    }

    /// Attach this row to a parent document's table.
    pub fn set_parent(&mut self, parent: Option<String>, parenttype: DocType, parentfield: &str, idx: u32) {
        self.parent = parent;
        self.parenttype = Some(parenttype);
        self.parentfield = Some(parentfield.to_owned());
        self.idx = idx;
    }

    /// Value of a field, standard or not. Missing fields read as [Value::Null].
    pub fn get(&self, field: &str) -> Value {
        match field {
            "doctype" => Value::Str(self.doctype.to_string()),
            "name" => self.name.clone().into(),
            "docstatus" => Value::Int(self.docstatus.into()),
            "idx" => Value::Int(self.idx as i64),
            "parent" => self.parent.clone().into(),
            "parentfield" => self.parentfield.clone().into(),
            "parenttype" => self.parenttype.as_ref().map(|d| d.to_string()).into(),
            _ => self.fields.get(field).cloned().unwrap_or_default(),
        }
    }

    /// Whether the document carries the field, either as a standard field or
    /// as an explicitly set custom one (even if null).
    pub fn has_field(&self, field: &str) -> bool {
        is_standard_field(field) || self.fields.contains_key(field)
    }

    /// Set a field. Standard field names update the typed slots; a value that
    /// does not fit the slot (like a docstatus of 7) leaves it unchanged and
    /// returns `false`.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        match field {
            "doctype" => match value.as_str().map(DocType::new) {
                Some(Ok(doctype)) => self.doctype = doctype,
                _ => return false,
            },
            "name" => self.name = value_to_opt_string(value),
            "docstatus" => match value.as_i64().map(DocStatus::try_from) {
                Some(Ok(status)) => self.docstatus = status,
                _ => return false,
            },
            "idx" => match value.as_i64().and_then(|i| u32::try_from(i).ok()) {
                Some(idx) => self.idx = idx,
                None => return false,
            },
            "parent" => self.parent = value_to_opt_string(value),
            "parentfield" => self.parentfield = value_to_opt_string(value),
            "parenttype" => match value_to_opt_string(value).map(DocType::new) {
                Some(Ok(doctype)) => self.parenttype = Some(doctype),
                None => self.parenttype = None,
                Some(Err(_)) => return false,
            },
            _ => {
                self.fields.insert(field.to_owned(), value);
            }
        }
        true
    }

    /// Custom (non-standard) fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn table(&self, table: &str) -> &[Document] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn table_mut(&mut self, table: &str) -> &mut Vec<Document> {
        self.tables.entry(table.to_owned()).or_default()
    }

    /// Child tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &[Document])> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn tables_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<Document>)> {
        self.tables.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Append a row to a child table, numbering it after the existing rows.
    pub fn append(&mut self, table: &str, mut row: Document) -> &mut Document {
        let parent = self.name.clone();
        let parenttype = self.doctype.clone();
        let rows = self.table_mut(table);
        row.set_parent(parent, parenttype, table, rows.len() as u32 + 1);
        rows.push(row);
        rows.last_mut().expect("row was just pushed")
    }

    /// Replace a child table with the given rows, renumbering them.
    pub fn set_table(&mut self, table: &str, rows: Vec<Document>) {
        self.table_mut(table).clear();
        for row in rows {
            self.append(table, row);
        }
    }

    /// Builder-style [Document::set] for fixtures and computed rows.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }
}

fn value_to_opt_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Str(s) => Some(s),
        other => Some(other.to_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(name: &str) -> DocType {
        DocType::new(name).unwrap()
    }

    #[test]
    fn doctype_names() {
        assert!(DocType::new("Purchase Receipt Item").is_ok());
        assert!(DocType::new("").is_err());
        assert!(DocType::new("Stock Entry ").is_err());
        assert!(DocType::new("tab`x`").is_err());
    }

    #[test]
    fn field_names() {
        assert!(FieldName::new("s_warehouse").is_ok());
        assert!(FieldName::new("_private").is_ok());
        assert!(FieldName::new("9lives").is_err());
        assert!(FieldName::new("rejected qty").is_err());
    }

    #[test]
    fn standard_fields_route_to_typed_slots() {
        let mut doc = Document::new(dt("Purchase Receipt"));
        assert!(doc.set("docstatus", 1));
        assert_eq!(doc.docstatus(), DocStatus::Submitted);
        assert_eq!(doc.get("docstatus"), Value::Int(1));
        assert!(!doc.fields().any(|(k, _)| k == "docstatus"));

        assert!(!doc.set("docstatus", 7));
        assert_eq!(doc.docstatus(), DocStatus::Submitted);

        doc.set("name", "PR-0001");
        assert_eq!(doc.name(), Some("PR-0001"));
        assert!(!doc.is_new());
    }

    #[test]
    fn missing_fields_read_as_null() {
        let doc = Document::new(dt("Stock Entry"));
        assert!(doc.get("purpose").is_null());
        assert!(!doc.has_field("purpose"));
        assert!(doc.has_field("idx"));
    }

    #[test]
    fn append_numbers_rows() {
        let mut doc = Document::new(dt("Stock Entry"));
        doc.set_name("STE-1");
        doc.append("items", Document::new(dt("Stock Entry Detail")).with("qty", 1));
        doc.append("items", Document::new(dt("Stock Entry Detail")).with("qty", 2));

        let rows = doc.table("items");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].idx(), 2);
        assert_eq!(rows[1].parent(), Some("STE-1"));
        assert_eq!(rows[1].parentfield(), Some("items"));

        doc.set_table("items", vec![Document::new(dt("Stock Entry Detail"))]);
        assert_eq!(doc.table("items").len(), 1);
        assert_eq!(doc.table("items")[0].idx(), 1);
    }

    #[test]
    fn deserializes_from_yaml() {
        let doc: Document = serde_yml::from_str(
            r#"
doctype: Purchase Receipt
name: PR-0001
docstatus: 1
supplier: ACME
posting_date: "2024-03-01"
tables:
  items:
    - doctype: Purchase Receipt Item
      item_code: BOLT
      qty: 5
"#,
        )
        .unwrap();

        assert_eq!(doc.docstatus(), DocStatus::Submitted);
        assert_eq!(doc.get("supplier"), Value::from("ACME"));
        assert!(matches!(doc.get("posting_date"), Value::Date(_)));
        assert_eq!(doc.table("items")[0].get("qty"), Value::Int(5));
    }
}
