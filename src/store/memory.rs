use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use log::{debug, trace};

use super::{matches_all, Action, DocumentStore, Filter, Notifier, PermissionChecker};
use crate::doc::{DocStatus, DocType, Document};
use crate::error::{Error, Result};
use crate::value::Value;

/// Business-rule method registered on a [MemoryStore].
pub type MethodFn = fn(&mut Document) -> Result<()>;

/// Document store kept in memory. Reference implementation of
/// [DocumentStore], and the test double for everything built on it.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocType, BTreeMap<String, Document>>>,
    series: Mutex<HashMap<String, u64>>,
    methods: RwLock<HashMap<(DocType, String), MethodFn>>,
    calls: Mutex<Vec<(DocType, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a document and return its name. Fixture helper.
    pub fn insert(&self, mut doc: Document) -> Result<String> {
        self.save(&mut doc)?;
        Ok(doc.name().unwrap_or_default().to_owned())
    }

    pub fn register_method(&self, doctype: &DocType, method: &str, f: MethodFn) {
        if let Ok(mut methods) = self.methods.write() {
            methods.insert((doctype.clone(), method.to_owned()), f);
        }
    }

    /// Methods run through [DocumentStore::run_method], in call order.
    pub fn method_calls(&self) -> Vec<(DocType, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn len(&self, doctype: &DocType) -> usize {
        self.docs
            .read()
            .map(|docs| docs.get(doctype).map(BTreeMap::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().map(|docs| docs.values().all(BTreeMap::is_empty)).unwrap_or(true)
    }

    fn poisoned<T>(_: T) -> Error {
        Error::Store("memory store lock poisoned".to_owned())
    }

    fn autoname(&self, doctype: &DocType) -> Result<String> {
        let n = self.next_series(doctype.as_str())?;
        Ok(format!("{doctype}-{n:05}"))
    }

    /// Number child rows and propagate parent identity and status to them.
    fn link_children(doc: &mut Document) {
        let parent = doc.name().map(str::to_owned);
        let parenttype = doc.doctype().clone();
        let docstatus = doc.docstatus();
        for (table, rows) in doc.tables_mut() {
            for (i, row) in rows.iter_mut().enumerate() {
                let idx = i as u32 + 1;
                row.set_parent(parent.clone(), parenttype.clone(), table, idx);
                row.set_docstatus(docstatus);
                if row.is_new() {
                    if let Some(parent) = &parent {
                        row.set_name(format!("{parent}-{table}-{idx}"));
                    }
                }
            }
        }
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, doctype: &DocType, name: &str) -> Result<Document> {
        let docs = self.docs.read().map_err(Self::poisoned)?;
        docs.get(doctype)
            .and_then(|by_name| by_name.get(name))
            .cloned()
            .ok_or_else(|| Error::not_found(doctype, name))
    }

    fn save(&self, doc: &mut Document) -> Result<()> {
        if doc.is_new() {
            let name = self.autoname(doc.doctype())?;
            doc.set_name(name);
        }
        let name = doc.name().unwrap_or_default().to_owned();

        let mut docs = self.docs.write().map_err(Self::poisoned)?;
        let by_name = docs.entry(doc.doctype().clone()).or_default();
        if let Some(stored) = by_name.get(&name) {
            if stored.docstatus() == DocStatus::Cancelled {
                return Err(Error::validation(format!(
                    "Cannot edit cancelled {} {name}",
                    doc.doctype()
                )));
            }
        }

        Self::link_children(doc);
        debug!("Saved {} {name}", doc.doctype());
        by_name.insert(name, doc.clone());
        Ok(())
    }

    fn submit(&self, doc: &mut Document) -> Result<()> {
        if doc.docstatus() != DocStatus::Draft {
            return Err(Error::validation(format!(
                "Cannot submit {} {}: it is not a draft",
                doc.doctype(),
                doc.name().unwrap_or("(new)")
            )));
        }
        doc.set_docstatus(DocStatus::Submitted);
        if let Err(e) = self.save(doc) {
            doc.set_docstatus(DocStatus::Draft);
            return Err(e);
        }
        Ok(())
    }

    fn set_value(&self, doctype: &DocType, name: &str, field: &str, value: Value) -> Result<()> {
        let mut docs = self.docs.write().map_err(Self::poisoned)?;
        let doc = docs
            .get_mut(doctype)
            .and_then(|by_name| by_name.get_mut(name))
            .ok_or_else(|| Error::not_found(doctype, name))?;
        trace!("Set {doctype} {name}.{field} = {value}");
        if !doc.set(field, value) {
            return Err(Error::validation(format!(
                "Invalid value for {doctype}.{field}"
            )));
        }
        Ok(())
    }

    fn get_list(&self, doctype: &DocType, filters: &[Filter]) -> Result<Vec<Document>> {
        let docs = self.docs.read().map_err(Self::poisoned)?;

        let roots = docs.get(doctype).into_iter().flat_map(|by_name| by_name.values());
        let rows = docs
            .values()
            .flat_map(|by_name| by_name.values())
            .flat_map(|parent| parent.tables().flat_map(|(_, rows)| rows.iter()))
            .filter(|row| row.doctype() == doctype);

        Ok(roots
            .chain(rows)
            .filter(|doc| matches_all(filters, doc))
            .cloned()
            .collect())
    }

    fn run_method(&self, doc: &mut Document, method: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((doc.doctype().clone(), method.to_owned()));
        }
        let f = self
            .methods
            .read()
            .map_err(Self::poisoned)?
            .get(&(doc.doctype().clone(), method.to_owned()))
            .copied();
        match f {
            Some(f) => f(doc),
            None => {
                trace!("No method `{method}` on {}", doc.doctype());
                Ok(())
            }
        }
    }

    fn next_series(&self, prefix: &str) -> Result<u64> {
        let mut series = self.series.lock().map_err(Self::poisoned)?;
        let current = series.entry(prefix.to_owned()).or_insert(0);
        *current += 1;
        Ok(*current)
    }
}

/// Permissions granted to roles, per doctype and action.
#[derive(Debug, Default, Clone)]
pub struct RolePermissions {
    grants: HashMap<(DocType, Action), Vec<String>>,
}

impl RolePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, doctype: &DocType, action: Action, role: &str) -> Self {
        self.grants
            .entry((doctype.clone(), action))
            .or_default()
            .push(role.to_owned());
        self
    }
}

impl PermissionChecker for RolePermissions {
    fn has_permission(&self, user: &str, roles: &[String], doctype: &DocType, action: Action) -> bool {
        if user == "Administrator" {
            return true;
        }
        self.grants
            .get(&(doctype.clone(), action))
            .is_some_and(|granted| granted.iter().any(|r| roles.contains(r)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Realtime {
        event: String,
        payload: serde_json::Value,
        user: String,
    },
    Message {
        user: String,
        message: String,
    },
}

/// Keeps every notification for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Message { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn realtime(&self, event: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Realtime { event: e, payload, .. } if e == event => Some(payload),
                _ => None,
            })
            .collect()
    }

    fn push(&self, n: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(n);
        }
    }
}

impl Notifier for RecordingNotifier {
    fn publish_realtime(&self, event: &str, payload: serde_json::Value, user: &str) {
        self.push(Notification::Realtime {
            event: event.to_owned(),
            payload,
            user: user.to_owned(),
        });
    }

    fn msgprint(&self, user: &str, message: &str) {
        self.push(Notification::Message {
            user: user.to_owned(),
            message: message.to_owned(),
        });
    }
}
