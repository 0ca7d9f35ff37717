//! Docmap maps business documents of one kind into another and carries the
//! small pieces of business logic that live around such conversions in a
//! document-centric business application: bulk submission and approval,
//! print counting, credit and overdue checks on sales orders, naming series
//! and a few read-only reports.
//!
//! The host application owns persistence, permissions and the user's
//! session. This crate only talks to it through the collaborator traits in
//! [store] and gets them, together with the caller's identity, from an
//! explicit request-scoped [ctx::Ctx]. Nothing here holds global mutable
//! state.
//!
//! # Documents
//! A [doc::Document] is a flat record of fields plus named child tables whose
//! rows are documents too. The standard fields every document has (name,
//! docstatus, parent linkage) live in typed slots; everything else lives in
//! an open field map. Doctypes may be declared in a [meta::Registry], in
//! which case mappings into them are checked against the declared fields.
//!
//! # Mappings
//! A [mapper::MappingSpec] describes how a document of one doctype becomes a
//! new document of another:
//! - a validation the source must pass,
//! - scalar field renames, with every other field copied under its own name,
//! - per child doctype, the target child doctype, renames and a row condition,
//! - an optional post-process that fills in what cannot be copied.
//!
//! Specs are built in code or loaded from versioned YAML files into a
//! [catalog::Catalog]. Conditions are written in a small expression language
//! (see [expr]), and mistakes in them are reported with the offending part of
//! the condition underlined.
//!
//! ```yaml
//! version: docmap/0.1
//! name: purchase_receipt_to_stock_entry
//! source: Purchase Receipt
//! target: Stock Entry
//! validation:
//!   docstatus: ["=", 1]
//! post_process: material_transfer
//! tables:
//!   Purchase Receipt Item:
//!     doctype: Stock Entry Detail
//!     field_map:
//!       warehouse: s_warehouse
//!     condition: "qty > 0"
//! ```
//!
//! Mapping never writes anything: the result is an unsaved document the
//! host shows to the user or saves itself.

/// Dynamic field values and their comparison rules.
pub mod value;

/// Documents, doctype and field names.
pub mod doc;

/// Declared schemas of doctypes, so that mappings can be validated against
/// the fields that really exist on the target.
pub mod meta;

/// Condition expressions used in mapping files.
pub mod expr;

pub mod span;

/// Module to aid user in understanding errors and providing hints on how to fix them.
pub mod error_expl;

pub mod error;

/// Request-scoped context passed to every operation.
pub mod ctx;

/// Collaborators provided by the host application.
pub mod store;

/// Settings of the operations, loaded from YAML.
pub mod config;

pub mod mapper;

pub mod catalog;

/// Built-in conversions between stock, quality and support documents.
pub mod conversions;

pub mod ops;

pub use ctx::Ctx;
pub use doc::{DocStatus, DocType, Document, FieldName};
pub use error::{Error, Result};
pub use mapper::{map, map_document, MappingSpec, Predicate, TableMapping};
pub use value::Value;

#[cfg(test)]
pub fn init_log() {
    use log::*;

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        flexi_logger::Logger::with(LevelFilter::Trace)
            .format(format)
            .start()
            .unwrap();
    });

    fn format(
        write: &mut dyn std::io::Write,
        _: &mut flexi_logger::DeferredNow,
        record: &Record,
    ) -> std::io::Result<()> {
        write.write_all(
            format!(
                "[{} {}:{}] {} - {}",
                record.level(),
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.module_path().unwrap_or_default(),
                record.args()
            )
            .as_bytes(),
        )
    }
}

/// Declarations of the doctypes the built-in conversions, hooks and reports
/// work with. See [meta::Registry::core].
pub fn core_doctypes_yaml() -> &'static str {
    include_str!("core/doctypes.yaml")
}
