//! Operations the host invokes directly: bulk actions from list views,
//! document hooks, naming, and read-only reports.

use crate::doc::DocType;
use crate::error::Result;

/// Submit and approve many documents in one request.
pub mod bulk;

/// Validation and submission hooks of sales orders and stock entries.
pub mod hooks;

/// Naming series.
pub mod naming;

pub mod print_counter;

/// Read-only queries behind dashboards and search fields.
pub mod reports;

/// Doctype from a name literal of this crate.
fn doctype(name: &str) -> Result<DocType> {
    Ok(DocType::new(name)?)
}
