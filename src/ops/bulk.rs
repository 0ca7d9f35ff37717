use log::{debug, warn};
use serde_json::json;

use crate::ctx::Ctx;
use crate::doc::{DocStatus, DocType};
use crate::error::{Error, Result};
use crate::store::Action;

/// What happened to one document of a batch.
#[derive(Debug)]
pub enum Outcome {
    Done,

    /// Left alone on purpose, with the reason.
    Skipped(String),

    Failed(Error),
}

/// Per-document outcomes of a bulk operation, in input order.
#[derive(Debug, Default)]
pub struct BatchResult {
    items: Vec<(String, Outcome)>,
}

impl BatchResult {
    fn push(&mut self, name: &str, outcome: Outcome) {
        self.items.push((name.to_owned(), outcome));
    }

    pub fn items(&self) -> &[(String, Outcome)] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.items.iter().find(|(n, _)| n == name).map(|(_, o)| o)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|(name, outcome)| match outcome {
            Outcome::Done => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().filter_map(|(name, outcome)| match outcome {
            Outcome::Skipped(reason) => Some((name.as_str(), reason.as_str())),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.items.iter().filter_map(|(name, outcome)| match outcome {
            Outcome::Failed(e) => Some((name.as_str(), e)),
            _ => None,
        })
    }

    /// No document failed. Skipped documents do not count as failures.
    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Submit every named document independently of the others.
///
/// For batches of at least `config.bulk.progress_threshold` documents a
/// `progress` event is pushed to the caller after each successful submit.
pub fn submit_multiple<S: AsRef<str>>(ctx: &Ctx<'_>, doctype: &DocType, names: &[S]) -> BatchResult {
    let total = names.len();
    let report_progress = total >= ctx.config().bulk.progress_threshold;
    let title = format!("Submitting {doctype}");

    let mut result = BatchResult::default();
    for (i, name) in names.iter().enumerate() {
        let name = name.as_ref();
        match submit_one(ctx, doctype, name) {
            Ok(()) => {
                if report_progress {
                    ctx.publish_realtime("progress", json!({ "progress": [i + 1, total], "title": title }));
                }
                result.push(name, Outcome::Done);
            }
            Err(e) => {
                warn!("Failed to submit {doctype} {name}: {e}");
                result.push(name, Outcome::Failed(e));
            }
        }
    }

    debug!(
        "Submitted {} of {total} {doctype} documents",
        result.succeeded().count()
    );
    result
}

fn submit_one(ctx: &Ctx<'_>, doctype: &DocType, name: &str) -> Result<()> {
    ctx.check_permission(doctype, Action::Submit)?;
    let mut doc = ctx.store().load(doctype, name)?;
    ctx.store().submit(&mut doc)
}

/// Set `status` on every named draft and save it.
///
/// Requires write permission on the doctype; without it nothing is loaded
/// or changed. Documents past the draft stage are skipped.
pub fn approve_multiple<S: AsRef<str>>(
    ctx: &Ctx<'_>,
    doctype: &DocType,
    names: &[S],
    status: &str,
) -> Result<BatchResult> {
    ctx.check_permission(doctype, Action::Write)?;

    let mut result = BatchResult::default();
    for name in names {
        let name = name.as_ref();
        let outcome = match approve_one(ctx, doctype, name, status) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Failed to set {doctype} {name} to {status}: {e}");
                Outcome::Failed(e)
            }
        };
        result.push(name, outcome);
    }
    Ok(result)
}

fn approve_one(ctx: &Ctx<'_>, doctype: &DocType, name: &str, status: &str) -> Result<Outcome> {
    let mut doc = ctx.store().load(doctype, name)?;
    if doc.docstatus() != DocStatus::Draft {
        return Ok(Outcome::Skipped(format!("{doctype} {name} is not a draft")));
    }
    doc.set("status", status);
    ctx.store().save(&mut doc)?;
    Ok(Outcome::Done)
}
