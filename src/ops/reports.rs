use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use log::trace;
use serde::Serialize;

use super::doctype;
use crate::ctx::Ctx;
use crate::doc::{Document, FieldName, STANDARD_FIELDS};
use crate::error::Result;
use crate::expr::{like, Op};
use crate::store::{optional, Filter};
use crate::value::{flt, Value};

/// Sales orders completed, as a percentage of all submitted orders that
/// were not closed. Rounded to two decimals.
pub fn percentage_completed_of_sales_order(ctx: &Ctx<'_>) -> Result<f64> {
    let sales_order = doctype("Sales Order")?;
    let total = ctx.store().count(
        &sales_order,
        &[Filter::eq("docstatus", 1)?, Filter::new("status", Op::Ne, "Closed")?],
    )?;
    let completed = ctx.store().count(
        &sales_order,
        &[Filter::eq("docstatus", 1)?, Filter::eq("status", "Completed")?],
    )?;
    Ok(flt(completed as f64 * 100.0 / total.max(1) as f64, 2))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellingRate {
    pub base_rate: f64,
    pub rate: f64,
}

/// Rate the item was last sold at, from the submitted sales invoice with
/// the latest posting date and time.
pub fn last_selling_rate(ctx: &Ctx<'_>, item_code: &str) -> Result<Option<SellingRate>> {
    let rows = ctx.store().get_list(
        &doctype("Sales Invoice Item")?,
        &[Filter::eq("item_code", item_code)?, Filter::eq("docstatus", 1)?],
    )?;

    let sales_invoice = doctype("Sales Invoice")?;
    let mut posted: BTreeMap<String, (Option<NaiveDate>, Option<NaiveTime>)> = BTreeMap::new();
    let mut latest: Option<(&Document, (Option<NaiveDate>, Option<NaiveTime>))> = None;
    for row in &rows {
        let parent = row.parent().unwrap_or_default();
        let key = match posted.get(parent).copied() {
            Some(key) => key,
            None => {
                let invoice = optional(ctx.store().load(&sales_invoice, parent))?;
                let key = invoice.map_or((None, None), |si| {
                    (si.get("posting_date").as_date(), si.get("posting_time").as_time())
                });
                posted.insert(parent.to_owned(), key);
                key
            }
        };
        if latest.as_ref().map_or(true, |(_, k)| key > *k) {
            latest = Some((row, key));
        }
    }

    Ok(latest.map(|(row, _)| SellingRate {
        base_rate: row.get("base_rate").as_f64().unwrap_or_default(),
        rate: row.get("rate").as_f64().unwrap_or_default(),
    }))
}

/// Address linked to a document through its Dynamic Link rows. Hosts
/// usually look up addresses of a `Customer`.
pub fn address_by_link(ctx: &Ctx<'_>, link_name: &str, link_doctype: &str) -> Result<Option<Document>> {
    if link_name.is_empty() {
        return Ok(None);
    }

    let parent = ctx.store().get_value(
        &doctype("Dynamic Link")?,
        &[
            Filter::eq("parenttype", "Address")?,
            Filter::eq("link_doctype", link_doctype)?,
            Filter::eq("link_name", link_name)?,
        ],
        "parent",
    )?;
    match parent.as_ref().and_then(Value::as_str) {
        Some(address) => optional(ctx.store().load(&doctype("Address")?, address)),
        None => Ok(None),
    }
}

/// Search-as-you-type over sales invoice items.
#[derive(Debug, Clone)]
pub struct ItemSearch {
    pub txt: String,

    /// Field searched besides item group, name, barcode and description.
    pub searchfield: String,

    pub start: usize,
    pub page_len: usize,

    /// Extra conditions from the caller.
    pub filters: Vec<Filter>,
}

impl ItemSearch {
    pub fn new(txt: impl Into<String>) -> Self {
        Self {
            txt: txt.into(),
            searchfield: "item_code".to_owned(),
            start: 0,
            page_len: 20,
            filters: Vec::new(),
        }
    }

    pub fn searchfield(mut self, field: &str) -> Self {
        self.searchfield = field.to_owned();
        self
    }

    pub fn page(mut self, start: usize, page_len: usize) -> Self {
        self.start = start;
        self.page_len = page_len;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSearchRow {
    pub item_code: String,
    pub item_group: String,
    pub item_name: String,
    pub description: String,
}

/// 1-based position of `needle` in `haystack`, ignoring case; 0 when absent.
fn locate(needle: &str, haystack: &str) -> usize {
    if needle.is_empty() {
        return 1;
    }
    let haystack = haystack.to_lowercase();
    haystack
        .find(&needle.to_lowercase())
        .map(|byte| haystack[..byte].chars().count() + 1)
        .unwrap_or(0)
}

fn truncate(text: String, at: usize) -> String {
    if text.chars().count() > at {
        let mut cut: String = text.chars().take(at).collect();
        cut.push_str("...");
        cut
    } else {
        text
    }
}

/// Non-cancelled sales invoice items matching the search text, best
/// matches first: by where the text appears in the item code, then in the
/// item name, then latest rows first.
pub fn sales_invoice_item_query(ctx: &Ctx<'_>, search: &ItemSearch) -> Result<Vec<ItemSearchRow>> {
    let searchfield = FieldName::new(search.searchfield.as_str())?;
    let mut filters = vec![Filter::new("docstatus", Op::Lt, 2)?];
    filters.extend(search.filters.iter().cloned());
    let rows = ctx.store().get_list(&doctype("Sales Invoice Item")?, &filters)?;

    let pattern = format!("%{}%", search.txt);
    let searched = [
        searchfield.as_str(),
        "item_group",
        "item_name",
        "barcode",
        "description",
    ];
    let mut matches: Vec<&Document> = rows
        .iter()
        .filter(|row| {
            searched.iter().any(|field| {
                let value = row.get(field);
                !value.is_null() && like(&value.to_text(), &pattern)
            })
        })
        .collect();
    trace!("{} of {} items match `{}`", matches.len(), rows.len(), search.txt);

    let needle = search.txt.replace('%', "");
    let position = |row: &Document, field: &str| match locate(&needle, &row.get(field).to_text()) {
        0 => 99999,
        n => n,
    };
    matches.sort_by_cached_key(|row| {
        (
            position(row, "item_code"),
            position(row, "item_name"),
            Reverse(row.idx()),
            row.name().unwrap_or_default().to_owned(),
            row.get("item_name").to_text(),
        )
    });

    let truncate_at = ctx.config().search.truncate_at;
    Ok(matches
        .into_iter()
        .skip(search.start)
        .take(search.page_len)
        .map(|row| ItemSearchRow {
            item_code: row.get("item_code").to_text(),
            item_group: row.get("item_group").to_text(),
            item_name: truncate(row.get("item_name").to_text(), truncate_at),
            description: truncate(row.get("description").to_text(), truncate_at),
        })
        .collect())
}

/// Fields of the sales invoice item with the given code on the given
/// invoice: the requested ones, or all of them.
pub fn sales_invoice_item(
    ctx: &Ctx<'_>,
    item_code: &str,
    parent: &str,
    fields: Option<&[&str]>,
) -> Result<Option<BTreeMap<String, Value>>> {
    let rows = ctx.store().get_list(
        &doctype("Sales Invoice Item")?,
        &[Filter::eq("parent", parent)?, Filter::eq("item_code", item_code)?],
    )?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };

    let values = match fields {
        Some(fields) => fields
            .iter()
            .map(|f| -> Result<(String, Value)> { Ok((FieldName::new(*f)?.to_string(), row.get(f))) })
            .collect::<Result<_>>()?,
        None => STANDARD_FIELDS
            .iter()
            .map(|f| (f.to_string(), row.get(f)))
            .filter(|(_, v)| !v.is_null())
            .chain(row.fields().map(|(k, v)| (k.to_owned(), v.clone())))
            .collect(),
    };
    Ok(Some(values))
}
