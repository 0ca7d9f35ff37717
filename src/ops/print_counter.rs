use log::debug;

use crate::ctx::Ctx;
use crate::doc::DocType;
use crate::error::Result;
use crate::value::Value;

pub const PRINT_COUNTER: &str = "print_counter";

/// Mark a document as printed: a `print_counter` of 0 becomes 1, written
/// straight to the store without a full save. Returns whether it changed.
pub fn update_print_counter(ctx: &Ctx<'_>, doctype: &DocType, name: &str) -> Result<bool> {
    let doc = ctx.store().load(doctype, name)?;
    let counter = doc.get(PRINT_COUNTER);
    if counter.is_null() || counter.as_i64() != Some(0) {
        return Ok(false);
    }
    ctx.store().set_value(doctype, name, PRINT_COUNTER, Value::Int(1))?;
    debug!("{doctype} {name} printed for the first time");
    Ok(true)
}
