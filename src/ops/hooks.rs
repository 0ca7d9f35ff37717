use log::{debug, trace};

use super::doctype;
use crate::ctx::Ctx;
use crate::doc::{DocStatus, Document};
use crate::error::{Error, Result};
use crate::store::{optional, Filter};
use crate::value::{flt, Value};

const ACCOUNTS_SETTINGS: &str = "Accounts Settings";

/// Role named in Accounts Settings, if one is configured.
fn controller_role(ctx: &Ctx<'_>, field: &str) -> Result<Option<String>> {
    let value = ctx.store().get_single_value(&doctype(ACCOUNTS_SETTINGS)?, field)?;
    Ok(value
        .and_then(|v| v.as_str().map(str::to_owned))
        .filter(|role| !role.is_empty()))
}

fn holds(ctx: &Ctx<'_>, role: Option<&str>) -> bool {
    role.is_some_and(|r| ctx.has_role(r))
}

fn contact_message(role: Option<&str>) -> String {
    match role {
        Some(role) => format!("Please contact a user with the Sales Master Manager / {role} role"),
        None => "Please contact a user with the Sales Master Manager role".to_owned(),
    }
}

/// Sum of the outstanding amounts of the customer's submitted invoices
/// with the company.
pub fn customer_outstanding(ctx: &Ctx<'_>, customer: &str, company: &Value) -> Result<f64> {
    let mut filters = vec![
        Filter::eq("customer", customer)?,
        Filter::eq("docstatus", i64::from(DocStatus::Submitted))?,
    ];
    if !company.is_null() {
        filters.push(Filter::eq("company", company.clone())?);
    }
    let invoices = ctx.store().get_list(&doctype("Sales Invoice")?, &filters)?;
    Ok(invoices
        .iter()
        .filter_map(|si| si.get("outstanding_amount").as_f64())
        .sum())
}

/// Credit limit of the customer, falling back to its customer group's and
/// then to the company's. A zero limit counts as unset.
pub fn credit_limit(ctx: &Ctx<'_>, customer: &str, company: &Value) -> Result<f64> {
    let limit_of = |doc: Option<&Document>| {
        doc.and_then(|d| d.get("credit_limit").as_f64())
            .unwrap_or_default()
    };

    let customer = optional(ctx.store().load(&doctype("Customer")?, customer))?;
    let customer_limit = limit_of(customer.as_ref());
    if customer_limit != 0.0 {
        return Ok(customer_limit);
    }

    let group = customer.as_ref().map(|c| c.get("customer_group"));
    if let Some(group) = group.as_ref().and_then(Value::as_str).filter(|g| !g.is_empty()) {
        let group = optional(ctx.store().load(&doctype("Customer Group")?, group))?;
        let group_limit = limit_of(group.as_ref());
        if group_limit != 0.0 {
            trace!("Credit limit of customer group {}", group_limit);
            return Ok(group_limit);
        }
    }

    match company.as_str() {
        Some(company) => Ok(limit_of(optional(ctx.store().load(&doctype("Company")?, company))?.as_ref())),
        None => Ok(0.0),
    }
}

/// Sales order validation hook. Flags `exceeded_credit_limits` when the
/// customer's outstanding amount is over their credit limit and tells the
/// user; only a warning, the order is still accepted.
pub fn check_credit_limit_in_sales_order(ctx: &Ctx<'_>, doc: &mut Document) -> Result<()> {
    doc.set("exceeded_credit_limits", 0);

    let customer = doc.get("customer");
    let Some(customer) = customer.as_str().filter(|c| !c.is_empty()) else {
        return Ok(());
    };
    let company = doc.get("company");

    let outstanding = flt(customer_outstanding(ctx, customer, &company)?, 2);
    let limit = credit_limit(ctx, customer, &company)?;
    trace!("{customer}: outstanding {outstanding}, credit limit {limit}");

    if limit > 0.0 && outstanding > limit {
        doc.set("exceeded_credit_limits", 1);
        ctx.msgprint(&format!(
            "Credit limit has been crossed for customer {customer} ({outstanding}/{limit})"
        ));

        let controller = controller_role(ctx, "credit_controller")?;
        if !holds(ctx, controller.as_deref()) {
            ctx.msgprint(&contact_message(controller.as_deref()));
        }
    }
    Ok(())
}

/// Sales order validation hook. Flags `has_overdue_invoice` when the
/// customer has an overdue invoice; the order is rejected unless the user
/// holds the overdue controller role from Accounts Settings.
pub fn check_overdue_sales_invoice(ctx: &Ctx<'_>, doc: &mut Document) -> Result<()> {
    doc.set("has_overdue_invoice", 0);

    let filters = [
        Filter::eq("customer", doc.get("customer"))?,
        Filter::eq("status", "Overdue")?,
    ];
    let overdue = ctx
        .store()
        .get_value(&doctype("Sales Invoice")?, &filters, "name")?;
    let Some(invoice) = overdue else {
        return Ok(());
    };

    debug!("{} has overdue invoice {invoice}", doc.get("customer"));
    doc.set("has_overdue_invoice", 1);
    ctx.msgprint("Customer has an overdue invoice");

    let controller = controller_role(ctx, "overdue_controller")?;
    if holds(ctx, controller.as_deref()) {
        Ok(())
    } else {
        Err(Error::validation(contact_message(controller.as_deref())))
    }
}

/// Stock entry submission hook. Finishing a completed production order
/// marks the material request it was made for as produced.
pub fn on_submit_stock_entry(ctx: &Ctx<'_>, doc: &Document) -> Result<()> {
    let order = doc.get("production_order");
    let Some(order) = order.as_str().filter(|o| !o.is_empty()) else {
        return Ok(());
    };

    let order = ctx.store().load(&doctype("Production Order")?, order)?;
    let request = order.get("material_request");
    match request.as_str() {
        Some(request) if !request.is_empty() && order.get("status") == Value::from("Completed") => {
            debug!("Material Request {request} produced");
            ctx.store()
                .set_value(&doctype("Material Request")?, request, "status", "Produced".into())
        }
        _ => Ok(()),
    }
}
