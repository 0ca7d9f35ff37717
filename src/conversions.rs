//! Built-in document conversions. Their mappings are the YAML files bundled
//! from `mappings/`; the computed parts live here as post-processes.

use std::sync::LazyLock;

use log::debug;

use crate::catalog::{Catalog, PostProcessRegistry};
use crate::ctx::Ctx;
use crate::doc::{DocType, Document};
use crate::error::{Error, Result};
use crate::mapper::MappingSpec;

pub const PURCHASE_RECEIPT_TO_STOCK_ENTRY: &str = "purchase_receipt_to_stock_entry";
pub const REJECTED_ITEMS_TO_STOCK_ENTRY: &str = "rejected_items_to_stock_entry";
pub const QUALITY_INSPECTION_TO_STOCK_ENTRY: &str = "quality_inspection_to_stock_entry";
pub const COMPLAINS_FORM_TO_TECHNICAL_RETURNED: &str = "complains_form_to_technical_returned";

const BUNDLED: [(&str, &str); 4] = [
    (
        "mappings/purchase_receipt_to_stock_entry.yaml",
        include_str!("../mappings/purchase_receipt_to_stock_entry.yaml"),
    ),
    (
        "mappings/rejected_items_to_stock_entry.yaml",
        include_str!("../mappings/rejected_items_to_stock_entry.yaml"),
    ),
    (
        "mappings/quality_inspection_to_stock_entry.yaml",
        include_str!("../mappings/quality_inspection_to_stock_entry.yaml"),
    ),
    (
        "mappings/complains_form_to_technical_returned.yaml",
        include_str!("../mappings/complains_form_to_technical_returned.yaml"),
    ),
];

static CATALOG: LazyLock<Catalog> = LazyLock::new(|| {
    Catalog::from_sources(BUNDLED, &post_processes()).expect("bundled mappings are valid")
});

/// Catalog of the bundled mappings.
pub fn catalog() -> &'static Catalog {
    &CATALOG
}

/// Post-processes the bundled mappings refer to, by name.
pub fn post_processes() -> PostProcessRegistry {
    PostProcessRegistry::new()
        .register("material_transfer", material_transfer)
        .register("stock_entry_from_quality_inspection", stock_entry_from_quality_inspection)
}

fn spec(name: &str) -> Result<&'static MappingSpec> {
    CATALOG
        .get(name)
        .ok_or_else(|| Error::UnknownMapping(name.to_owned()))
}

/// Stock Entry moving the received quantities out of the receipt's warehouses.
pub fn make_stock_entry_from_purchase_receipt(
    ctx: &Ctx<'_>,
    source_name: &str,
    target: Option<Document>,
) -> Result<Document> {
    spec(PURCHASE_RECEIPT_TO_STOCK_ENTRY)?.apply(ctx, source_name, target)
}

/// Stock Entry moving the rejected quantities out of the rejected warehouses.
pub fn make_stock_entry_for_rejected_items(
    ctx: &Ctx<'_>,
    source_name: &str,
    target: Option<Document>,
) -> Result<Document> {
    spec(REJECTED_ITEMS_TO_STOCK_ENTRY)?.apply(ctx, source_name, target)
}

/// Stock Entry moving the accepted quantity out of the inspection warehouse.
pub fn make_stock_entry_from_quality_inspection(
    ctx: &Ctx<'_>,
    source_name: &str,
    target: Option<Document>,
) -> Result<Document> {
    spec(QUALITY_INSPECTION_TO_STOCK_ENTRY)?.apply(ctx, source_name, target)
}

pub fn make_technical_returned_from_complains_form(
    ctx: &Ctx<'_>,
    source_name: &str,
    target: Option<Document>,
) -> Result<Document> {
    spec(COMPLAINS_FORM_TO_TECHNICAL_RETURNED)?.apply(ctx, source_name, target)
}

fn material_transfer(ctx: &Ctx<'_>, _: &Document, target: &mut Document) -> Result<()> {
    target.set("purpose", "Material Transfer");
    ctx.store().run_method(target, "set_basic_rate")?;
    ctx.store().run_method(target, "get_stock_and_rate")
}

fn stock_entry_from_quality_inspection(ctx: &Ctx<'_>, source: &Document, target: &mut Document) -> Result<()> {
    let warehouses = &ctx.config().quality_inspection;
    let from_warehouse = match source.get("reference_type").as_str() {
        Some("Sales Invoice") => Some(warehouses.sales_invoice_warehouse.clone()),
        Some("Purchase Receipt") => Some(warehouses.purchase_receipt_warehouse.clone()),
        None | Some("") => Some(warehouses.unreferenced_warehouse.clone()),
        Some(other) => {
            debug!("No inspection warehouse for reference type `{other}`");
            None
        }
    };

    target.set("purpose", "Material Transfer");
    target.set("posting_date", ctx.today());
    target.set("from_warehouse", from_warehouse.clone());

    let item = ctx
        .store()
        .new_doc(&DocType::new("Stock Entry Detail")?)
        .with("s_warehouse", from_warehouse)
        .with("item_code", source.get("item_code"))
        .with("item_name", source.get("item_name"))
        .with("description", source.get("description"))
        .with("qty", source.get("accepted_quantity"))
        .with("batch_no", source.get("batch_no"))
        .with("uom", source.get("uom"));
    target.set_table("items", vec![item]);
    Ok(())
}
