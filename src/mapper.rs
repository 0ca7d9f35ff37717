//! Document mapper: builds a new, unsaved document of one doctype from a
//! stored document of another, following a declarative [MappingSpec].
//!
//! Mapping runs in one pass:
//! 1. the source is loaded and checked against the spec's validation,
//! 2. scalar fields are copied (renamed by the field map, identity otherwise),
//! 3. child rows passing their table's condition are mapped and appended in
//!    source order,
//! 4. the post-process callback computes whatever a static rename cannot.
//!
//! Nothing is written to the store; saving the result is up to the caller.

use log::{debug, trace};
use smallvec::SmallVec;
use thiserror::Error;

use crate::ctx::Ctx;
use crate::doc::{is_standard_field, DocType, Document, FieldName, InvalidName};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::meta::{DocTypeMeta, Registry};
use crate::store::{matches_all, Filter};

/// Bookkeeping fields of the host that a mapped document must not inherit.
pub const NEVER_COPIED: &[&str] = &["owner", "creation", "modified", "modified_by", "amended_from"];

/// Computes target fields from the whole source after structural mapping.
pub type PostProcess = fn(&Ctx<'_>, &Document, &mut Document) -> Result<()>;

/// Predicate over a document or a child row.
#[derive(Debug, Clone, Default)]
pub enum Predicate {
    #[default]
    Always,

    /// All filters must hold, like `docstatus = 1`.
    Filters(Vec<Filter>),

    /// Condition expression, like `qty > 0`.
    Expr(Expr),

    Fn(fn(&Document) -> bool),
}

impl Predicate {
    /// The document must be submitted.
    pub fn submitted() -> Self {
        Predicate::Filters(vec![Filter {
            field: FieldName::new("docstatus").expect("valid field name"),
            op: crate::expr::Op::Eq,
            value: 1.into(),
        }])
    }

    pub fn test(&self, doc: &Document) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Filters(filters) => matches_all(filters, doc),
            Predicate::Expr(expr) => expr.test(doc),
            Predicate::Fn(f) => f(doc),
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Always => write!(f, "true"),
            Predicate::Filters(filters) => {
                let parts: Vec<String> = filters.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" and "))
            }
            Predicate::Expr(expr) => write!(f, "{expr}"),
            Predicate::Fn(_) => write!(f, "custom condition"),
        }
    }
}

/// Ordered source-to-target field renames.
#[derive(Debug, Clone, Default)]
pub struct FieldMap(SmallVec<[(FieldName, FieldName); 4]>);

impl FieldMap {
    pub fn insert(&mut self, source: FieldName, target: FieldName) {
        match self.0.iter_mut().find(|(s, _)| *s == source) {
            Some(entry) => entry.1 = target,
            None => self.0.push((source, target)),
        }
    }

    pub fn target_of(&self, source: &str) -> Option<&FieldName> {
        self.0.iter().find(|(s, _)| *s == source).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldName, &FieldName)> {
        self.0.iter().map(|(s, t)| (s, t))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How rows of one child doctype are carried over.
#[derive(Debug, Clone)]
pub struct TableMapping {
    source_doctype: DocType,
    target_doctype: DocType,
    target_table: Option<FieldName>,
    field_map: FieldMap,
    field_no_map: SmallVec<[FieldName; 4]>,
    condition: Predicate,
}

impl TableMapping {
    pub fn builder(source_doctype: &str, target_doctype: &str) -> TableMappingBuilder {
        TableMappingBuilder {
            source_doctype: source_doctype.to_owned(),
            target_doctype: target_doctype.to_owned(),
            target_table: None,
            field_map: Vec::new(),
            field_no_map: Vec::new(),
            condition: Predicate::Always,
        }
    }

    pub fn source_doctype(&self) -> &DocType {
        &self.source_doctype
    }

    pub fn target_doctype(&self) -> &DocType {
        &self.target_doctype
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    pub fn condition(&self) -> &Predicate {
        &self.condition
    }

    /// Table of the target document the mapped rows go to.
    fn target_table(&self, target_meta: Option<&DocTypeMeta>, source_table: &str) -> String {
        if let Some(table) = &self.target_table {
            return table.to_string();
        }
        target_meta
            .and_then(|meta| meta.table_for(&self.target_doctype))
            .map(|t| t.name.to_string())
            .unwrap_or_else(|| source_table.to_owned())
    }
}

pub struct TableMappingBuilder {
    source_doctype: String,
    target_doctype: String,
    target_table: Option<String>,
    field_map: Vec<(String, String)>,
    field_no_map: Vec<String>,
    condition: Predicate,
}

impl TableMappingBuilder {
    pub fn field_map(mut self, source: &str, target: &str) -> Self {
        self.field_map.push((source.to_owned(), target.to_owned()));
        self
    }

    pub fn no_map(mut self, field: &str) -> Self {
        self.field_no_map.push(field.to_owned());
        self
    }

    /// Rows failing the condition are dropped.
    pub fn condition(mut self, condition: Predicate) -> Self {
        self.condition = condition;
        self
    }

    /// Explicit target table, when it cannot be found by child doctype.
    pub fn target_table(mut self, table: &str) -> Self {
        self.target_table = Some(table.to_owned());
        self
    }

    fn build(self) -> Result<TableMapping, SpecError> {
        Ok(TableMapping {
            source_doctype: DocType::new(self.source_doctype)?,
            target_doctype: DocType::new(self.target_doctype)?,
            target_table: self.target_table.map(FieldName::new).transpose()?,
            field_map: build_field_map(self.field_map)?,
            field_no_map: self
                .field_no_map
                .into_iter()
                .map(FieldName::new)
                .collect::<Result<_, _>>()?,
            condition: self.condition,
        })
    }
}

fn build_field_map(pairs: Vec<(String, String)>) -> Result<FieldMap, SpecError> {
    let mut map = FieldMap::default();
    for (source, target) in pairs {
        let target = FieldName::new(target)?;
        if is_standard_field(target.as_str()) {
            return Err(SpecError::StandardFieldTarget(target));
        }
        map.insert(FieldName::new(source)?, target);
    }
    Ok(map)
}

/// Declarative description of how one doctype is turned into another.
///
/// Specs are stateless: build them once and share them between calls.
#[derive(Debug, Clone)]
pub struct MappingSpec {
    source_doctype: DocType,
    target_doctype: DocType,
    field_map: FieldMap,
    field_no_map: SmallVec<[FieldName; 4]>,
    validation: Predicate,
    tables: Vec<TableMapping>,
    post_process: Option<PostProcess>,
}

#[derive(Debug, Error, PartialEq)]
pub enum SpecError {
    #[error(transparent)]
    InvalidName(#[from] InvalidName),

    #[error("Child doctype `{0}` is mapped more than once")]
    DuplicatedTable(DocType),

    /// Standard fields belong to the target document and are never renamed into.
    #[error("Standard field `{0}` cannot be a rename target")]
    StandardFieldTarget(FieldName),
}

impl MappingSpec {
    pub fn builder(source_doctype: &str, target_doctype: &str) -> MappingSpecBuilder {
        MappingSpecBuilder {
            source_doctype: source_doctype.to_owned(),
            target_doctype: target_doctype.to_owned(),
            field_map: Vec::new(),
            field_no_map: Vec::new(),
            validation: Predicate::Always,
            tables: Vec::new(),
            post_process: None,
        }
    }

    pub fn source_doctype(&self) -> &DocType {
        &self.source_doctype
    }

    pub fn target_doctype(&self) -> &DocType {
        &self.target_doctype
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    pub fn validation(&self) -> &Predicate {
        &self.validation
    }

    pub fn tables(&self) -> &[TableMapping] {
        &self.tables
    }

    pub fn post_process(&self) -> Option<PostProcess> {
        self.post_process
    }

    pub fn table_for(&self, source_child: &DocType) -> Option<&TableMapping> {
        self.tables.iter().find(|t| &t.source_doctype == source_child)
    }

    /// Check the renames and target tables against the declared schemas.
    /// Doctypes missing from the registry are open and accept any field.
    pub fn check(&self, registry: &Registry) -> Result<()> {
        let target_meta = registry.doctype(&self.target_doctype);
        check_field_map(&self.field_map, &self.target_doctype, target_meta)?;

        for table in &self.tables {
            let child_meta = registry.doctype(&table.target_doctype);
            check_field_map(&table.field_map, &table.target_doctype, child_meta)?;

            let Some(meta) = target_meta else { continue };
            let declared = match &table.target_table {
                Some(name) => meta.table(name).is_some(),
                None => meta.table_for(&table.target_doctype).is_some(),
            };
            if !declared {
                let field = table
                    .target_table
                    .as_ref()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| format!("<table of {}>", table.target_doctype));
                return Err(Error::Mapping {
                    doctype: self.target_doctype.clone(),
                    field,
                });
            }
        }
        Ok(())
    }

    /// Load `source_name` and map it. See [map].
    pub fn apply(&self, ctx: &Ctx<'_>, source_name: &str, existing_target: Option<Document>) -> Result<Document> {
        map(ctx, &self.source_doctype, source_name, self, existing_target)
    }
}

/// Renames may not write the standard fields, and must name a declared field
/// when the doctype has a schema.
fn check_field_map(field_map: &FieldMap, doctype: &DocType, meta: Option<&DocTypeMeta>) -> Result<()> {
    for (_, target) in field_map.iter() {
        let declared = meta.map_or(true, |m| m.has_field(target));
        if is_standard_field(target.as_str()) || !declared {
            return Err(Error::Mapping {
                doctype: doctype.clone(),
                field: target.to_string(),
            });
        }
    }
    Ok(())
}

pub struct MappingSpecBuilder {
    source_doctype: String,
    target_doctype: String,
    field_map: Vec<(String, String)>,
    field_no_map: Vec<String>,
    validation: Predicate,
    tables: Vec<TableMappingBuilder>,
    post_process: Option<PostProcess>,
}

impl MappingSpecBuilder {
    pub fn field_map(mut self, source: &str, target: &str) -> Self {
        self.field_map.push((source.to_owned(), target.to_owned()));
        self
    }

    pub fn no_map(mut self, field: &str) -> Self {
        self.field_no_map.push(field.to_owned());
        self
    }

    /// Precondition on the source document.
    pub fn validation(mut self, validation: Predicate) -> Self {
        self.validation = validation;
        self
    }

    pub fn table(mut self, table: TableMappingBuilder) -> Self {
        self.tables.push(table);
        self
    }

    pub fn post_process(mut self, f: PostProcess) -> Self {
        self.post_process = Some(f);
        self
    }

    pub fn build(self) -> Result<MappingSpec, SpecError> {
        let mut tables: Vec<TableMapping> = Vec::with_capacity(self.tables.len());
        for table in self.tables {
            let table = table.build()?;
            if tables.iter().any(|t| t.source_doctype == table.source_doctype) {
                return Err(SpecError::DuplicatedTable(table.source_doctype));
            }
            tables.push(table);
        }

        Ok(MappingSpec {
            source_doctype: DocType::new(self.source_doctype)?,
            target_doctype: DocType::new(self.target_doctype)?,
            field_map: build_field_map(self.field_map)?,
            field_no_map: self
                .field_no_map
                .into_iter()
                .map(FieldName::new)
                .collect::<Result<_, _>>()?,
            validation: self.validation,
            tables,
            post_process: self.post_process,
        })
    }
}

/// Load the source document and map it into a new (or the given) target.
///
/// Fails with [Error::NotFound] when the source does not exist,
/// [Error::Validation] when it does not meet the spec's validation and
/// [Error::Mapping] when a rename targets a field the target doctype lacks.
/// No target is produced in any of these cases.
pub fn map(
    ctx: &Ctx<'_>,
    source_doctype: &DocType,
    source_name: &str,
    spec: &MappingSpec,
    existing_target: Option<Document>,
) -> Result<Document> {
    if source_doctype != spec.source_doctype() {
        return Err(Error::SpecMismatch {
            expected: spec.source_doctype.clone(),
            found: source_doctype.clone(),
        });
    }
    let source = ctx.store().load(source_doctype, source_name)?;
    map_document(ctx, &source, spec, existing_target)
}

/// Map an already loaded source document. See [map].
pub fn map_document(
    ctx: &Ctx<'_>,
    source: &Document,
    spec: &MappingSpec,
    existing_target: Option<Document>,
) -> Result<Document> {
    let source_name = source.name().unwrap_or("(new)");
    debug!(
        "Map {} {source_name} into {}",
        source.doctype(),
        spec.target_doctype
    );

    if source.doctype() != spec.source_doctype() {
        return Err(Error::SpecMismatch {
            expected: spec.source_doctype.clone(),
            found: source.doctype().clone(),
        });
    }

    if !spec.validation.test(source) {
        return Err(Error::validation(format!(
            "Cannot map {} {source_name} because the condition fails: {}",
            source.doctype(),
            spec.validation
        )));
    }

    let registry = ctx.registry();
    spec.check(registry)?;

    if let Some(target) = &existing_target {
        if target.doctype() != spec.target_doctype() {
            return Err(Error::SpecMismatch {
                expected: spec.target_doctype.clone(),
                found: target.doctype().clone(),
            });
        }
    }

    let mut target = existing_target.unwrap_or_else(|| ctx.store().new_doc(&spec.target_doctype));
    let target_meta = registry.doctype(&spec.target_doctype);
    copy_fields(source, &mut target, &spec.field_map, &spec.field_no_map, target_meta);

    for (source_table, rows) in source.tables() {
        for row in rows {
            let Some(table) = spec.table_for(row.doctype()) else {
                continue;
            };
            if !table.condition.test(row) {
                trace!(
                    "Skip {} row {} of {source_table}: {}",
                    row.doctype(),
                    row.idx(),
                    table.condition
                );
                continue;
            }

            let mut mapped = ctx.store().new_doc(&table.target_doctype);
            copy_fields(
                row,
                &mut mapped,
                &table.field_map,
                &table.field_no_map,
                registry.doctype(&table.target_doctype),
            );
            let target_table = table.target_table(target_meta, source_table);
            target.append(&target_table, mapped);
        }
    }

    if let Some(post_process) = spec.post_process {
        trace!("Run post-process for {}", spec.target_doctype);
        post_process(ctx, source, &mut target)?;
    }

    Ok(target)
}

/// Copy scalar fields: identity first, then the renames on top of it. Empty
/// source values never overwrite the target.
fn copy_fields(
    source: &Document,
    target: &mut Document,
    field_map: &FieldMap,
    field_no_map: &[FieldName],
    target_meta: Option<&DocTypeMeta>,
) {
    let skipped = |field: &str| field_no_map.iter().any(|f| *f == field) || NEVER_COPIED.contains(&field);

    for (field, value) in source.fields() {
        if skipped(field) || is_empty(value) {
            continue;
        }
        if let Some(meta) = target_meta {
            if !meta.has_field(field) {
                trace!("{} has no field `{field}`, not copied", meta.name);
                continue;
            }
        }
        target.set(field, value.clone());
    }

    for (from, to) in field_map.iter() {
        let value = source.get(from);
        if !is_empty(&value) {
            target.set(to, value);
        }
    }
}

fn is_empty(value: &crate::value::Value) -> bool {
    value.is_null() || value.as_str() == Some("")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::doc::DocStatus;
    use crate::store::memory::MemoryStore;
    use crate::store::DocumentStore;
    use crate::value::Value;

    fn dt(name: &str) -> DocType {
        DocType::new(name).unwrap()
    }

    fn receipt(quantities: &[i64]) -> Document {
        let mut pr = Document::new(dt("Purchase Receipt"))
            .with("supplier", "ACME")
            .with("company", "Mesa")
            .with("owner", "buyer@example.com");
        pr.set_docstatus(DocStatus::Submitted);
        for (i, qty) in quantities.iter().enumerate() {
            pr.append(
                "items",
                Document::new(dt("Purchase Receipt Item"))
                    .with("item_code", format!("ITEM-{i}"))
                    .with("qty", *qty)
                    .with("warehouse", "Stores - M"),
            );
        }
        pr
    }

    fn material_transfer(_: &Ctx<'_>, _: &Document, target: &mut Document) -> Result<()> {
        target.set("purpose", "Material Transfer");
        Ok(())
    }

    fn receipt_spec() -> MappingSpec {
        MappingSpec::builder("Purchase Receipt", "Stock Entry")
            .validation(Predicate::submitted())
            .table(
                TableMapping::builder("Purchase Receipt Item", "Stock Entry Detail")
                    .field_map("warehouse", "s_warehouse")
                    .condition(Predicate::Expr(Expr::parse("qty > 0").unwrap())),
            )
            .post_process(material_transfer)
            .build()
            .unwrap()
    }

    #[test]
    fn maps_submitted_receipt_dropping_empty_rows() {
        crate::init_log();

        let store = MemoryStore::new();
        let name = store.insert(receipt(&[5, 0])).unwrap();
        let ctx = Ctx::builder("jane", &store).build();

        let se = map(&ctx, &dt("Purchase Receipt"), &name, &receipt_spec(), None).unwrap();

        assert_eq!(se.doctype(), &dt("Stock Entry"));
        assert!(se.is_new());
        assert_eq!(se.docstatus(), DocStatus::Draft);
        assert_eq!(se.get("purpose"), Value::from("Material Transfer"));
        assert_eq!(se.get("supplier"), Value::from("ACME"));
        assert!(se.get("owner").is_null());

        let items = se.table("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].doctype(), &dt("Stock Entry Detail"));
        assert_eq!(items[0].get("qty"), Value::Int(5));
        assert_eq!(items[0].get("s_warehouse"), Value::from("Stores - M"));
        assert_eq!(items[0].idx(), 1);
        assert_eq!(items[0].parentfield(), Some("items"));

        // Nothing was written.
        assert_eq!(store.len(&dt("Stock Entry")), 0);
    }

    #[test]
    fn renamed_field_takes_precedence() {
        let spec = MappingSpec::builder("Purchase Receipt", "Stock Entry")
            .table(
                TableMapping::builder("Purchase Receipt Item", "Stock Entry Detail")
                    .field_map("rejected_qty", "qty")
                    .field_map("rejected_warehouse", "s_warehouse")
                    .condition(Predicate::Expr(Expr::parse("rejected_qty > 0").unwrap())),
            )
            .build()
            .unwrap();

        let mut pr = Document::new(dt("Purchase Receipt"));
        pr.append(
            "items",
            Document::new(dt("Purchase Receipt Item"))
                .with("item_code", "A")
                .with("qty", 0)
                .with("rejected_qty", 3)
                .with("rejected_warehouse", "Rejected - M"),
        );
        pr.append(
            "items",
            Document::new(dt("Purchase Receipt Item"))
                .with("item_code", "B")
                .with("qty", 4)
                .with("rejected_qty", 0),
        );

        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let se = map_document(&ctx, &pr, &spec, None).unwrap();

        let items = se.table("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("item_code"), Value::from("A"));
        assert_eq!(items[0].get("qty"), Value::Int(3));
        assert_eq!(items[0].get("s_warehouse"), Value::from("Rejected - M"));
    }

    #[test]
    fn filter_keeps_source_order() {
        let store = MemoryStore::new();
        let name = store.insert(receipt(&[3, 0, 1, 0, 7, 2])).unwrap();
        let ctx = Ctx::builder("jane", &store).build();

        let se = receipt_spec().apply(&ctx, &name, None).unwrap();
        let codes: Vec<Value> = se.table("items").iter().map(|r| r.get("item_code")).collect();
        assert_eq!(
            codes,
            ["ITEM-0", "ITEM-2", "ITEM-4", "ITEM-5"].map(Value::from).to_vec()
        );
        let idx: Vec<u32> = se.table("items").iter().map(Document::idx).collect();
        assert_eq!(idx, [1, 2, 3, 4]);
    }

    #[test]
    fn source_is_not_mutated() {
        let store = MemoryStore::new();
        let name = store.insert(receipt(&[5, 0])).unwrap();
        let before = store.load(&dt("Purchase Receipt"), &name).unwrap();

        let ctx = Ctx::builder("jane", &store).build();
        map_document(&ctx, &before, &receipt_spec(), None).unwrap();

        assert_eq!(store.load(&dt("Purchase Receipt"), &name).unwrap(), before);
    }

    #[test]
    fn missing_source_is_not_found() {
        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let err = map(&ctx, &dt("Purchase Receipt"), "PR-404", &receipt_spec(), None).unwrap_err();
        assert!(err.is_not_found());
    }

    static POST_PROCESS_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting(_: &Ctx<'_>, source: &Document, target: &mut Document) -> Result<()> {
        POST_PROCESS_CALLS.fetch_add(1, Ordering::SeqCst);
        // Structural mapping is complete by now.
        target.set("row_count", target.table("items").len() as i64);
        target.set("source_rows", source.table("items").len() as i64);
        Ok(())
    }

    fn must_not_run(_: &Ctx<'_>, _: &Document, _: &mut Document) -> Result<()> {
        panic!("post-process ran for an invalid source");
    }

    #[test]
    fn validation_failure_skips_everything() {
        let spec = MappingSpec::builder("Purchase Receipt", "Stock Entry")
            .validation(Predicate::submitted())
            .post_process(must_not_run)
            .build()
            .unwrap();

        let mut draft = receipt(&[1]);
        draft.set_docstatus(DocStatus::Draft);

        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let err = map_document(&ctx, &draft, &spec, None).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("docstatus = 1")));
    }

    #[test]
    fn post_process_runs_once_after_rows() {
        let spec = MappingSpec::builder("Purchase Receipt", "Stock Entry")
            .table(TableMapping::builder("Purchase Receipt Item", "Stock Entry Detail"))
            .post_process(counting)
            .build()
            .unwrap();

        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let se = map_document(&ctx, &receipt(&[1, 2]), &spec, None).unwrap();

        assert_eq!(POST_PROCESS_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(se.get("row_count"), Value::Int(2));
        assert_eq!(se.get("source_rows"), Value::Int(2));
    }

    #[test]
    fn appends_to_existing_target() {
        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();

        let mut existing = Document::new(dt("Stock Entry")).with("purpose", "Material Receipt");
        existing.append("items", Document::new(dt("Stock Entry Detail")).with("item_code", "OLD"));

        let se = map_document(&ctx, &receipt(&[2]), &receipt_spec(), Some(existing)).unwrap();
        let items = se.table("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("item_code"), Value::from("OLD"));
        assert_eq!(items[1].idx(), 2);
        assert_eq!(se.get("purpose"), Value::from("Material Transfer"));
    }

    #[test]
    fn existing_target_of_wrong_doctype() {
        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let err = map_document(
            &ctx,
            &receipt(&[2]),
            &receipt_spec(),
            Some(Document::new(dt("Material Request"))),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SpecMismatch { .. }));
    }

    #[test]
    fn registry_restricts_identity_and_rejects_unknown_renames() {
        let registry = Registry::from_yaml_str(
            r#"
doctypes:
  - name: Stock Entry
    fields:
      - name: purpose
      - name: company
    tables:
      - name: items
        options: Stock Entry Detail
  - name: Stock Entry Detail
    is_child: true
    fields:
      - name: item_code
      - name: qty
      - name: s_warehouse
"#,
        )
        .unwrap();
        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).registry(&registry).build();

        let se = map_document(&ctx, &receipt(&[2]), &receipt_spec(), None).unwrap();
        assert_eq!(se.get("company"), Value::from("Mesa"));
        assert!(!se.has_field("supplier"));
        assert!(!se.table("items")[0].has_field("warehouse"));

        let bad = MappingSpec::builder("Purchase Receipt", "Stock Entry")
            .field_map("supplier", "supplier_name")
            .build()
            .unwrap();
        let err = map_document(&ctx, &receipt(&[2]), &bad, None).unwrap_err();
        assert!(matches!(err, Error::Mapping { ref field, .. } if field == "supplier_name"));
    }

    #[test]
    fn standard_fields_are_not_rename_targets() {
        for target in ["name", "docstatus", "idx", "parent", "parentfield", "parenttype", "doctype"] {
            let err = MappingSpec::builder("Purchase Receipt", "Stock Entry")
                .field_map("supplier", target)
                .build()
                .unwrap_err();
            assert!(matches!(err, SpecError::StandardFieldTarget(ref f) if f == target), "{target}");
        }

        let err = MappingSpec::builder("Purchase Receipt", "Stock Entry")
            .table(TableMapping::builder("Purchase Receipt Item", "Stock Entry Detail").field_map("qty", "docstatus"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::StandardFieldTarget(_)));

        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let mut draft = receipt(&[1]).with("flag", 1);
        draft.set_docstatus(DocStatus::Draft);
        let spec = MappingSpec::builder("Purchase Receipt", "Stock Entry")
            .field_map("flag", "is_flagged")
            .build()
            .unwrap();
        let se = map_document(&ctx, &draft, &spec, None).unwrap();
        assert!(se.is_new());
        assert_eq!(se.docstatus(), DocStatus::Draft);
        assert_eq!(se.get("is_flagged"), Value::Int(1));
    }

    #[test]
    fn empty_rename_source_keeps_identity_copy() {
        let spec = MappingSpec::builder("Purchase Receipt", "Stock Entry")
            .table(
                TableMapping::builder("Purchase Receipt Item", "Stock Entry Detail")
                    .field_map("rejected_qty", "qty"),
            )
            .build()
            .unwrap();
        let mut pr = receipt(&[4, 6]);
        pr.table_mut("items")[1].set("rejected_qty", 2);

        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let se = map_document(&ctx, &pr, &spec, None).unwrap();

        let rows = se.table("items");
        assert_eq!(rows[0].get("qty"), Value::Int(4));
        assert_eq!(rows[1].get("qty"), Value::Int(2));
    }

    #[test]
    fn no_map_fields_are_skipped() {
        let spec = MappingSpec::builder("Purchase Receipt", "Stock Entry")
            .no_map("supplier")
            .build()
            .unwrap();
        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let se = map_document(&ctx, &receipt(&[]), &spec, None).unwrap();
        assert!(!se.has_field("supplier"));
        assert!(se.has_field("company"));
    }

    #[test]
    fn builder_rejects_bad_names_and_duplicate_tables() {
        assert!(matches!(
            MappingSpec::builder("Purchase Receipt", "Stock Entry")
                .field_map("bad field", "qty")
                .build(),
            Err(SpecError::InvalidName(_))
        ));
        assert!(matches!(
            MappingSpec::builder("Purchase Receipt", "Stock Entry")
                .table(TableMapping::builder("Purchase Receipt Item", "Stock Entry Detail"))
                .table(TableMapping::builder("Purchase Receipt Item", "Stock Entry Detail"))
                .build(),
            Err(SpecError::DuplicatedTable(_))
        ));
    }

    #[test]
    fn fn_condition_and_explicit_target_table() {
        fn big(row: &Document) -> bool {
            row.get("qty").as_f64().is_some_and(|q| q >= 5.0)
        }

        let spec = MappingSpec::builder("Purchase Receipt", "Material Request")
            .table(
                TableMapping::builder("Purchase Receipt Item", "Material Request Item")
                    .target_table("lines")
                    .field_map("warehouse", "for_warehouse")
                    .condition(Predicate::Fn(big)),
            )
            .build()
            .unwrap();
        let table = spec.table_for(&dt("Purchase Receipt Item")).unwrap();
        assert_eq!(table.field_map().target_of("warehouse").map(|f| f.as_str()), Some("for_warehouse"));
        assert_eq!(table.condition().to_string(), "custom condition");

        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let mr = map_document(&ctx, &receipt(&[5, 2, 9]), &spec, None).unwrap();

        assert!(mr.table("items").is_empty());
        let lines = mr.table("lines");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].get("qty"), Value::Int(9));
        assert_eq!(lines[1].get("for_warehouse"), Value::from("Stores - M"));
        assert_eq!(lines[1].parentfield(), Some("lines"));
    }

    #[test]
    fn wrong_source_doctype() {
        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let err = map(&ctx, &dt("Sales Invoice"), "SI-1", &receipt_spec(), None).unwrap_err();
        assert!(matches!(err, Error::SpecMismatch { .. }));
    }
}
