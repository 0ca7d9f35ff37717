use std::collections::BTreeMap;

use serde::Deserialize;

use super::{LoadError, PostProcessRegistry, Version};
use crate::expr::{Expr, Op};
use crate::mapper::{MappingSpec, Predicate, TableMapping};
use crate::store::Filter;
use crate::value::Value;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingFile {
    #[allow(dead_code)]
    version: Version,

    name: String,
    source: String,
    target: String,

    #[serde(default)]
    field_map: BTreeMap<String, String>,

    #[serde(default)]
    field_no_map: Vec<String>,

    #[serde(default)]
    validation: Option<Validation>,

    #[serde(default)]
    post_process: Option<String>,

    /// Table mappings by source child doctype.
    #[serde(default)]
    tables: BTreeMap<String, TableFile>,
}

/// Either a condition expression or `field: [op, value]` filters.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Validation {
    Expr(String),
    Filters(BTreeMap<String, (String, Value)>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableFile {
    doctype: String,

    #[serde(default)]
    target_table: Option<String>,

    #[serde(default)]
    field_map: BTreeMap<String, String>,

    #[serde(default)]
    field_no_map: Vec<String>,

    #[serde(default)]
    condition: Option<String>,
}

impl MappingFile {
    /// Build the spec. Every problem is pushed to `errors`; `None` is
    /// returned if there was any.
    pub fn into_spec(
        self,
        origin: &str,
        post_processes: &PostProcessRegistry,
        errors: &mut Vec<LoadError>,
    ) -> Option<(String, MappingSpec)> {
        let errors_before = errors.len();

        let mut builder = MappingSpec::builder(&self.source, &self.target);
        for (from, to) in &self.field_map {
            builder = builder.field_map(from, to);
        }
        for field in &self.field_no_map {
            builder = builder.no_map(field);
        }

        match self.validation {
            Some(Validation::Expr(src)) => {
                if let Some(expr) = parse_condition(origin, &src, errors) {
                    builder = builder.validation(Predicate::Expr(expr));
                }
            }
            Some(Validation::Filters(filters)) => {
                let filters = filters
                    .into_iter()
                    .filter_map(|(field, (op, value))| filter(origin, field, &op, value, errors))
                    .collect();
                builder = builder.validation(Predicate::Filters(filters));
            }
            None => {}
        }

        if let Some(name) = self.post_process {
            match post_processes.get(&name) {
                Some(f) => builder = builder.post_process(f),
                None => errors.push(LoadError::UnknownPostProcess {
                    origin: origin.to_owned(),
                    name,
                }),
            }
        }

        for (source_child, table) in self.tables {
            let mut tb = TableMapping::builder(&source_child, &table.doctype);
            if let Some(target_table) = &table.target_table {
                tb = tb.target_table(target_table);
            }
            for (from, to) in &table.field_map {
                tb = tb.field_map(from, to);
            }
            for field in &table.field_no_map {
                tb = tb.no_map(field);
            }
            if let Some(src) = &table.condition {
                if let Some(expr) = parse_condition(origin, src, errors) {
                    tb = tb.condition(Predicate::Expr(expr));
                }
            }
            builder = builder.table(tb);
        }

        match builder.build() {
            Ok(spec) if errors.len() == errors_before => Some((self.name, spec)),
            Ok(_) => None,
            Err(source) => {
                errors.push(LoadError::Spec {
                    origin: origin.to_owned(),
                    source,
                });
                None
            }
        }
    }
}

fn parse_condition(origin: &str, src: &str, errors: &mut Vec<LoadError>) -> Option<Expr> {
    match Expr::parse(src) {
        Ok(expr) => Some(expr),
        Err(e) => {
            errors.push(LoadError::Condition {
                origin: origin.to_owned(),
                explanation: e.explain(src),
            });
            None
        }
    }
}

fn filter(origin: &str, field: String, op: &str, value: Value, errors: &mut Vec<LoadError>) -> Option<Filter> {
    let op: Op = match op.parse() {
        Ok(op) => op,
        Err(op) => {
            errors.push(LoadError::UnknownOperator {
                origin: origin.to_owned(),
                field,
                op,
            });
            return None;
        }
    };
    match Filter::new(&field, op, value) {
        Ok(f) => Some(f),
        Err(source) => {
            errors.push(LoadError::InvalidName {
                origin: origin.to_owned(),
                source,
            });
            None
        }
    }
}
