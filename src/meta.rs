use serde::Deserialize;
use thiserror::Error;

use crate::doc::{DocType, FieldName};

/// Registry holds the declared schemas of all doctypes the crate maps
/// between: their fields and their child tables.
///
/// The registry is not loaded from the host; it is declared by the
/// integration (or taken from [Registry::core]) and used to check that
/// mappings only write fields the target doctype actually has.
#[derive(Default, Debug)]
pub struct Registry {
    doctypes: Vec<DocTypeMeta>,
}

impl Registry {
    pub const fn empty() -> Self {
        Self {
            doctypes: Vec::new(),
        }
    }

    pub fn doctype(&self, name: &str) -> Option<&DocTypeMeta> {
        self.doctypes.iter().find(|meta| meta.name == name)
    }

    pub fn doctypes(&self) -> &[DocTypeMeta] {
        &self.doctypes
    }

    /// Parse a YAML list of doctype declarations and validate it.
    pub fn from_yaml_str(yaml: &str) -> Result<Registry, Vec<RegistryBuildError>> {
        let file: RegistryFile =
            serde_yml::from_str(yaml).map_err(|e| vec![RegistryBuildError::Yaml(e.to_string())])?;
        let mut builder = RegistryBuilder::with_capacity(file.doctypes.len());
        for meta in file.doctypes {
            builder.add_doctype(meta);
        }
        builder.build()
    }

    /// Doctypes used by the built-in conversions and operations.
    pub fn core() -> Registry {
        Registry::from_yaml_str(crate::core_doctypes_yaml())
            .expect("built-in doctype declarations are valid")
    }
}

#[derive(Deserialize)]
struct RegistryFile {
    doctypes: Vec<DocTypeMeta>,
}

#[derive(Debug)]
pub struct RegistryBuilder {
    doctypes: Vec<DocTypeMeta>,
}

impl RegistryBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            doctypes: Vec::with_capacity(capacity),
        }
    }

    pub fn add_doctype(&mut self, meta: DocTypeMeta) -> &mut Self {
        self.doctypes.push(meta);
        self
    }

    /// Validate all the doctypes and build the registry.
    /// Returns every problem found, not only the first one.
    pub fn build(self) -> Result<Registry, Vec<RegistryBuildError>> {
        let mut errors = Vec::new();

        let mut names: Vec<&DocType> = self.doctypes.iter().map(|d| &d.name).collect();
        names.sort();
        let mut duplicated: Vec<DocType> = names
            .windows(2)
            .filter(|w| w[0] == w[1])
            .map(|w| w[0].clone())
            .collect();
        duplicated.dedup();
        if !duplicated.is_empty() {
            errors.push(RegistryBuildError::DuplicatedItems(duplicated));
        }

        for meta in &self.doctypes {
            let mut seen: Vec<&str> = Vec::new();
            let names = meta
                .fields
                .iter()
                .map(|f| f.name.as_str())
                .chain(meta.tables.iter().map(|t| t.name.as_str()));
            for name in names {
                if seen.contains(&name) {
                    errors.push(RegistryBuildError::DuplicatedField {
                        doctype: meta.name.clone(),
                        field: name.to_owned(),
                    });
                }
                seen.push(name);
            }

            for table in &meta.tables {
                match self.doctypes.iter().find(|d| d.name == table.options) {
                    None => errors.push(RegistryBuildError::UnknownChildDocType {
                        doctype: meta.name.clone(),
                        table: table.name.clone(),
                        child: table.options.clone(),
                    }),
                    Some(child) if !child.is_child => errors.push(RegistryBuildError::NotChildDocType {
                        doctype: meta.name.clone(),
                        table: table.name.clone(),
                        child: table.options.clone(),
                    }),
                    Some(_) => {}
                }
            }
        }

        if errors.is_empty() {
            Ok(Registry {
                doctypes: self.doctypes,
            })
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryBuildError {
    #[error("Duplicated doctypes found in the registry: {}", .0.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", "))]
    DuplicatedItems(Vec<DocType>),

    #[error("Doctype `{doctype}` declares field `{field}` more than once")]
    DuplicatedField { doctype: DocType, field: String },

    #[error("Table `{table}` of `{doctype}` refers to undeclared doctype `{child}`")]
    UnknownChildDocType {
        doctype: DocType,
        table: FieldName,
        child: DocType,
    },

    #[error("Table `{table}` of `{doctype}` refers to `{child}`, which is not a child doctype")]
    NotChildDocType {
        doctype: DocType,
        table: FieldName,
        child: DocType,
    },

    #[error("Doctype declarations are not valid YAML. {0}")]
    Yaml(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocTypeMeta {
    pub name: DocType,

    #[serde(default)]
    pub fields: Vec<FieldMeta>,

    #[serde(default)]
    pub tables: Vec<TableMeta>,

    /// Rows of a child table rather than a standalone document.
    #[serde(default)]
    pub is_child: bool,

    /// A settings-like doctype with exactly one record named after the doctype.
    #[serde(default)]
    pub is_single: bool,
}

impl DocTypeMeta {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn table(&self, name: &str) -> Option<&TableMeta> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// First table whose rows are of the given child doctype.
    pub fn table_for(&self, child: &DocType) -> Option<&TableMeta> {
        self.tables.iter().find(|t| &t.options == child)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldMeta {
    pub name: FieldName,

    #[serde(default, rename = "type")]
    pub ty: FieldType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableMeta {
    pub name: FieldName,

    /// Child doctype of the table rows.
    pub options: DocType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub enum FieldType {
    #[default]
    Data,
    Int,
    Float,
    Currency,
    Check,
    Date,
    Time,
    Select,
    Text,
    Link(DocType),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_registry_loads() {
        let registry = Registry::core();
        let se = registry.doctype("Stock Entry").unwrap();
        assert!(se.has_field("purpose"));
        let items = se.table("items").unwrap();
        assert_eq!(items.options, "Stock Entry Detail");
        assert!(registry.doctype("Stock Entry Detail").unwrap().is_child);
        assert!(registry.doctype("Accounts Settings").unwrap().is_single);
    }

    #[test]
    fn collects_all_errors() {
        let errors = Registry::from_yaml_str(
            r#"
doctypes:
  - name: Stock Entry
    fields:
      - name: purpose
      - name: purpose
    tables:
      - name: items
        options: Stock Entry Detail
  - name: Stock Entry
  - name: Item
    tables:
      - name: uoms
        options: Stock Entry
"#,
        )
        .unwrap_err();

        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(matches!(&errors[0], RegistryBuildError::DuplicatedItems(d) if d.len() == 1));
        assert!(errors
            .iter()
            .any(|e| matches!(e, RegistryBuildError::DuplicatedField { field, .. } if field == "purpose")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, RegistryBuildError::UnknownChildDocType { .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, RegistryBuildError::NotChildDocType { .. })));
    }

    #[test]
    fn link_field_type() {
        let registry = Registry::from_yaml_str(
            r#"
doctypes:
  - name: Stock Entry
    fields:
      - name: production_order
        type: !Link Production Order
"#,
        )
        .unwrap();
        let field = registry.doctype("Stock Entry").unwrap().field("production_order").unwrap();
        assert_eq!(field.ty, FieldType::Link(DocType::new("Production Order").unwrap()));
    }

    #[test]
    fn invalid_names_are_yaml_errors() {
        let errors = Registry::from_yaml_str("doctypes:\n  - name: ' bad'\n").unwrap_err();
        assert!(matches!(errors[0], RegistryBuildError::Yaml(_)));
    }
}
