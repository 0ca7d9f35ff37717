//! Mapping catalog: [MappingSpec]s declared in versioned YAML files.
//!
//! A mapping file names the source and target doctypes, the validation of
//! the source, the renames, the child table mappings and, optionally, a
//! post-process. Post-processes are code, so files refer to them by name and
//! the names are resolved through a [PostProcessRegistry] at load time.
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

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use log::{debug, trace};
use serde::Deserialize;
use thiserror::Error;

use crate::doc::InvalidName;
use crate::mapper::{MappingSpec, PostProcess, SpecError};
use crate::meta::Registry;

/// Parsing of the `docmap/0.1` file format.
mod v0_1;

/// Version of the mapping file format, from the `version` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Version {
    #[serde(rename = "docmap/0.1")]
    Docmap0_1,
}

#[derive(Deserialize)]
struct Header {
    version: Version,
}

/// Post-process functions that mapping files can name.
#[derive(Debug, Default, Clone)]
pub struct PostProcessRegistry(HashMap<String, PostProcess>);

impl PostProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post-processes of the built-in conversions.
    pub fn builtin() -> Self {
        crate::conversions::post_processes()
    }

    pub fn register(mut self, name: &str, f: PostProcess) -> Self {
        self.0.insert(name.to_owned(), f);
        self
    }

    pub fn get(&self, name: &str) -> Option<PostProcess> {
        self.0.get(name).copied()
    }
}

/// Loaded mapping specs by name.
#[derive(Debug, Default)]
pub struct Catalog {
    specs: BTreeMap<String, MappingSpec>,
}

impl Catalog {
    /// Load every `.yaml` and `.yml` file of the directory.
    /// All the problems found in all the files are returned together.
    pub fn load_dir(path: &Path, post_processes: &PostProcessRegistry) -> Result<Self, Vec<LoadError>> {
        if !path.is_dir() {
            return Err(vec![LoadError::PathNotDirectory(path.to_owned())]);
        }

        let mut errors: Vec<LoadError> = Vec::new();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path).map_err(|e| vec![LoadError::from(e)])? {
            match entry {
                Ok(entry) => files.push(entry.path()),
                Err(e) => errors.push(e.into()),
            }
        }
        files.sort();

        let mut sources = Vec::with_capacity(files.len());
        for file in files {
            let hidden = file
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden || file.is_dir() {
                trace!("Skip {}", file.display());
                continue;
            }

            match file.extension().and_then(|e| e.to_str()) {
                Some("yaml" | "yml") => match std::fs::read_to_string(&file) {
                    Ok(text) => sources.push((file.display().to_string(), text)),
                    Err(e) => errors.push(e.into()),
                },
                _ => errors.push(LoadError::NotMappingFile(file)),
            }
        }

        let mut catalog = Catalog::default();
        for (origin, text) in &sources {
            catalog.add_yaml(origin, text, post_processes, &mut errors);
        }

        if errors.is_empty() {
            debug!("Loaded {} mappings from {}", catalog.len(), path.display());
            Ok(catalog)
        } else {
            Err(errors)
        }
    }

    /// Parse a single mapping file.
    pub fn from_yaml_str(yaml: &str, post_processes: &PostProcessRegistry) -> Result<Self, Vec<LoadError>> {
        Self::from_sources([("<inline>", yaml)], post_processes)
    }

    /// Parse several mapping files given as `(origin, text)` pairs. The
    /// origin only labels errors.
    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
        post_processes: &PostProcessRegistry,
    ) -> Result<Self, Vec<LoadError>> {
        let mut catalog = Catalog::default();
        let mut errors = Vec::new();
        for (origin, yaml) in sources {
            catalog.add_yaml(origin, yaml, post_processes, &mut errors);
        }
        if errors.is_empty() {
            Ok(catalog)
        } else {
            Err(errors)
        }
    }

    fn add_yaml(&mut self, origin: &str, yaml: &str, post_processes: &PostProcessRegistry, errors: &mut Vec<LoadError>) {
        let yaml_error = |e: serde_yml::Error| LoadError::Yaml {
            origin: origin.to_owned(),
            message: e.to_string(),
        };

        let value: serde_yml::Value = match serde_yml::from_str(yaml) {
            Ok(v) => v,
            Err(e) => return errors.push(yaml_error(e)),
        };
        let header: Header = match serde_yml::from_value(value.clone()) {
            Ok(h) => h,
            Err(e) => return errors.push(yaml_error(e)),
        };

        // Every new format version gets its own module and match arm.
        let built = match header.version {
            Version::Docmap0_1 => match serde_yml::from_value::<v0_1::MappingFile>(value) {
                Ok(file) => file.into_spec(origin, post_processes, errors),
                Err(e) => return errors.push(yaml_error(e)),
            },
        };

        if let Some((name, spec)) = built {
            if self.specs.contains_key(&name) {
                errors.push(LoadError::DuplicatedMapping(name));
            } else {
                trace!("Loaded mapping `{name}` from {origin}");
                self.specs.insert(name, spec);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&MappingSpec> {
        self.specs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Check every mapping against the declared doctypes, so that bad renames
    /// are found at load time rather than on first use.
    pub fn check(&self, registry: &Registry) -> Result<(), Vec<LoadError>> {
        let errors: Vec<LoadError> = self
            .specs
            .iter()
            .filter_map(|(name, spec)| {
                spec.check(registry).err().map(|source| LoadError::Schema {
                    name: name.clone(),
                    source,
                })
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The provided path is not a directory: `{}`", .0.display())]
    PathNotDirectory(PathBuf),

    #[error("IO error occurred while loading the mapping directory. {0}")]
    IoError(#[from] std::io::Error),

    #[error("Directory contains file that is not a mapping file: `{}`", .0.display())]
    NotMappingFile(PathBuf),

    #[error("`{origin}` is not a valid mapping file. {message}")]
    Yaml { origin: String, message: String },

    #[error("`{origin}`: unknown post-process `{name}`")]
    UnknownPostProcess { origin: String, name: String },

    #[error("`{origin}`: unknown operator `{op}` in the validation of `{field}`")]
    UnknownOperator {
        origin: String,
        field: String,
        op: String,
    },

    #[error("`{origin}`: {explanation}")]
    Condition { origin: String, explanation: String },

    #[error("`{origin}`: {source}")]
    InvalidName { origin: String, source: InvalidName },

    #[error("`{origin}`: {source}")]
    Spec { origin: String, source: SpecError },

    #[error("Mapping `{0}` is declared more than once")]
    DuplicatedMapping(String),

    #[error("Mapping `{name}` does not fit the declared doctypes. {source}")]
    Schema { name: String, source: crate::Error },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctx::Ctx;
    use crate::doc::{DocStatus, DocType, Document};
    use crate::error::Result;
    use crate::store::memory::MemoryStore;
    use crate::value::Value;

    fn material_transfer(_: &Ctx<'_>, _: &Document, target: &mut Document) -> Result<()> {
        target.set("purpose", "Material Transfer");
        Ok(())
    }

    fn post_processes() -> PostProcessRegistry {
        PostProcessRegistry::new().register("material_transfer", material_transfer)
    }

    const RECEIPT: &str = r#"
version: docmap/0.1
name: purchase_receipt_to_stock_entry
source: Purchase Receipt
target: Stock Entry
validation:
  docstatus: ["=", 1]
post_process: material_transfer
tables:
  Purchase Receipt Item:
    doctype: Stock Entry Detail
    field_map:
      warehouse: s_warehouse
    condition: "qty > 0"
"#;

    #[test]
    fn loads_and_maps() {
        crate::init_log();

        let catalog = Catalog::from_yaml_str(RECEIPT, &post_processes()).unwrap();
        let spec = catalog.get("purchase_receipt_to_stock_entry").unwrap();
        assert_eq!(spec.target_doctype(), &DocType::new("Stock Entry").unwrap());
        assert_eq!(spec.validation().to_string(), "docstatus = 1");

        let mut pr = Document::new(DocType::new("Purchase Receipt").unwrap());
        pr.set_docstatus(DocStatus::Submitted);
        pr.append(
            "items",
            Document::new(DocType::new("Purchase Receipt Item").unwrap())
                .with("qty", 2)
                .with("warehouse", "Stores - M"),
        );
        let store = MemoryStore::new();
        let ctx = Ctx::builder("jane", &store).build();
        let se = crate::mapper::map_document(&ctx, &pr, spec, None).unwrap();
        assert_eq!(se.get("purpose"), Value::from("Material Transfer"));
        assert_eq!(se.table("items")[0].get("s_warehouse"), Value::from("Stores - M"));
    }

    #[test]
    fn expression_validation() {
        let yaml = r#"
version: docmap/0.1
name: open_orders
source: Sales Order
target: Sales Invoice
validation: "docstatus = 1 and status != 'Closed'"
"#;
        let catalog = Catalog::from_yaml_str(yaml, &PostProcessRegistry::new()).unwrap();
        let spec = catalog.get("open_orders").unwrap();

        let mut so = Document::new(DocType::new("Sales Order").unwrap()).with("status", "Closed");
        so.set_docstatus(DocStatus::Submitted);
        assert!(!spec.validation().test(&so));
        so.set("status", "To Deliver");
        assert!(spec.validation().test(&so));
    }

    #[test]
    fn collects_every_error_of_a_file() {
        let yaml = r#"
version: docmap/0.1
name: broken
source: Purchase Receipt
target: Stock Entry
validation:
  docstatus: ["is", 1]
post_process: nope
tables:
  Purchase Receipt Item:
    doctype: Stock Entry Detail
    condition: "qty > > 0"
"#;
        let errors = Catalog::from_yaml_str(yaml, &post_processes()).unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(matches!(&errors[0], LoadError::UnknownOperator { op, .. } if op == "is"));
        assert!(errors
            .iter()
            .any(|e| matches!(e, LoadError::UnknownPostProcess { name, .. } if name == "nope")));

        let explanation = errors
            .iter()
            .find_map(|e| match e {
                LoadError::Condition { explanation, .. } => Some(explanation.as_str()),
                _ => None,
            })
            .unwrap();
        assert!(explanation.contains("qty > > 0"), "{explanation}");
        assert!(explanation.contains('^'), "{explanation}");
    }

    #[test]
    fn rejects_unknown_version_and_keys() {
        let errors = Catalog::from_yaml_str(
            "version: docmap/9\nname: x\nsource: A\ntarget: B\n",
            &PostProcessRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(errors[0], LoadError::Yaml { .. }));

        let errors = Catalog::from_yaml_str(
            "version: docmap/0.1\nname: x\nsource: A\ntarget: B\nfeild_map: {}\n",
            &PostProcessRegistry::new(),
        )
        .unwrap_err();
        assert!(matches!(&errors[0], LoadError::Yaml { message, .. } if message.contains("feild_map")));
    }

    #[test]
    fn duplicated_names_across_files() {
        let errors = Catalog::from_sources([("a.yaml", RECEIPT), ("b.yaml", RECEIPT)], &post_processes())
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], LoadError::DuplicatedMapping(n) if n == "purchase_receipt_to_stock_entry"));
    }

    #[test]
    fn bundled_mappings_load_and_fit_core_doctypes() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("mappings");
        let catalog = Catalog::load_dir(&dir, &PostProcessRegistry::builtin()).unwrap();
        assert_eq!(catalog.len(), 4);
        assert!(catalog.get("complains_form_to_technical_returned").is_some());
        catalog.check(&Registry::core()).unwrap();
    }

    #[test]
    fn load_dir_reports_foreign_files() {
        let dir = std::env::temp_dir().join(format!("docmap-catalog-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("receipt.yaml"), RECEIPT).unwrap();
        std::fs::write(dir.join("notes.txt"), "not a mapping").unwrap();
        std::fs::write(dir.join("bad.yml"), "version: docmap/0.1\nname: [").unwrap();

        let errors = Catalog::load_dir(&dir, &post_processes()).unwrap_err();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors.iter().any(|e| matches!(e, LoadError::NotMappingFile(_))));
        assert!(errors.iter().any(|e| matches!(e, LoadError::Yaml { .. })));

        let missing = Catalog::load_dir(Path::new("/definitely/not/here"), &post_processes()).unwrap_err();
        assert!(matches!(missing[0], LoadError::PathNotDirectory(_)));
    }

    #[test]
    fn schema_check_reports_unknown_targets() {
        let yaml = r#"
version: docmap/0.1
name: bad_rename
source: Purchase Receipt
target: Stock Entry
field_map:
  supplier: supplier_name
"#;
        let catalog = Catalog::from_yaml_str(yaml, &PostProcessRegistry::new()).unwrap();
        let errors = catalog.check(&Registry::core()).unwrap_err();
        assert!(matches!(&errors[0], LoadError::Schema { name, .. } if name == "bad_rename"));
    }
}
