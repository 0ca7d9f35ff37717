use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Settings of the operations. Every key has a default, so an empty YAML
/// document is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bulk: BulkConfig,
    pub quality_inspection: QualityInspectionConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Batches of at least this many documents report progress after every item.
    pub progress_threshold: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            progress_threshold: 5,
        }
    }
}

/// Warehouses holding goods under inspection, by what the inspection refers to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityInspectionConfig {
    /// Returned goods from a sales invoice.
    pub sales_invoice_warehouse: String,

    /// Raw material from a purchase receipt.
    pub purchase_receipt_warehouse: String,

    /// Finished goods, inspection without a reference document.
    pub unreferenced_warehouse: String,
}

impl Default for QualityInspectionConfig {
    fn default() -> Self {
        Self {
            sales_invoice_warehouse: "B2B تحت الفحص مرتجعات - M".to_owned(),
            purchase_receipt_warehouse: "تحت الفحص مواد خام - B2B - M".to_owned(),
            unreferenced_warehouse: "تحت الفحص منتج تام - B2B - M".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Item names and descriptions longer than this are cut and suffixed with `...`.
    pub truncate_at: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { truncate_at: 40 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error occurred while reading `{path}`. {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuration is not valid. {0}")]
    Yaml(#[from] serde_yml::Error),
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
