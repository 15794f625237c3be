//! Rewrite configuration: naming conventions and accepted column kinds.

use serde::{Deserialize, Serialize};

use crate::error::{AodError, Result};
use crate::kind::KindSet;

/// Naming conventions and kind set for a rewrite run.
///
/// Every field has a default matching the AOD layout, so an empty JSON
/// object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteConfig {
    /// Directory-name prefix of batches (default `DF_`).
    #[serde(default = "default_batch_prefix")]
    pub batch_prefix: String,

    /// Table family of the dimension table (default `O2bc`, matching `O2bc`
    /// and `O2bc_<version>`).
    #[serde(default = "default_dimension_table")]
    pub dimension_table: String,

    /// Table family of the flags side table (default `O2bcflag`).
    #[serde(default = "default_flags_table")]
    pub flags_table: String,

    /// Key column of the dimension table (default `fGlobalBC`).
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Recognized foreign-key column names, in priority order.
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: Vec<String>,

    /// File extension of table files inside a batch (default `parquet`).
    #[serde(default = "default_table_extension")]
    pub table_extension: String,

    /// Scalar kinds the binder accepts (default: all).
    #[serde(default)]
    pub kinds: KindSet,
}

fn default_batch_prefix() -> String {
    "DF_".to_string()
}

fn default_dimension_table() -> String {
    "O2bc".to_string()
}

fn default_flags_table() -> String {
    "O2bcflag".to_string()
}

fn default_key_column() -> String {
    "fGlobalBC".to_string()
}

fn default_foreign_keys() -> Vec<String> {
    vec!["fIndexBCs".to_string(), "fIndexBC".to_string()]
}

fn default_table_extension() -> String {
    "parquet".to_string()
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            batch_prefix: default_batch_prefix(),
            dimension_table: default_dimension_table(),
            flags_table: default_flags_table(),
            key_column: default_key_column(),
            foreign_keys: default_foreign_keys(),
            table_extension: default_table_extension(),
            kinds: KindSet::default(),
        }
    }
}

impl RewriteConfig {
    /// Parse a JSON configuration and validate it.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text).map_err(|e| AodError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the role resolver cannot work with.
    pub fn validate(&self) -> Result<()> {
        let non_empty = [
            ("batch_prefix", &self.batch_prefix),
            ("dimension_table", &self.dimension_table),
            ("flags_table", &self.flags_table),
            ("key_column", &self.key_column),
            ("table_extension", &self.table_extension),
        ];
        for (name, value) in non_empty {
            if value.trim().is_empty() {
                return Err(AodError::Config(format!("{name} must be non-empty")));
            }
        }
        if self.foreign_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(AodError::Config("foreign key names must be non-empty".into()));
        }
        if self.dimension_table == self.flags_table {
            return Err(AodError::Config(
                "dimension_table and flags_table must name different families".into(),
            ));
        }
        Ok(())
    }
}
