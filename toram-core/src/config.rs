//! Browser configuration loaded from TOML.
//!
//! ```toml
//! database = "data/toram-data.db"
//! page_size = 20
//! permissive = true
//! crystal_table = "xtal"
//! ```
//!
//! Every key is optional.

use crate::assembler::{AssemblerOptions, DEFAULT_CRYSTAL_TABLE};
use crate::browse::DEFAULT_PAGE_SIZE;
use crate::error::{Result, ToramError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    pub database: PathBuf,
    pub page_size: usize,
    pub permissive: bool,
    pub crystal_table: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/toram-data.db"),
            page_size: DEFAULT_PAGE_SIZE,
            permissive: true,
            crystal_table: DEFAULT_CRYSTAL_TABLE.to_string(),
        }
    }
}

impl BrowserConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ToramError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config from {:?}: {}", path, e),
            ))
        })?;

        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ToramError::Config(format!("Failed to parse config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ToramError::Config("page_size must be at least 1".to_string()));
        }
        if self.crystal_table.trim().is_empty() {
            return Err(ToramError::Config("crystal_table must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn assembler_options(&self) -> AssemblerOptions {
        AssemblerOptions {
            permissive: self.permissive,
            crystal_table: self.crystal_table.clone(),
        }
    }
}
