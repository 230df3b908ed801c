//! Engine configuration: naming conventions, run mode, type aliases.
use std::collections::BTreeMap;
use std::path::Path;

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub conventions: Conventions,
    pub mode: Mode,
    /// Evaluate resolver rules per struct on the rayon pool.
    pub parallel: bool,
    /// Named types mapped to a builtin before rendering (`EventStatus` → `string`).
    pub type_aliases: BTreeMap<String, String>,
}

/// Source naming conventions the rules key off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conventions {
    /// Canonical identifier field name.
    pub identifier: String,
    /// Suffix marking relationship-id shadow fields.
    pub id_suffix: String,
    /// Suffix of timestamp columns, in model (snake case) naming.
    pub timestamp_suffix: String,
    /// Field sorted right after the identifier.
    pub name_field: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Stop at the first error.
    #[default]
    FailFast,
    /// Evaluate everything and report every error together.
    Batch,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Default for Conventions {
    fn default() -> Self {
        Self {
            identifier: "ID".to_string(),
            id_suffix: "ID".to_string(),
            timestamp_suffix: "_at".to_string(),
            name_field: "name".to_string(),
        }
    }
}

impl Conventions {
    /// Identifier as it appears in a model.
    pub fn model_identifier(&self) -> String {
        self.identifier.to_case(Case::Snake)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        crate::path_de::from_str_with_path(&source).map_err(|error| match error {
            Error::Decode { path: json_path, message } => Error::Decode {
                path: format!("{} {json_path}", path.display()),
                message,
            },
            other => other,
        })
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Follows alias chains; stops on cycles.
    pub fn resolve_alias<'a>(&'a self, mut name: &'a str) -> &'a str {
        for _ in 0..=self.type_aliases.len() {
            match self.type_aliases.get(name) {
                Some(next) => name = next.as_str(),
                None => return name,
            }
        }
        name
    }
}
